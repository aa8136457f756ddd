//! Typed error taxonomy for the reviewer assignment service.
//!
//! Five variants are business outcomes that callers are expected to match on
//! (`NotFound`, `AlreadyExists`, `AlreadyMerged`, `NotAssigned`,
//! `NoCandidate`). The rest are opaque internal failures surfaced as-is.

use thiserror::Error;

/// The kind of record a `NotFound` / `AlreadyExists` error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Team,
    User,
    PullRequest,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Team => write!(f, "Team"),
            Self::User => write!(f, "User"),
            Self::PullRequest => write!(f, "Pull request"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: Entity, id: String },

    #[error("{entity} '{id}' already exists")]
    AlreadyExists { entity: Entity, id: String },

    #[error("Pull request '{pr_id}' is already merged")]
    AlreadyMerged { pr_id: String },

    #[error("User '{reviewer_id}' is not a reviewer of pull request '{pr_id}'")]
    NotAssigned { pr_id: String, reviewer_id: String },

    #[error("No active replacement candidate for pull request '{pr_id}'")]
    NoCandidate { pr_id: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReviewError {
    pub fn not_found(entity: Entity, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn already_exists(entity: Entity, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity,
            id: id.into(),
        }
    }

    /// True for the typed, non-retryable business outcomes.
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::AlreadyExists { .. }
                | Self::AlreadyMerged { .. }
                | Self::NotAssigned { .. }
                | Self::NoCandidate { .. }
        )
    }
}

pub type ReviewResult<T> = std::result::Result<T, ReviewError>;
