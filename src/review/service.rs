//! Pull request lifecycle and the team/user pass-through services.
//!
//! `PullRequestService` is the only code that drives pull request state
//! transitions:
//!
//! ```text
//!   create ──> OPEN ──merge──> MERGED (terminal)
//!               │ ^
//!               └─┘ reassign (one reviewer swapped)
//! ```

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{error, info, warn};

use super::models::{PullRequest, PullRequestShort, Team, User};
use super::selection::{REVIEWERS_PER_PR, exclude, select_reviewers};
use super::store::ReviewStore;
use crate::errors::{ReviewError, ReviewResult};

fn log_failure(operation: &'static str, err: &ReviewError) {
    if err.is_business() {
        warn!(operation, error = %err, "request rejected");
    } else {
        error!(operation, error = %err, "request failed");
    }
}

pub struct TeamService {
    store: Arc<dyn ReviewStore>,
}

impl TeamService {
    pub fn new(store: Arc<dyn ReviewStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, team: Team) -> ReviewResult<Team> {
        self.store
            .add_team(team.clone())
            .await
            .inspect_err(|e| log_failure("create_team", e))?;
        info!(team = %team.name, members = team.members.len(), "team created");
        Ok(team)
    }

    pub async fn get(&self, name: &str) -> ReviewResult<Team> {
        self.store
            .get_team(name)
            .await
            .inspect_err(|e| log_failure("get_team", e))
    }
}

pub struct UserService {
    store: Arc<dyn ReviewStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn ReviewStore>) -> Self {
        Self { store }
    }

    pub async fn set_active(&self, user_id: &str, is_active: bool) -> ReviewResult<User> {
        self.store
            .set_user_active(user_id, is_active)
            .await
            .inspect_err(|e| log_failure("set_user_active", e))
    }
}

/// Reviewer assignment engine.
///
/// The random source is injected so tests can pin outcomes with a seeded
/// generator; production uses an entropy-seeded `StdRng`.
pub struct PullRequestService {
    store: Arc<dyn ReviewStore>,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl PullRequestService {
    pub fn new(store: Arc<dyn ReviewStore>) -> Self {
        Self::with_rng(store, StdRng::from_entropy())
    }

    pub fn with_rng<R>(store: Arc<dyn ReviewStore>, rng: R) -> Self
    where
        R: RngCore + Send + 'static,
    {
        Self {
            store,
            rng: Mutex::new(Box::new(rng)),
        }
    }

    fn pick(&self, pool: &[String], count: usize) -> ReviewResult<Vec<String>> {
        let mut rng = self.rng.lock().map_err(|_| ReviewError::LockPoisoned)?;
        Ok(select_reviewers(pool, count, &mut **rng))
    }

    /// Open a pull request with up to two active teammates of the author as
    /// reviewers. Fewer (or none) are assigned when the team is small.
    pub async fn create(
        &self,
        pr_id: &str,
        name: &str,
        author_id: &str,
    ) -> ReviewResult<PullRequest> {
        self.try_create(pr_id, name, author_id)
            .await
            .inspect_err(|e| log_failure("create_pull_request", e))
    }

    async fn try_create(
        &self,
        pr_id: &str,
        name: &str,
        author_id: &str,
    ) -> ReviewResult<PullRequest> {
        let teammates = self.store.list_active_teammate_ids(author_id).await?;
        let pool = exclude(teammates, [author_id]);
        let reviewers = self.pick(&pool, REVIEWERS_PER_PR)?;

        let pr = self
            .store
            .insert_pull_request(pr_id, name, author_id, &reviewers)
            .await?;
        info!(pr_id, author_id, reviewers = ?pr.reviewers, "pull request created");
        Ok(pr)
    }

    /// Idempotent: merging an already merged pull request returns it unchanged.
    pub async fn merge(&self, pr_id: &str) -> ReviewResult<PullRequest> {
        let pr = self
            .store
            .mark_merged(pr_id)
            .await
            .inspect_err(|e| log_failure("merge_pull_request", e))?;
        info!(pr_id, merged_at = ?pr.merged_at, "pull request merged");
        Ok(pr)
    }

    /// Replace `old_reviewer_id` with a random eligible teammate.
    ///
    /// Returns the updated pull request and the id of the new reviewer.
    pub async fn reassign(
        &self,
        pr_id: &str,
        old_reviewer_id: &str,
    ) -> ReviewResult<(PullRequest, String)> {
        self.try_reassign(pr_id, old_reviewer_id)
            .await
            .inspect_err(|e| log_failure("reassign_reviewer", e))
    }

    async fn try_reassign(
        &self,
        pr_id: &str,
        old_reviewer_id: &str,
    ) -> ReviewResult<(PullRequest, String)> {
        let current = self.store.get_pull_request(pr_id).await?;
        if current.status.is_terminal() {
            return Err(ReviewError::AlreadyMerged {
                pr_id: pr_id.to_string(),
            });
        }
        if !current.is_reviewer(old_reviewer_id) {
            return Err(ReviewError::NotAssigned {
                pr_id: pr_id.to_string(),
                reviewer_id: old_reviewer_id.to_string(),
            });
        }

        // Candidates come from the outgoing reviewer's team.
        let teammates = self.store.list_active_teammate_ids(old_reviewer_id).await?;
        let excluded = current
            .reviewers
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(current.author_id.as_str()));
        let pool = exclude(teammates, excluded);

        let Some(new_reviewer_id) = self.pick(&pool, 1)?.pop() else {
            return Err(ReviewError::NoCandidate {
                pr_id: pr_id.to_string(),
            });
        };

        let pr = self
            .store
            .replace_reviewer(pr_id, old_reviewer_id, &new_reviewer_id)
            .await?;
        info!(
            pr_id,
            old_reviewer_id,
            new_reviewer_id = %new_reviewer_id,
            "reviewer reassigned"
        );
        Ok((pr, new_reviewer_id))
    }

    /// Summaries of every pull request `user_id` currently reviews.
    pub async fn list_by_reviewer(&self, user_id: &str) -> ReviewResult<Vec<PullRequestShort>> {
        self.store
            .list_by_reviewer(user_id)
            .await
            .inspect_err(|e| log_failure("list_by_reviewer", e))
    }
}
