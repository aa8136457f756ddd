use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};

use super::models::*;
use super::store::ReviewStore;
use crate::errors::{Entity, ReviewError, ReviewResult};

/// Async-safe handle to the review database.
///
/// Wraps `ReviewDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<ReviewDb>>,
}

impl DbHandle {
    pub fn new(db: ReviewDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> ReviewResult<R>
    where
        F: FnOnce(&ReviewDb) -> ReviewResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| ReviewError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| ReviewError::Other(anyhow::anyhow!("DB task panicked: {}", e)))?
    }
}

pub struct ReviewDb {
    conn: Connection,
}

impl ReviewDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> anyhow::Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> anyhow::Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS teams (
                    name TEXT PRIMARY KEY,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS users (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    team_name TEXT NOT NULL REFERENCES teams(name)
                );

                CREATE TABLE IF NOT EXISTS pull_requests (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    author_id TEXT NOT NULL REFERENCES users(id),
                    status TEXT NOT NULL DEFAULT 'OPEN',
                    created_at TEXT NOT NULL,
                    merged_at TEXT
                );

                CREATE TABLE IF NOT EXISTS pr_reviewers (
                    pr_id TEXT NOT NULL REFERENCES pull_requests(id) ON DELETE CASCADE,
                    reviewer_id TEXT NOT NULL,
                    slot INTEGER NOT NULL,
                    PRIMARY KEY (pr_id, reviewer_id),
                    UNIQUE (pr_id, slot)
                );

                CREATE INDEX IF NOT EXISTS idx_users_team ON users(team_name, is_active);
                CREATE INDEX IF NOT EXISTS idx_pr_reviewers_reviewer ON pr_reviewers(reviewer_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Teams ─────────────────────────────────────────────────────────

    /// Insert the team row and upsert every member in one transaction.
    /// A member that already exists moves to this team.
    pub fn add_team(&self, team: &Team) -> ReviewResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        match tx.execute("INSERT INTO teams (name) VALUES (?1)", params![team.name]) {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(ReviewError::already_exists(Entity::Team, &team.name));
            }
            Err(e) => return Err(e.into()),
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO users (id, name, is_active, team_name) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    is_active = excluded.is_active,
                    team_name = excluded.team_name",
            )?;
            for member in &team.members {
                stmt.execute(params![member.id, member.name, member.is_active, team.name])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_team(&self, name: &str) -> ReviewResult<Team> {
        let exists = self
            .conn
            .query_row("SELECT name FROM teams WHERE name = ?1", params![name], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        let name = exists.ok_or_else(|| ReviewError::not_found(Entity::Team, name))?;

        let mut stmt = self.conn.prepare(
            "SELECT id, name, is_active FROM users WHERE team_name = ?1 ORDER BY rowid",
        )?;
        let members = stmt
            .query_map(params![name], |row| {
                Ok(TeamMember {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    is_active: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Team { name, members })
    }

    // ── Users ─────────────────────────────────────────────────────────

    pub fn set_user_active(&self, user_id: &str, is_active: bool) -> ReviewResult<User> {
        self.conn
            .query_row(
                "UPDATE users SET is_active = ?1 WHERE id = ?2
                 RETURNING id, name, team_name, is_active",
                params![is_active, user_id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        team_name: row.get(2)?,
                        is_active: row.get(3)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| ReviewError::not_found(Entity::User, user_id))
    }

    /// Active members of the team `user_id` belongs to, `user_id` included.
    pub fn list_active_teammate_ids(&self, user_id: &str) -> ReviewResult<Vec<String>> {
        let team_name: String = self
            .conn
            .query_row(
                "SELECT team_name FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| ReviewError::not_found(Entity::User, user_id))?;

        let mut stmt = self.conn.prepare(
            "SELECT id FROM users WHERE team_name = ?1 AND is_active = 1 ORDER BY rowid",
        )?;
        let ids = stmt
            .query_map(params![team_name], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    // ── Pull requests ─────────────────────────────────────────────────

    pub fn get_pull_request(&self, pr_id: &str) -> ReviewResult<PullRequest> {
        fetch_pull_request(&self.conn, pr_id)?
            .ok_or_else(|| ReviewError::not_found(Entity::PullRequest, pr_id))
    }

    pub fn insert_pull_request(
        &self,
        pr_id: &str,
        name: &str,
        author_id: &str,
        reviewer_ids: &[String],
    ) -> ReviewResult<PullRequest> {
        let tx = self.conn.unchecked_transaction()?;
        let inserted = tx.execute(
            "INSERT INTO pull_requests (id, name, author_id, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![pr_id, name, author_id, PrStatus::Open.as_str(), now_rfc3339()],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(ReviewError::already_exists(Entity::PullRequest, pr_id));
            }
            Err(e) if is_foreign_key_violation(&e) => {
                return Err(ReviewError::not_found(Entity::User, author_id));
            }
            Err(e) => return Err(e.into()),
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO pr_reviewers (pr_id, reviewer_id, slot) VALUES (?1, ?2, ?3)",
            )?;
            for (slot, reviewer_id) in reviewer_ids.iter().enumerate() {
                stmt.execute(params![pr_id, reviewer_id, slot as i64])?;
            }
        }
        let pr = fetch_pull_request(&tx, pr_id)?
            .context("Pull request not found after insert")?;
        tx.commit()?;
        Ok(pr)
    }

    /// Set status MERGED. `merged_at` is only written on the first call.
    pub fn mark_merged(&self, pr_id: &str) -> ReviewResult<PullRequest> {
        let tx = self.conn.unchecked_transaction()?;
        let updated = tx.execute(
            "UPDATE pull_requests
             SET status = ?2, merged_at = COALESCE(merged_at, ?3)
             WHERE id = ?1",
            params![pr_id, PrStatus::Merged.as_str(), now_rfc3339()],
        )?;
        if updated == 0 {
            return Err(ReviewError::not_found(Entity::PullRequest, pr_id));
        }
        let pr = fetch_pull_request(&tx, pr_id)?
            .context("Pull request not found after merge")?;
        tx.commit()?;
        Ok(pr)
    }

    /// Conditional swap of one reviewer. Status and membership are checked
    /// inside the same transaction as the update.
    pub fn replace_reviewer(
        &self,
        pr_id: &str,
        old_reviewer_id: &str,
        new_reviewer_id: &str,
    ) -> ReviewResult<PullRequest> {
        let tx = self.conn.unchecked_transaction()?;
        let current = fetch_pull_request(&tx, pr_id)?
            .ok_or_else(|| ReviewError::not_found(Entity::PullRequest, pr_id))?;

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
        // A concurrent reassignment may have taken the candidate already.
        if current.author_id == new_reviewer_id || current.is_reviewer(new_reviewer_id) {
            return Err(ReviewError::NoCandidate {
                pr_id: pr_id.to_string(),
            });
        }

        tx.execute(
            "UPDATE pr_reviewers SET reviewer_id = ?3 WHERE pr_id = ?1 AND reviewer_id = ?2",
            params![pr_id, old_reviewer_id, new_reviewer_id],
        )?;
        let pr = fetch_pull_request(&tx, pr_id)?
            .context("Pull request not found after reviewer update")?;
        tx.commit()?;
        Ok(pr)
    }

    pub fn list_by_reviewer(&self, user_id: &str) -> ReviewResult<Vec<PullRequestShort>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.name, p.author_id, p.status
             FROM pull_requests p
             JOIN pr_reviewers r ON r.pr_id = p.id
             WHERE r.reviewer_id = ?1
             ORDER BY p.created_at, p.id",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, name, author_id, status)| {
                Ok(PullRequestShort {
                    id,
                    name,
                    author_id,
                    status: parse_status(&status)?,
                })
            })
            .collect()
    }
}

// ── Row helpers ───────────────────────────────────────────────────────

struct PullRequestRow {
    id: String,
    name: String,
    author_id: String,
    status: String,
    created_at: String,
    merged_at: Option<String>,
}

impl PullRequestRow {
    fn into_pull_request(self, reviewers: Vec<String>) -> ReviewResult<PullRequest> {
        Ok(PullRequest {
            status: parse_status(&self.status)?,
            created_at: Some(parse_timestamp(&self.created_at)?),
            merged_at: self.merged_at.as_deref().map(parse_timestamp).transpose()?,
            id: self.id,
            name: self.name,
            author_id: self.author_id,
            reviewers,
        })
    }
}

/// Works against both a plain connection and an open transaction.
fn fetch_pull_request(conn: &Connection, pr_id: &str) -> ReviewResult<Option<PullRequest>> {
    let row = conn
        .query_row(
            "SELECT id, name, author_id, status, created_at, merged_at
             FROM pull_requests WHERE id = ?1",
            params![pr_id],
            |row| {
                Ok(PullRequestRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    author_id: row.get(2)?,
                    status: row.get(3)?,
                    created_at: row.get(4)?,
                    merged_at: row.get(5)?,
                })
            },
        )
        .optional()?;
    let Some(row) = row else {
        return Ok(None);
    };

    let mut stmt =
        conn.prepare("SELECT reviewer_id FROM pr_reviewers WHERE pr_id = ?1 ORDER BY slot")?;
    let reviewers = stmt
        .query_map(params![pr_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;

    row.into_pull_request(reviewers).map(Some)
}

fn parse_status(raw: &str) -> ReviewResult<PrStatus> {
    PrStatus::from_str(raw).map_err(|e| ReviewError::Other(anyhow::anyhow!(e)))
}

fn parse_timestamp(raw: &str) -> ReviewResult<DateTime<Utc>> {
    let ts = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid timestamp in database: {}", raw))?;
    Ok(ts.with_timezone(&Utc))
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
    )
}

fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}

// ── Storage gateway ───────────────────────────────────────────────────

#[async_trait]
impl ReviewStore for DbHandle {
    async fn add_team(&self, team: Team) -> ReviewResult<()> {
        self.call(move |db| db.add_team(&team)).await
    }

    async fn get_team(&self, name: &str) -> ReviewResult<Team> {
        let name = name.to_string();
        self.call(move |db| db.get_team(&name)).await
    }

    async fn set_user_active(&self, user_id: &str, is_active: bool) -> ReviewResult<User> {
        let user_id = user_id.to_string();
        self.call(move |db| db.set_user_active(&user_id, is_active))
            .await
    }

    async fn get_pull_request(&self, pr_id: &str) -> ReviewResult<PullRequest> {
        let pr_id = pr_id.to_string();
        self.call(move |db| db.get_pull_request(&pr_id)).await
    }

    async fn list_active_teammate_ids(&self, user_id: &str) -> ReviewResult<Vec<String>> {
        let user_id = user_id.to_string();
        self.call(move |db| db.list_active_teammate_ids(&user_id))
            .await
    }

    async fn insert_pull_request(
        &self,
        pr_id: &str,
        name: &str,
        author_id: &str,
        reviewer_ids: &[String],
    ) -> ReviewResult<PullRequest> {
        let pr_id = pr_id.to_string();
        let name = name.to_string();
        let author_id = author_id.to_string();
        let reviewer_ids = reviewer_ids.to_vec();
        self.call(move |db| db.insert_pull_request(&pr_id, &name, &author_id, &reviewer_ids))
            .await
    }

    async fn mark_merged(&self, pr_id: &str) -> ReviewResult<PullRequest> {
        let pr_id = pr_id.to_string();
        self.call(move |db| db.mark_merged(&pr_id)).await
    }

    async fn replace_reviewer(
        &self,
        pr_id: &str,
        old_reviewer_id: &str,
        new_reviewer_id: &str,
    ) -> ReviewResult<PullRequest> {
        let pr_id = pr_id.to_string();
        let old_reviewer_id = old_reviewer_id.to_string();
        let new_reviewer_id = new_reviewer_id.to_string();
        self.call(move |db| db.replace_reviewer(&pr_id, &old_reviewer_id, &new_reviewer_id))
            .await
    }

    async fn list_by_reviewer(&self, user_id: &str) -> ReviewResult<Vec<PullRequestShort>> {
        let user_id = user_id.to_string();
        self.call(move |db| db.list_by_reviewer(&user_id)).await
    }
}
