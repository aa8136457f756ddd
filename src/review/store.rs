use async_trait::async_trait;

use super::models::{PullRequest, PullRequestShort, Team, User};
use crate::errors::ReviewResult;

/// Durable storage for teams, users and pull requests.
///
/// Implementations are the source of truth for uniqueness and must run every
/// multi-statement write as one atomic unit. Real implementation:
/// `DbHandle` (SQLite).
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Create a team and upsert its members. `AlreadyExists` if the name is taken.
    async fn add_team(&self, team: Team) -> ReviewResult<()>;

    async fn get_team(&self, name: &str) -> ReviewResult<Team>;

    async fn set_user_active(&self, user_id: &str, is_active: bool) -> ReviewResult<User>;

    async fn get_pull_request(&self, pr_id: &str) -> ReviewResult<PullRequest>;

    /// Active members of the team `user_id` belongs to, `user_id` included.
    async fn list_active_teammate_ids(&self, user_id: &str) -> ReviewResult<Vec<String>>;

    /// Persist an OPEN pull request. `AlreadyExists` on a duplicate id,
    /// `NotFound` when the author is unknown.
    async fn insert_pull_request(
        &self,
        pr_id: &str,
        name: &str,
        author_id: &str,
        reviewer_ids: &[String],
    ) -> ReviewResult<PullRequest>;

    /// Mark merged. Repeating the call returns the stored record unchanged.
    async fn mark_merged(&self, pr_id: &str) -> ReviewResult<PullRequest>;

    /// Swap `old_reviewer_id` for `new_reviewer_id`, re-checking status and
    /// membership in the same transaction as the write.
    async fn replace_reviewer(
        &self,
        pr_id: &str,
        old_reviewer_id: &str,
        new_reviewer_id: &str,
    ) -> ReviewResult<PullRequest>;

    async fn list_by_reviewer(&self, user_id: &str) -> ReviewResult<Vec<PullRequestShort>>;
}
