//! Synthetic data for load testing: `pullreq seed`.
//!
//! Creates `team_<i>` with members `u_<i>_<j>` and opens `pr_seed_<k>` for
//! random authors through the regular lifecycle engine. Records that already
//! exist are skipped, so the command can be re-run against the same database.

use std::sync::Arc;

use anyhow::Result;
use rand::{Rng, SeedableRng};
use rand::seq::SliceRandom;
use tracing::debug;

use pullreq::config::ServiceConfig;
use pullreq::errors::ReviewError;
use pullreq::review::db::DbHandle;
use pullreq::review::models::{Team, TeamMember};
use pullreq::review::server::open_database;
use pullreq::review::service::{PullRequestService, TeamService};
use pullreq::review::store::ReviewStore;

#[derive(Debug, Clone, Copy)]
pub struct SeedPlan {
    pub teams: usize,
    pub members: usize,
    pub pull_requests: usize,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub teams_created: usize,
    pub teams_skipped: usize,
    pub pull_requests_created: usize,
    pub pull_requests_skipped: usize,
}

pub async fn cmd_seed(config: &ServiceConfig, plan: SeedPlan) -> Result<()> {
    let db = open_database(&config.database.path)?;
    let store: Arc<dyn ReviewStore> = Arc::new(DbHandle::new(db));
    let summary = seed_store(store, plan, &mut rand::thread_rng()).await?;

    println!(
        "Seeded {}: {} teams ({} skipped), {} pull requests ({} skipped)",
        config.database.path.display(),
        summary.teams_created,
        summary.teams_skipped,
        summary.pull_requests_created,
        summary.pull_requests_skipped
    );
    Ok(())
}

pub async fn seed_store<R>(
    store: Arc<dyn ReviewStore>,
    plan: SeedPlan,
    rng: &mut R,
) -> Result<SeedSummary>
where
    R: Rng + ?Sized,
{
    let teams = TeamService::new(store.clone());
    let pull_requests =
        PullRequestService::with_rng(store, rand::rngs::StdRng::from_rng(&mut *rng)?);
    let mut summary = SeedSummary::default();
    let mut users = Vec::with_capacity(plan.teams * plan.members);

    for i in 1..=plan.teams {
        let members: Vec<TeamMember> = (1..=plan.members)
            .map(|j| TeamMember {
                id: format!("u_{}_{}", i, j),
                name: format!("User {}-{}", i, j),
                is_active: true,
            })
            .collect();
        users.extend(members.iter().map(|m| m.id.clone()));

        let team = Team {
            name: format!("team_{}", i),
            members,
        };
        match teams.create(team).await {
            Ok(_) => summary.teams_created += 1,
            Err(ReviewError::AlreadyExists { id, .. }) => {
                debug!(team = %id, "team exists, skipping");
                summary.teams_skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    for k in 1..=plan.pull_requests {
        let Some(author) = users.choose(&mut *rng) else {
            break;
        };
        let pr_id = format!("pr_seed_{}", k);
        match pull_requests
            .create(&pr_id, &format!("Seed PR {}", k), author)
            .await
        {
            Ok(_) => summary.pull_requests_created += 1,
            Err(ReviewError::AlreadyExists { .. }) => summary.pull_requests_skipped += 1,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pullreq::review::db::ReviewDb;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn memory_store() -> Arc<dyn ReviewStore> {
        Arc::new(DbHandle::new(ReviewDb::new_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn test_seed_creates_everything() {
        let store = memory_store();
        let plan = SeedPlan {
            teams: 3,
            members: 4,
            pull_requests: 5,
        };
        let summary = seed_store(store.clone(), plan, &mut StdRng::seed_from_u64(1))
            .await
            .unwrap();
        assert_eq!(summary.teams_created, 3);
        assert_eq!(summary.pull_requests_created, 5);

        let team = store.get_team("team_2").await.unwrap();
        assert_eq!(team.members.len(), 4);
        assert_eq!(team.members[0].id, "u_2_1");

        let pr = store.get_pull_request("pr_seed_5").await.unwrap();
        assert_eq!(pr.reviewers.len(), 2);
        assert!(!pr.is_reviewer(&pr.author_id));
    }

    #[tokio::test]
    async fn test_seed_is_rerunnable() {
        let store = memory_store();
        let plan = SeedPlan {
            teams: 2,
            members: 3,
            pull_requests: 2,
        };
        seed_store(store.clone(), plan, &mut StdRng::seed_from_u64(1))
            .await
            .unwrap();
        let again = seed_store(store, plan, &mut StdRng::seed_from_u64(2))
            .await
            .unwrap();
        assert_eq!(
            again,
            SeedSummary {
                teams_created: 0,
                teams_skipped: 2,
                pull_requests_created: 0,
                pull_requests_skipped: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_seed_without_members_opens_nothing() {
        let store = memory_store();
        let plan = SeedPlan {
            teams: 2,
            members: 0,
            pull_requests: 3,
        };
        let summary = seed_store(store, plan, &mut StdRng::seed_from_u64(1))
            .await
            .unwrap();
        assert_eq!(summary.teams_created, 2);
        assert_eq!(summary.pull_requests_created, 0);
    }
}
