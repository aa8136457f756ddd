//! Reviewer assignment back-end.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, ServerConfig)          │
//! │          │ <─────── │    └─ api.rs  (route handlers, AppState)         │
//! └──────────┘          │         │                                        │
//!                       │         v                                        │
//!                       │  service.rs  (PullRequestService, Team/User)     │
//!                       │         │            │                           │
//!                       │         │            └─ selection.rs (sampling)  │
//!                       │         v                                        │
//!                       │  store.rs  (ReviewStore trait)                   │
//!                       │         │                                        │
//!                       │         v                                        │
//!                       │  db.rs  (DbHandle → ReviewDb, SQLite)            │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Typical Request Flow (reassign a reviewer)
//!
//! 1. `POST /pullRequest/reassign` → `api::reassign_reviewer()`
//! 2. `PullRequestService::reassign()` loads the pull request, rejects merged
//!    ones and ids that are not current reviewers.
//! 3. The active teammates of the outgoing reviewer, minus the current
//!    reviewers and the author, form the candidate pool; one is sampled.
//! 4. `ReviewStore::replace_reviewer()` re-validates and swaps in a single
//!    SQLite transaction, so a concurrent merge or reassignment is detected.

pub mod api;
pub mod db;
pub mod models;
pub mod selection;
pub mod server;
pub mod service;
pub mod store;
