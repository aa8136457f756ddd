use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::models::{PullRequest, PullRequestShort, Team, User};
use super::service::{PullRequestService, TeamService, UserService};
use super::store::ReviewStore;
use crate::errors::{Entity, ReviewError};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub teams: TeamService,
    pub users: UserService,
    pub pull_requests: PullRequestService,
}

impl AppState {
    pub fn new(store: Arc<dyn ReviewStore>) -> Self {
        Self::with_pull_requests(store.clone(), PullRequestService::new(store))
    }

    /// Build state around an already configured lifecycle engine (e.g. one
    /// with a seeded random source).
    pub fn with_pull_requests(store: Arc<dyn ReviewStore>, pull_requests: PullRequestService) -> Self {
        Self {
            teams: TeamService::new(store.clone()),
            users: UserService::new(store),
            pull_requests,
        }
    }
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct TeamQuery {
    pub team_name: Option<String>,
}

#[derive(Deserialize)]
pub struct UserQuery {
    pub user_id: Option<String>,
}

#[derive(Deserialize)]
pub struct SetIsActiveRequest {
    pub user_id: String,
    pub is_active: bool,
}

#[derive(Deserialize)]
pub struct CreatePullRequestRequest {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
}

#[derive(Deserialize)]
pub struct MergePullRequestRequest {
    pub pull_request_id: String,
}

#[derive(Deserialize)]
pub struct ReassignRequest {
    pub pull_request_id: String,
    pub old_user_id: String,
}

// ── Response payload types ────────────────────────────────────────────

#[derive(Serialize)]
pub struct TeamResponse {
    pub team: Team,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Serialize)]
pub struct PullRequestResponse {
    pub pull_request: PullRequest,
}

#[derive(Serialize)]
pub struct ReassignResponse {
    pub pr: PullRequest,
    pub replaced_by: String,
}

#[derive(Serialize)]
pub struct ReviewListResponse {
    pub user_id: String,
    pub pull_requests: Vec<PullRequestShort>,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    Review(ReviewError),
    BadRequest(String),
}

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        ApiError::Review(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Review(err) => match err {
                ReviewError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                ReviewError::AlreadyExists {
                    entity: Entity::Team,
                    ..
                } => (StatusCode::BAD_REQUEST, "TEAM_EXISTS"),
                ReviewError::AlreadyExists { .. } => (StatusCode::CONFLICT, "PR_EXISTS"),
                ReviewError::AlreadyMerged { .. } => (StatusCode::CONFLICT, "PR_MERGED"),
                ReviewError::NotAssigned { .. } => (StatusCode::CONFLICT, "NOT_ASSIGNED"),
                ReviewError::NoCandidate { .. } => (StatusCode::CONFLICT, "NO_CANDIDATE"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::Review(err) if err.is_business() => err.to_string(),
            // Internal details are already logged by the service layer.
            ApiError::Review(_) => "Internal error".to_string(),
        };
        (
            status,
            Json(serde_json::json!({"error": {"code": code, "message": message}})),
        )
            .into_response()
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, ApiError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ApiError::BadRequest(format!("{} should not be empty", name))),
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/team/add", post(add_team))
        .route("/team/get", get(get_team))
        .route("/users/setIsActive", post(set_is_active))
        .route("/users/getReview", get(get_review))
        .route("/pullRequest/create", post(create_pull_request))
        .route("/pullRequest/merge", post(merge_pull_request))
        .route("/pullRequest/reassign", post(reassign_reviewer))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn add_team(
    State(state): State<SharedState>,
    payload: Result<Json<Team>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(team) = payload?;
    let team = state.teams.create(team).await?;
    Ok((StatusCode::CREATED, Json(TeamResponse { team })))
}

async fn get_team(
    State(state): State<SharedState>,
    Query(query): Query<TeamQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let name = required(query.team_name, "team_name")?;
    let team = state.teams.get(&name).await?;
    Ok(Json(TeamResponse { team }))
}

async fn set_is_active(
    State(state): State<SharedState>,
    payload: Result<Json<SetIsActiveRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let user = state.users.set_active(&req.user_id, req.is_active).await?;
    Ok(Json(UserResponse { user }))
}

async fn get_review(
    State(state): State<SharedState>,
    Query(query): Query<UserQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = required(query.user_id, "user_id")?;
    let pull_requests = state.pull_requests.list_by_reviewer(&user_id).await?;
    Ok(Json(ReviewListResponse {
        user_id,
        pull_requests,
    }))
}

async fn create_pull_request(
    State(state): State<SharedState>,
    payload: Result<Json<CreatePullRequestRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let pull_request = state
        .pull_requests
        .create(&req.pull_request_id, &req.pull_request_name, &req.author_id)
        .await?;
    Ok((StatusCode::CREATED, Json(PullRequestResponse { pull_request })))
}

async fn merge_pull_request(
    State(state): State<SharedState>,
    payload: Result<Json<MergePullRequestRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let pull_request = state.pull_requests.merge(&req.pull_request_id).await?;
    Ok(Json(PullRequestResponse { pull_request }))
}

async fn reassign_reviewer(
    State(state): State<SharedState>,
    payload: Result<Json<ReassignRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let (pr, replaced_by) = state
        .pull_requests
        .reassign(&req.pull_request_id, &req.old_user_id)
        .await?;
    Ok(Json(ReassignResponse { pr, replaced_by }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::db::{DbHandle, ReviewDb};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let store: Arc<dyn ReviewStore> = Arc::new(DbHandle::new(ReviewDb::new_in_memory().unwrap()));
        let prs = PullRequestService::with_rng(store.clone(), StdRng::seed_from_u64(11));
        let state = Arc::new(AppState::with_pull_requests(store, prs));
        api_router().with_state(state)
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> Response {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    async fn get_uri(app: &Router, uri: &str) -> Response {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    async fn add_default_team(app: &Router) {
        let response = post_json(
            app,
            "/team/add",
            serde_json::json!({
                "team_name": "backend",
                "members": [
                    {"user_id": "u1", "username": "Alice", "is_active": true},
                    {"user_id": "u2", "username": "Bob", "is_active": true},
                    {"user_id": "u3", "username": "Carol", "is_active": true},
                ]
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    async fn error_code(response: Response) -> String {
        let body: serde_json::Value = body_json(response.into_body()).await;
        body["error"]["code"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = test_app();
        let response = get_uri(&app, "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_add_and_get_team() {
        let app = test_app();
        add_default_team(&app).await;

        let response = get_uri(&app, "/team/get?team_name=backend").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["team"]["team_name"], "backend");
        assert_eq!(body["team"]["members"][1]["username"], "Bob");
    }

    #[tokio::test]
    async fn test_add_team_twice() {
        let app = test_app();
        add_default_team(&app).await;
        let response = post_json(
            &app,
            "/team/add",
            serde_json::json!({"team_name": "backend", "members": []}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_code(response).await, "TEAM_EXISTS");
    }

    #[tokio::test]
    async fn test_get_team_missing_param() {
        let app = test_app();
        let response = get_uri(&app, "/team/get").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_code(response).await, "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_get_team_not_found() {
        let app = test_app();
        let response = get_uri(&app, "/team/get?team_name=ghost").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(error_code(response).await, "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let app = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/pullRequest/create")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_set_is_active() {
        let app = test_app();
        add_default_team(&app).await;
        let response = post_json(
            &app,
            "/users/setIsActive",
            serde_json::json!({"user_id": "u2", "is_active": false}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["user"]["team_name"], "backend");
        assert_eq!(body["user"]["is_active"], false);

        let response = post_json(
            &app,
            "/users/setIsActive",
            serde_json::json!({"user_id": "ghost", "is_active": false}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_pull_request_flow() {
        let app = test_app();
        add_default_team(&app).await;

        let response = post_json(
            &app,
            "/pullRequest/create",
            serde_json::json!({
                "pull_request_id": "pr-1",
                "pull_request_name": "Add search",
                "author_id": "u1"
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body: serde_json::Value = body_json(response.into_body()).await;
        let pr = &body["pull_request"];
        assert_eq!(pr["status"], "OPEN");
        let reviewers: Vec<String> =
            serde_json::from_value(pr["assigned_reviewers"].clone()).unwrap();
        let mut sorted = reviewers.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["u2".to_string(), "u3".to_string()]);

        let response = post_json(
            &app,
            "/pullRequest/create",
            serde_json::json!({
                "pull_request_id": "pr-1",
                "pull_request_name": "Again",
                "author_id": "u1"
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(error_code(response).await, "PR_EXISTS");

        let response = get_uri(&app, "/users/getReview?user_id=u2").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["user_id"], "u2");
        assert_eq!(body["pull_requests"][0]["pull_request_id"], "pr-1");
    }

    #[tokio::test]
    async fn test_create_unknown_author() {
        let app = test_app();
        let response = post_json(
            &app,
            "/pullRequest/create",
            serde_json::json!({
                "pull_request_id": "pr-1",
                "pull_request_name": "x",
                "author_id": "ghost"
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reassign_no_candidate_then_merge() {
        let app = test_app();
        add_default_team(&app).await;
        post_json(
            &app,
            "/pullRequest/create",
            serde_json::json!({
                "pull_request_id": "pr-1",
                "pull_request_name": "x",
                "author_id": "u1"
            }),
        )
        .await;

        let response = post_json(
            &app,
            "/pullRequest/reassign",
            serde_json::json!({"pull_request_id": "pr-1", "old_user_id": "u2"}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(error_code(response).await, "NO_CANDIDATE");

        let response = post_json(
            &app,
            "/pullRequest/reassign",
            serde_json::json!({"pull_request_id": "pr-1", "old_user_id": "u1"}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(error_code(response).await, "NOT_ASSIGNED");

        let response = post_json(
            &app,
            "/pullRequest/merge",
            serde_json::json!({"pull_request_id": "pr-1"}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let first: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(first["pull_request"]["status"], "MERGED");
        assert!(first["pull_request"]["mergedAt"].is_string());

        let response = post_json(
            &app,
            "/pullRequest/merge",
            serde_json::json!({"pull_request_id": "pr-1"}),
        )
        .await;
        let second: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(
            first["pull_request"]["mergedAt"],
            second["pull_request"]["mergedAt"]
        );

        let response = post_json(
            &app,
            "/pullRequest/reassign",
            serde_json::json!({"pull_request_id": "pr-1", "old_user_id": "u2"}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(error_code(response).await, "PR_MERGED");
    }

    #[tokio::test]
    async fn test_reassign_success() {
        let app = test_app();
        add_default_team(&app).await;
        post_json(
            &app,
            "/users/setIsActive",
            serde_json::json!({"user_id": "u3", "is_active": false}),
        )
        .await;
        post_json(
            &app,
            "/pullRequest/create",
            serde_json::json!({
                "pull_request_id": "pr-1",
                "pull_request_name": "x",
                "author_id": "u1"
            }),
        )
        .await;
        post_json(
            &app,
            "/users/setIsActive",
            serde_json::json!({"user_id": "u3", "is_active": true}),
        )
        .await;

        let response = post_json(
            &app,
            "/pullRequest/reassign",
            serde_json::json!({"pull_request_id": "pr-1", "old_user_id": "u2"}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["replaced_by"], "u3");
        assert_eq!(body["pr"]["assigned_reviewers"][0], "u3");
    }

    #[tokio::test]
    async fn test_merge_unknown_pull_request() {
        let app = test_app();
        let response = post_json(
            &app,
            "/pullRequest/merge",
            serde_json::json!({"pull_request_id": "missing"}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_review_empty() {
        let app = test_app();
        let response = get_uri(&app, "/users/getReview?user_id=nobody").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert!(body["pull_requests"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let err = ApiError::from(ReviewError::LockPoisoned);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
