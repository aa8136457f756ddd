use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::api::{self, AppState, SharedState};
use super::db::{DbHandle, ReviewDb};
use super::store::ReviewStore;
use crate::config::ServiceConfig;

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub db_path: PathBuf,
    pub request_timeout: Duration,
    pub permissive_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
            db_path: PathBuf::from(".pullreq/pullreq.db"),
            request_timeout: Duration::from_secs(5),
            permissive_cors: false,
        }
    }
}

impl From<&ServiceConfig> for ServerConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            address: config.server.address.clone(),
            db_path: config.database.path.clone(),
            request_timeout: Duration::from_secs(config.server.timeout_secs),
            permissive_cors: config.server.permissive_cors,
        }
    }
}

/// Build the full application router with request tracing and a per-request timeout.
pub fn build_router(state: SharedState, request_timeout: Duration) -> Router {
    api::api_router()
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}

/// Open the database, creating its parent directory when needed.
pub fn open_database(db_path: &std::path::Path) -> Result<ReviewDb> {
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    ReviewDb::new(db_path).context("Failed to initialize review database")
}

/// Start the HTTP server and block until Ctrl+C.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let db = open_database(&config.db_path)?;
    let store: Arc<dyn ReviewStore> = Arc::new(DbHandle::new(db));
    let state = Arc::new(AppState::new(store));

    let mut app = build_router(state, config.request_timeout);
    if config.permissive_cors {
        app = app.layer(CorsLayer::permissive());
    }

    let listener = tokio::net::TcpListener::bind(&config.address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.address))?;

    let local_addr = listener.local_addr()?;
    info!(address = %local_addr, db = %config.db_path.display(), "review service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install Ctrl+C handler");
        return;
    }
    info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let store: Arc<dyn ReviewStore> =
            Arc::new(DbHandle::new(ReviewDb::new_in_memory().unwrap()));
        build_router(Arc::new(AppState::new(store)), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_health_via_full_router() {
        let app = test_router();
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_create_team_via_full_router() {
        let app = test_router();
        let req = Request::builder()
            .method("POST")
            .uri("/team/add")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"team_name": "server-test", "members": []}).to_string(),
            ))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["team"]["team_name"], "server-test");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = test_router();
        let req = Request::builder()
            .uri("/nope")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_open_database_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/review.db");
        open_database(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.address, "127.0.0.1:8080");
        assert_eq!(config.db_path, PathBuf::from(".pullreq/pullreq.db"));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert!(!config.permissive_cors);
    }

    #[test]
    fn test_server_config_from_service_config() {
        let mut service = ServiceConfig::default();
        service.server.address = "0.0.0.0:9000".into();
        service.server.timeout_secs = 30;
        let config = ServerConfig::from(&service);
        assert_eq!(config.address, "0.0.0.0:9000");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }
}
