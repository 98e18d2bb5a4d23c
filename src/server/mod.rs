//! Development remote store for Obra.
//!
//! Serves table endpoints and the change feed over in-memory tables that
//! are persisted to disk, so the CLI can sync end-to-end without a hosted
//! backend.
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint (no auth required)
//! - `POST|GET|DELETE /rest/v1/{table}`: table access (auth required)
//! - `GET /realtime/v1?apikey=...`: change feed WebSocket

pub mod auth;
pub mod realtime;
pub mod rest;
pub mod storage;

use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use auth::{ApiKeyStore, AuthClient};
pub use realtime::ChangeHub;
pub use storage::{ServerStorage, ServerStorageError};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Directory holding `tables.json`
    pub data_dir: PathBuf,
    /// Path to the API key file
    pub config_path: PathBuf,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let port = std::env::var("OBRA_REMOTE_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8787);

        let data_dir = std::env::var("OBRA_REMOTE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("obra-remote")
            });

        let config_path = std::env::var("OBRA_REMOTE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("obra-remote")
                    .join("config.yaml")
            });

        Self {
            port,
            data_dir,
            config_path,
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<ServerStorage>,
    pub hub: Arc<ChangeHub>,
    pub api_keys: Arc<ApiKeyStore>,
}

impl AppState {
    pub fn new(storage: ServerStorage, api_keys: ApiKeyStore) -> Self {
        Self {
            storage: Arc::new(storage),
            hub: Arc::new(ChangeHub::new()),
            api_keys: Arc::new(api_keys),
        }
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(state: AppState) -> Router {
    // Public routes (no auth); the feed checks its key from the query string
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/realtime/v1", get(realtime::feed_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route(
            "/rest/v1/{table}",
            post(rest::upsert_rows)
                .get(rest::select_rows)
                .delete(rest::delete_rows),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
