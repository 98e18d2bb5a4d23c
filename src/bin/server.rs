//! Obra development remote store
//!
//! Serves the table and change-feed endpoints the Obra sync engine talks
//! to, backed by a JSON file.
//!
//! # Configuration
//!
//! Environment variables:
//! - `OBRA_REMOTE_PORT`: Port to listen on (default: 8787)
//! - `OBRA_REMOTE_DATA_DIR`: Directory for `tables.json` (default: ~/.local/share/obra-remote)
//! - `OBRA_REMOTE_CONFIG`: Path to the API key file (default: ~/.config/obra-remote/config.yaml)

use obra::server::{router, ApiKeyStore, AppState, ServerConfig, ServerStorage};
use obra_core::TableRegistry;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "obra_remote=info,obra=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("Config file: {}", config.config_path.display());

    let registry = TableRegistry::standard();
    let storage = match ServerStorage::open(&config.data_dir, registry.names()) {
        Ok(storage) => storage,
        Err(e) => {
            tracing::error!("Failed to open storage: {}", e);
            std::process::exit(1);
        }
    };
    let api_keys = ApiKeyStore::load(&config.config_path);

    let app = router(AppState::new(storage, api_keys));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
