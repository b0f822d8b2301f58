//! # tatsahay-server
//!
//! HTTP front end for Tat-Sahay hazard reporting.
//!
//! This binary provides:
//! - **Report submission** through the core pipeline, with per-submission
//!   status polling and cancellation
//! - **Feed, profile and map views** served from the projection cache
//! - **Server-sent events** announcing which views went stale
//! - **Photo storage** on local disk
//! - **Moderation** endpoints behind an admin bearer token

mod api;
mod config;
mod error;
mod media_store;
mod session;
mod submissions;

use tracing::info;
use tracing_subscriber::EnvFilter;

use tatsahay_shared::constants::APP_NAME;
use tatsahay_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::media_store::DiskMediaStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,tatsahay_server=debug,tatsahay_core=debug")
            }),
        )
        .init();

    info!("Starting {} server v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        instance = %config.instance_name,
        http_addr = %config.http_addr,
        feed_includes_unverified = config.feed_includes_unverified,
        admin_enabled = config.admin_token.is_some(),
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Open storage
    // -----------------------------------------------------------------------
    let db = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    info!(path = ?db.path(), "Incident store ready");

    let media =
        DiskMediaStore::new(config.media_storage_path.clone(), config.max_media_size).await?;

    // -----------------------------------------------------------------------
    // 4. Wire the core and start the projection listener
    // -----------------------------------------------------------------------
    let http_addr = config.http_addr;
    let state = AppState::new(config, db, media);
    let _listener = state.cache.spawn_listener();

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server until it fails or Ctrl+C arrives
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
