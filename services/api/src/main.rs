//! API Service - admin upload intake for retail sales data
//!
//! Endpoints:
//! - GET /health - Health check
//! - POST /uploads - Ingest one multipart upload (`kind`, `file`)
//! - GET /uploads - List recent batches
//! - GET /uploads/:id - Batch detail
//! - GET /uploads/:id/errors - Row errors of a batch

mod context;
mod error;
mod routes;
mod state;

use anyhow::Context;
use context::AccessPolicy;
use ingest::telemetry::init_tracing;
use ingest::{Config, Ingestor, PgStore};
use state::AppState;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env().context("Invalid configuration")?;

    info!("connecting to database");
    let store = PgStore::connect(config.require_db_url()?, config.db_max_connections)
        .await
        .context("Failed to connect to database")?;
    if config.run_migrations {
        store.migrate().await.context("Failed to run migrations")?;
    }
    let store = Arc::new(store);

    let ingestor = Ingestor::new(store.clone(), store).with_max_upload_bytes(config.max_upload_bytes);
    let policy = AccessPolicy::new(config.admin_emails.clone(), config.admin_subjects.clone());
    if policy.is_open() {
        warn!("no admin allowlist configured; every signed-in caller may upload");
    }
    let app = routes::app(Arc::new(AppState::new(ingestor, policy)));

    info!(bind = %config.api_bind, "API listening");
    info!("endpoints: GET /health, POST /uploads, GET /uploads?limit=, GET /uploads/:id, GET /uploads/:id/errors");

    let listener = tokio::net::TcpListener::bind(&config.api_bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
