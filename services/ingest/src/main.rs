//! Ingest CLI - loads a local upload file through the same pipeline as the API
//!
//! Usage:
//!   cargo run --bin ingest -- --kind actuals_circana --file ./weekly.csv
//!   cargo run --bin ingest -- --kind budget --file ./budget.xlsx --dry-run

use anyhow::{Context, Result};
use clap::Parser;
use ingest::audit::AuditSource;
use ingest::store::{MemoryStore, PgStore};
use ingest::telemetry::init_tracing;
use ingest::{Config, IngestRequest, Ingestor, UploadKind, Uploader};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ingest", about = "Ingests a retail upload file into canonical facts")]
struct Args {
    /// Upload kind: actuals_circana, promotions or budget
    #[arg(long)]
    kind: UploadKind,

    /// Path to the CSV or spreadsheet file
    #[arg(long)]
    file: PathBuf,

    /// Email recorded as the uploader
    #[arg(long)]
    uploader: Option<String>,

    /// Dry run - map against an in-memory store, don't touch the database
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    let config = Config::from_env()?;

    let payload = fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let filename = args
        .file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());

    info!(
        kind = %args.kind,
        file = %args.file.display(),
        bytes = payload.len(),
        mode = if args.dry_run { "dry-run" } else { "live" },
        "starting ingest"
    );

    let memory = Arc::new(MemoryStore::new());
    let ingestor = if args.dry_run {
        Ingestor::new(memory.clone(), memory.clone())
    } else {
        let store = PgStore::connect(config.require_db_url()?, config.db_max_connections)
            .await
            .context("Failed to connect to database")?;
        if config.run_migrations {
            store.migrate().await.context("Failed to run migrations")?;
        }
        let store = Arc::new(store);
        Ingestor::new(store.clone(), store)
    }
    .with_max_upload_bytes(config.max_upload_bytes)
    .with_source(AuditSource::System);

    let outcome = ingestor
        .ingest(IngestRequest {
            kind: args.kind,
            filename,
            uploader: Uploader::new(Some("cli".to_string()), args.uploader),
            payload,
            correlation_id: None,
        })
        .await?;

    println!("Batch:   {}", outcome.batch_id);
    println!("Status:  {}", outcome.status);
    println!("Rows:    {}", outcome.row_count);
    println!("Errors:  {}", outcome.error_count);

    let errors = ingestor.store().batch_errors(outcome.batch_id).await?;
    for err in errors.iter().take(10) {
        match err.row_number {
            Some(row) => println!("  row {:>5}: {}", row, err.message),
            None => println!("  batch:     {}", err.message),
        }
    }
    if errors.len() > 10 {
        println!("  ... and {} more", errors.len() - 10);
    }

    if args.dry_run {
        print_sample(&memory, args.kind).await;
        println!("\nDry run - nothing written to the database");
    }

    if let Some(error) = outcome.error {
        anyhow::bail!("batch {} failed: {}", outcome.batch_id, error);
    }
    Ok(())
}

async fn print_sample(store: &MemoryStore, kind: UploadKind) {
    let lines: Vec<String> = match kind {
        UploadKind::ActualsWide => store
            .actuals()
            .await
            .iter()
            .map(|f| format!("{} | {} | {} | {}", f.geography, f.product, f.week_end_date, f.volume))
            .collect(),
        UploadKind::Promotions => store
            .promotions()
            .await
            .iter()
            .map(|p| {
                format!(
                    "{} | {} | {} | {:?}",
                    p.deal_id.as_deref().unwrap_or("-"),
                    p.call_point.as_deref().unwrap_or("-"),
                    p.ppg.as_deref().unwrap_or("-"),
                    p.promo_start_date
                )
            })
            .collect(),
        UploadKind::Budget => store
            .budget()
            .await
            .iter()
            .map(|b| format!("{} | {} | {:?}", b.call_point, b.ppg_item, b.total_cases_budgeted))
            .collect(),
    };

    println!("\nAccounts seen: {}", store.account_count().await);
    for (i, line) in lines.iter().take(3).enumerate() {
        println!("  [{}] {}", i + 1, line);
    }
    if lines.len() > 3 {
        println!("  ... and {} more", lines.len() - 3);
    }
}
