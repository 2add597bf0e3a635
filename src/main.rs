use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use grocery_loader::config::GroceryLoadConfig;
use grocery_loader::database_ops::db::Db;
use grocery_loader::database_ops::grocery_items::{ensure_schema, TABLE_NAME};
use grocery_loader::loader::load_csv;
use grocery_loader::logging::init_tracing;
use grocery_loader::util::env as env_util;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "load_groceries",
    version,
    about = "Load the grocery product CSV export into the grocery_items table"
)]
struct Cli {
    /// Optional override for the database URL (default: DATABASE_URL)
    #[arg(long)]
    db_url: Option<String>,
    /// Path to the CSV export (default: GROCERY_CSV_PATH or ./GroceryDataset.csv)
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Rows per bulk insert (default: GROCERY_CHUNK_SIZE or 1000)
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Optional override for max pool connections (default: 2)
    #[arg(long)]
    max_connections: Option<u32>,
    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_filter: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_util::init_env();
    init_tracing(&cli.log_filter)?;

    let cfg = GroceryLoadConfig {
        database_url: cli.db_url,
        csv_path: cli.csv,
        chunk_size: cli.chunk_size,
        max_connections: cli.max_connections,
    }
    .resolve()?;
    cfg.log_snapshot();

    let db = Db::connect(&cfg.database_url, cfg.max_connections)
        .await
        .context("failed to connect to database")?;
    ensure_schema(&db.pool).await?;

    let mut store = db.begin_grocery_store().await?;
    let inserted = load_csv(&mut store, &cfg.csv_path, cfg.chunk_size).await?;
    info!(inserted, csv = %cfg.csv_path.display(), "load finished");
    println!("Inserted {inserted} rows into {TABLE_NAME}.");

    db.close().await;
    Ok(())
}
