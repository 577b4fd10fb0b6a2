use bulkload::config::LoadConfig;
use bulkload::connection::PgBulkConnection;
use bulkload::pool::ConnectionPool;
use bulkload::scheduler::IngestionScheduler;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "bulkload")]
#[command(about = "Parallel CSV bulk loader for PostgreSQL")]
#[command(version)]
struct Args {
    /// Target table name
    #[arg(short, long)]
    table: String,

    /// Database name
    #[arg(short, long)]
    database: String,

    /// Database server host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Database server port
    #[arg(long, default_value_t = 5432)]
    port: u16,

    /// Database user (or set BULKLOAD_USER env var)
    #[arg(long)]
    user: Option<String>,

    /// Database password (or set BULKLOAD_PASSWORD env var)
    #[arg(long)]
    password: Option<String>,

    /// Directory scanned for *.csv input files
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Number of database connections and parallel load workers
    #[arg(long, default_value_t = 5)]
    connections: usize,

    /// Rows per batch
    #[arg(long, default_value_t = 50_000)]
    batch_rows: usize,

    /// Waves per file: each wave submits ceil(total_batches / N) jobs
    #[arg(long, default_value_t = 5)]
    wave_denominator: u64,

    /// Low-memory threshold in GiB
    #[arg(long, default_value_t = 5.0)]
    memory_threshold_gib: f64,

    /// Progress milestone granularity in percent
    #[arg(long, default_value_t = 10)]
    progress_step_percent: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let user = args
        .user
        .or_else(|| std::env::var("BULKLOAD_USER").ok())
        .unwrap_or_else(|| "postgres".to_string());
    let password = args
        .password
        .or_else(|| std::env::var("BULKLOAD_PASSWORD").ok())
        .unwrap_or_default();

    let config = LoadConfig {
        host: args.host,
        port: args.port,
        database: args.database,
        user,
        password,
        table: args.table,
        connections: args.connections,
        batch_rows: args.batch_rows,
        wave_denominator: args.wave_denominator,
        memory_threshold_bytes: (args.memory_threshold_gib * 1024.0 * 1024.0 * 1024.0) as u64,
        progress_step_percent: args.progress_step_percent,
    };

    let files = scan_csv_files(&args.data_dir)?;
    info!(
        "{} target csv files found in {}",
        files.len(),
        args.data_dir.display()
    );

    // Connectivity failure here is fatal: no file is attempted.
    let connections = PgBulkConnection::connect_many(&config.database_url(), config.connections)
        .await
        .context("Failed to establish database connections")?;
    let pool = Arc::new(ConnectionPool::new(connections));
    info!("Database connection established");

    let mut scheduler = IngestionScheduler::new(Arc::clone(&pool), config);
    let mut total_failed: u64 = 0;
    for file in &files {
        info!("Start importing {} to the database...", file.display());
        match scheduler.load_file(file).await {
            Ok(summary) => {
                total_failed += summary.failed_batches;
                info!("{} has been imported to the database", file.display());
            }
            Err(err) => {
                // Keep going: remaining files are still attempted.
                error!("Failed to import {}: {}", file.display(), err);
            }
        }
    }

    pool.close_all().await;
    if total_failed > 0 {
        warn!(
            "{} batches failed across the run; see per-batch errors above",
            total_failed
        );
    }
    info!("All files imported. Database connections closed");
    Ok(())
}

fn scan_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read input directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();
    Ok(files)
}
