//! Vigil server binary.
//!
//! Subcommands:
//! - `run`: ingest API + triangulation worker pool (the default)
//! - `init-db`: create the database and run migrations
//! - `backfill`: re-enqueue pending reports stranded by publish failures
//! - `status`: print store statistics

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use vigil_server::api::{self, AppState};
use vigil_server::bus::EventBus;
use vigil_server::config::Config;
use vigil_server::ingest::ReportIntake;
use vigil_server::storage::Storage;
use vigil_server::triangulation::TriangulationService;
use vigil_server::worker::ReportWorker;

#[derive(Parser)]
#[command(name = "vigil-server")]
#[command(version, about = "Vigil election-observation back-end", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "vigil.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server (ingest API + worker pool)
    Run,

    /// Initialize the database
    InitDb,

    /// Re-enqueue pending reports older than a threshold
    Backfill {
        /// Only reports at least this many minutes old
        #[arg(long, default_value_t = 10)]
        older_than_minutes: i64,
    },

    /// Show store statistics
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug);

    info!("Vigil server starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(&cli.config).await?,
        Commands::InitDb => init_database(&cli.config).await?,
        Commands::Backfill { older_than_minutes } => {
            backfill(&cli.config, older_than_minutes).await?
        }
        Commands::Status => show_status(&cli.config).await?,
    }

    Ok(())
}

/// Initialize tracing subscriber for logging.
fn init_logging(debug: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = if debug {
        EnvFilter::new("vigil_server=debug,tower_http=debug,sqlx=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("vigil_server=info,tower_http=info"))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}

/// Main service: storage, bus, worker pool, then the ingest API.
async fn run_server(config_path: &str) -> Result<()> {
    let config = Config::from_file(config_path)?;

    let storage = Storage::new(
        &config.database.url,
        Some(config.database.max_connections),
        Some(config.database.min_connections),
    )
    .await?;
    storage.run_migrations().await?;

    let bus = EventBus::connect(&config.bus).await?;
    bus.ensure_stream().await?;

    let triangulation = TriangulationService::new(storage.clone(), config.triangulation.policy());
    let worker = ReportWorker::new(bus.clone(), triangulation, config.worker.concurrency);

    let worker_for_task = worker.clone();
    let worker_handle = tokio::spawn(async move { worker_for_task.run().await });

    let intake = ReportIntake::new(storage.clone(), Some(bus), config.hex.resolution);
    let state = AppState::new(intake, storage.clone());

    // Blocks until SIGINT/SIGTERM; in-flight requests drain first.
    api::serve(&config.server.listen, state).await?;

    info!("Stopping worker pool...");
    worker.stop().await;
    if let Err(e) = worker_handle.await.context("Worker pool task failed")? {
        warn!("Worker pool exited with error: {}", e);
    }

    storage.close().await;
    info!("Shutdown complete");

    Ok(())
}

/// Create the database and run migrations.
async fn init_database(config_path: &str) -> Result<()> {
    let config = Config::from_file(config_path)?;

    info!("Initializing database: {}", config.database.url);

    let storage = Storage::new(&config.database.url, None, None)
        .await
        .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    storage
        .health_check()
        .await
        .context("Database health check failed")?;

    let stats = storage.stats().await?;
    info!("Database initialized successfully!");
    info!("  Reports: {}", stats.report_count);
    info!("  Submitters: {}", stats.submitter_count);

    storage.close().await;

    Ok(())
}

/// Re-enqueue pending reports stranded by publish failures.
async fn backfill(config_path: &str, older_than_minutes: i64) -> Result<()> {
    let config = Config::from_file(config_path)?;

    let storage = Storage::new(&config.database.url, None, None).await?;
    storage.run_migrations().await?;

    let bus = EventBus::connect(&config.bus).await?;
    bus.ensure_stream().await?;

    let cutoff = chrono::Utc::now() - chrono::Duration::minutes(older_than_minutes);
    let stranded = storage.pending_older_than(cutoff).await?;

    info!(
        "Backfilling {} pending reports older than {} minutes",
        stranded.len(),
        older_than_minutes
    );

    let mut published = 0usize;
    for report in &stranded {
        match bus.publish_report(report).await {
            Ok(()) => published += 1,
            Err(e) => warn!(report_id = %report.id, "Backfill publish failed: {}", e),
        }
    }

    info!("Backfill complete: {}/{} enqueued", published, stranded.len());

    storage.close().await;

    Ok(())
}

/// Show store statistics.
async fn show_status(config_path: &str) -> Result<()> {
    let config = Config::from_file(config_path)?;

    let storage = Storage::new(&config.database.url, None, None)
        .await
        .context("Failed to connect to database")?;
    storage.run_migrations().await?;

    let stats = storage.stats().await?;

    println!("\n=== Vigil Store Status ===\n");
    println!("Reports:");
    println!("  Total:    {}", stats.report_count);
    println!("  Pending:  {}", stats.pending_count);
    println!("  Verified: {}", stats.verified_count);
    println!("  Rejected: {}", stats.rejected_count);
    println!("\nSubmitters: {}", stats.submitter_count);
    println!();

    storage.close().await;

    Ok(())
}
