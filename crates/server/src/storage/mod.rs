//! Storage layer for the Vigil server.
//!
//! This module provides database operations for:
//! - Reports (creation, lookup, spatio-temporal neighborhoods, status)
//! - Submitters (the identity rows whose `role` column the corroboration
//!   join reads)

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub mod report;
pub mod submitter;

pub use report::NeighborRecord;

/// Database storage for reports and submitters.
///
/// Provides async access to SQLite with connection pooling.
#[derive(Debug, Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Open the report store at the given database URL.
    ///
    /// The database file is created on first open; call
    /// [`run_migrations`](Self::run_migrations) afterwards to set up the
    /// schema. Foreign keys are enforced so report rows can never reference
    /// an unknown submitter.
    pub async fn new(
        database_url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        let max = max_connections.unwrap_or(5);
        let min = min_connections.unwrap_or(1);

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max)
            .min_connections(min)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open report store at {}", database_url))?;

        info!(url = %database_url, max, min, "Report store opened");

        Ok(Self { pool })
    }

    /// Open the report store backed by a specific file path.
    pub async fn new_with_path<P: AsRef<Path>>(
        path: P,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        let database_url = format!("sqlite://{}", path.as_ref().display());
        Self::new(&database_url, max_connections, min_connections).await
    }

    /// Bring the schema up to date.
    ///
    /// Called once during startup, before any reads or writes.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to apply schema migrations")?;

        info!("Schema is up to date");

        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        info!("Closing report store");
        self.pool.close().await;
    }

    /// Get database statistics.
    pub async fn stats(&self) -> Result<DatabaseStats> {
        let report_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reports")
            .fetch_one(&self.pool)
            .await?;

        let pending_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM reports WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;

        let verified_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM reports WHERE status = 'verified'")
                .fetch_one(&self.pool)
                .await?;

        let rejected_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM reports WHERE status = 'rejected'")
                .fetch_one(&self.pool)
                .await?;

        let submitter_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM submitters")
            .fetch_one(&self.pool)
            .await?;

        Ok(DatabaseStats {
            report_count: report_count as u64,
            pending_count: pending_count as u64,
            verified_count: verified_count as u64,
            rejected_count: rejected_count as u64,
            submitter_count: submitter_count as u64,
        })
    }

    /// Check that the store answers queries.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Report store health check failed")?;

        Ok(())
    }
}

/// Database statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Total number of reports
    pub report_count: u64,

    /// Reports currently pending
    pub pending_count: u64,

    /// Reports promoted or reviewed to verified
    pub verified_count: u64,

    /// Reports rejected by review
    pub rejected_count: u64,

    /// Total number of submitters
    pub submitter_count: u64,
}
