//! Submitter storage operations.
//!
//! Only what the corroboration core consumes: the identity row that report
//! rows reference and whose `role` column the neighborhood join reads.
//! Account management proper lives outside this service.

use anyhow::{Context, Result};
use chrono::Utc;

use super::Storage;

impl Storage {
    /// Insert a new submitter with the given role string.
    pub async fn create_submitter(&self, id: &str, display_name: &str, role: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO submitters (id, display_name, role, created_at_ms)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(display_name)
        .bind(role)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to insert submitter")?;

        Ok(())
    }
}
