//! Report storage operations.
//!
//! The spatio-temporal neighborhood query keeps the hex-cell arm in SQL
//! (indexed equality) and pairs it with a bounding-box pre-filter; the exact
//! great-circle check runs on the shortlisted rows.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use vigil_core::{geo, Report, ReportStatus};

use super::Storage;

/// Meters spanned by one degree of latitude.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// A neighborhood member joined with its submitter's current role.
///
/// The role stays a raw database string here; the scoring policy decides how
/// unrecognized values are weighted.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborRecord {
    /// The neighboring report.
    pub report: Report,
    /// The submitter's current role string.
    pub role: String,
}

impl Storage {
    /// Insert a new report.
    pub async fn create_report(&self, report: &Report) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reports (
                id, submitter_id, category, description,
                location, latitude, longitude, hex_cell,
                status, evidence_key, created_at_ms
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&report.id)
        .bind(&report.submitter_id)
        .bind(&report.category)
        .bind(&report.description)
        .bind(&report.location)
        .bind(report.latitude)
        .bind(report.longitude)
        .bind(&report.hex_cell)
        .bind(report.status.as_str())
        .bind(report.evidence_key.as_deref())
        .bind(report.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to insert report")?;

        Ok(())
    }

    /// Get a report by id.
    pub async fn get_report(&self, id: &str) -> Result<Option<Report>> {
        let row = sqlx::query(
            r#"
            SELECT id, submitter_id, category, description,
                   location, latitude, longitude, hex_cell,
                   status, evidence_key, created_at_ms
            FROM reports
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_report(&row)?)),
            None => Ok(None),
        }
    }

    /// List reports, newest first, optionally filtered by status.
    pub async fn list_reports(&self, status: Option<ReportStatus>) -> Result<Vec<Report>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    r#"
                    SELECT id, submitter_id, category, description,
                           location, latitude, longitude, hex_cell,
                           status, evidence_key, created_at_ms
                    FROM reports
                    WHERE status = ?
                    ORDER BY created_at_ms DESC
                    "#,
                )
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, submitter_id, category, description,
                           location, latitude, longitude, hex_cell,
                           status, evidence_key, created_at_ms
                    FROM reports
                    ORDER BY created_at_ms DESC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(row_to_report).collect()
    }

    /// Fetch the spatio-temporal neighborhood of a point, each row joined
    /// with its submitter's current role.
    ///
    /// A report qualifies when its creation instant lies in
    /// `[t_start, t_end]` (inclusive) and it either shares `hex_cell` or
    /// lies within `radius_m` meters of `(lat, lon)` on the great circle.
    /// The target report itself satisfies the predicate and is returned like
    /// any other member.
    pub async fn find_neighbors(
        &self,
        hex_cell: &str,
        lat: f64,
        lon: f64,
        radius_m: f64,
        t_start: DateTime<Utc>,
        t_end: DateTime<Utc>,
    ) -> Result<Vec<NeighborRecord>> {
        // Bounding box around the radius, slightly padded: the exact
        // great-circle check below discards the overshoot. The box does not
        // wrap the antimeridian; the hex-cell arm still matches there.
        let pad = radius_m * 1.1;
        let lat_delta = pad / METERS_PER_DEGREE;
        let lon_scale = lat.to_radians().cos().abs().max(0.01);
        let lon_delta = pad / (METERS_PER_DEGREE * lon_scale);

        let rows = sqlx::query(
            r#"
            SELECT r.id, r.submitter_id, r.category, r.description,
                   r.location, r.latitude, r.longitude, r.hex_cell,
                   r.status, r.evidence_key, r.created_at_ms,
                   s.role
            FROM reports r
            JOIN submitters s ON s.id = r.submitter_id
            WHERE r.created_at_ms BETWEEN ? AND ?
              AND (r.hex_cell = ?
                   OR (r.latitude BETWEEN ? AND ?
                       AND r.longitude BETWEEN ? AND ?))
            ORDER BY r.created_at_ms ASC
            "#,
        )
        .bind(t_start.timestamp_millis())
        .bind(t_end.timestamp_millis())
        .bind(hex_cell)
        .bind(lat - lat_delta)
        .bind(lat + lat_delta)
        .bind((lon - lon_delta).max(-180.0))
        .bind((lon + lon_delta).min(180.0))
        .fetch_all(&self.pool)
        .await
        .context("Failed to query neighbors")?;

        let mut neighbors = Vec::with_capacity(rows.len());
        for row in &rows {
            let report = row_to_report(row)?;
            let within_radius = report.hex_cell == hex_cell
                || geo::distance_meters((lat, lon), (report.latitude, report.longitude))
                    .map(|d| d <= radius_m)
                    .unwrap_or(false);
            if !within_radius {
                continue;
            }
            let role: String = row.try_get("role")?;
            neighbors.push(NeighborRecord { report, role });
        }

        Ok(neighbors)
    }

    /// Unconditionally set a report's status (operator path).
    ///
    /// Returns `false` when no such report exists.
    pub async fn update_status(&self, id: &str, status: ReportStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE reports SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update report status")?;

        Ok(result.rows_affected() > 0)
    }

    /// Promote a report to verified, but only out of the pending state.
    ///
    /// The `WHERE status = 'pending'` guard makes concurrent promotions of
    /// the same report collapse into a single effective write.
    ///
    /// Returns `true` if the row transitioned, `false` if it was not pending
    /// (or absent).
    pub async fn promote_pending(&self, id: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE reports SET status = 'verified' WHERE id = ? AND status = 'pending'")
                .bind(id)
                .execute(&self.pool)
                .await
                .context("Failed to promote report")?;

        Ok(result.rows_affected() > 0)
    }

    /// Pending reports created at or before the given cutoff, oldest first.
    ///
    /// Used by the backfill command to re-enqueue reports stranded by
    /// publish failures.
    pub async fn pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Report>> {
        let rows = sqlx::query(
            r#"
            SELECT id, submitter_id, category, description,
                   location, latitude, longitude, hex_cell,
                   status, evidence_key, created_at_ms
            FROM reports
            WHERE status = 'pending' AND created_at_ms <= ?
            ORDER BY created_at_ms ASC
            "#,
        )
        .bind(cutoff.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_report).collect()
    }
}

fn row_to_report(row: &SqliteRow) -> Result<Report> {
    let status: String = row.try_get("status")?;
    let status: ReportStatus = status
        .parse()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("Corrupt status column")?;

    let created_at_ms: i64 = row.try_get("created_at_ms")?;
    let created_at = DateTime::from_timestamp_millis(created_at_ms)
        .with_context(|| format!("Corrupt created_at_ms value: {}", created_at_ms))?;

    Ok(Report {
        id: row.try_get("id")?,
        submitter_id: row.try_get("submitter_id")?,
        category: row.try_get("category")?,
        description: row.try_get("description")?,
        location: row.try_get("location")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        hex_cell: row.try_get("hex_cell")?,
        status,
        evidence_key: row.try_get("evidence_key")?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::NamedTempFile;
    use vigil_core::Role;

    async fn setup() -> (Storage, NamedTempFile) {
        let temp_db = NamedTempFile::new().unwrap();
        let storage = Storage::new_with_path(temp_db.path(), None, None)
            .await
            .unwrap();
        storage.run_migrations().await.unwrap();
        (storage, temp_db)
    }

    fn report_at(
        id: &str,
        submitter_id: &str,
        lat: f64,
        lon: f64,
        created_at: DateTime<Utc>,
    ) -> Report {
        Report {
            id: id.to_string(),
            submitter_id: submitter_id.to_string(),
            category: "A".to_string(),
            description: String::new(),
            location: geo::format_point(lat, lon),
            latitude: lat,
            longitude: lon,
            hex_cell: geo::cell_index(lat, lon, geo::DEFAULT_RESOLUTION).unwrap(),
            status: ReportStatus::Pending,
            evidence_key: None,
            created_at,
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_750_000_000_000).unwrap()
    }

    #[tokio::test]
    async fn test_create_get_round_trip() {
        let (storage, _db) = setup().await;
        storage
            .create_submitter("sub-1", "Ada", Role::Observer.as_str())
            .await
            .unwrap();

        let mut report = report_at("rep-1", "sub-1", 4.05, 9.7, t0());
        report.evidence_key = Some("blobs/rep-1.jpg".to_string());
        storage.create_report(&report).await.unwrap();

        let loaded = storage.get_report("rep-1").await.unwrap().unwrap();
        assert_eq!(loaded, report);

        assert!(storage.get_report("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_reports_filters_and_orders() {
        let (storage, _db) = setup().await;
        storage
            .create_submitter("sub-1", "", Role::Citizen.as_str())
            .await
            .unwrap();

        let older = report_at("rep-old", "sub-1", 4.05, 9.7, t0());
        let newer = report_at("rep-new", "sub-1", 4.05, 9.7, t0() + Duration::minutes(5));
        storage.create_report(&older).await.unwrap();
        storage.create_report(&newer).await.unwrap();
        storage
            .update_status("rep-old", ReportStatus::Rejected)
            .await
            .unwrap();

        let all = storage.list_reports(None).await.unwrap();
        assert_eq!(
            all.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["rep-new", "rep-old"]
        );

        let pending = storage
            .list_reports(Some(ReportStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "rep-new");
    }

    #[tokio::test]
    async fn test_find_neighbors_hex_or_radius() {
        let (storage, _db) = setup().await;
        storage
            .create_submitter("sub-1", "", Role::Observer.as_str())
            .await
            .unwrap();

        let target = report_at("target", "sub-1", 48.85, 2.35, t0());
        // ~498 m north: outside the target's cell, inside the radius.
        let near = report_at("near", "sub-1", 48.85 + 0.00448, 2.35, t0());
        // ~503 m north: outside both.
        let far = report_at("far", "sub-1", 48.85 + 0.00452, 2.35, t0());
        assert_ne!(near.hex_cell, target.hex_cell);

        storage.create_report(&target).await.unwrap();
        storage.create_report(&near).await.unwrap();
        storage.create_report(&far).await.unwrap();

        let neighbors = storage
            .find_neighbors(
                &target.hex_cell,
                target.latitude,
                target.longitude,
                500.0,
                t0() - Duration::minutes(30),
                t0() + Duration::minutes(30),
            )
            .await
            .unwrap();

        let mut ids: Vec<_> = neighbors.iter().map(|n| n.report.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["near", "target"]);
        assert!(neighbors.iter().all(|n| n.role == "observer"));
    }

    #[tokio::test]
    async fn test_find_neighbors_window_is_inclusive() {
        let (storage, _db) = setup().await;
        storage
            .create_submitter("sub-1", "", Role::Citizen.as_str())
            .await
            .unwrap();

        let start = t0() - Duration::minutes(30);
        let end = t0() + Duration::minutes(30);

        let target = report_at("target", "sub-1", 48.85, 2.35, t0());
        let at_start = report_at("at-start", "sub-1", 48.85, 2.35, start);
        let at_end = report_at("at-end", "sub-1", 48.85, 2.35, end);
        let after_end = report_at(
            "after-end",
            "sub-1",
            48.85,
            2.35,
            end + Duration::milliseconds(1),
        );

        for report in [&target, &at_start, &at_end, &after_end] {
            storage.create_report(report).await.unwrap();
        }

        let neighbors = storage
            .find_neighbors(&target.hex_cell, 48.85, 2.35, 500.0, start, end)
            .await
            .unwrap();

        let mut ids: Vec<_> = neighbors.iter().map(|n| n.report.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["at-end", "at-start", "target"]);
    }

    #[tokio::test]
    async fn test_find_neighbors_returns_rejected_rows() {
        // Rejected reports still match the predicate; excluding them from
        // the tally is the engine's job, not the store's.
        let (storage, _db) = setup().await;
        storage
            .create_submitter("sub-1", "", Role::Observer.as_str())
            .await
            .unwrap();

        let target = report_at("target", "sub-1", 48.85, 2.35, t0());
        let rejected = report_at("rejected", "sub-1", 48.85, 2.35, t0());
        storage.create_report(&target).await.unwrap();
        storage.create_report(&rejected).await.unwrap();
        storage
            .update_status("rejected", ReportStatus::Rejected)
            .await
            .unwrap();

        let neighbors = storage
            .find_neighbors(
                &target.hex_cell,
                48.85,
                2.35,
                500.0,
                t0() - Duration::minutes(30),
                t0() + Duration::minutes(30),
            )
            .await
            .unwrap();
        assert_eq!(neighbors.len(), 2);
    }

    #[tokio::test]
    async fn test_promote_pending_is_guarded() {
        let (storage, _db) = setup().await;
        storage
            .create_submitter("sub-1", "", Role::Citizen.as_str())
            .await
            .unwrap();
        let report = report_at("rep-1", "sub-1", 4.05, 9.7, t0());
        storage.create_report(&report).await.unwrap();

        assert!(storage.promote_pending("rep-1").await.unwrap());
        // Second promotion is a no-op: the guard no longer matches.
        assert!(!storage.promote_pending("rep-1").await.unwrap());
        assert!(!storage.promote_pending("missing").await.unwrap());

        let loaded = storage.get_report("rep-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, ReportStatus::Verified);

        // A rejected report is never promoted.
        let other = report_at("rep-2", "sub-1", 4.05, 9.7, t0());
        storage.create_report(&other).await.unwrap();
        storage
            .update_status("rep-2", ReportStatus::Rejected)
            .await
            .unwrap();
        assert!(!storage.promote_pending("rep-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_pending_older_than() {
        let (storage, _db) = setup().await;
        storage
            .create_submitter("sub-1", "", Role::Citizen.as_str())
            .await
            .unwrap();

        let stale = report_at("stale", "sub-1", 4.05, 9.7, t0() - Duration::minutes(20));
        let fresh = report_at("fresh", "sub-1", 4.05, 9.7, t0());
        let done = report_at("done", "sub-1", 4.05, 9.7, t0() - Duration::minutes(40));
        for report in [&stale, &fresh, &done] {
            storage.create_report(report).await.unwrap();
        }
        storage.promote_pending("done").await.unwrap();

        let stranded = storage
            .pending_older_than(t0() - Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(stranded.len(), 1);
        assert_eq!(stranded[0].id, "stale");
    }
}
