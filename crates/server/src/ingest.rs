//! Ingest front: validate a submission, derive its identity, point encoding
//! and hex cell, persist it pending, then dispatch one queue event.
//!
//! Ingest availability is prioritized over immediate corroboration: the
//! queue publish runs on a detached task and its failure only logs a
//! warning. Stranded reports are recovered by the backfill command.

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use vigil_core::{geo, Report, ReportStatus};

use crate::bus::EventBus;
use crate::storage::Storage;

/// An inbound report submission, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportSubmission {
    /// Identifier of the submitting user.
    #[serde(default)]
    pub submitter_id: Option<String>,

    /// Short incident code.
    #[serde(default)]
    pub category: Option<String>,

    /// Free-form description.
    #[serde(default)]
    pub description: String,

    /// WGS84 latitude in degrees.
    #[serde(default)]
    pub latitude: Option<f64>,

    /// WGS84 longitude in degrees.
    #[serde(default)]
    pub longitude: Option<f64>,

    /// Opaque blob-store key for attached evidence.
    #[serde(default)]
    pub evidence_key: Option<String>,
}

/// Errors surfaced by report submission.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The submission is incomplete or out of range. No side effects.
    #[error("{0}")]
    Validation(String),

    /// Persisting the report failed. Nothing was enqueued.
    #[error("Failed to persist report: {0}")]
    Storage(#[source] anyhow::Error),
}

/// The synchronous ingest boundary.
#[derive(Clone)]
pub struct ReportIntake {
    storage: Storage,
    bus: Option<EventBus>,
    resolution: u8,
}

impl ReportIntake {
    /// Create a new intake.
    ///
    /// `bus` may be absent in degraded or test setups; submissions then skip
    /// dispatch entirely.
    pub fn new(storage: Storage, bus: Option<EventBus>, resolution: u8) -> Self {
        Self {
            storage,
            bus,
            resolution,
        }
    }

    /// Accept one submission: validate, persist pending, dispatch.
    pub async fn submit(&self, submission: ReportSubmission) -> Result<Report, IngestError> {
        let submitter_id = require_field(submission.submitter_id, "submitter_id")?;
        let category = require_field(submission.category, "category")?;
        let latitude = submission
            .latitude
            .ok_or_else(|| IngestError::Validation("latitude is required".to_string()))?;
        let longitude = submission
            .longitude
            .ok_or_else(|| IngestError::Validation("longitude is required".to_string()))?;

        geo::validate_coordinates(latitude, longitude)
            .map_err(|e| IngestError::Validation(e.to_string()))?;

        let hex_cell = geo::cell_index(latitude, longitude, self.resolution)
            .map_err(|e| IngestError::Validation(e.to_string()))?;

        let report = Report {
            id: Uuid::new_v4().to_string(),
            submitter_id,
            category,
            description: submission.description,
            location: geo::format_point(latitude, longitude),
            latitude,
            longitude,
            hex_cell,
            status: ReportStatus::Pending,
            evidence_key: submission.evidence_key,
            created_at: Utc::now(),
        };

        self.storage
            .create_report(&report)
            .await
            .map_err(IngestError::Storage)?;

        debug!(report_id = %report.id, hex_cell = %report.hex_cell, "Report persisted");

        match &self.bus {
            Some(bus) => {
                // Detached so the submitter's response never waits on the
                // broker, and the publish outlives the request.
                let bus = bus.clone();
                let event = report.clone();
                tokio::spawn(async move {
                    if let Err(e) = bus.publish_report(&event).await {
                        warn!(report_id = %event.id, "Failed to enqueue report event: {}", e);
                    }
                });
            }
            None => {
                debug!(report_id = %report.id, "No event bus configured, skipping dispatch");
            }
        }

        Ok(report)
    }
}

fn require_field(value: Option<String>, name: &str) -> Result<String, IngestError> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| IngestError::Validation(format!("{} is required", name)))
}
