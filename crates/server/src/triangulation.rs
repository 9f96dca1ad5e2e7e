//! Triangulation orchestration: load the target, guard on its state, fetch
//! the spatio-temporal neighborhood, tally it and promote when corroborated.
//!
//! `score` is a pure function of the store's current state: it keeps no
//! state of its own, so re-running it for the same report is always safe.

use chrono::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use vigil_core::{geo, ReportStatus};
use vigil_engine::{self as engine, Neighbor, ScoringPolicy, Verdict};

use crate::storage::Storage;

/// Errors surfaced by a scoring run.
#[derive(Debug, Error)]
pub enum TriangulationError {
    /// The target report does not exist. Permanent: the event is discarded.
    #[error("Report not found: {0}")]
    NotFound(String),

    /// A store read or write failed. The message disposition policy decides
    /// whether the event is retried.
    #[error("Storage failure while scoring {report_id}: {source}")]
    Storage {
        /// The report whose scoring run failed.
        report_id: String,
        /// Underlying storage error.
        #[source]
        source: anyhow::Error,
    },
}

/// What a scoring run did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreOutcome {
    /// The target was no longer pending; nothing was touched.
    Skipped {
        /// The settled status that short-circuited the run.
        status: ReportStatus,
    },
    /// Below threshold; the report stays pending. A normal outcome.
    Held {
        /// The aggregated corroboration weight.
        total: f64,
    },
    /// At or above threshold; the report was promoted to verified.
    Promoted {
        /// The aggregated corroboration weight.
        total: f64,
    },
}

/// Stateless scoring service over the report store.
#[derive(Clone)]
pub struct TriangulationService {
    storage: Storage,
    policy: ScoringPolicy,
}

impl TriangulationService {
    /// Create a new service with the given policy.
    pub fn new(storage: Storage, policy: ScoringPolicy) -> Self {
        Self { storage, policy }
    }

    /// Recompute the trust score of one report and promote it when the
    /// neighborhood corroborates it.
    pub async fn score(&self, report_id: &str) -> Result<ScoreOutcome, TriangulationError> {
        let storage_err = |source: anyhow::Error| TriangulationError::Storage {
            report_id: report_id.to_string(),
            source,
        };

        let target = self
            .storage
            .get_report(report_id)
            .await
            .map_err(storage_err)?
            .ok_or_else(|| TriangulationError::NotFound(report_id.to_string()))?;

        // Idempotence guard: redeliveries and operator re-enqueues of
        // settled reports must not touch the store.
        if target.status != ReportStatus::Pending {
            debug!(report_id, status = %target.status, "Report already settled, skipping");
            return Ok(ScoreOutcome::Skipped {
                status: target.status,
            });
        }

        // The stored hex cell stays authoritative when the point is
        // unreadable; the radius arm degenerates around (0, 0).
        let (lat, lon) = match geo::parse_point(&target.location) {
            Ok(coords) => coords,
            Err(e) => {
                warn!(report_id, "Could not parse stored location: {}", e);
                (0.0, 0.0)
            }
        };

        let window = Duration::minutes(self.policy.window_minutes);
        let records = self
            .storage
            .find_neighbors(
                &target.hex_cell,
                lat,
                lon,
                self.policy.radius_meters,
                target.created_at - window,
                target.created_at + window,
            )
            .await
            .map_err(storage_err)?;

        let neighbors: Vec<Neighbor> = records
            .into_iter()
            .map(|record| Neighbor {
                id: record.report.id,
                status: record.report.status,
                role: record.role.parse().ok(),
                category: record.report.category,
            })
            .collect();

        let tally = engine::tally(&neighbors, &self.policy.weights);
        info!(
            report_id,
            neighbors = neighbors.len(),
            total = tally.total,
            "Triangulation tally"
        );

        if tally.is_conflicted() {
            // Observational only: conflicting categories never suppress
            // promotion in this version.
            warn!(
                report_id,
                histogram = ?tally.histogram,
                "Conflicting incident categories in neighborhood"
            );
        }

        match engine::decide(tally.total, self.policy.threshold) {
            Verdict::Promote => {
                let promoted = self
                    .storage
                    .promote_pending(report_id)
                    .await
                    .map_err(storage_err)?;
                if promoted {
                    info!(report_id, total = tally.total, "Report verified");
                } else {
                    // A racing worker got there first; same final state.
                    debug!(report_id, "Report was promoted concurrently");
                }
                Ok(ScoreOutcome::Promoted { total: tally.total })
            }
            Verdict::Hold => Ok(ScoreOutcome::Held { total: tally.total }),
        }
    }
}
