//! Vigil triangulation policy.
//!
//! This crate implements the deterministic corroboration rule applied to a
//! report's spatio-temporal neighborhood:
//! - each non-rejected neighbor contributes a weight determined by its
//!   submitter's role (closed role set with an `other` fallback bucket),
//! - the target report is part of its own neighborhood and contributes its
//!   own weight (a single high-trust author is sufficient corroboration),
//! - a total at or above the threshold promotes the report,
//! - more than one distinct incident category in the neighborhood raises a
//!   conflict signal, which is observational only and never blocks
//!   promotion.
//!
//! The engine is pure: neighborhood selection, persistence and message
//! disposition live in the service layer.

use std::collections::BTreeMap;

use vigil_core::{ReportStatus, Role};

/// Corroboration weight per submitter role.
///
/// The mapping is total: roles without a dedicated weight (coordination and
/// admin staff, or unrecognized database strings) fall into `other`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoleWeights {
    /// Weight of an accredited observer.
    pub observer: f64,
    /// Weight of an identity-verified citizen.
    pub verified_citizen: f64,
    /// Weight of an unverified citizen.
    pub citizen: f64,
    /// Weight of every other role, recognized or not.
    pub other: f64,
}

impl Default for RoleWeights {
    fn default() -> Self {
        Self {
            observer: 1.0,
            verified_citizen: 0.35,
            citizen: 0.2,
            other: 0.1,
        }
    }
}

impl RoleWeights {
    /// Weight contributed by a neighbor authored under the given role.
    ///
    /// `None` stands for a role string the domain does not recognize.
    pub fn weight_of(&self, role: Option<Role>) -> f64 {
        match role {
            Some(Role::Observer) => self.observer,
            Some(Role::VerifiedCitizen) => self.verified_citizen,
            Some(Role::Citizen) => self.citizen,
            _ => self.other,
        }
    }
}

/// Policy validation errors.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PolicyError {
    /// The promotion threshold must be a positive finite number.
    #[error("invalid threshold: {0} (must be positive and finite)")]
    InvalidThreshold(f64),

    /// The neighborhood radius must be a positive finite number.
    #[error("invalid radius: {0} meters (must be positive and finite)")]
    InvalidRadius(f64),

    /// The temporal half-window must be positive.
    #[error("invalid time window: {0} minutes (must be > 0)")]
    InvalidWindow(i64),

    /// Role weights must be finite and non-negative.
    #[error("invalid weight for '{role}': {value}")]
    InvalidWeight {
        /// Name of the offending weight bucket.
        role: &'static str,
        /// The rejected value.
        value: f64,
    },
}

/// The complete triangulation policy: every externally configurable knob of
/// the scoring rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringPolicy {
    /// Minimum aggregated weight for promotion.
    pub threshold: f64,
    /// Geodesic neighborhood radius in meters.
    pub radius_meters: f64,
    /// Half-window in minutes before and after the target's creation.
    pub window_minutes: i64,
    /// Per-role corroboration weights.
    pub weights: RoleWeights,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            radius_meters: 500.0,
            window_minutes: 30,
            weights: RoleWeights::default(),
        }
    }
}

impl ScoringPolicy {
    /// Validate the policy parameters.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(PolicyError::InvalidThreshold(self.threshold));
        }
        if !self.radius_meters.is_finite() || self.radius_meters <= 0.0 {
            return Err(PolicyError::InvalidRadius(self.radius_meters));
        }
        if self.window_minutes <= 0 {
            return Err(PolicyError::InvalidWindow(self.window_minutes));
        }
        for (role, value) in [
            ("observer", self.weights.observer),
            ("verified_citizen", self.weights.verified_citizen),
            ("citizen", self.weights.citizen),
            ("other", self.weights.other),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PolicyError::InvalidWeight { role, value });
            }
        }
        Ok(())
    }
}

/// One member of a target's spatio-temporal neighborhood, joined with its
/// submitter's current role.
///
/// The target itself must be present in the slice handed to [`tally`];
/// callers must not filter it out.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    /// Report identifier (for logging only; the tally never compares ids).
    pub id: String,
    /// Lifecycle state; rejected neighbors contribute nothing.
    pub status: ReportStatus,
    /// Submitter role, `None` when the stored string is unrecognized.
    pub role: Option<Role>,
    /// Incident category, feeding the conflict histogram.
    pub category: String,
}

/// Aggregation result over a neighborhood.
#[derive(Debug, Clone, PartialEq)]
pub struct Tally {
    /// Sum of role weights over non-rejected neighbors.
    pub total: f64,
    /// Number of neighbors that contributed weight.
    pub counted: usize,
    /// Category histogram over non-rejected neighbors.
    pub histogram: BTreeMap<String, usize>,
}

impl Tally {
    /// True when more than one distinct category appears in the
    /// neighborhood.
    pub fn is_conflicted(&self) -> bool {
        self.histogram.len() > 1
    }
}

/// Promotion verdict for a tallied neighborhood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Total reached the threshold; promote to verified.
    Promote,
    /// Below threshold; the report stays pending. Not an error.
    Hold,
}

/// Aggregate a neighborhood into a weighted total and category histogram.
///
/// Rejected neighbors are skipped entirely: they add no weight and do not
/// appear in the histogram.
pub fn tally(neighbors: &[Neighbor], weights: &RoleWeights) -> Tally {
    let mut total = 0.0;
    let mut counted = 0;
    let mut histogram = BTreeMap::new();

    for neighbor in neighbors {
        if neighbor.status == ReportStatus::Rejected {
            continue;
        }
        total += weights.weight_of(neighbor.role);
        counted += 1;
        *histogram.entry(neighbor.category.clone()).or_insert(0) += 1;
    }

    Tally {
        total,
        counted,
        histogram,
    }
}

/// Decide promotion for a total against the policy threshold.
pub fn decide(total: f64, threshold: f64) -> Verdict {
    if total >= threshold {
        Verdict::Promote
    } else {
        Verdict::Hold
    }
}
