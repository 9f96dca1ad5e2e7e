//! Entity types shared across Vigil components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Lifecycle state of a field report.
///
/// The triangulation engine only ever performs `Pending -> Verified`;
/// every other transition is operator-driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Freshly ingested, awaiting corroboration.
    Pending,
    /// Promoted by triangulation or by operator review.
    Verified,
    /// Rejected by operator review; never counted as corroboration.
    Rejected,
}

impl ReportStatus {
    /// Canonical lowercase string form (database representation).
    pub const fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Verified => "verified",
            ReportStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReportStatus::Pending),
            "verified" => Ok(ReportStatus::Verified),
            "rejected" => Ok(ReportStatus::Rejected),
            other => Err(CoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// Submitter role at the time a report is scored.
///
/// The set is closed; database strings that match none of the variants are
/// handled by the scoring policy's `other` weight bucket, not by this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform-wide administrator.
    SuperAdmin,
    /// Administrator scoped to a region.
    RegionAdmin,
    /// Local coordination staff.
    LocalCoord,
    /// Accredited field observer.
    Observer,
    /// Citizen with a verified identity.
    VerifiedCitizen,
    /// Unverified citizen.
    Citizen,
}

impl Role {
    /// Canonical lowercase string form (database representation).
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::RegionAdmin => "region_admin",
            Role::LocalCoord => "local_coord",
            Role::Observer => "observer",
            Role::VerifiedCitizen => "verified_citizen",
            Role::Citizen => "citizen",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "super_admin" => Ok(Role::SuperAdmin),
            "region_admin" => Ok(Role::RegionAdmin),
            "local_coord" => Ok(Role::LocalCoord),
            "observer" => Ok(Role::Observer),
            "verified_citizen" => Ok(Role::VerifiedCitizen),
            "citizen" => Ok(Role::Citizen),
            other => Err(CoreError::InvalidRole(other.to_string())),
        }
    }
}

/// A geotagged incident report.
///
/// The hex cell is derived from the coordinates exactly once, at ingest, and
/// is immutable afterwards; `location` is the canonical WKT form of the same
/// point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Opaque unique identifier (UUID v4).
    pub id: String,

    /// Identifier of the submitting user.
    pub submitter_id: String,

    /// Free-form short incident code (e.g. "ballot_stuffing").
    pub category: String,

    /// Free-form description.
    #[serde(default)]
    pub description: String,

    /// Canonical WKT point, `POINT(lon lat)`.
    pub location: String,

    /// WGS84 latitude in degrees.
    pub latitude: f64,

    /// WGS84 longitude in degrees.
    pub longitude: f64,

    /// H3 cell string at the configured resolution, derived at ingest.
    pub hex_cell: String,

    /// Lifecycle state.
    pub status: ReportStatus,

    /// Opaque blob-store key for attached evidence, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_key: Option<String>,

    /// Ingest instant (UTC, millisecond precision). Never altered.
    pub created_at: DateTime<Utc>,
}
