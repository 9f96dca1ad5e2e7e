//! Error types for the core crate.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Latitude outside the WGS84 range.
    #[error("Invalid latitude: {0} (must be between -90 and 90)")]
    InvalidLatitude(f64),

    /// Longitude outside the WGS84 range.
    #[error("Invalid longitude: {0} (must be between -180 and 180)")]
    InvalidLongitude(f64),

    /// A point string that is not well-formed WKT.
    #[error("Invalid point geometry '{0}' (expected WKT POINT(lon lat))")]
    InvalidPoint(String),

    /// H3 resolution outside the supported range.
    #[error("Invalid hex resolution: {0} (must be between 0 and 15)")]
    InvalidResolution(u8),

    /// Unknown report status string.
    #[error("Unknown report status: {0}")]
    InvalidStatus(String),

    /// Unknown submitter role string.
    #[error("Unknown role: {0}")]
    InvalidRole(String),
}

/// Result type alias for CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;
