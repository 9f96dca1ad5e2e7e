//! # Vigil Core
//!
//! Domain types and geospatial utilities for the Vigil election-observation
//! platform.
//!
//! This crate provides the building blocks shared by every Vigil component,
//! keeping the entity model and the coordinate math consistent between the
//! ingest path, the storage layer, and the triangulation worker.
//!
//! ## Features
//!
//! - **Entities**: `Report`, `ReportStatus`, `Role`
//! - **Geospatial**: WGS84 validation, WKT point encoding, H3 cell
//!   derivation, great-circle distance

#![warn(missing_docs)]

pub mod error;
pub mod geo;
pub mod types;

// Re-export commonly used items
pub use error::{CoreError, Result};
pub use geo::{cell_index, distance_meters, format_point, parse_point, DEFAULT_RESOLUTION};
pub use types::{Report, ReportStatus, Role};
