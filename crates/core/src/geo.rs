//! WGS84 coordinate handling: validation, WKT encoding, H3 cell derivation
//! and great-circle distance.
//!
//! Reports carry their point twice: as canonical WKT (`POINT(lon lat)`) and
//! as an H3 cell string. Both are derived here so every component agrees on
//! the encoding.

use h3o::{LatLng, Resolution};

use crate::error::{CoreError, Result};

/// Default H3 resolution for report cells (~65 m edge length).
///
/// Changing this forces a re-index of every stored report.
pub const DEFAULT_RESOLUTION: u8 = 10;

/// Validate a WGS84 coordinate pair.
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<()> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(CoreError::InvalidLatitude(latitude));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(CoreError::InvalidLongitude(longitude));
    }
    Ok(())
}

/// Derive the H3 cell containing a point, as its canonical string form.
pub fn cell_index(latitude: f64, longitude: f64, resolution: u8) -> Result<String> {
    validate_coordinates(latitude, longitude)?;
    let resolution =
        Resolution::try_from(resolution).map_err(|_| CoreError::InvalidResolution(resolution))?;
    let point =
        LatLng::new(latitude, longitude).map_err(|_| CoreError::InvalidLatitude(latitude))?;
    Ok(point.to_cell(resolution).to_string())
}

/// Encode a point as canonical WKT, `POINT(lon lat)`.
///
/// Longitude first: WKT follows the x-then-y axis order.
pub fn format_point(latitude: f64, longitude: f64) -> String {
    format!("POINT({} {})", longitude, latitude)
}

/// Parse a WKT point back into `(latitude, longitude)`.
pub fn parse_point(wkt: &str) -> Result<(f64, f64)> {
    let invalid = || CoreError::InvalidPoint(wkt.to_string());

    let inner = wkt
        .trim()
        .strip_prefix("POINT(")
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(invalid)?;

    let mut parts = inner.split_whitespace();
    let longitude: f64 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(invalid)?;
    let latitude: f64 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(invalid)?;
    if parts.next().is_some() {
        return Err(invalid());
    }

    validate_coordinates(latitude, longitude)?;
    Ok((latitude, longitude))
}

/// Great-circle distance in meters between two WGS84 points, each given as
/// `(latitude, longitude)`.
pub fn distance_meters(a: (f64, f64), b: (f64, f64)) -> Result<f64> {
    validate_coordinates(a.0, a.1)?;
    validate_coordinates(b.0, b.1)?;
    let from = LatLng::new(a.0, a.1).map_err(|_| CoreError::InvalidLatitude(a.0))?;
    let to = LatLng::new(b.0, b.1).map_err(|_| CoreError::InvalidLatitude(b.0))?;
    Ok(from.distance_m(to))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_bounds() {
        assert!(validate_coordinates(90.0, 180.0).is_ok());
        assert!(validate_coordinates(-90.0, -180.0).is_ok());
        assert!(validate_coordinates(0.0, 0.0).is_ok());

        assert!(matches!(
            validate_coordinates(90.001, 0.0),
            Err(CoreError::InvalidLatitude(_))
        ));
        assert!(matches!(
            validate_coordinates(0.0, -180.001),
            Err(CoreError::InvalidLongitude(_))
        ));
        assert!(validate_coordinates(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_cell_index_is_deterministic() {
        let a = cell_index(4.05, 9.7, DEFAULT_RESOLUTION).unwrap();
        let b = cell_index(4.05, 9.7, DEFAULT_RESOLUTION).unwrap();
        assert_eq!(a, b);
        // Canonical H3 string form: 15 lowercase hex characters at res 10.
        assert_eq!(a.len(), 15);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_cell_index_rejects_bad_inputs() {
        assert!(cell_index(91.0, 0.0, DEFAULT_RESOLUTION).is_err());
        assert!(matches!(
            cell_index(0.0, 0.0, 16),
            Err(CoreError::InvalidResolution(16))
        ));
    }

    #[test]
    fn test_wkt_round_trip() {
        let wkt = format_point(48.85, 2.35);
        assert_eq!(wkt, "POINT(2.35 48.85)");
        assert_eq!(parse_point(&wkt).unwrap(), (48.85, 2.35));

        // Whitespace tolerance around the literal.
        assert_eq!(parse_point("  POINT(9.7 4.05) ").unwrap(), (4.05, 9.7));
    }

    #[test]
    fn test_point_cell_stability_through_wkt() {
        // Point -> cell -> WKT -> parse -> cell must be stable.
        let cell = cell_index(2.35, 48.85, DEFAULT_RESOLUTION).unwrap();
        let (lat, lon) = parse_point(&format_point(2.35, 48.85)).unwrap();
        assert_eq!(cell_index(lat, lon, DEFAULT_RESOLUTION).unwrap(), cell);
    }

    #[test]
    fn test_parse_point_rejects_malformed() {
        for bad in [
            "",
            "POINT()",
            "POINT(2.35)",
            "POINT(2.35 48.85 7)",
            "POLYGON(2.35 48.85)",
            "2.35 48.85",
            "POINT(abc def)",
            "POINT(200.0 48.85)",
        ] {
            assert!(parse_point(bad).is_err(), "expected rejection of {:?}", bad);
        }
    }

    #[test]
    fn test_distance_one_degree_of_latitude() {
        // One degree of latitude is ~111.2 km of great-circle distance.
        let d = distance_meters((48.0, 2.35), (49.0, 2.35)).unwrap();
        assert!((d - 111_195.0).abs() < 200.0, "got {}", d);
    }

    #[test]
    fn test_distance_zero_for_identical_points() {
        let d = distance_meters((4.05, 9.7), (4.05, 9.7)).unwrap();
        assert!(d.abs() < 1e-9);
    }

    /// Mean Earth radius of the great-circle math, in meters.
    const EARTH_RADIUS_M: f64 = 6_371_007.180918475;

    /// Latitude offset in degrees spanning `meters` along a meridian.
    ///
    /// On a meridian the great-circle distance is exactly the central angle
    /// times the radius, so this inverts `distance_meters` analytically.
    fn meridian_degrees(meters: f64) -> f64 {
        (meters / EARTH_RADIUS_M).to_degrees()
    }

    #[test]
    fn test_distance_boundary_at_500_meters() {
        // Neighborhood membership compares `d <= radius`: a point at exactly
        // 500.000 m is in, one at 500.001 m is out. The conversion round
        // trip costs far less than the millimeter the policy distinguishes.
        let at_limit = distance_meters((0.0, 0.0), (meridian_degrees(500.000), 0.0)).unwrap();
        assert!((at_limit - 500.000).abs() < 1e-6, "got {}", at_limit);
        assert!(at_limit <= 500.0 + 1e-6);

        let past_limit = distance_meters((0.0, 0.0), (meridian_degrees(500.001), 0.0)).unwrap();
        assert!((past_limit - 500.001).abs() < 1e-6, "got {}", past_limit);
        assert!(past_limit > 500.0);
    }
}
