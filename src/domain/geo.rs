//! Great-circle distance and the circular workshop geofence

use crate::domain::types::PositionSample;
use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine formula (meters)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    #[inline]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// Great-circle distance in meters between two points (haversine).
///
/// The intermediate term is clamped to [0, 1] so rounding near antipodal
/// points never feeds a negative value to `sqrt`.
pub fn distance(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = ((d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos()
            * b.latitude.to_radians().cos()
            * (d_lon / 2.0).sin().powi(2))
    .clamp(0.0, 1.0);

    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Circular region around a fixed center
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub center: Coordinates,
    pub radius_m: f64,
}

impl Geofence {
    pub const fn new(center: Coordinates, radius_m: f64) -> Self {
        Self { center, radius_m }
    }

    /// Distance from the center to a point, in meters
    #[inline]
    pub fn distance_to(&self, point: Coordinates) -> f64 {
        distance(point, self.center)
    }

    /// Boundary is inclusive
    #[inline]
    pub fn contains(&self, point: Coordinates) -> bool {
        self.distance_to(point) <= self.radius_m
    }
}

/// Presence check for an optional sample. No sample means outside.
pub fn is_within(sample: Option<&PositionSample>, geofence: &Geofence) -> bool {
    match sample {
        Some(s) => geofence.contains(s.coordinates()),
        None => false,
    }
}
