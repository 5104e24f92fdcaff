//! Geofence monitor - classifies each position sample against the workshop
//!
//! Holds only the latest sample. Presence is recomputed from it on every
//! update; there is no transition state, hysteresis, or debounce, so every
//! outside sample is reported as outside.

use crate::domain::geo::{is_within, Geofence};
use crate::domain::types::PositionSample;

/// Outcome of classifying one sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresenceVerdict {
    pub distance_m: f64,
    pub inside: bool,
}

impl PresenceVerdict {
    /// True when the left-geofence side effect must fire
    #[inline]
    pub fn is_outside(&self) -> bool {
        !self.inside
    }
}

#[derive(Debug, Clone)]
pub struct GeofenceMonitor {
    geofence: Geofence,
    latest: Option<PositionSample>,
}

impl GeofenceMonitor {
    pub fn new(geofence: Geofence) -> Self {
        Self { geofence, latest: None }
    }

    /// Replace the latest sample and classify it
    pub fn on_position_update(&mut self, sample: PositionSample) -> PresenceVerdict {
        self.latest = Some(sample);
        PresenceVerdict {
            distance_m: self.geofence.distance_to(sample.coordinates()),
            inside: is_within(self.latest.as_ref(), &self.geofence),
        }
    }

    /// Presence of the latest sample; false until one arrives
    pub fn is_within(&self) -> bool {
        is_within(self.latest.as_ref(), &self.geofence)
    }

    /// Distance from the latest sample to the geofence center
    pub fn distance_m(&self) -> Option<f64> {
        self.latest.map(|s| self.geofence.distance_to(s.coordinates()))
    }

    pub fn latest(&self) -> Option<&PositionSample> {
        self.latest.as_ref()
    }

    pub fn geofence(&self) -> &Geofence {
        &self.geofence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geo::Coordinates;

    fn workshop() -> GeofenceMonitor {
        GeofenceMonitor::new(Geofence::new(Coordinates::new(36.7525, 3.0420), 300.0))
    }

    #[test]
    fn test_no_sample_is_outside() {
        let monitor = workshop();
        assert!(!monitor.is_within());
        assert_eq!(monitor.distance_m(), None);
        assert!(monitor.latest().is_none());
    }

    #[test]
    fn test_sample_at_reference_is_inside() {
        let mut monitor = workshop();
        let verdict = monitor.on_position_update(PositionSample::new(36.7525, 3.0420, 5.0));
        assert!(verdict.inside);
        assert_eq!(verdict.distance_m, 0.0);
        assert!(monitor.is_within());
    }

    #[test]
    fn test_every_outside_sample_reported() {
        let mut monitor = workshop();
        let outside = PositionSample::new(36.7625, 3.0420, 5.0);

        for _ in 0..3 {
            let verdict = monitor.on_position_update(outside);
            assert!(verdict.is_outside());
            assert!((verdict.distance_m - 1111.95).abs() < 1.0);
        }
    }

    #[test]
    fn test_latest_sample_replaced() {
        let mut monitor = workshop();
        monitor.on_position_update(PositionSample::new(36.7625, 3.0420, 5.0));
        assert!(!monitor.is_within());

        monitor.on_position_update(PositionSample::new(36.7526, 3.0421, 5.0));
        assert!(monitor.is_within());
        assert_eq!(monitor.latest().map(|s| s.latitude), Some(36.7526));
    }
}
