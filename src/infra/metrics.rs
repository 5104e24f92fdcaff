//! Lock-free session counters
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only. Do NOT use them for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Counters recorded by the session loop and read by the status endpoint
pub struct Metrics {
    samples_total: AtomicU64,
    samples_outside: AtomicU64,
    location_errors: AtomicU64,
    api_requests: AtomicU64,
    api_failures: AtomicU64,
    api_rejections: AtomicU64,
    absences_recorded: AtomicU64,
    toasts_shown: AtomicU64,
    /// Latest distance to the geofence center in centimeters (u64::MAX = unknown)
    last_distance_cm: AtomicU64,
    started_at: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            samples_total: AtomicU64::new(0),
            samples_outside: AtomicU64::new(0),
            location_errors: AtomicU64::new(0),
            api_requests: AtomicU64::new(0),
            api_failures: AtomicU64::new(0),
            api_rejections: AtomicU64::new(0),
            absences_recorded: AtomicU64::new(0),
            toasts_shown: AtomicU64::new(0),
            last_distance_cm: AtomicU64::new(u64::MAX),
            started_at: Instant::now(),
        }
    }

    #[inline]
    pub fn record_sample(&self, distance_m: f64, inside: bool) {
        self.samples_total.fetch_add(1, Ordering::Relaxed);
        if !inside {
            self.samples_outside.fetch_add(1, Ordering::Relaxed);
        }
        let cm = (distance_m * 100.0).round();
        let cm = if cm.is_finite() && cm >= 0.0 { cm as u64 } else { u64::MAX };
        self.last_distance_cm.store(cm, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_location_error(&self) {
        self.location_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_api_request(&self) {
        self.api_requests.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_api_failure(&self) {
        self.api_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_api_rejection(&self) {
        self.api_rejections.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_absence(&self) {
        self.absences_recorded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_toast(&self) {
        self.toasts_shown.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters without resetting them
    pub fn report(&self) -> MetricsSummary {
        let last_distance_cm = self.last_distance_cm.load(Ordering::Relaxed);
        MetricsSummary {
            samples_total: self.samples_total.load(Ordering::Relaxed),
            samples_outside: self.samples_outside.load(Ordering::Relaxed),
            location_errors: self.location_errors.load(Ordering::Relaxed),
            api_requests: self.api_requests.load(Ordering::Relaxed),
            api_failures: self.api_failures.load(Ordering::Relaxed),
            api_rejections: self.api_rejections.load(Ordering::Relaxed),
            absences_recorded: self.absences_recorded.load(Ordering::Relaxed),
            toasts_shown: self.toasts_shown.load(Ordering::Relaxed),
            last_distance_m: (last_distance_cm != u64::MAX)
                .then(|| last_distance_cm as f64 / 100.0),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSummary {
    pub samples_total: u64,
    pub samples_outside: u64,
    pub location_errors: u64,
    pub api_requests: u64,
    pub api_failures: u64,
    pub api_rejections: u64,
    pub absences_recorded: u64,
    pub toasts_shown: u64,
    pub last_distance_m: Option<f64>,
    pub uptime_secs: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            samples = %self.samples_total,
            outside = %self.samples_outside,
            location_errors = %self.location_errors,
            api_requests = %self.api_requests,
            api_failures = %self.api_failures,
            api_rejections = %self.api_rejections,
            absences = %self.absences_recorded,
            toasts = %self.toasts_shown,
            last_distance_m = ?self.last_distance_m,
            uptime_secs = %self.uptime_secs,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_samples() {
        let metrics = Metrics::new();
        assert_eq!(metrics.report().last_distance_m, None);

        metrics.record_sample(12.345, true);
        metrics.record_sample(1111.95, false);
        metrics.record_sample(2000.0, false);

        let summary = metrics.report();
        assert_eq!(summary.samples_total, 3);
        assert_eq!(summary.samples_outside, 2);
        assert_eq!(summary.last_distance_m, Some(2000.0));
    }

    #[test]
    fn test_api_counters() {
        let metrics = Metrics::new();
        metrics.record_api_request();
        metrics.record_api_request();
        metrics.record_api_failure();
        metrics.record_api_rejection();
        metrics.record_absence();
        metrics.record_toast();
        metrics.record_location_error();

        let summary = metrics.report();
        assert_eq!(summary.api_requests, 2);
        assert_eq!(summary.api_failures, 1);
        assert_eq!(summary.api_rejections, 1);
        assert_eq!(summary.absences_recorded, 1);
        assert_eq!(summary.toasts_shown, 1);
        assert_eq!(summary.location_errors, 1);
    }
}
