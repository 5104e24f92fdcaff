//! Presentation port
//!
//! The session never touches a screen directly. Everything the worker sees
//! goes through `Presenter`, implemented here by `LogPresenter` (headless
//! agent) and by the dashboard state of the TUI binary.

use crate::domain::attendance::{AttendanceSession, Progress, ProgressLevel};
use crate::domain::types::{
    ClockReading, NotificationId, OrderId, PositionSample, Toast, ToastKind,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Latest presence as shown to the worker and served on `/presence`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PresenceSnapshot {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy_m: Option<f64>,
    pub distance_m: Option<f64>,
    pub inside: bool,
    pub auto_check_in: bool,
}

impl PresenceSnapshot {
    pub fn new(
        sample: Option<&PositionSample>,
        distance_m: Option<f64>,
        inside: bool,
        auto_check_in: bool,
    ) -> Self {
        Self {
            latitude: sample.map(|s| s.latitude),
            longitude: sample.map(|s| s.longitude),
            accuracy_m: sample.map(|s| s.accuracy),
            distance_m,
            inside,
            auto_check_in,
        }
    }
}

/// Presence shared between the presenter and the status endpoint
#[derive(Debug, Clone, Default)]
pub struct SharedPresence(Arc<RwLock<PresenceSnapshot>>);

impl SharedPresence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, snapshot: PresenceSnapshot) {
        *self.0.write() = snapshot;
    }

    pub fn get(&self) -> PresenceSnapshot {
        self.0.read().clone()
    }
}

/// Everything the session renders
pub trait Presenter: Send {
    fn show_toast(&mut self, toast: Toast);

    fn set_progress(&mut self, order: OrderId, progress: Progress, level: ProgressLevel);

    fn show_attendance(&mut self, session: &AttendanceSession);

    /// Unread count; zero hides the badge
    fn set_notification_badge(&mut self, count: usize);

    fn remove_notification(&mut self, id: NotificationId);

    fn order_completed(&mut self, order: OrderId);

    fn set_clock(&mut self, clock: &ClockReading);

    fn set_presence(&mut self, presence: PresenceSnapshot);
}

/// Renders every call as a structured log line
#[derive(Debug, Default)]
pub struct LogPresenter {
    presence: SharedPresence,
}

impl LogPresenter {
    pub fn new(presence: SharedPresence) -> Self {
        Self { presence }
    }
}

impl Presenter for LogPresenter {
    fn show_toast(&mut self, toast: Toast) {
        let kind = toast.kind.as_str();
        match toast.kind {
            ToastKind::Error | ToastKind::Warning => {
                warn!(kind = %kind, title = %toast.title, message = %toast.message, "toast")
            }
            ToastKind::Success | ToastKind::Info => {
                info!(kind = %kind, title = %toast.title, message = %toast.message, "toast")
            }
        }
    }

    fn set_progress(&mut self, order: OrderId, progress: Progress, level: ProgressLevel) {
        info!(order_id = %order, progress = %progress, level = %level.as_str(), "order_progress_shown");
    }

    fn show_attendance(&mut self, session: &AttendanceSession) {
        if session.is_empty() {
            info!("attendance_empty");
            return;
        }
        for line in session.display_lines() {
            info!(mark = %line, "attendance_mark");
        }
    }

    fn set_notification_badge(&mut self, count: usize) {
        info!(unread = %count, "notification_badge");
    }

    fn remove_notification(&mut self, id: NotificationId) {
        info!(notification_id = %id, "notification_removed");
    }

    fn order_completed(&mut self, order: OrderId) {
        info!(order_id = %order, "order_completed_shown");
    }

    fn set_clock(&mut self, clock: &ClockReading) {
        debug!(time = %clock.time, date = %clock.date, "clock");
    }

    fn set_presence(&mut self, presence: PresenceSnapshot) {
        debug!(
            distance_m = ?presence.distance_m,
            inside = presence.inside,
            auto_check_in = presence.auto_check_in,
            "presence"
        );
        self.presence.set(presence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_from_sample() {
        let sample = PositionSample::new(36.7525, 3.042, 8.0);
        let snapshot = PresenceSnapshot::new(Some(&sample), Some(0.0), true, false);
        assert_eq!(snapshot.latitude, Some(36.7525));
        assert_eq!(snapshot.accuracy_m, Some(8.0));
        assert!(snapshot.inside);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["inside"], true);
        assert_eq!(json["auto_check_in"], false);
    }

    #[test]
    fn test_log_presenter_publishes_presence() {
        let shared = SharedPresence::new();
        let mut presenter = LogPresenter::new(shared.clone());
        assert_eq!(shared.get(), PresenceSnapshot::default());

        let snapshot = PresenceSnapshot::new(None, None, false, true);
        presenter.set_presence(snapshot.clone());
        assert_eq!(shared.get(), snapshot);
    }
}
