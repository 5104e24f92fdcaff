//! Session operations
//!
//! Each API-backed operation is split in two: `start_*` validates and returns
//! the request as an owned future, `apply_outcome` reports its result through
//! the presenter. The run loop keeps the futures in flight while it goes on
//! handling samples; the public async operations await them directly.
//! Failures end as a toast or a log line; nothing is retried.

use super::{UserAction, WorkerSession};
use crate::domain::attendance::{Notification, Progress};
use crate::domain::types::{
    ClockReading, LocationError, LocationResult, NotificationId, OrderId, PositionSample, Toast,
};
use crate::io::api::{ApiError, CheckIn, WorkerApi};
use crate::io::presenter::{PresenceSnapshot, Presenter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub(crate) const OUTSIDE_WARNING: &str = "You are outside the workshop area!";
pub(crate) const LOCATION_ERROR: &str = "Unable to determine location";
pub(crate) const ACQUIRING_LOCATION: &str = "Acquiring location...";

/// A finished API call, carrying what its handler needs
#[derive(Debug)]
pub(crate) enum ApiOutcome {
    CheckIn { sample: PositionSample, result: Result<CheckIn, ApiError> },
    Progress { order: OrderId, progress: Progress, result: Result<Option<String>, ApiError> },
    Complete { order: OrderId, result: Result<Option<String>, ApiError> },
    MarkRead { id: NotificationId, result: Result<(), ApiError> },
    Notifications(Result<Vec<Notification>, ApiError>),
}

/// An API request owned independently of the session
pub(crate) type ApiCall = Pin<Box<dyn Future<Output = ApiOutcome> + Send>>;

/// Log a location error (cold path)
#[cold]
fn log_location_error(e: &LocationError) {
    warn!(error = %e, terminal = e.is_terminal(), "location_unavailable");
}

/// Log an API call whose failure is not shown to the worker (cold path)
#[cold]
fn log_silent_api_error(operation: &str, e: &ApiError) {
    warn!(operation = %operation, error = %e, "api_call_failed_silently");
}

impl<A: WorkerApi + 'static, P: Presenter> WorkerSession<A, P> {
    pub(crate) fn toast(&mut self, toast: Toast) {
        self.metrics.record_toast();
        self.presenter.show_toast(toast);
    }

    fn publish_presence_with(&mut self, distance_m: Option<f64>, inside: bool) {
        let snapshot =
            PresenceSnapshot::new(self.monitor.latest(), distance_m, inside, self.auto_check_in);
        self.presenter.set_presence(snapshot);
    }

    pub(crate) fn publish_presence(&mut self) {
        let distance_m = self.monitor.distance_m();
        let inside = self.monitor.is_within();
        self.publish_presence_with(distance_m, inside);
    }

    /// Route a failed write to a toast: the server's own message for a
    /// rejection, `fallback` for anything else
    fn report_api_error(&mut self, operation: &str, e: &ApiError, fallback: &str) {
        match e.rejection_message() {
            Some(message) => {
                self.metrics.record_api_rejection();
                info!(operation = %operation, message = %message, "api_call_rejected");
                let message = if message.is_empty() { fallback } else { message };
                self.toast(Toast::error(message));
            }
            None => {
                self.metrics.record_api_failure();
                self.toast(Toast::error(fallback));
            }
        }
    }

    fn record_silent_api_error(&mut self, operation: &str, e: &ApiError) {
        if e.rejection_message().is_some() {
            self.metrics.record_api_rejection();
        } else {
            self.metrics.record_api_failure();
        }
        log_silent_api_error(operation, e);
    }

    /// Dispatch one result from the location watch
    pub fn handle_location(&mut self, result: LocationResult) {
        match result {
            Ok(sample) => self.on_position_update(sample),
            Err(e) => self.on_location_error(&e),
        }
    }

    /// Classify a new sample. Every outside sample warns and records an
    /// absence attempt.
    pub fn on_position_update(&mut self, sample: PositionSample) {
        let verdict = self.monitor.on_position_update(sample);
        self.metrics.record_sample(verdict.distance_m, verdict.inside);
        debug!(
            latitude = %sample.latitude,
            longitude = %sample.longitude,
            accuracy_m = %sample.accuracy,
            distance_m = %verdict.distance_m,
            inside = verdict.inside,
            "position_update"
        );

        if verdict.is_outside() {
            info!(distance_m = %verdict.distance_m, "outside_geofence");
            self.toast(Toast::warning(OUTSIDE_WARNING));
            self.record_absence();
        }
        self.publish_presence_with(Some(verdict.distance_m), verdict.inside);
    }

    /// The latest sample is left as it was
    fn on_location_error(&mut self, e: &LocationError) {
        self.metrics.record_location_error();
        log_location_error(e);
        self.toast(Toast::error(LOCATION_ERROR));
    }

    /// Absence attempt for an outside sample. Only counted while automatic
    /// attendance is on; the server has no absence endpoint.
    pub fn record_absence(&mut self) {
        if !self.auto_check_in {
            return;
        }
        self.metrics.record_absence();
        info!(distance_m = ?self.monitor.distance_m(), "absence_recorded");
    }

    /// Start the API call behind an action, if it needs one. Local actions
    /// are applied immediately.
    pub(crate) fn start_action(&mut self, action: UserAction) -> Option<ApiCall> {
        debug!(action = ?action, "user_action");
        match action {
            UserAction::CheckIn => self.start_check_in(),
            UserAction::UpdateProgress { order, progress } => {
                self.start_order_progress(order, progress)
            }
            UserAction::CompleteOrder(order) => Some(self.start_complete_order(order)),
            UserAction::MarkRead(id) => Some(self.start_mark_notification_read(id)),
            UserAction::EnableAutoCheckIn => {
                self.enable_auto_check_in();
                None
            }
            UserAction::DisableAutoCheckIn => {
                self.disable_auto_check_in();
                None
            }
            UserAction::RefreshNotifications => self.start_check_notifications(),
        }
    }

    /// Run an action to completion, including its API call
    pub async fn handle_action(&mut self, action: UserAction) {
        if let Some(call) = self.start_action(action) {
            self.finish(call).await;
        }
    }

    async fn finish(&mut self, call: ApiCall) {
        let outcome = call.await;
        self.apply_outcome(outcome);
    }

    /// Count a request and hand a clone of the client to `request`
    fn call<F>(&self, request: impl FnOnce(Arc<A>) -> F) -> ApiCall
    where
        F: Future<Output = ApiOutcome> + Send + 'static,
    {
        self.metrics.record_api_request();
        Box::pin(request(Arc::clone(&self.api)))
    }

    /// Apply a finished call to the session and the presenter
    pub(crate) fn apply_outcome(&mut self, outcome: ApiOutcome) {
        match outcome {
            ApiOutcome::CheckIn { sample, result } => self.on_check_in(sample, result),
            ApiOutcome::Progress { order, progress, result } => {
                self.on_order_progress(order, progress, result)
            }
            ApiOutcome::Complete { order, result } => self.on_order_completed(order, result),
            ApiOutcome::MarkRead { id, result } => self.on_notification_read(id, result),
            ApiOutcome::Notifications(result) => self.on_notifications(result),
        }
    }

    /// Send the latest sample as a check-in
    pub async fn check_in(&mut self) {
        if let Some(call) = self.start_check_in() {
            self.finish(call).await;
        }
    }

    pub(crate) fn start_check_in(&mut self) -> Option<ApiCall> {
        let Some(sample) = self.monitor.latest().copied() else {
            self.toast(Toast::error(ACQUIRING_LOCATION));
            return None;
        };
        Some(self.call(move |api| async move {
            let result = api.check_in(&sample).await;
            ApiOutcome::CheckIn { sample, result }
        }))
    }

    fn on_check_in(&mut self, sample: PositionSample, result: Result<CheckIn, ApiError>) {
        match result {
            Ok(check_in) => {
                info!(
                    latitude = %sample.latitude,
                    longitude = %sample.longitude,
                    accuracy_m = %sample.accuracy,
                    "checked_in"
                );
                self.toast(Toast::success("Attendance recorded"));
                if let Some(session) = &check_in.session {
                    self.presenter.show_attendance(session);
                }
            }
            Err(e) => self.report_api_error("checkin", &e, "Could not reach the server"),
        }
    }

    pub async fn update_order_progress(&mut self, order: OrderId, progress: u32) {
        if let Some(call) = self.start_order_progress(order, progress) {
            self.finish(call).await;
        }
    }

    /// Values above 100 are refused before any request is made
    pub(crate) fn start_order_progress(&mut self, order: OrderId, progress: u32) -> Option<ApiCall> {
        let Some(progress) = Progress::new(progress) else {
            debug!(order_id = %order, progress = %progress, "order_progress_out_of_range");
            self.toast(Toast::error("Progress must be between 0 and 100"));
            return None;
        };
        Some(self.call(move |api| async move {
            let result = api.update_progress(order, progress).await;
            ApiOutcome::Progress { order, progress, result }
        }))
    }

    fn on_order_progress(
        &mut self,
        order: OrderId,
        progress: Progress,
        result: Result<Option<String>, ApiError>,
    ) {
        match result {
            Ok(_) => {
                info!(order_id = %order, progress = %progress, "order_progress_updated");
                self.toast(Toast::success("Progress updated"));
                self.presenter.set_progress(order, progress, progress.level());
            }
            Err(e) => self.report_api_error("update_progress", &e, "Could not update progress"),
        }
    }

    /// Caller has already confirmed with the worker
    pub async fn complete_order(&mut self, order: OrderId) {
        let call = self.start_complete_order(order);
        self.finish(call).await;
    }

    pub(crate) fn start_complete_order(&mut self, order: OrderId) -> ApiCall {
        self.call(move |api| async move {
            let result = api.complete_order(order).await;
            ApiOutcome::Complete { order, result }
        })
    }

    fn on_order_completed(&mut self, order: OrderId, result: Result<Option<String>, ApiError>) {
        match result {
            Ok(_) => {
                info!(order_id = %order, "order_completed");
                self.toast(Toast::success("Order completed"));
                self.presenter.order_completed(order);
                self.refresh_at = Some(Instant::now() + self.completion_refresh_delay);
            }
            Err(e) => self.report_api_error("complete_order", &e, "Could not complete order"),
        }
    }

    /// Failures are logged, never shown
    pub async fn mark_notification_read(&mut self, id: NotificationId) {
        let call = self.start_mark_notification_read(id);
        self.finish(call).await;
    }

    pub(crate) fn start_mark_notification_read(&mut self, id: NotificationId) -> ApiCall {
        self.call(move |api| async move {
            let result = api.mark_notification_read(id).await;
            ApiOutcome::MarkRead { id, result }
        })
    }

    fn on_notification_read(&mut self, id: NotificationId, result: Result<(), ApiError>) {
        match result {
            Ok(()) => {
                self.unread = self.unread.saturating_sub(1);
                info!(notification_id = %id, unread = %self.unread, "notification_read");
                self.presenter.remove_notification(id);
                self.presenter.set_notification_badge(self.unread);
            }
            Err(e) => self.record_silent_api_error("mark_read", &e),
        }
    }

    /// Poll unread notifications; failures are logged, never shown
    pub async fn check_notifications(&mut self) {
        if let Some(call) = self.start_check_notifications() {
            self.finish(call).await;
        }
    }

    /// At most one poll is in flight; a tick landing while one is pending
    /// is skipped
    pub(crate) fn start_check_notifications(&mut self) -> Option<ApiCall> {
        if self.notifications_pending {
            debug!("notification_poll_skipped");
            return None;
        }
        self.notifications_pending = true;
        Some(self.call(|api| async move {
            ApiOutcome::Notifications(api.unread_notifications().await)
        }))
    }

    fn on_notifications(&mut self, result: Result<Vec<Notification>, ApiError>) {
        self.notifications_pending = false;
        match result {
            Ok(notifications) => {
                self.unread = notifications.len();
                debug!(unread = %self.unread, "notifications_checked");
                self.presenter.set_notification_badge(self.unread);
                for notification in notifications {
                    self.toast(Toast::for_notification(
                        notification.id,
                        notification.title,
                        notification.message,
                    ));
                }
            }
            Err(e) => self.record_silent_api_error("notifications", &e),
        }
    }

    pub fn refresh_clock(&mut self) {
        self.presenter.set_clock(&ClockReading::now());
    }

    /// Re-render after an order completion; returns the notification poll
    pub(crate) fn refresh_view(&mut self) -> Option<ApiCall> {
        debug!("view_refresh");
        self.refresh_clock();
        self.publish_presence();
        self.start_check_notifications()
    }

    pub fn enable_auto_check_in(&mut self) {
        self.set_auto_check_in(true);
        self.toast(Toast::success("Automatic attendance enabled"));
    }

    pub fn disable_auto_check_in(&mut self) {
        self.set_auto_check_in(false);
        self.toast(Toast::success("Automatic attendance disabled"));
    }

    fn set_auto_check_in(&mut self, enabled: bool) {
        self.auto_check_in = enabled;
        info!(enabled, "auto_check_in_changed");
        self.publish_presence();
    }
}
