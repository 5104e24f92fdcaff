//! Integration tests for the session event loop

use async_trait::async_trait;
use attendance_agent::domain::attendance::{AttendanceSession, Notification, Progress, ProgressLevel};
use attendance_agent::domain::types::{
    ClockReading, NotificationId, OrderId, PositionSample, Toast, ToastKind,
};
use attendance_agent::infra::{Config, Metrics};
use attendance_agent::io::location::{ChannelProvider, FixCache, LocationWatch, WatchOptions};
use attendance_agent::io::{ApiError, CheckIn, PresenceSnapshot, Presenter, WorkerApi};
use attendance_agent::services::{UserAction, WorkerSession};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Presenter events shared with the test body while the session runs
#[derive(Debug, Clone, PartialEq)]
enum Shown {
    Toast(ToastKind, String),
    Progress(OrderId, u8),
    Badge(usize),
    Completed(OrderId),
    Clock,
    Presence { inside: bool },
    Other,
}

#[derive(Clone, Default)]
struct SharedPresenter(Arc<Mutex<Vec<Shown>>>);

impl SharedPresenter {
    fn events(&self) -> Vec<Shown> {
        self.0.lock().clone()
    }

    fn toasts(&self) -> Vec<(ToastKind, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Shown::Toast(kind, message) => Some((kind, message)),
                _ => None,
            })
            .collect()
    }

    /// Poll until `check` holds or a second has passed
    async fn wait_for(&self, check: impl Fn(&[Shown]) -> bool) -> bool {
        for _ in 0..100 {
            if check(&self.0.lock()) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl Presenter for SharedPresenter {
    fn show_toast(&mut self, toast: Toast) {
        self.0.lock().push(Shown::Toast(toast.kind, toast.message));
    }
    fn set_progress(&mut self, order: OrderId, progress: Progress, _level: ProgressLevel) {
        self.0.lock().push(Shown::Progress(order, progress.value()));
    }
    fn show_attendance(&mut self, _session: &AttendanceSession) {
        self.0.lock().push(Shown::Other);
    }
    fn set_notification_badge(&mut self, count: usize) {
        self.0.lock().push(Shown::Badge(count));
    }
    fn remove_notification(&mut self, _id: NotificationId) {
        self.0.lock().push(Shown::Other);
    }
    fn order_completed(&mut self, order: OrderId) {
        self.0.lock().push(Shown::Completed(order));
    }
    fn set_clock(&mut self, _clock: &ClockReading) {
        self.0.lock().push(Shown::Clock);
    }
    fn set_presence(&mut self, presence: PresenceSnapshot) {
        self.0.lock().push(Shown::Presence { inside: presence.inside });
    }
}

/// API that accepts everything and counts notification polls
#[derive(Default)]
struct AcceptingApi {
    polls: Mutex<usize>,
}

#[async_trait]
impl WorkerApi for AcceptingApi {
    async fn check_in(&self, _sample: &PositionSample) -> Result<CheckIn, ApiError> {
        Ok(CheckIn::default())
    }
    async fn update_progress(
        &self,
        _order: OrderId,
        _progress: Progress,
    ) -> Result<Option<String>, ApiError> {
        Ok(None)
    }
    async fn complete_order(&self, _order: OrderId) -> Result<Option<String>, ApiError> {
        Ok(None)
    }
    async fn mark_notification_read(&self, _id: NotificationId) -> Result<(), ApiError> {
        Ok(())
    }
    async fn unread_notifications(&self) -> Result<Vec<Notification>, ApiError> {
        *self.polls.lock() += 1;
        Ok(vec![Notification {
            id: NotificationId(1),
            title: "New order".into(),
            message: "Order #7 assigned".into(),
        }])
    }
}

fn watch_options() -> WatchOptions {
    WatchOptions { timeout: Duration::from_secs(5), ..WatchOptions::default() }
}

#[tokio::test]
async fn test_run_loop_end_to_end() {
    let presenter = SharedPresenter::default();
    let metrics = Arc::new(Metrics::new());
    let mut session = WorkerSession::new(
        &Config::default(),
        AcceptingApi::default(),
        presenter.clone(),
        metrics.clone(),
    );

    let (fix_tx, provider) = ChannelProvider::new(8);
    let location = LocationWatch::start(provider, watch_options(), FixCache::new());
    let (action_tx, action_rx) = mpsc::channel(8);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        session.run(location, action_rx, shutdown_rx).await;
        session
    });

    // Both timers fire once at start
    assert!(presenter.wait_for(|e| e.contains(&Shown::Clock)).await);
    assert!(presenter.wait_for(|e| e.contains(&Shown::Badge(1))).await);

    // Level-triggered: two outside samples, two warnings
    fix_tx.send(Ok(PositionSample::new(36.7625, 3.0420, 5.0))).await.unwrap();
    fix_tx.send(Ok(PositionSample::new(36.7625, 3.0420, 5.0))).await.unwrap();
    fix_tx.send(Ok(PositionSample::new(36.7525, 3.0420, 5.0))).await.unwrap();
    assert!(presenter.wait_for(|e| e.contains(&Shown::Presence { inside: true })).await);

    let warnings = presenter
        .toasts()
        .into_iter()
        .filter(|(kind, msg)| {
            *kind == ToastKind::Warning && msg == "You are outside the workshop area!"
        })
        .count();
    assert_eq!(warnings, 2);

    action_tx.send(UserAction::CheckIn).await.unwrap();
    action_tx.send(UserAction::UpdateProgress { order: OrderId(7), progress: 30 }).await.unwrap();
    action_tx.send(UserAction::CompleteOrder(OrderId(7))).await.unwrap();
    // Calls are in flight together and may land in any order
    assert!(presenter.wait_for(|e| e.contains(&Shown::Completed(OrderId(7)))).await);
    assert!(presenter.wait_for(|e| e.contains(&Shown::Progress(OrderId(7), 30))).await);
    assert!(
        presenter
            .wait_for(|e| e.contains(&Shown::Toast(
                ToastKind::Success,
                "Attendance recorded".to_string()
            )))
            .await
    );

    let toasts = presenter.toasts();
    assert!(toasts.contains(&(ToastKind::Success, "Attendance recorded".to_string())));
    assert!(toasts.contains(&(ToastKind::Success, "Progress updated".to_string())));
    assert!(toasts.contains(&(ToastKind::Success, "Order completed".to_string())));
    assert!(presenter.events().contains(&Shown::Progress(OrderId(7), 30)));

    shutdown_tx.send(true).unwrap();
    let session = tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

    // Watch cancelled on exit
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(fix_tx.is_closed());
    assert_eq!(session.monitor().latest().map(|s| s.latitude), Some(36.7525));
    assert_eq!(metrics.report().samples_outside, 2);
}

#[tokio::test]
async fn test_refresh_after_completion() {
    let presenter = SharedPresenter::default();
    let config = Config::default();
    let mut session = WorkerSession::new(
        &config,
        AcceptingApi::default(),
        presenter.clone(),
        Arc::new(Metrics::new()),
    );

    let location = LocationWatch::unavailable("no gps");
    let (action_tx, action_rx) = mpsc::channel(8);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        session.run(location, action_rx, shutdown_rx).await;
        session
    });

    // Missing capability is reported once
    assert!(
        presenter
            .wait_for(|e| e.contains(&Shown::Toast(
                ToastKind::Error,
                "Unable to determine location".to_string()
            )))
            .await
    );

    action_tx.send(UserAction::CompleteOrder(OrderId(3))).await.unwrap();
    assert!(presenter.wait_for(|e| e.contains(&Shown::Completed(OrderId(3)))).await);

    // The view refresh polls notifications again after the completion delay
    tokio::time::sleep(config.completion_refresh_delay() + Duration::from_millis(300)).await;
    shutdown_tx.send(true).unwrap();
    let session = tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    assert_eq!(*session.api().polls.lock(), 2);

    let errors = presenter
        .toasts()
        .into_iter()
        .filter(|(kind, _)| *kind == ToastKind::Error)
        .count();
    assert_eq!(errors, 1);
}

#[tokio::test]
async fn test_dropped_shutdown_sender_stops_session() {
    let mut session = WorkerSession::new(
        &Config::default(),
        AcceptingApi::default(),
        SharedPresenter::default(),
        Arc::new(Metrics::new()),
    );
    let (_action_tx, action_rx) = mpsc::channel(1);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    drop(shutdown_tx);

    let run = session.run(LocationWatch::unavailable("none"), action_rx, shutdown_rx);
    assert!(tokio::time::timeout(Duration::from_secs(1), run).await.is_ok());
}

/// API whose calls never answer, like a server that swallows requests
struct SilentApi;

#[async_trait]
impl WorkerApi for SilentApi {
    async fn check_in(&self, _sample: &PositionSample) -> Result<CheckIn, ApiError> {
        std::future::pending().await
    }
    async fn update_progress(
        &self,
        _order: OrderId,
        _progress: Progress,
    ) -> Result<Option<String>, ApiError> {
        std::future::pending().await
    }
    async fn complete_order(&self, _order: OrderId) -> Result<Option<String>, ApiError> {
        std::future::pending().await
    }
    async fn mark_notification_read(&self, _id: NotificationId) -> Result<(), ApiError> {
        std::future::pending().await
    }
    async fn unread_notifications(&self) -> Result<Vec<Notification>, ApiError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_pending_requests_do_not_stall_monitoring() {
    let presenter = SharedPresenter::default();
    let metrics = Arc::new(Metrics::new());
    let mut session =
        WorkerSession::new(&Config::default(), SilentApi, presenter.clone(), metrics.clone());

    let (fix_tx, provider) = ChannelProvider::new(8);
    let location = LocationWatch::start(provider, watch_options(), FixCache::new());
    let (action_tx, action_rx) = mpsc::channel(8);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { session.run(location, action_rx, shutdown_rx).await });

    // The startup notification poll never answers
    fix_tx.send(Ok(PositionSample::new(36.7525, 3.0420, 5.0))).await.unwrap();
    assert!(presenter.wait_for(|e| e.contains(&Shown::Presence { inside: true })).await);

    action_tx.send(UserAction::CheckIn).await.unwrap();
    action_tx.send(UserAction::CompleteOrder(OrderId(4))).await.unwrap();
    for _ in 0..3 {
        fix_tx.send(Ok(PositionSample::new(36.7625, 3.0420, 5.0))).await.unwrap();
    }

    let warning = Shown::Toast(ToastKind::Warning, "You are outside the workshop area!".into());
    assert!(presenter.wait_for(|e| e.iter().filter(|s| **s == warning).count() == 3).await);
    assert_eq!(metrics.report().samples_outside, 3);

    // Startup poll, check-in and completion are all still pending
    for _ in 0..100 {
        if metrics.report().api_requests == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(metrics.report().api_requests, 3);

    shutdown_tx.send(true).unwrap();
    assert!(tokio::time::timeout(Duration::from_secs(1), handle).await.is_ok());
    assert!(!presenter.events().iter().any(|e| matches!(e, Shown::Completed(_))));
}
