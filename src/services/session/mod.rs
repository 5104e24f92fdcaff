//! Worker session - the single execution context of the agent
//!
//! The session owns everything the worker page kept in globals:
//! - the geofence monitor and its latest sample
//! - the auto-check-in flag
//! - the API client and the presenter
//!
//! `run` drives it from one `select!` loop over location results, worker
//! actions, the clock timer, the notification timer and the API calls in
//! flight. Inputs are handled one at a time. A pending request never holds
//! up samples, ticks or shutdown; its outcome is applied when it lands.

mod actions;
mod handlers;

pub use actions::{ActionParseError, UserAction};

use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::api::WorkerApi;
use crate::io::location::LocationWatch;
use crate::io::presenter::Presenter;
use crate::services::geofence_monitor::GeofenceMonitor;
use handlers::ApiOutcome;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval, sleep_until, Duration, Instant, MissedTickBehavior};
use tracing::{info, warn};

/// Log an API task that panicked or was aborted (cold path)
#[cold]
fn log_call_lost(e: &JoinError) {
    warn!(error = %e, "api_call_lost");
}

pub struct WorkerSession<A: WorkerApi, P: Presenter> {
    /// Latest sample and its classification
    pub(crate) monitor: GeofenceMonitor,
    /// Only persisted boolean; toggled by the worker
    pub(crate) auto_check_in: bool,
    /// Unread notifications behind the badge
    pub(crate) unread: usize,
    pub(crate) api: Arc<A>,
    pub(crate) presenter: P,
    pub(crate) metrics: Arc<Metrics>,
    clock_interval: Duration,
    notification_interval: Duration,
    pub(crate) completion_refresh_delay: Duration,
    /// Order view refresh scheduled after a completion
    pub(crate) refresh_at: Option<Instant>,
    /// A notification poll is in flight
    pub(crate) notifications_pending: bool,
}

impl<A: WorkerApi + 'static, P: Presenter> WorkerSession<A, P> {
    pub fn new(config: &Config, api: A, presenter: P, metrics: Arc<Metrics>) -> Self {
        Self {
            monitor: GeofenceMonitor::new(config.geofence()),
            auto_check_in: config.auto_check_in(),
            unread: 0,
            api: Arc::new(api),
            presenter,
            metrics,
            clock_interval: config.clock_interval(),
            notification_interval: config.notification_interval(),
            completion_refresh_delay: config.completion_refresh_delay(),
            refresh_at: None,
            notifications_pending: false,
        }
    }

    pub fn monitor(&self) -> &GeofenceMonitor {
        &self.monitor
    }

    pub fn auto_check_in(&self) -> bool {
        self.auto_check_in
    }

    pub fn unread(&self) -> usize {
        self.unread
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    /// Run until shutdown is signalled.
    ///
    /// Location and action channels closing does not end the session; the
    /// timers keep running. The location watch is cancelled and pending API
    /// calls are aborted on exit.
    pub async fn run(
        &mut self,
        mut location: LocationWatch,
        mut actions: mpsc::Receiver<UserAction>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut clock_tick = interval(self.clock_interval);
        let mut notification_tick = interval(self.notification_interval);
        clock_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        notification_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut location_open = true;
        let mut actions_open = true;
        let mut in_flight: JoinSet<ApiOutcome> = JoinSet::new();

        info!(
            auto_check_in = self.auto_check_in,
            radius_m = %self.monitor.geofence().radius_m,
            "session_started"
        );
        self.publish_presence();

        loop {
            let refresh_at = self.refresh_at;
            let call = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    None
                }
                result = location.recv(), if location_open => {
                    match result {
                        Some(result) => self.handle_location(result),
                        None => {
                            location_open = false;
                            info!("location_watch_ended");
                        }
                    }
                    None
                }
                action = actions.recv(), if actions_open => {
                    match action {
                        Some(action) => self.start_action(action),
                        None => {
                            actions_open = false;
                            None
                        }
                    }
                }
                _ = clock_tick.tick() => {
                    self.refresh_clock();
                    None
                }
                _ = notification_tick.tick() => self.start_check_notifications(),
                _ = sleep_until(refresh_at.unwrap_or_else(Instant::now)), if refresh_at.is_some() => {
                    self.refresh_at = None;
                    self.refresh_view()
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    match joined {
                        Ok(outcome) => self.apply_outcome(outcome),
                        Err(e) => {
                            log_call_lost(&e);
                            // The lost task may have been the notification poll
                            self.notifications_pending = false;
                        }
                    }
                    None
                }
            };
            if let Some(call) = call {
                in_flight.spawn(call);
            }
        }

        if !in_flight.is_empty() {
            info!(pending = in_flight.len(), "api_calls_abandoned");
            in_flight.abort_all();
        }
        location.cancel();
        self.metrics.report().log();
        info!("session_stopped");
    }
}
