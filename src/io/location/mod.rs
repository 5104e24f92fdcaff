//! Location watch - cancellable subscription to position fixes
//!
//! A `LocationWatch` pulls fixes from a `PositionProvider` on its own task and
//! forwards them as `Result<PositionSample, LocationError>` over a bounded
//! channel. Watch semantics:
//! - a cached fix younger than `maximum_age` is delivered first
//! - no fix within `timeout` yields `LocationError::Timeout`, then keeps waiting
//! - a terminal error (unavailable, permission denied) ends the watch
//! - `cancel()` or dropping the watch stops the task
//!
//! Providers:
//! - `nmea` - NMEA-0183 GPS receiver on a serial port
//! - `mqtt` - JSON fixes published on an MQTT topic
//! - `channel` - fixes pushed from inside the process

pub mod channel;
pub mod mqtt;
pub mod nmea;

pub use channel::ChannelProvider;
pub use mqtt::MqttProvider;
pub use nmea::NmeaProvider;

use crate::domain::types::{LocationError, LocationResult, PositionSample};
use crate::infra::config::{Config, LocationProviderKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Watch tuning, mirroring the platform geolocation options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    pub maximum_age: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(10),
            maximum_age: Duration::from_secs(60),
        }
    }
}

impl WatchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            high_accuracy: config.location_high_accuracy(),
            timeout: config.location_timeout(),
            maximum_age: config.location_maximum_age(),
        }
    }
}

/// Source of position fixes
#[async_trait]
pub trait PositionProvider: Send + 'static {
    fn name(&self) -> &'static str;

    /// Wait for the next fix or error. `None` means the provider is exhausted.
    ///
    /// Must be cancel-safe: the watch drops the future on timeout.
    async fn next_fix(&mut self) -> Option<LocationResult>;
}

/// Last fix seen by any watch, shared so a restarted watch can reuse it
#[derive(Debug, Clone, Default)]
pub struct FixCache {
    last: Arc<Mutex<Option<PositionSample>>>,
}

impl FixCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, sample: PositionSample) {
        *self.last.lock() = Some(sample);
    }

    /// Cached fix if it is no older than `maximum_age`
    pub fn fresh(&self, maximum_age: Duration) -> Option<PositionSample> {
        let last = *self.last.lock();
        last.filter(|s| s.age() <= maximum_age)
    }
}

/// Handle to a running watch
pub struct LocationWatch {
    rx: mpsc::Receiver<LocationResult>,
    cancel_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl LocationWatch {
    /// Spawn the watch task. Must be called inside a tokio runtime.
    pub fn start<P: PositionProvider>(provider: P, options: WatchOptions, cache: FixCache) -> Self {
        let (tx, rx) = mpsc::channel(16);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(watch_loop(provider, options, cache, tx, cancel_rx));
        Self { rx, cancel_tx, handle }
    }

    /// A watch that reports the missing capability once and ends
    pub fn unavailable(reason: &str) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let (cancel_tx, _) = watch::channel(false);
        let error = LocationError::Unavailable(reason.to_string());
        let handle = tokio::spawn(async move {
            let _ = tx.send(Err(error)).await;
        });
        Self { rx, cancel_tx, handle }
    }

    /// Build the provider selected in config and start watching it
    pub fn from_config(config: &Config, cache: FixCache) -> Self {
        let options = WatchOptions::from_config(config);
        match config.location_provider() {
            LocationProviderKind::Nmea => {
                Self::start(NmeaProvider::from_config(config, options.high_accuracy), options, cache)
            }
            LocationProviderKind::Mqtt => {
                Self::start(MqttProvider::from_config(config), options, cache)
            }
            LocationProviderKind::None => Self::unavailable("no location provider configured"),
        }
    }

    /// Next result; `None` once the watch has ended or been cancelled
    pub async fn recv(&mut self) -> Option<LocationResult> {
        self.rx.recv().await
    }

    /// Stop the subscription. Pending results are discarded.
    pub fn cancel(&mut self) {
        let _ = self.cancel_tx.send(true);
        self.handle.abort();
        self.rx.close();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for LocationWatch {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn watch_loop<P: PositionProvider>(
    mut provider: P,
    options: WatchOptions,
    cache: FixCache,
    tx: mpsc::Sender<LocationResult>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let name = provider.name();
    info!(
        provider = %name,
        high_accuracy = options.high_accuracy,
        timeout_ms = %options.timeout.as_millis(),
        maximum_age_ms = %options.maximum_age.as_millis(),
        "location_watch_started"
    );

    if let Some(cached) = cache.fresh(options.maximum_age) {
        debug!(age_ms = %cached.age().as_millis(), "location_cached_fix_reused");
        if tx.send(Ok(cached)).await.is_err() {
            return;
        }
    }

    loop {
        let next = tokio::select! {
            _ = cancel_rx.changed() => {
                info!(provider = %name, "location_watch_cancelled");
                return;
            }
            next = tokio::time::timeout(options.timeout, provider.next_fix()) => next,
        };

        let item = match next {
            Ok(Some(Ok(sample))) => {
                cache.store(sample);
                Ok(sample)
            }
            Ok(Some(Err(e))) => Err(e),
            Ok(None) => {
                info!(provider = %name, "location_provider_ended");
                return;
            }
            Err(_) => Err(LocationError::Timeout(options.timeout)),
        };

        let terminal = matches!(&item, Err(e) if e.is_terminal());
        if let Err(e) = &item {
            warn!(provider = %name, error = %e, terminal, "location_error");
        }

        if tx.send(item).await.is_err() {
            debug!(provider = %name, "location_watch_receiver_dropped");
            return;
        }
        if terminal {
            return;
        }
    }
}
