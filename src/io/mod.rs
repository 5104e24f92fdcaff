//! IO modules - external system interfaces
//!
//! - `api` - REST client for the worker application server
//! - `location` - location watch and position providers (NMEA serial, MQTT)
//! - `presenter` - presentation port and the log-backed presenter
//! - `status` - HTTP endpoint for metrics and presence

pub mod api;
pub mod location;
pub mod presenter;
pub mod status;

// Re-export commonly used types
pub use api::{ApiError, CheckIn, HttpWorkerApi, WorkerApi};
pub use location::{FixCache, LocationWatch, PositionProvider, WatchOptions};
pub use presenter::{LogPresenter, PresenceSnapshot, Presenter, SharedPresence};
