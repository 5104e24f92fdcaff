//! Services - session logic and state
//!
//! - `geofence_monitor` - classifies position samples against the workshop
//! - `session` - the worker session and its event loop

pub mod geofence_monitor;
pub mod session;

// Re-export commonly used types
pub use geofence_monitor::{GeofenceMonitor, PresenceVerdict};
pub use session::{ActionParseError, UserAction, WorkerSession};
