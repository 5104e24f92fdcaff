//! Domain models - core types and the geofence math
//!
//! - `geo` - haversine distance and the workshop geofence
//! - `types` - position samples, location errors, toasts, ids
//! - `attendance` - attendance marks, order progress, notifications

pub mod attendance;
pub mod geo;
pub mod types;

// Re-export commonly used types at module level
pub use attendance::{AttendanceSession, Notification, Progress, ProgressLevel};
pub use geo::{distance, is_within, Coordinates, Geofence};
pub use types::{LocationError, LocationResult, NotificationId, OrderId, PositionSample, Toast, ToastKind};
