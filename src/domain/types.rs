//! Shared types for the attendance agent

use crate::domain::geo::Coordinates;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use time::macros::format_description;
use time::OffsetDateTime;
use uuid::Uuid;

/// Newtype wrapper for order IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct OrderId(pub u64);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype wrapper for notification IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct NotificationId(pub u64);

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single fix delivered by a location provider.
///
/// Immutable once captured. The session keeps only the latest one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius in meters
    pub accuracy: f64,
    pub captured_at: Instant,
}

impl PositionSample {
    #[inline]
    pub fn new(latitude: f64, longitude: f64, accuracy: f64) -> Self {
        Self { latitude, longitude, accuracy, captured_at: Instant::now() }
    }

    #[inline]
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    /// Time since the fix was captured
    #[inline]
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }
}

/// Failure reported by a location provider instead of a fix
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LocationError {
    #[error("location provider unavailable: {0}")]
    Unavailable(String),
    #[error("location permission denied")]
    PermissionDenied,
    #[error("no position fix within {0:?}")]
    Timeout(Duration),
    #[error("malformed position data: {0}")]
    Parse(String),
}

impl LocationError {
    /// Errors after which the provider cannot deliver anything more
    pub fn is_terminal(&self) -> bool {
        matches!(self, LocationError::Unavailable(_) | LocationError::PermissionDenied)
    }
}

/// Result type carried by a location watch
pub type LocationResult = Result<PositionSample, LocationError>;

/// Toast severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Error,
    Warning,
    Info,
}

impl ToastKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToastKind::Success => "success",
            ToastKind::Error => "error",
            ToastKind::Warning => "warning",
            ToastKind::Info => "info",
        }
    }

    /// Default title used when a toast carries only a message
    pub fn title(&self) -> &'static str {
        match self {
            ToastKind::Success => "Success",
            ToastKind::Error => "Error",
            ToastKind::Warning => "Warning",
            ToastKind::Info => "Notice",
        }
    }
}

/// Transient notification shown to the worker
#[derive(Debug, Clone)]
pub struct Toast {
    pub id: Uuid,
    pub kind: ToastKind,
    pub title: String,
    pub message: String,
    /// Server notification this toast displays, if any
    pub notification: Option<NotificationId>,
    pub created_at: Instant,
}

impl Toast {
    pub fn new(kind: ToastKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            title: title.into(),
            message: message.into(),
            notification: None,
            created_at: Instant::now(),
        }
    }

    /// Info toast for an unread server notification
    pub fn for_notification(
        id: NotificationId,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self { notification: Some(id), ..Self::new(ToastKind::Info, title, message) }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Success, ToastKind::Success.title(), message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Error, ToastKind::Error.title(), message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Warning, ToastKind::Warning.title(), message)
    }

    #[inline]
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() >= ttl
    }
}

/// Current wall-clock time rendered for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockReading {
    pub time: String,
    pub date: String,
}

impl ClockReading {
    /// Read the local clock, falling back to UTC when the offset is unknown
    pub fn now() -> Self {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        Self::at(now)
    }

    pub fn at(now: OffsetDateTime) -> Self {
        let time_fmt = format_description!("[hour]:[minute]:[second]");
        let date_fmt =
            format_description!("[weekday], [day padding:none] [month repr:long] [year]");
        Self {
            time: now.format(&time_fmt).unwrap_or_default(),
            date: now.format(&date_fmt).unwrap_or_default(),
        }
    }
}
