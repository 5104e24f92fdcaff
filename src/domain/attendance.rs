//! Attendance session marks, order progress, and worker notifications

use crate::domain::types::NotificationId;
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use smallvec::SmallVec;

/// The four attendance marks of a working day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceMark {
    MorningCheckIn,
    MorningCheckOut,
    AfternoonCheckIn,
    AfternoonCheckOut,
}

impl AttendanceMark {
    pub fn label(&self) -> &'static str {
        match self {
            AttendanceMark::MorningCheckIn => "Morning check-in",
            AttendanceMark::MorningCheckOut => "Morning check-out",
            AttendanceMark::AfternoonCheckIn => "Afternoon check-in",
            AttendanceMark::AfternoonCheckOut => "Afternoon check-out",
        }
    }
}

/// Today's attendance as returned by the check-in endpoint
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AttendanceSession {
    #[serde(default, deserialize_with = "deserialize_mark")]
    pub check_in_morning: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "deserialize_mark")]
    pub check_out_morning: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "deserialize_mark")]
    pub check_in_afternoon: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "deserialize_mark")]
    pub check_out_afternoon: Option<NaiveDateTime>,
}

impl AttendanceSession {
    /// Recorded marks in day order; absent marks are skipped
    pub fn marks(&self) -> SmallVec<[(AttendanceMark, NaiveDateTime); 4]> {
        [
            (AttendanceMark::MorningCheckIn, self.check_in_morning),
            (AttendanceMark::MorningCheckOut, self.check_out_morning),
            (AttendanceMark::AfternoonCheckIn, self.check_in_afternoon),
            (AttendanceMark::AfternoonCheckOut, self.check_out_afternoon),
        ]
        .into_iter()
        .filter_map(|(mark, at)| at.map(|at| (mark, at)))
        .collect()
    }

    /// "Label: HH:MM" lines for display
    pub fn display_lines(&self) -> SmallVec<[String; 4]> {
        self.marks()
            .into_iter()
            .map(|(mark, at)| format!("{}: {}", mark.label(), at.format("%H:%M")))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.marks().is_empty()
    }
}

/// Accepts naive ISO timestamps (with or without fraction) and RFC 3339 with offset
fn deserialize_mark<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(naive) = raw.parse::<NaiveDateTime>() {
        return Ok(Some(naive));
    }
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| Some(dt.naive_local()))
        .map_err(|e| D::Error::custom(format!("invalid attendance timestamp {raw:?}: {e}")))
}

/// Visual class of an order's progress bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressLevel {
    Low,
    Medium,
    High,
}

impl ProgressLevel {
    /// 0-29 low, 30-69 medium, 70 and above high
    pub fn classify(progress: u8) -> Self {
        match progress {
            0..=29 => ProgressLevel::Low,
            30..=69 => ProgressLevel::Medium,
            _ => ProgressLevel::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressLevel::Low => "progress-low",
            ProgressLevel::Medium => "progress-medium",
            ProgressLevel::High => "progress-high",
        }
    }
}

/// Completion percentage of an order, always within 0-100
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Progress(u8);

impl Progress {
    pub const MAX: u8 = 100;

    pub fn new(value: u32) -> Option<Self> {
        u8::try_from(value).ok().filter(|v| *v <= Self::MAX).map(Progress)
    }

    #[inline]
    pub fn value(&self) -> u8 {
        self.0
    }

    #[inline]
    pub fn level(&self) -> ProgressLevel {
        ProgressLevel::classify(self.0)
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Unread notification as listed by the server
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    #[serde(default)]
    pub message: String,
}
