//! Worker actions and their text form
//!
//! The headless agent reads one command per line on stdin:
//!
//! ```text
//! checkin
//! progress <order-id> <0-100>
//! complete <order-id> --yes
//! read <notification-id>
//! auto on|off
//! notifications
//! ```

use crate::domain::types::{NotificationId, OrderId};
use std::str::FromStr;

/// Something the worker asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    CheckIn,
    /// Raw value; range checked by the session
    UpdateProgress { order: OrderId, progress: u32 },
    /// Already confirmed by the front end
    CompleteOrder(OrderId),
    MarkRead(NotificationId),
    EnableAutoCheckIn,
    DisableAutoCheckIn,
    RefreshNotifications,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("not a number: {0}")]
    InvalidNumber(String),
    #[error("completing an order needs confirmation: complete <order-id> --yes")]
    ConfirmationRequired,
}

fn number<T: FromStr>(raw: Option<&str>, usage: &'static str) -> Result<T, ActionParseError> {
    let raw = raw.ok_or(ActionParseError::Usage(usage))?;
    raw.parse().map_err(|_| ActionParseError::InvalidNumber(raw.to_string()))
}

impl FromStr for UserAction {
    type Err = ActionParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let command = words.next().ok_or(ActionParseError::Empty)?;

        let action = match command.to_ascii_lowercase().as_str() {
            "checkin" | "check-in" => UserAction::CheckIn,
            "progress" => {
                const USAGE: &str = "progress <order-id> <0-100>";
                let order = number(words.next(), USAGE)?;
                let progress = number(words.next(), USAGE)?;
                UserAction::UpdateProgress { order: OrderId(order), progress }
            }
            "complete" => {
                let order = number(words.next(), "complete <order-id> --yes")?;
                if words.next() != Some("--yes") {
                    return Err(ActionParseError::ConfirmationRequired);
                }
                UserAction::CompleteOrder(OrderId(order))
            }
            "read" => UserAction::MarkRead(NotificationId(number(
                words.next(),
                "read <notification-id>",
            )?)),
            "auto" => match words.next() {
                Some("on") => UserAction::EnableAutoCheckIn,
                Some("off") => UserAction::DisableAutoCheckIn,
                _ => return Err(ActionParseError::Usage("auto on|off")),
            },
            "notifications" => UserAction::RefreshNotifications,
            other => return Err(ActionParseError::Unknown(other.to_string())),
        };
        Ok(action)
    }
}
