//! Live-update delivery port.

use crate::domain::error::ScreenerError;
use crate::domain::notification::Notification;

pub trait NotifyPort {
    /// Deliver to every current subscriber of `group`; returns how many were
    /// reached. No subscribers is not an error.
    fn publish(&self, group: &str, notification: &Notification) -> Result<usize, ScreenerError>;
}
