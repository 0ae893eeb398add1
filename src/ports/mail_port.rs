//! Outgoing mail port.

use crate::domain::account::User;
use crate::domain::error::ScreenerError;

pub trait MailPort {
    fn send_password_reset(&self, user: &User, reset_link: &str) -> Result<(), ScreenerError>;
}
