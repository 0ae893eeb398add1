//! Mail adapter that writes outgoing messages to the log.
//!
//! Stands in for an SMTP transport; the reset link is logged at info level so
//! an operator can hand it over.

use std::sync::Mutex;

use crate::domain::account::User;
use crate::domain::error::ScreenerError;
use crate::ports::mail_port::MailPort;

/// A message handed to the mailer.
#[derive(Debug, Clone, PartialEq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Default)]
pub struct LogMailer {
    outbox: Mutex<Vec<SentMail>>,
}

impl LogMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message sent so far, oldest first.
    pub fn sent(&self) -> Vec<SentMail> {
        self.outbox
            .lock()
            .map(|outbox| outbox.clone())
            .unwrap_or_default()
    }
}

impl MailPort for LogMailer {
    fn send_password_reset(&self, user: &User, reset_link: &str) -> Result<(), ScreenerError> {
        if user.email.trim().is_empty() {
            return Err(ScreenerError::Mail {
                reason: format!("user '{}' has no email address", user.username),
            });
        }
        let mail = SentMail {
            to: user.email.clone(),
            subject: "Password reset".to_string(),
            body: format!(
                "Hello {},\n\nUse the link below to choose a new password:\n{reset_link}\n",
                user.username
            ),
        };
        tracing::info!(to = %mail.to, link = %reset_link, "password reset mail");
        self.outbox
            .lock()
            .map_err(|e| ScreenerError::Mail {
                reason: e.to_string(),
            })?
            .push(mail);
        Ok(())
    }
}
