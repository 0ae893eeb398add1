//! Port traits for the screener's collaborators.

pub mod account_port;
pub mod config_port;
pub mod currency_port;
pub mod mail_port;
pub mod notify_port;
pub mod record_port;
