//! Concrete adapter implementations for ports.

#[cfg(feature = "web")]
pub mod broadcast_notifier;
pub mod csv_adapter;
pub mod file_config_adapter;
pub mod log_mailer;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
#[cfg(feature = "web")]
pub mod web;
