//! Core domain types and logic.

pub mod account;
pub mod config_validation;
pub mod currency;
pub mod diff;
pub mod ema_record;
pub mod error;
pub mod filter;
pub mod notification;
pub mod watch;
