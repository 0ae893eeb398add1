//! Server configuration validation.
//!
//! Reads and checks every setting the server needs before it starts.

use std::net::SocketAddr;

use chrono::Duration;

use crate::domain::error::ScreenerError;
use crate::domain::notification::DEFAULT_GROUP;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8000";
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const DEFAULT_MAX_PAGE_SIZE: usize = 500;
pub const DEFAULT_RESET_VALIDITY_HOURS: i64 = 24;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub database_path: String,
    pub pool_size: u32,
    pub listen: SocketAddr,
    pub page_size: usize,
    pub max_page_size: usize,
    pub public_url: String,
    pub reset_token_validity: Duration,
    pub notification_group: String,
    pub channel_capacity: usize,
    pub json_logs: bool,
}

impl ServerSettings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, ScreenerError> {
        let database_path = validate_database_path(config)?;
        let pool_size: u32 = positive_int(config, "database", "pool_size", 4)?;
        let listen = validate_listen(config)?;
        let page_size: usize = positive_int(config, "web", "page_size", DEFAULT_PAGE_SIZE as i64)?;
        let max_page_size: usize =
            positive_int(config, "web", "max_page_size", DEFAULT_MAX_PAGE_SIZE as i64)?;
        if max_page_size < page_size {
            return Err(invalid(
                "web",
                "max_page_size",
                "max_page_size must not be smaller than page_size",
            ));
        }
        let public_url = config
            .get_string("web", "public_url")
            .unwrap_or_else(|| format!("http://{listen}"));
        let validity_hours: i64 = positive_int(
            config,
            "auth",
            "reset_token_validity_hours",
            DEFAULT_RESET_VALIDITY_HOURS,
        )?;
        let reset_token_validity = Duration::try_hours(validity_hours).ok_or_else(|| {
            invalid(
                "auth",
                "reset_token_validity_hours",
                "reset_token_validity_hours is too large",
            )
        })?;
        let notification_group = match config.get_string("notifications", "group") {
            Some(group) if group.trim().is_empty() => {
                return Err(invalid("notifications", "group", "group must not be blank"));
            }
            Some(group) => group.trim().to_string(),
            None => DEFAULT_GROUP.to_string(),
        };
        let channel_capacity: usize = positive_int(
            config,
            "notifications",
            "capacity",
            DEFAULT_CHANNEL_CAPACITY as i64,
        )?;

        Ok(Self {
            database_path,
            pool_size,
            listen,
            page_size,
            max_page_size,
            public_url,
            reset_token_validity,
            notification_group,
            channel_capacity,
            json_logs: config.get_bool("logging", "json", false),
        })
    }
}

fn invalid(section: &str, key: &str, reason: &str) -> ScreenerError {
    ScreenerError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_database_path(config: &dyn ConfigPort) -> Result<String, ScreenerError> {
    match config.get_string("database", "path") {
        Some(path) if !path.trim().is_empty() => Ok(path.trim().to_string()),
        Some(_) => Err(invalid("database", "path", "path must not be blank")),
        None => Err(ScreenerError::ConfigMissing {
            section: "database".to_string(),
            key: "path".to_string(),
        }),
    }
}

fn validate_listen(config: &dyn ConfigPort) -> Result<SocketAddr, ScreenerError> {
    let listen = config
        .get_string("web", "listen")
        .unwrap_or_else(|| DEFAULT_LISTEN.to_string());
    listen
        .trim()
        .parse()
        .map_err(|_| invalid("web", "listen", "listen must be an address like 127.0.0.1:8000"))
}

/// A positive integer setting that fits in `T`.
fn positive_int<T: TryFrom<i64>>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<T, ScreenerError> {
    let value = config.get_int(section, key, default);
    if value <= 0 {
        return Err(invalid(section, key, &format!("{key} must be positive")));
    }
    T::try_from(value).map_err(|_| invalid(section, key, &format!("{key} is too large")))
}
