//! INI file configuration adapter.

use std::path::Path;

use configparser::ini::Ini;

use crate::domain::error::ScreenerError;
use crate::ports::config_port::ConfigPort;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScreenerError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| ScreenerError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, ScreenerError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| ScreenerError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_deref()
            .and_then(Self::parse_bool)
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config_validation::ServerSettings;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL: &str = r#"
[database]
path = /var/lib/screener/screener.db
pool_size = 8

[web]
listen = 0.0.0.0:8080
page_size = 25
public_url = https://screener.example.com

[auth]
reset_token_validity_hours = 2

[notifications]
group = ema_record_updates
capacity = 64

[logging]
json = yes
"#;

    #[test]
    fn from_string_parses_sections() {
        let adapter = FileConfigAdapter::from_string(FULL).unwrap();
        assert_eq!(
            adapter.get_string("database", "path"),
            Some("/var/lib/screener/screener.db".to_string())
        );
        assert_eq!(adapter.get_int("database", "pool_size", 0), 8);
        assert!(adapter.get_bool("logging", "json", false));
    }

    #[test]
    fn missing_keys_fall_back() {
        let adapter = FileConfigAdapter::from_string("[web]\npage_size = many\n").unwrap();
        assert_eq!(adapter.get_string("web", "listen"), None);
        assert_eq!(adapter.get_string("nowhere", "key"), None);
        assert_eq!(adapter.get_int("web", "page_size", 50), 50);
        assert_eq!(adapter.get_double("web", "ratio", 0.5), 0.5);
        assert!(adapter.get_bool("logging", "json", true));
    }

    #[test]
    fn bool_spellings() {
        let adapter =
            FileConfigAdapter::from_string("[x]\na = On\nb = no\nc = 1\nd = maybe\n").unwrap();
        assert!(adapter.get_bool("x", "a", false));
        assert!(!adapter.get_bool("x", "b", true));
        assert!(adapter.get_bool("x", "c", false));
        assert!(!adapter.get_bool("x", "d", false));
    }

    #[test]
    fn full_file_builds_settings() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{FULL}").unwrap();
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        let settings = ServerSettings::from_config(&adapter).unwrap();

        assert_eq!(settings.pool_size, 8);
        assert_eq!(settings.listen.port(), 8080);
        assert_eq!(settings.page_size, 25);
        assert_eq!(settings.public_url, "https://screener.example.com");
        assert_eq!(settings.reset_token_validity, chrono::Duration::hours(2));
        assert_eq!(settings.channel_capacity, 64);
        assert!(settings.json_logs);
    }

    #[test]
    fn missing_file_is_a_parse_error() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/screener.ini");
        assert!(matches!(result, Err(ScreenerError::ConfigParse { .. })));
    }
}
