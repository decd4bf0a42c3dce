//! Loading and saving `~/.tilefetch/config.ini`.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;

use super::FetchConfig;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read or parse the config file
    #[error("Failed to read config file: {0}")]
    Read(#[from] ini::Error),

    /// Malformed INI text
    #[error("Failed to parse config: {0}")]
    Parse(#[from] ini::ParseError),

    /// Failed to write the config file
    #[error("Failed to write config file: {0}")]
    Write(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// The HTTP client could not be built from the settings
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl FetchConfig {
    /// Loads the default config file, or defaults when it does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Loads `path`, or defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        parse_ini(&ini)
    }

    /// Parses INI text.
    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text)?;
        parse_ini(&ini)
    }

    /// Writes the configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.to_ini().write_to_file(path)?;
        Ok(())
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.with_section(Some("http"))
            .set("timeout", self.http.timeout.as_secs().to_string())
            .set("user_agent", self.http.user_agent.as_str())
            .set(
                "pool_max_idle_per_host",
                self.http.pool_max_idle_per_host.to_string(),
            );
        ini.with_section(Some("scheduler"))
            .set(
                "throttle_requests",
                self.scheduler.throttle_requests.to_string(),
            )
            .set("max_requests", self.scheduler.max_requests.to_string())
            .set(
                "max_requests_per_server",
                self.scheduler.max_requests_per_server.to_string(),
            );
        ini.with_section(Some("retry"))
            .set("attempts", self.retry.attempts.to_string());
        ini.with_section(Some("logging"))
            .set("directory", self.logging.directory.as_str())
            .set("file", self.logging.file.as_str());
        ini
    }
}

fn parse_ini(ini: &Ini) -> Result<FetchConfig, ConfigError> {
    let mut config = FetchConfig::default();

    if let Some(section) = ini.section(Some("http")) {
        if let Some(secs) = parse_value::<u64>(section, "http", "timeout", "must be a positive integer (seconds)")? {
            if secs == 0 {
                return Err(invalid("http", "timeout", "0", "must be a positive integer (seconds)"));
            }
            config.http.timeout = Duration::from_secs(secs);
        }
        if let Some(v) = section.get("user_agent") {
            let v = v.trim();
            if !v.is_empty() {
                config.http.user_agent = v.to_string();
            }
        }
        if let Some(v) = parse_value(section, "http", "pool_max_idle_per_host", "must be a non-negative integer")? {
            config.http.pool_max_idle_per_host = v;
        }
    }

    if let Some(section) = ini.section(Some("scheduler")) {
        if let Some(v) = parse_value(section, "scheduler", "throttle_requests", "must be 'true' or 'false'")? {
            config.scheduler.throttle_requests = v;
        }
        if let Some(v) = parse_value(section, "scheduler", "max_requests", "must be a positive integer")? {
            config.scheduler.max_requests = v;
        }
        if let Some(v) = parse_value(section, "scheduler", "max_requests_per_server", "must be a positive integer")? {
            config.scheduler.max_requests_per_server = v;
        }
    }

    if let Some(section) = ini.section(Some("retry")) {
        if let Some(v) = parse_value(section, "retry", "attempts", "must be a non-negative integer")? {
            config.retry.attempts = v;
        }
    }

    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory").map(str::trim).filter(|v| !v.is_empty()) {
            config.logging.directory = expand_tilde(v);
        }
        if let Some(v) = section.get("file").map(str::trim).filter(|v| !v.is_empty()) {
            config.logging.file = v.to_string();
        }
    }

    Ok(config)
}

fn parse_value<T: FromStr>(
    section: &Properties,
    section_name: &str,
    key: &str,
    reason: &str,
) -> Result<Option<T>, ConfigError> {
    match section.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(section_name, key, raw, reason)),
    }
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn expand_tilde(path: &str) -> String {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest).to_string_lossy().into_owned(),
        _ => path.to_string(),
    }
}

/// Get the path to the config directory (~/.tilefetch).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tilefetch")
}

/// Get the path to the config file (~/.tilefetch/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::DEFAULT_MAX_REQUESTS_PER_SERVER;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = FetchConfig::load_from(&dir.path().join("absent.ini")).unwrap();
        assert_eq!(config, FetchConfig::default());
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = FetchConfig::load_from_str(
            "[scheduler]\nmax_requests = 8\n\n[retry]\nattempts = 3\n",
        )
        .unwrap();

        assert_eq!(config.scheduler.max_requests, 8);
        assert_eq!(
            config.scheduler.max_requests_per_server,
            DEFAULT_MAX_REQUESTS_PER_SERVER
        );
        assert!(config.scheduler.throttle_requests);
        assert_eq!(config.retry.attempts, 3);
        assert_eq!(config.http, super::super::HttpConfig::default());
    }

    #[test]
    fn test_http_section() {
        let config = FetchConfig::load_from_str(
            "[http]\ntimeout = 5\nuser_agent = tilefetch-test\npool_max_idle_per_host = 4\n",
        )
        .unwrap();

        assert_eq!(config.http.timeout, Duration::from_secs(5));
        assert_eq!(config.http.user_agent, "tilefetch-test");
        assert_eq!(config.http.pool_max_idle_per_host, 4);
    }

    #[test]
    fn test_invalid_value_names_section_and_key() {
        let err = FetchConfig::load_from_str("[scheduler]\nthrottle_requests = maybe\n").unwrap_err();
        match err {
            ConfigError::InvalidValue {
                section, key, value, ..
            } => {
                assert_eq!(section, "scheduler");
                assert_eq!(key, "throttle_requests");
                assert_eq!(value, "maybe");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(matches!(
            FetchConfig::load_from_str("[http]\ntimeout = 0\n"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.ini");

        let mut config = FetchConfig::default();
        config.scheduler.throttle_requests = false;
        config.retry.attempts = 2;
        config.logging.file = "custom.log".to_string();
        config.save_to(&path).unwrap();

        assert_eq!(FetchConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_config_file_path() {
        let path = config_file_path();
        assert!(path.ends_with(".tilefetch/config.ini"));
    }
}
