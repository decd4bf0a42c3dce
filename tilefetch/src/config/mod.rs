//! Configuration for the fetch stack.
//!
//! Settings are read from an INI file (default `~/.tilefetch/config.ini`).
//! Every key is optional; anything missing keeps its default.
//!
//! ```ini
//! [http]
//! timeout = 30
//! user_agent = Mozilla/5.0 ...
//! pool_max_idle_per_host = 128
//!
//! [scheduler]
//! throttle_requests = true
//! max_requests = 50
//! max_requests_per_server = 18
//!
//! [retry]
//! attempts = 0
//!
//! [logging]
//! directory = logs
//! file = tilefetch.log
//! ```

mod file;

use std::time::Duration;

use crate::logging::{default_log_dir, default_log_file};
use crate::scheduler::SchedulerConfig;
use crate::transport::DEFAULT_USER_AGENT;

pub use file::{config_directory, config_file_path, ConfigError};

/// Default HTTP timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Default idle connections kept per host.
pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 128;

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchConfig {
    pub http: HttpConfig,
    pub scheduler: SchedulerConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

/// `[http]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
        }
    }
}

/// `[retry]` section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retry budget for resources built from the command line.
    pub attempts: u32,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub directory: String,
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_dir().to_string(),
            file: default_log_file().to_string(),
        }
    }
}
