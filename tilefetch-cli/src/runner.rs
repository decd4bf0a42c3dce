//! CLI runner for common setup.
//!
//! Loads the configuration, initializes logging and builds the fetch context
//! shared by the command handlers.

use std::path::Path;

use tilefetch::config::FetchConfig;
use tilefetch::logging::{init_logging, LoggingGuard};
use tilefetch::FetchContext;
use tracing::info;

use crate::error::CliError;

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Keeps logging active while the runner exists
    _logging_guard: LoggingGuard,
    config: FetchConfig,
    context: FetchContext,
}

impl CliRunner {
    /// Loads `config_path` (or the default config file) and sets everything up.
    pub fn new(config_path: Option<&Path>) -> Result<Self, CliError> {
        let config = match config_path {
            Some(path) => FetchConfig::load_from(path)?,
            None => FetchConfig::load()?,
        };

        let logging_guard = init_logging(&config.logging.directory, &config.logging.file)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;
        let context = FetchContext::from_config(&config)?;

        Ok(Self {
            _logging_guard: logging_guard,
            config,
            context,
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn context(&self) -> &FetchContext {
        &self.context
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("Tilefetch v{}", tilefetch::VERSION);
        info!("Tilefetch CLI: {} command", command);
    }
}
