//! Configuration management CLI commands.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use tilefetch::config::{config_file_path, FetchConfig};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Print the effective configuration
    Show,

    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, config_path: Option<PathBuf>) -> Result<(), CliError> {
    let path = config_path.unwrap_or_else(config_file_path);
    match command {
        ConfigCommands::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommands::Show => run_show(&path),
        ConfigCommands::Init { force } => run_init(&path, force),
    }
}

fn run_show(path: &Path) -> Result<(), CliError> {
    let config = FetchConfig::load_from(path)?;

    println!("[http]");
    println!("timeout = {}", config.http.timeout.as_secs());
    println!("user_agent = {}", config.http.user_agent);
    println!("pool_max_idle_per_host = {}", config.http.pool_max_idle_per_host);
    println!();
    println!("[scheduler]");
    println!("throttle_requests = {}", config.scheduler.throttle_requests);
    println!("max_requests = {}", config.scheduler.max_requests);
    println!(
        "max_requests_per_server = {}",
        config.scheduler.max_requests_per_server
    );
    println!();
    println!("[retry]");
    println!("attempts = {}", config.retry.attempts);
    println!();
    println!("[logging]");
    println!("directory = {}", config.logging.directory);
    println!("file = {}", config.logging.file);
    Ok(())
}

fn run_init(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        println!("Config file already exists: {}", path.display());
        println!("Use --force to overwrite it.");
        return Ok(());
    }
    FetchConfig::default().save_to(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_defaults_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");

        run_init(&path, false).unwrap();
        assert_eq!(FetchConfig::load_from(&path).unwrap(), FetchConfig::default());

        std::fs::write(&path, "[retry]\nattempts = 4\n").unwrap();
        run_init(&path, false).unwrap();
        assert_eq!(FetchConfig::load_from(&path).unwrap().retry.attempts, 4);

        run_init(&path, true).unwrap();
        assert_eq!(FetchConfig::load_from(&path).unwrap().retry.attempts, 0);
    }
}
