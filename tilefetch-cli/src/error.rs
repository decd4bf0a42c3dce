//! CLI error handling with user-friendly messages.

use std::fmt;
use std::process;

use tilefetch::config::ConfigError;
use tilefetch::provider::ProviderError;
use tilefetch::FetchError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(ConfigError),
    /// Invalid command-line argument
    Argument(String),
    /// The resource could not be fetched
    Fetch(FetchError),
    /// A tile provider gave up
    Provider(ProviderError),
    /// The scheduler never accepted the request
    Throttled(String),
    /// Failed to write output file
    FileWrite { path: String, error: std::io::Error },
    /// Failed to encode an image for output
    ImageWrite { path: String, error: image::ImageError },
}

impl CliError {
    /// Exit the process with an error message and code 1.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::Fetch(FetchError::Status { status: 401 | 403, .. }) = self {
            eprintln!();
            eprintln!("The server refused the request. Check any API key or");
            eprintln!("authorization header passed with -q or -H.");
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Argument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::Fetch(e) => write!(f, "Fetch failed: {}", e),
            CliError::Provider(e) => write!(f, "Tile download failed: {}", e),
            CliError::Throttled(url) => write!(f, "Request to {} was never scheduled", url),
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path, error)
            }
            CliError::ImageWrite { path, error } => {
                write!(f, "Failed to write image '{}': {}", path, error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Fetch(e) => Some(e),
            CliError::Provider(e) => Some(e),
            CliError::FileWrite { error, .. } => Some(error),
            CliError::ImageWrite { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<FetchError> for CliError {
    fn from(e: FetchError) -> Self {
        CliError::Fetch(e)
    }
}

impl From<ProviderError> for CliError {
    fn from(e: ProviderError) -> Self {
        CliError::Provider(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_fetch_error() {
        let err = CliError::from(FetchError::MissingUrl);
        assert_eq!(err.to_string(), "Fetch failed: resource url is required");
    }

    #[test]
    fn test_source_chain() {
        use std::error::Error;
        let err = CliError::from(FetchError::MissingUrl);
        assert!(err.source().is_some());
        assert!(CliError::Argument("x".to_string()).source().is_none());
    }
}
