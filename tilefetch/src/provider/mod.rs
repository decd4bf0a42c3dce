//! Tile providers built on [`Resource`](crate::resource::Resource).
//!
//! A provider turns tile coordinates into a derived resource, fetches it
//! through the scheduler, and escalates failures through a
//! [`TileProviderError`] record that listeners can answer with a retry.
//!
//! ```ignore
//! use tilefetch::provider::{TemplateTileProvider, TileProvider};
//! use tilefetch::FetchContext;
//!
//! let provider = TemplateTileProvider::arcgis_world_imagery(FetchContext::global().clone())?;
//! provider.error_event().add_event_listener(|e| e.retry = e.times_retried < 3);
//! let bytes = provider.load_tile(4, 5, 4).await?;
//! ```

mod template;

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use crate::event::Event;
use crate::tile_error::TileProviderError;

pub use template::{
    TemplateTileProvider, ARCGIS_WORLD_IMAGERY_URL, DEFAULT_MAX_THROTTLE_WAITS,
    DEFAULT_THROTTLE_BACKOFF, GOOGLE_LEGACY_URL,
};

/// Errors from provider operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// Zoom level outside the provider's range
    #[error("Zoom level {0} not supported by provider")]
    UnsupportedZoom(u32),

    /// The scheduler kept declining the request
    #[error("Tile {x},{y} at level {level} was throttled {waits} times")]
    Throttled { x: u32, y: u32, level: u32, waits: u32 },

    /// The tile failed and no listener asked for another attempt
    #[error("{0}")]
    Tile(TileProviderError),
}

/// A source of imagery tiles addressed by `x`, `y` and zoom level.
pub trait TileProvider: Send + Sync {
    /// Fetches the raw bytes of one tile.
    fn load_tile(
        &self,
        x: u32,
        y: u32,
        level: u32,
    ) -> impl Future<Output = Result<Bytes, ProviderError>> + Send;

    /// Returns the provider's name for logging and identification.
    fn name(&self) -> &str;

    fn min_level(&self) -> u32;

    fn max_level(&self) -> u32;

    /// Raised with the failure record each time a tile fails.
    fn error_event(&self) -> &Event<TileProviderError>;

    /// Checks if this provider supports the given zoom level.
    fn supports_level(&self, level: u32) -> bool {
        level >= self.min_level() && level <= self.max_level()
    }
}

/// Pause between attempts when the scheduler declines a request.
pub(crate) fn backoff(base: Duration, waits: u32) -> Duration {
    base.saturating_mul(waits.min(8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_then_caps() {
        let base = Duration::from_millis(10);
        assert_eq!(backoff(base, 1), Duration::from_millis(10));
        assert_eq!(backoff(base, 3), Duration::from_millis(30));
        assert_eq!(backoff(base, 100), Duration::from_millis(80));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            ProviderError::UnsupportedZoom(25).to_string(),
            "Zoom level 25 not supported by provider"
        );
    }
}
