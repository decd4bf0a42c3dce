//! Tilefetch - resource fetching for tile and imagery providers
//!
//! A [`Resource`] is a URL plus its query parameters, template values,
//! headers, proxy and retry policy. Content verbs (`fetch_text`,
//! `fetch_json`, `fetch_image`, ...) build a [`request::Request`], submit it
//! through a [`scheduler::Scheduler`] that may decline it under load, and ask
//! the resource's retry callback before surfacing a transport failure.
//! Providers escalate per-tile failures through [`TileProviderError`].
//!
//! ```ignore
//! use tilefetch::Resource;
//!
//! let mut resource = Resource::new("https://example.com/{z}/{x}/{y}.json?v=2")?;
//! if let Some(value) = resource.fetch_json().await? {
//!     println!("{value}");
//! }
//! ```

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod config;
pub mod context;
pub mod credit;
pub mod error;
pub mod event;
pub mod logging;
pub mod provider;
pub mod proxy;
pub mod request;
pub mod resource;
pub mod scheduler;
pub mod tile_error;
pub mod transport;

pub use context::FetchContext;
pub use credit::Credit;
pub use error::{FetchError, FetchResult};
pub use event::{Event, ListenerId};
pub use proxy::{DefaultProxy, Proxy};
pub use resource::{
    DerivedResourceOptions, FetchOptions, ImageFetchOptions, Resource, ResourceOptions,
    RetryCallback,
};
pub use tile_error::{TileFailure, TileProviderError};
