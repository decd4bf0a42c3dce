//! URL-template tile provider.
//!
//! # URL tokens
//!
//! - `{x}`, `{y}`, `{z}`: tile column, row and zoom level
//! - `{s}`: one of the configured subdomains, rotated by tile
//! - `{reverseY}`: row counted from the bottom (TMS layout)

use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::{backoff, ProviderError, TileProvider};
use crate::context::FetchContext;
use crate::credit::Credit;
use crate::error::FetchResult;
use crate::event::Event;
use crate::request::{Request, RequestType};
use crate::resource::{
    DerivedResourceOptions, QueryParameters, QueryValue, Resource, ResourceOptions, TemplateValues,
};
use crate::tile_error::{TileFailure, TileProviderError};

/// ArcGIS World Imagery tile template.
pub const ARCGIS_WORLD_IMAGERY_URL: &str =
    "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}";

/// Google legacy satellite tile template.
pub const GOOGLE_LEGACY_URL: &str = "https://mt{s}.google.com/vt?lyrs=s&x={x}&y={y}&z={z}";

/// Base pause after the scheduler declines a tile request.
pub const DEFAULT_THROTTLE_BACKOFF: Duration = Duration::from_millis(20);

/// Declined submissions tolerated for one tile before giving up.
pub const DEFAULT_MAX_THROTTLE_WAITS: u32 = 200;

type TileKey = (u32, u32, u32);

/// Tile provider driven by a URL template.
///
/// Each tile gets its own derived resource with a fresh request, so tiles
/// never contend for the same request slot. Failure records are kept per tile
/// and threaded through [`TileProviderError::report_error`] across calls.
pub struct TemplateTileProvider {
    name: String,
    resource: Resource,
    subdomains: Vec<String>,
    min_level: u32,
    max_level: u32,
    throttle_backoff: Duration,
    max_throttle_waits: u32,
    error_event: Event<TileProviderError>,
    errors: DashMap<TileKey, TileProviderError>,
}

impl std::fmt::Debug for TemplateTileProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateTileProvider")
            .field("name", &self.name)
            .field("url", &self.resource.raw_url())
            .field("levels", &(self.min_level..=self.max_level))
            .finish_non_exhaustive()
    }
}

impl TemplateTileProvider {
    /// Creates a provider over `resource`, whose URL holds the tile tokens.
    ///
    /// The resource's request is replaced by a throttled imagery request.
    pub fn new(name: impl Into<String>, mut resource: Resource) -> Self {
        resource.set_request(
            Request::new()
                .with_throttle(true)
                .with_throttle_by_server(true)
                .with_type(RequestType::Imagery)
                .shared(),
        );
        Self {
            name: name.into(),
            resource,
            subdomains: Vec::new(),
            min_level: 0,
            max_level: 19,
            throttle_backoff: DEFAULT_THROTTLE_BACKOFF,
            max_throttle_waits: DEFAULT_MAX_THROTTLE_WAITS,
            error_event: Event::new(),
            errors: DashMap::new(),
        }
    }

    /// Esri's World Imagery basemap, levels 0 to 19.
    pub fn arcgis_world_imagery(context: FetchContext) -> FetchResult<Self> {
        let mut resource = Resource::from_options(ResourceOptions {
            context: Some(context),
            ..ResourceOptions::new(ARCGIS_WORLD_IMAGERY_URL)
        })?;
        resource.add_credit(Credit::new("Esri, Maxar, Earthstar Geographics").on_screen());
        Ok(Self::new("ArcGIS", resource).levels(0, 19))
    }

    /// Google's legacy satellite tiles, levels 0 to 22, across `mt0`..`mt3`.
    ///
    /// `api_key` is sent as the `key` query parameter when given.
    pub fn google_legacy(context: FetchContext, api_key: Option<&str>) -> FetchResult<Self> {
        let mut resource = Resource::from_options(ResourceOptions {
            context: Some(context),
            ..ResourceOptions::new(GOOGLE_LEGACY_URL)
        })?;
        if let Some(key) = api_key {
            let mut parameters = QueryParameters::new();
            parameters.insert("key".to_string(), QueryValue::from(key));
            resource.set_query_parameters(parameters, false);
        }
        resource.add_credit(Credit::new("Google").on_screen());
        Ok(Self::new("Google", resource)
            .levels(0, 22)
            .subdomains(["0", "1", "2", "3"]))
    }

    pub fn levels(mut self, min_level: u32, max_level: u32) -> Self {
        self.min_level = min_level;
        self.max_level = max_level;
        self
    }

    pub fn subdomains<I, S>(mut self, subdomains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subdomains = subdomains.into_iter().map(Into::into).collect();
        self
    }

    /// How long to back off when throttled, and how many times before giving up.
    pub fn throttle_backoff(mut self, base: Duration, max_waits: u32) -> Self {
        self.throttle_backoff = base;
        self.max_throttle_waits = max_waits;
        self
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn credits(&self) -> &[Credit] {
        self.resource.credits()
    }

    /// Current failure record for a tile, if it has ever failed.
    pub fn tile_error(&self, x: u32, y: u32, level: u32) -> Option<TileProviderError> {
        self.errors.get(&(x, y, level)).map(|r| r.clone())
    }

    /// Derived resource for one tile with the URL tokens filled in.
    pub fn tile_resource(&self, x: u32, y: u32, level: u32) -> Resource {
        let mut values = TemplateValues::new();
        values.insert("x".to_string(), x.to_string());
        values.insert("y".to_string(), y.to_string());
        values.insert("z".to_string(), level.to_string());
        values.insert("reverseY".to_string(), reverse_y(y, level).to_string());
        if !self.subdomains.is_empty() {
            let index = (x as usize + y as usize + level as usize) % self.subdomains.len();
            values.insert("s".to_string(), self.subdomains[index].clone());
        }

        let resource = self.resource.get_derived_resource(DerivedResourceOptions {
            template_values: Some(values),
            ..DerivedResourceOptions::default()
        });
        trace!(provider = %self.name, url = %resource.url(), "tile resource");
        resource
    }

    fn report_failure(&self, key: TileKey, failure: TileFailure) -> TileProviderError {
        let previous = self.errors.remove(&key).map(|(_, record)| record);
        let record = TileProviderError::report_error(previous, Some(&self.error_event), failure);
        self.errors.insert(key, record.clone());
        record
    }

    fn report_success(&self, key: TileKey) {
        if let Some(mut record) = self.errors.get_mut(&key) {
            TileProviderError::report_success(Some(&mut *record));
        }
    }
}

impl TileProvider for TemplateTileProvider {
    async fn load_tile(&self, x: u32, y: u32, level: u32) -> Result<Bytes, ProviderError> {
        if !self.supports_level(level) {
            return Err(ProviderError::UnsupportedZoom(level));
        }

        let key = (x, y, level);
        let mut waits = 0;
        loop {
            let mut resource = self.tile_resource(x, y, level);
            match resource.fetch_array_buffer().await {
                Ok(Some(bytes)) => {
                    self.report_success(key);
                    return Ok(bytes);
                }
                Ok(None) => {
                    waits += 1;
                    if waits > self.max_throttle_waits {
                        return Err(ProviderError::Throttled { x, y, level, waits });
                    }
                    tokio::time::sleep(backoff(self.throttle_backoff, waits)).await;
                }
                Err(e) => {
                    let failure = TileFailure::new(format!(
                        "Failed to obtain image tile X: {x} Y: {y} Level: {level}."
                    ))
                    .provider(self.name.as_str())
                    .tile(x, y, level)
                    .error(e);
                    let record = self.report_failure(key, failure);
                    if !record.retry {
                        return Err(ProviderError::Tile(record));
                    }
                    debug!(
                        provider = %self.name,
                        x, y, level,
                        times_retried = record.times_retried,
                        "retrying tile"
                    );
                }
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn min_level(&self) -> u32 {
        self.min_level
    }

    fn max_level(&self) -> u32 {
        self.max_level
    }

    fn error_event(&self) -> &Event<TileProviderError> {
        &self.error_event
    }
}

fn reverse_y(y: u32, level: u32) -> u32 {
    let rows = 1u64 << level.min(32);
    (rows - 1).saturating_sub(u64::from(y)) as u32
}
