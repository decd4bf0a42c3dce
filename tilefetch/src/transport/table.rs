//! Swappable strategy table.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::OnceCell;
use tracing::debug;

use super::image_loader::probe_decode_options;
use super::{
    HttpImageLoader, HttpJsonpLoader, HttpLoader, ImageDecoder, ImageLoader, JsonpLoader,
    ObjectUrlStore, ReqwestLoader, StandardImageDecoder,
};

/// One complete set of transport strategies.
#[derive(Clone)]
pub struct Transports {
    pub http: Arc<dyn HttpLoader>,
    pub image: Arc<dyn ImageLoader>,
    pub decoder: Arc<dyn ImageDecoder>,
    pub jsonp: Arc<dyn JsonpLoader>,
}

impl Transports {
    /// Default strategies sharing one reqwest client.
    pub fn standard(client: reqwest::Client, object_urls: Arc<ObjectUrlStore>) -> Self {
        Self {
            http: Arc::new(ReqwestLoader::from_client(client.clone())),
            image: Arc::new(HttpImageLoader::new(client.clone(), object_urls)),
            decoder: Arc::new(StandardImageDecoder),
            jsonp: Arc::new(HttpJsonpLoader::new(client)),
        }
    }
}

/// Active strategies plus the defaults they can be restored to.
///
/// Overrides apply to every resource sharing this table, so tests can swap a
/// loader without touching call sites.
pub struct TransportTable {
    defaults: Transports,
    active: RwLock<Transports>,
    object_urls: Arc<ObjectUrlStore>,
    decode_support: RwLock<Arc<OnceCell<bool>>>,
}

impl TransportTable {
    /// Table of default strategies over `client`.
    pub fn new(client: reqwest::Client) -> Self {
        let object_urls = Arc::new(ObjectUrlStore::new());
        let defaults = Transports::standard(client, object_urls.clone());
        Self::build(defaults, object_urls)
    }

    /// Table whose defaults are the given strategies.
    pub fn from_transports(transports: Transports) -> Self {
        Self::build(transports, Arc::new(ObjectUrlStore::new()))
    }

    fn build(defaults: Transports, object_urls: Arc<ObjectUrlStore>) -> Self {
        Self {
            active: RwLock::new(defaults.clone()),
            defaults,
            object_urls,
            decode_support: RwLock::new(Arc::new(OnceCell::new())),
        }
    }

    pub fn http(&self) -> Arc<dyn HttpLoader> {
        self.active.read().http.clone()
    }

    pub fn image(&self) -> Arc<dyn ImageLoader> {
        self.active.read().image.clone()
    }

    pub fn decoder(&self) -> Arc<dyn ImageDecoder> {
        self.active.read().decoder.clone()
    }

    pub fn jsonp(&self) -> Arc<dyn JsonpLoader> {
        self.active.read().jsonp.clone()
    }

    /// Snapshot of the active strategies.
    pub fn active(&self) -> Transports {
        self.active.read().clone()
    }

    pub fn set_http(&self, loader: Arc<dyn HttpLoader>) {
        self.active.write().http = loader;
    }

    pub fn set_image(&self, loader: Arc<dyn ImageLoader>) {
        self.active.write().image = loader;
    }

    /// Replaces the decoder and forgets the memoized capability probe.
    pub fn set_decoder(&self, decoder: Arc<dyn ImageDecoder>) {
        self.active.write().decoder = decoder;
        self.reset_decode_support();
    }

    pub fn set_jsonp(&self, loader: Arc<dyn JsonpLoader>) {
        self.active.write().jsonp = loader;
    }

    /// Puts every strategy back to its default.
    pub fn restore_defaults(&self) {
        *self.active.write() = self.defaults.clone();
        self.reset_decode_support();
    }

    pub fn object_urls(&self) -> Arc<ObjectUrlStore> {
        self.object_urls.clone()
    }

    /// Whether the active decoder honours decode options.
    ///
    /// Probed once per decoder; concurrent callers share the same probe.
    pub async fn supports_image_decode_options(&self) -> bool {
        let cell = self.decode_support.read().clone();
        let decoder = self.decoder();
        *cell
            .get_or_init(|| async move {
                let supported = probe_decode_options(decoder.as_ref());
                debug!(supported, "image decode options probed");
                supported
            })
            .await
    }

    /// Memoized probe result, or `None` if the probe has not run yet.
    pub fn image_decode_options_support(&self) -> Option<bool> {
        self.decode_support.read().get().copied()
    }

    fn reset_decode_support(&self) {
        *self.decode_support.write() = Arc::new(OnceCell::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ImageDecodeOptions, MockHttpLoader};
    use image::DynamicImage;

    struct FlatDecoder;

    impl ImageDecoder for FlatDecoder {
        fn decode(
            &self,
            bytes: &[u8],
            _options: &ImageDecodeOptions,
        ) -> image::ImageResult<DynamicImage> {
            image::load_from_memory(bytes)
        }
    }

    #[test]
    fn test_override_and_restore() {
        let table = TransportTable::new(reqwest::Client::new());
        let mock = Arc::new(MockHttpLoader::new());
        let default_http = table.http();

        table.set_http(mock.clone());
        assert!(!Arc::ptr_eq(&table.http(), &default_http));

        table.restore_defaults();
        assert!(Arc::ptr_eq(&table.http(), &default_http));
    }

    #[tokio::test]
    async fn test_capability_is_memoized_per_decoder() {
        let table = TransportTable::new(reqwest::Client::new());
        assert_eq!(table.image_decode_options_support(), None);

        assert!(table.supports_image_decode_options().await);
        assert_eq!(table.image_decode_options_support(), Some(true));

        table.set_decoder(Arc::new(FlatDecoder));
        assert_eq!(table.image_decode_options_support(), None);
        assert!(!table.supports_image_decode_options().await);

        table.restore_defaults();
        assert!(table.supports_image_decode_options().await);
    }
}
