//! Image decoding and the plain image-load path.

use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use tracing::{debug, trace, warn};

use super::{data_uri, Blob, BoxFuture, ImageDecoder, ImageLoadOptions, ImageLoader};
use crate::error::{FetchError, FetchResult};

/// Orientation and colour-space flags applied while decoding a bitmap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ImageDecodeOptions {
    /// Flip the image vertically.
    pub flip_y: bool,
    /// Leave embedded colour profiles unapplied.
    pub skip_color_space_conversion: bool,
}

/// Decoder built on the `image` crate.
///
/// The `image` crate never applies embedded colour profiles, so
/// `skip_color_space_conversion` is always satisfied.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardImageDecoder;

impl ImageDecoder for StandardImageDecoder {
    fn decode(&self, bytes: &[u8], options: &ImageDecodeOptions) -> image::ImageResult<DynamicImage> {
        let image = image::load_from_memory(bytes)?;
        Ok(if options.flip_y { image.flipv() } else { image })
    }
}

/// Checks whether `decoder` honours orientation options.
///
/// Encodes a 1x2 PNG (red above blue), decodes it with and without `flip_y`
/// and compares the pixels. Any encode or decode failure counts as unsupported.
pub fn probe_decode_options(decoder: &dyn ImageDecoder) -> bool {
    let Some(png) = probe_png() else {
        return false;
    };

    let plain = decoder.decode(&png, &ImageDecodeOptions::default());
    let flipped = decoder.decode(
        &png,
        &ImageDecodeOptions {
            flip_y: true,
            skip_color_space_conversion: true,
        },
    );

    match (plain, flipped) {
        (Ok(plain), Ok(flipped)) => plain.to_rgba8().as_raw() != flipped.to_rgba8().as_raw(),
        _ => false,
    }
}

fn probe_png() -> Option<Vec<u8>> {
    let pixels = RgbaImage::from_fn(1, 2, |_, y| {
        if y == 0 {
            Rgba([255, 0, 0, 255])
        } else {
            Rgba([0, 0, 255, 255])
        }
    });
    let mut png = Vec::new();
    DynamicImage::ImageRgba8(pixels)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .ok()?;
    Some(png)
}

/// Registry of `blob:` URLs pointing at in-memory blobs.
#[derive(Debug, Default)]
pub struct ObjectUrlStore {
    blobs: DashMap<String, Blob>,
    next_id: AtomicU64,
}

impl ObjectUrlStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `blob` and returns its `blob:` URL.
    pub fn create(&self, blob: Blob) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let url = format!("blob:tilefetch/{}", id);
        self.blobs.insert(url.clone(), blob);
        trace!(url = %url, "object url created");
        url
    }

    pub fn get(&self, url: &str) -> Option<Blob> {
        self.blobs.get(url).map(|entry| entry.value().clone())
    }

    /// Releases a URL. Returns false if it was not registered.
    pub fn revoke(&self, url: &str) -> bool {
        let removed = self.blobs.remove(url).is_some();
        if removed {
            trace!(url = %url, "object url revoked");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

/// Object URL that is revoked when dropped, on success and failure paths alike.
pub struct ObjectUrlGuard {
    store: Arc<ObjectUrlStore>,
    url: String,
}

impl ObjectUrlGuard {
    pub fn new(store: Arc<ObjectUrlStore>, blob: Blob) -> Self {
        let url = store.create(blob);
        Self { store, url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for ObjectUrlGuard {
    fn drop(&mut self) {
        self.store.revoke(&self.url);
    }
}

/// Default [`ImageLoader`]: resolves `data:` and `blob:` URLs locally and
/// everything else with a header-less GET.
pub struct HttpImageLoader {
    client: reqwest::Client,
    object_urls: Arc<ObjectUrlStore>,
}

impl HttpImageLoader {
    pub fn new(client: reqwest::Client, object_urls: Arc<ObjectUrlStore>) -> Self {
        Self {
            client,
            object_urls,
        }
    }

    async fn fetch_bytes(&self, url: &str) -> FetchResult<bytes::Bytes> {
        if data_uri::is_data_uri(url) {
            return Ok(data_uri::decode(url)?.bytes);
        }
        if data_uri::is_blob_uri(url) {
            return self
                .object_urls
                .get(url)
                .map(|blob| blob.bytes)
                .ok_or_else(|| FetchError::network(url, "object url has been revoked"));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| {
                warn!(url = url, error = %e, "image request failed");
                FetchError::network(url, e)
            })?;
        let status = response.status();
        if !status.is_success() {
            warn!(url = url, status = status.as_u16(), "image request error status");
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.bytes().await.map_err(|e| FetchError::network(url, e))
    }

    async fn load(
        &self,
        url: String,
        options: ImageLoadOptions,
        decoder: Arc<dyn ImageDecoder>,
    ) -> FetchResult<DynamicImage> {
        let bytes = self.fetch_bytes(&url).await?;
        let image = decoder
            .decode(&bytes, &options.decode)
            .map_err(|e| FetchError::decode(url.as_str(), "image", e))?;
        debug!(
            url = %url,
            width = image.width(),
            height = image.height(),
            "image decoded"
        );
        Ok(image)
    }
}

impl ImageLoader for HttpImageLoader {
    fn load_image(
        &self,
        url: String,
        options: ImageLoadOptions,
        decoder: Arc<dyn ImageDecoder>,
    ) -> BoxFuture<'_, FetchResult<DynamicImage>> {
        Box::pin(self.load(url, options, decoder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    /// Decoder that ignores every option.
    struct NaiveDecoder;

    impl ImageDecoder for NaiveDecoder {
        fn decode(
            &self,
            bytes: &[u8],
            _options: &ImageDecodeOptions,
        ) -> image::ImageResult<DynamicImage> {
            image::load_from_memory(bytes)
        }
    }

    fn png_data_uri() -> String {
        let png = probe_png().unwrap();
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png)
        )
    }

    fn loader(store: Arc<ObjectUrlStore>) -> HttpImageLoader {
        HttpImageLoader::new(reqwest::Client::new(), store)
    }

    #[test]
    fn test_standard_decoder_supports_options() {
        assert!(probe_decode_options(&StandardImageDecoder));
    }

    #[test]
    fn test_decoder_ignoring_flip_is_unsupported() {
        assert!(!probe_decode_options(&NaiveDecoder));
    }

    #[test]
    fn test_flip_y_swaps_rows() {
        let png = probe_png().unwrap();
        let options = ImageDecodeOptions {
            flip_y: true,
            ..Default::default()
        };
        let image = StandardImageDecoder.decode(&png, &options).unwrap().to_rgba8();
        assert_eq!(image.get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_object_url_guard_revokes_on_drop() {
        let store = Arc::new(ObjectUrlStore::new());
        let url = {
            let guard = ObjectUrlGuard::new(store.clone(), Blob::default());
            assert_eq!(store.len(), 1);
            assert!(guard.url().starts_with("blob:"));
            guard.url().to_string()
        };
        assert!(store.is_empty());
        assert!(!store.revoke(&url));
    }

    #[tokio::test]
    async fn test_loads_data_uri_without_network() {
        let image = loader(Arc::new(ObjectUrlStore::new()))
            .load_image(png_data_uri(), ImageLoadOptions::default(), Arc::new(StandardImageDecoder))
            .await
            .unwrap();
        assert_eq!((image.width(), image.height()), (1, 2));
    }

    #[tokio::test]
    async fn test_uses_supplied_decoder() {
        let options = ImageLoadOptions {
            decode: ImageDecodeOptions {
                flip_y: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let store = Arc::new(ObjectUrlStore::new());

        let flipped = loader(store.clone())
            .load_image(png_data_uri(), options, Arc::new(StandardImageDecoder))
            .await
            .unwrap()
            .to_rgba8();
        assert_eq!(flipped.get_pixel(0, 0), &Rgba([0, 0, 255, 255]));

        let naive = loader(store)
            .load_image(png_data_uri(), options, Arc::new(NaiveDecoder))
            .await
            .unwrap()
            .to_rgba8();
        assert_eq!(naive.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
    }

    #[tokio::test]
    async fn test_loads_registered_blob_url() {
        let store = Arc::new(ObjectUrlStore::new());
        let blob = Blob {
            bytes: probe_png().unwrap().into(),
            mime_type: Some("image/png".to_string()),
        };
        let guard = ObjectUrlGuard::new(store.clone(), blob);

        let image = loader(store.clone())
            .load_image(
                guard.url().to_string(),
                ImageLoadOptions::default(),
                Arc::new(StandardImageDecoder),
            )
            .await
            .unwrap();
        assert_eq!(image.height(), 2);
    }

    #[tokio::test]
    async fn test_garbage_bytes_are_decode_error() {
        let err = loader(Arc::new(ObjectUrlStore::new()))
            .load_image(
                "data:image/png;base64,AAAA".to_string(),
                ImageLoadOptions::default(),
                Arc::new(StandardImageDecoder),
            )
            .await
            .unwrap_err();
        assert!(err.is_decode());
    }
}
