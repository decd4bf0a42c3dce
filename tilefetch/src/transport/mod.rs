//! Pluggable transport primitives.
//!
//! Every content verb on a [`Resource`](crate::resource::Resource) bottoms out in one
//! of four strategies:
//!
//! - [`HttpLoader`]: binary/text request with method, body and headers
//! - [`ImageLoader`]: plain image load (no custom headers)
//! - [`ImageDecoder`]: bitmap decode with orientation/colour-space options
//! - [`JsonpLoader`]: script-style load that resolves to the callback argument
//!
//! The strategies live in a [`TransportTable`], which can swap any of them for
//! testing and put the defaults back with [`TransportTable::restore_defaults`].
//!
//! `data:` URIs are a virtual transport: they are decoded locally and never
//! reach the network.

pub mod data_uri;
mod http;
mod image_loader;
mod jsonp;
mod table;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use image::DynamicImage;
use bytes::Bytes;

use crate::error::{FetchError, FetchResult};
use crate::request::Completion;

pub use image_loader::{
    probe_decode_options, HttpImageLoader, ImageDecodeOptions, ObjectUrlGuard, ObjectUrlStore,
    StandardImageDecoder,
};
pub(crate) use http::build_client;
pub use http::{ReqwestLoader, DEFAULT_USER_AGENT};
pub use jsonp::{unwrap_jsonp, HttpJsonpLoader};
pub use table::{TransportTable, Transports};

#[cfg(test)]
pub use http::tests::MockHttpLoader;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Header map with lower-cased names.
pub type Headers = BTreeMap<String, String>;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// HEAD and OPTIONS resolve to response headers rather than a body.
    pub fn resolves_headers(&self) -> bool {
        matches!(self, Self::Head | Self::Options)
    }
}

/// How the caller intends to interpret the response body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ResponseType {
    #[default]
    Text,
    ArrayBuffer,
    Blob,
    Json,
    Document,
}

/// Everything a loader needs to perform one HTTP attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadRequest {
    pub url: String,
    pub response_type: ResponseType,
    pub method: Method,
    pub data: Option<Bytes>,
    pub headers: Headers,
    pub override_mime_type: Option<String>,
}

/// Raw HTTP response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub url: String,
    pub status: u16,
    pub headers: Headers,
    pub body: Bytes,
}

impl Response {
    /// Value of the `content-type` header without parameters.
    pub fn mime_type(&self) -> Option<&str> {
        self.headers
            .get("content-type")
            .map(|value| value.split(';').next().unwrap_or(value).trim())
    }
}

/// Bytes plus their MIME type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Blob {
    pub bytes: Bytes,
    pub mime_type: Option<String>,
}

/// What a request function produces.
#[derive(Debug)]
pub enum Payload {
    Response(Response),
    Image(DynamicImage),
    Json(serde_json::Value),
}

impl Payload {
    pub(crate) fn completion(&self) -> Completion {
        match self {
            Self::Response(response) => Completion {
                status: Some(response.status),
                bytes: response.body.len(),
            },
            Self::Image(_) | Self::Json(_) => Completion::default(),
        }
    }

    pub(crate) fn into_response(self, url: &str) -> FetchResult<Response> {
        match self {
            Self::Response(response) => Ok(response),
            _ => Err(FetchError::decode(url, "response", "transport produced a non-http payload")),
        }
    }

    pub(crate) fn into_image(self, url: &str) -> FetchResult<DynamicImage> {
        match self {
            Self::Image(image) => Ok(image),
            _ => Err(FetchError::decode(url, "image", "transport produced a non-image payload")),
        }
    }

    pub(crate) fn into_json(self, url: &str) -> FetchResult<serde_json::Value> {
        match self {
            Self::Json(value) => Ok(value),
            _ => Err(FetchError::decode(url, "jsonp", "transport produced a non-json payload")),
        }
    }
}

/// Options for the plain image-load path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageLoadOptions {
    pub cross_origin: bool,
    pub decode: ImageDecodeOptions,
    pub prefer_image_bitmap: bool,
}

/// Binary/text loader.
pub trait HttpLoader: Send + Sync {
    /// Performs one HTTP attempt.
    ///
    /// Non-2xx statuses resolve to [`FetchError::Status`]; connection, timeout and
    /// body errors to [`FetchError::Network`].
    fn load(&self, request: LoadRequest) -> BoxFuture<'_, FetchResult<Response>>;

    /// Whether the loader can hand back raw blobs.
    fn supports_blob(&self) -> bool {
        true
    }
}

/// Plain image loader. It cannot carry custom headers.
///
/// `decoder` is the table's active decoder at the time of the load.
pub trait ImageLoader: Send + Sync {
    fn load_image(
        &self,
        url: String,
        options: ImageLoadOptions,
        decoder: Arc<dyn ImageDecoder>,
    ) -> BoxFuture<'_, FetchResult<DynamicImage>>;
}

/// Bitmap decoder honouring orientation options.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8], options: &ImageDecodeOptions) -> image::ImageResult<DynamicImage>;
}

/// Script-injection style loader for JSONP endpoints.
pub trait JsonpLoader: Send + Sync {
    /// Loads `url` and resolves with the argument passed to `function_name`.
    fn load_and_execute_script(
        &self,
        url: String,
        function_name: String,
    ) -> BoxFuture<'_, FetchResult<serde_json::Value>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_resolves_headers() {
        assert!(Method::Head.resolves_headers());
        assert!(Method::Options.resolves_headers());
        assert!(!Method::Get.resolves_headers());
        assert_eq!(Method::Patch.as_str(), "PATCH");
    }

    #[test]
    fn test_response_mime_type_strips_parameters() {
        let mut response = Response::default();
        response.headers.insert(
            "content-type".to_string(),
            "application/json; charset=utf-8".to_string(),
        );
        assert_eq!(response.mime_type(), Some("application/json"));
    }

    #[test]
    fn test_payload_conversion_mismatch_is_decode_error() {
        let payload = Payload::Json(serde_json::json!({"a": 1}));
        let err = payload.into_response("http://x").unwrap_err();
        assert!(err.is_decode());
    }
}
