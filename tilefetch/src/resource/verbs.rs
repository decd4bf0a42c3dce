//! Content verbs.
//!
//! ```text
//! verb -> check_and_reset_request -> bind request function -> scheduler.submit
//!           |                                                   |-- None: Ok(None)
//!           '-- Busy                                            |-- Ok: post-step (decode)
//!                                                               '-- Err: retry_on_error
//!                                                                        |-- true: reset, resubmit
//!                                                                        '-- false: Err
//! ```
//!
//! Decode failures never go through the retry coordinator.

use std::sync::atomic::{AtomicU32, Ordering};

use bytes::Bytes;
use image::DynamicImage;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::options::{FetchOptions, FetchedImage, ImageFetchOptions, ResourceOptions, XmlDocument};
use super::query::query;
use super::Resource;
use crate::error::{FetchError, FetchResult};
use crate::request::{request_function, RequestFunction};
use crate::transport::{
    data_uri, unwrap_jsonp, Blob, Headers, ImageDecodeOptions, ImageLoadOptions, LoadRequest,
    Method, ObjectUrlGuard, Payload, Response, ResponseType,
};

const TEXT_ACCEPT: &str = "text/plain, */*;q=0.01";
const JSON_ACCEPT: &str = "application/json,*/*;q=0.01";
const DEFAULT_JSONP_PARAMETER: &str = "callback";

static JSONP_COUNTER: AtomicU32 = AtomicU32::new(0);

fn response_text(response: Response) -> FetchResult<String> {
    String::from_utf8(response.body.to_vec())
        .map_err(|e| FetchError::decode(response.url.as_str(), "text", e))
}

impl Resource {
    /// Adds a default `Accept` header unless the call or the resource sets one.
    fn with_accept(&self, mut options: FetchOptions, accept: &str) -> FetchOptions {
        let present = options
            .headers
            .keys()
            .chain(self.headers.keys())
            .any(|name| name.eq_ignore_ascii_case("accept"));
        if !present {
            options
                .headers
                .insert("accept".to_string(), accept.to_string());
        }
        options
    }

    /// Fails with [`FetchError::Busy`] while the request is issued or active,
    /// otherwise puts it back to `Unissued`.
    fn check_and_reset_request(&self) -> FetchResult<()> {
        let mut request = self.request.lock();
        if request.state().is_in_flight() {
            return Err(FetchError::Busy { url: self.url() });
        }
        request.reset()
    }

    /// Binds, submits and, on transport failure, retries the request.
    ///
    /// `bind` is called once per attempt with the current URL and the merged
    /// headers, so a retry callback that edits the resource takes effect.
    async fn submit_with_retry<F>(&mut self, call_headers: &Headers, bind: F) -> FetchResult<Option<Payload>>
    where
        F: Fn(String, Headers) -> RequestFunction,
    {
        loop {
            let url = self.url();
            let mut headers = self.headers.clone();
            headers.extend(call_headers.iter().map(|(k, v)| (k.clone(), v.clone())));

            let function = bind(url.clone(), headers);
            {
                let mut request = self.request.lock();
                request.set_url(url.as_str());
                request.set_request_function(function);
            }

            let Some(pending) = self.context.scheduler().submit(&self.request) else {
                debug!(url = %url, "request throttled by scheduler");
                return Ok(None);
            };

            match pending.await {
                Ok(payload) => {
                    self.request.lock().clear_cancel();
                    return Ok(Some(payload));
                }
                Err(error) => {
                    let failed = self.request.lock().state().is_failed();
                    if !failed || error.is_decode() {
                        return Err(error);
                    }
                    if !self.retry_on_error(&error).await {
                        warn!(url = %url, error = %error, "request failed");
                        return Err(error);
                    }
                    debug!(url = %url, attempt = self.retry_count, "retrying request");
                    self.request.lock().reset()?;
                }
            }
        }
    }

    async fn make_request(
        &mut self,
        method: Method,
        data: Option<Bytes>,
        options: FetchOptions,
    ) -> FetchResult<Option<Response>> {
        self.check_and_reset_request()?;

        let transports = self.context.transports().clone();
        let response_type = options.response_type;
        let override_mime_type = options.override_mime_type.clone();

        let payload = self
            .submit_with_retry(&options.headers, move |url, headers| {
                let transports = transports.clone();
                let request = LoadRequest {
                    url,
                    response_type,
                    method,
                    data: data.clone(),
                    headers,
                    override_mime_type: override_mime_type.clone(),
                };
                request_function(move || {
                    let request = request.clone();
                    let http = transports.http();
                    async move {
                        if data_uri::is_data_uri(&request.url) {
                            return data_uri::decode_response(&request.url).map(Payload::Response);
                        }
                        http.load(request).await.map(Payload::Response)
                    }
                })
            })
            .await?;

        match payload {
            Some(payload) => payload.into_response(&self.url).map(Some),
            None => Ok(None),
        }
    }

    /// GET with the given response type and extra headers.
    pub async fn fetch(&mut self, options: FetchOptions) -> FetchResult<Option<Response>> {
        self.make_request(Method::Get, None, options).await
    }

    pub async fn fetch_array_buffer(&mut self) -> FetchResult<Option<Bytes>> {
        let response = self
            .fetch(FetchOptions::response_type(ResponseType::ArrayBuffer))
            .await?;
        Ok(response.map(|response| response.body))
    }

    pub async fn fetch_blob(&mut self) -> FetchResult<Option<Blob>> {
        let response = self
            .fetch(FetchOptions::response_type(ResponseType::Blob))
            .await?;
        Ok(response.map(|response| Blob {
            mime_type: response.mime_type().map(str::to_string),
            bytes: response.body,
        }))
    }

    /// Body as UTF-8 text.
    pub async fn fetch_text(&mut self) -> FetchResult<Option<String>> {
        let options = self.with_accept(FetchOptions::response_type(ResponseType::Text), TEXT_ACCEPT);
        match self.fetch(options).await? {
            Some(response) => response_text(response).map(Some),
            None => Ok(None),
        }
    }

    /// Body parsed as JSON. An empty body yields `Value::Null`.
    pub async fn fetch_json(&mut self) -> FetchResult<Option<serde_json::Value>> {
        let options = self.with_accept(FetchOptions::response_type(ResponseType::Text), JSON_ACCEPT);
        let Some(response) = self.fetch(options).await? else {
            return Ok(None);
        };
        let url = response.url.clone();
        let text = response_text(response)?;
        if text.trim().is_empty() {
            return Ok(Some(serde_json::Value::Null));
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| FetchError::decode(url, "json", e))
    }

    /// Body deserialized into `T`.
    pub async fn fetch_json_as<T: DeserializeOwned>(&mut self) -> FetchResult<Option<T>> {
        let Some(value) = self.fetch_json().await? else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| FetchError::decode(self.url(), "json", e))
    }

    /// Body parsed as XML.
    pub async fn fetch_xml(&mut self) -> FetchResult<Option<XmlDocument>> {
        let options = FetchOptions {
            response_type: ResponseType::Document,
            override_mime_type: Some("text/xml".to_string()),
            ..FetchOptions::default()
        };
        let Some(response) = self.fetch(options).await? else {
            return Ok(None);
        };
        let url = response.url.clone();
        let text = response_text(response)?;
        XmlDocument::parse(text)
            .map(Some)
            .map_err(|e| FetchError::decode(url, "xml", e))
    }

    pub async fn post(
        &mut self,
        data: impl Into<Bytes>,
        options: FetchOptions,
    ) -> FetchResult<Option<Response>> {
        self.make_request(Method::Post, Some(data.into()), options).await
    }

    pub async fn put(
        &mut self,
        data: impl Into<Bytes>,
        options: FetchOptions,
    ) -> FetchResult<Option<Response>> {
        self.make_request(Method::Put, Some(data.into()), options).await
    }

    pub async fn patch(
        &mut self,
        data: impl Into<Bytes>,
        options: FetchOptions,
    ) -> FetchResult<Option<Response>> {
        self.make_request(Method::Patch, Some(data.into()), options).await
    }

    pub async fn delete(&mut self, options: FetchOptions) -> FetchResult<Option<Response>> {
        self.make_request(Method::Delete, None, options).await
    }

    /// Response headers of a HEAD request.
    pub async fn head(&mut self, options: FetchOptions) -> FetchResult<Option<Headers>> {
        let response = self.make_request(Method::Head, None, options).await?;
        Ok(response.map(|response| response.headers))
    }

    /// Response headers of an OPTIONS request.
    pub async fn options(&mut self, options: FetchOptions) -> FetchResult<Option<Headers>> {
        let response = self.make_request(Method::Options, None, options).await?;
        Ok(response.map(|response| response.headers))
    }

    /// Loads a JSONP endpoint.
    ///
    /// Adds `<callback_parameter_name>=<generated name>` to this resource's
    /// query parameters (default parameter name `callback`) and resolves with
    /// the argument the script passes to that function.
    pub async fn fetch_jsonp(
        &mut self,
        callback_parameter_name: Option<&str>,
    ) -> FetchResult<Option<serde_json::Value>> {
        self.check_and_reset_request()?;

        let function_name = format!(
            "loadJsonp{:06}",
            JSONP_COUNTER.fetch_add(1, Ordering::Relaxed) % 1_000_000
        );
        let parameter = callback_parameter_name.unwrap_or(DEFAULT_JSONP_PARAMETER);
        self.set_query_parameters(query([(parameter, function_name.as_str())]), false);

        let transports = self.context.transports().clone();
        let payload = self
            .submit_with_retry(&Headers::new(), move |url, _| {
                let transports = transports.clone();
                let function_name = function_name.clone();
                request_function(move || {
                    let url = url.clone();
                    let function_name = function_name.clone();
                    let jsonp = transports.jsonp();
                    async move {
                        if data_uri::is_data_uri(&url) {
                            let blob = data_uri::decode(&url)?;
                            let script = String::from_utf8_lossy(&blob.bytes);
                            return unwrap_jsonp(&url, &script, &function_name).map(Payload::Json);
                        }
                        jsonp
                            .load_and_execute_script(url, function_name)
                            .await
                            .map(Payload::Json)
                    }
                })
            })
            .await?;

        match payload {
            Some(payload) => payload.into_json(&self.url).map(Some),
            None => Ok(None),
        }
    }

    /// Loads and decodes an image.
    ///
    /// The plain image path (no custom headers) is used when the HTTP loader
    /// cannot return blobs, the URL is `data:`/`blob:`, or no headers are
    /// needed and `prefer_blob` is off. Otherwise the bytes are fetched as a
    /// blob and either decoded directly (decoder honours decode options and
    /// `prefer_image_bitmap` is set) or loaded through a temporary object URL
    /// that is revoked whether the load succeeds or not.
    pub async fn fetch_image(
        &mut self,
        options: ImageFetchOptions,
    ) -> FetchResult<Option<FetchedImage>> {
        self.check_and_reset_request()?;

        let transports = self.context.transports().clone();
        let decode = ImageDecodeOptions {
            flip_y: options.flip_y,
            skip_color_space_conversion: options.skip_color_space_conversion,
        };

        let plain = !transports.http().supports_blob()
            || self.is_data_uri()
            || self.is_blob_uri()
            || (!self.has_headers() && !options.prefer_blob);
        if plain {
            let image = self
                .fetch_image_element(decode, options.prefer_image_bitmap)
                .await?;
            return Ok(image.map(|image| FetchedImage { image, blob: None }));
        }

        let Some(blob) = self.fetch_blob().await? else {
            return Ok(None);
        };

        if options.prefer_image_bitmap && transports.supports_image_decode_options().await {
            let image = transports
                .decoder()
                .decode(&blob.bytes, &decode)
                .map_err(|e| FetchError::decode(self.url(), "image", e))?;
            return Ok(Some(FetchedImage {
                image,
                blob: Some(blob),
            }));
        }

        let object_url = ObjectUrlGuard::new(transports.object_urls(), blob.clone());
        let mut generated = Resource::from_options(ResourceOptions {
            context: Some(self.context.clone()),
            ..ResourceOptions::new(object_url.url())
        })?;
        let image = generated
            .fetch_image_element(decode, false)
            .await
            .map_err(|error| match error {
                FetchError::Decode { format, reason, .. } => FetchError::Decode {
                    url: self.url(),
                    format,
                    reason,
                },
                other => other,
            });
        drop(object_url);
        let image = image?;

        Ok(image.map(|image| FetchedImage {
            image,
            blob: Some(blob),
        }))
    }

    async fn fetch_image_element(
        &mut self,
        decode: ImageDecodeOptions,
        prefer_image_bitmap: bool,
    ) -> FetchResult<Option<DynamicImage>> {
        self.check_and_reset_request()?;

        let transports = self.context.transports().clone();
        let payload = self
            .submit_with_retry(&Headers::new(), move |url, _| {
                let transports = transports.clone();
                let options = ImageLoadOptions {
                    cross_origin: !(data_uri::is_data_uri(&url) || data_uri::is_blob_uri(&url)),
                    decode,
                    prefer_image_bitmap,
                };
                request_function(move || {
                    let url = url.clone();
                    let loader = transports.image();
                    let decoder = transports.decoder();
                    async move {
                        loader
                            .load_image(url, options, decoder)
                            .await
                            .map(Payload::Image)
                    }
                })
            })
            .await?;

        match payload {
            Some(payload) => payload.into_image(&self.url).map(Some),
            None => Ok(None),
        }
    }
}
