//! Fetchable locations.
//!
//! A [`Resource`] is a URL plus everything that shapes requests to it: query
//! parameters, `{key}` template values, headers, an optional proxy, a retry
//! policy and attribution. The URL is stored without its query or fragment;
//! [`Resource::url`] rebuilds the full URL on demand.
//!
//! Every content verb funnels through one request/submit/retry pipeline (see
//! `verbs.rs`). Precondition failures such as a resource that is already
//! being fetched are reported before any transport work starts.

mod options;
mod query;
mod retry;
mod uri;
mod verbs;

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::context::FetchContext;
use crate::credit::Credit;
use crate::error::{FetchError, FetchResult};
use crate::proxy::Proxy;
use crate::request::{Request, SharedRequest};
use crate::transport::{data_uri, Headers};

pub use options::{
    DerivedResourceOptions, FetchOptions, FetchedImage, ImageFetchOptions, ResourceOptions,
    TemplateValues, XmlDocument,
};
pub use query::{
    combine_query_parameters, encode_uri_component, parse_query_string, query, stringify_query,
    QueryParameters, QueryValue,
};
pub use retry::RetryCallback;
pub use uri::{has_scheme, resolve_relative, split_url};

/// A URL and its request-shaping parameters.
pub struct Resource {
    url: String,
    query_parameters: QueryParameters,
    template_values: TemplateValues,
    headers: Headers,
    proxy: Option<Arc<dyn Proxy>>,
    retry_callback: Option<Arc<dyn RetryCallback>>,
    retry_attempts: u32,
    retry_count: u32,
    request: SharedRequest,
    credits: Vec<Credit>,
    context: FetchContext,
}

impl Resource {
    /// Creates a resource for `url` with default options.
    pub fn new(url: impl Into<String>) -> FetchResult<Self> {
        Self::from_options(ResourceOptions::new(url))
    }

    /// Creates a resource from options. Fails with [`FetchError::MissingUrl`]
    /// when no URL is given.
    pub fn from_options(options: ResourceOptions) -> FetchResult<Self> {
        let url = match options.url {
            Some(url) if !url.is_empty() => url,
            _ => return Err(FetchError::MissingUrl),
        };

        let mut resource = Self {
            url: String::new(),
            query_parameters: options.query_parameters,
            template_values: options.template_values,
            headers: options.headers,
            proxy: options.proxy,
            retry_callback: options.retry_callback,
            retry_attempts: options.retry_attempts,
            retry_count: 0,
            request: options.request.unwrap_or_else(|| Request::new().shared()),
            credits: options.credits,
            context: options
                .context
                .unwrap_or_else(|| FetchContext::global().clone()),
        };

        if options.parse_url {
            resource.parse_url(&url, true, options.preserve_query_parameters, None);
        } else {
            resource.url = url;
        }
        Ok(resource)
    }

    /// Replaces the URL, splitting out its query string.
    ///
    /// With `merge` the parsed query is combined with the existing parameters
    /// (the URL's values win, or are appended when `preserve_query_parameters`);
    /// without it the existing parameters are discarded. A relative `url` is
    /// resolved against `base_url` when one is given. `data:` and `blob:` URLs
    /// are stored verbatim.
    pub fn parse_url(
        &mut self,
        url: &str,
        merge: bool,
        preserve_query_parameters: bool,
        base_url: Option<&str>,
    ) {
        if data_uri::is_data_uri(url) || data_uri::is_blob_uri(url) {
            self.url = url.to_string();
            if !merge {
                self.query_parameters.clear();
            }
            return;
        }

        let (path, query_string) = split_url(url);
        let parsed = query_string.map(parse_query_string).unwrap_or_default();
        self.query_parameters = if merge {
            combine_query_parameters(&self.query_parameters, &parsed, preserve_query_parameters)
        } else {
            parsed
        };

        self.url = match base_url {
            Some(base) if !has_scheme(path) => {
                let joined = resolve_relative(path, base);
                let (resolved, _) = split_url(&joined);
                resolved.to_string()
            }
            _ => path.to_string(),
        };
        trace!(url = %self.url, parameters = self.query_parameters.len(), "url parsed");
    }

    /// Rebuilds the URL.
    ///
    /// `%7B`/`%7D` escapes are restored to braces, known `{key}` tokens are
    /// substituted (encoded) and unknown tokens left as they are. `data:` URLs
    /// are returned untouched.
    pub fn get_url_component(&self, include_query: bool, include_proxy: bool) -> String {
        if self.is_data_uri() {
            return self.url.clone();
        }

        let mut url = self.url.clone();
        if include_query {
            url.push_str(&stringify_query(&self.query_parameters));
        }
        let url = url.replace("%7B", "{").replace("%7D", "}");
        let url = uri::substitute_template(&url, &self.template_values);

        match (&self.proxy, include_proxy) {
            (Some(proxy), true) => proxy.get_url(&url),
            _ => url,
        }
    }

    /// Full URL with query, template values and proxy applied.
    pub fn url(&self) -> String {
        self.get_url_component(true, true)
    }

    /// Replaces the URL, merging its query with the current parameters.
    pub fn set_url(&mut self, url: &str) {
        self.parse_url(url, true, false, None);
    }

    /// Stored URL without query, templates or proxy.
    pub fn raw_url(&self) -> &str {
        &self.url
    }

    pub fn query_parameters(&self) -> &QueryParameters {
        &self.query_parameters
    }

    pub fn template_values(&self) -> &TemplateValues {
        &self.template_values
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn has_headers(&self) -> bool {
        !self.headers.is_empty()
    }

    /// Sets parameters with override semantics. With `use_as_default` the
    /// existing parameters win instead.
    pub fn set_query_parameters(&mut self, parameters: QueryParameters, use_as_default: bool) {
        self.query_parameters = if use_as_default {
            combine_query_parameters(&parameters, &self.query_parameters, false)
        } else {
            combine_query_parameters(&self.query_parameters, &parameters, false)
        };
    }

    /// Adds parameters, concatenating values on key collisions.
    pub fn append_query_parameters(&mut self, parameters: QueryParameters) {
        self.query_parameters = combine_query_parameters(&self.query_parameters, &parameters, true);
    }

    /// Sets template values. With `use_as_default` existing values win.
    pub fn set_template_values(&mut self, values: TemplateValues, use_as_default: bool) {
        if use_as_default {
            let mut merged = values;
            merged.extend(std::mem::take(&mut self.template_values));
            self.template_values = merged;
        } else {
            self.template_values.extend(values);
        }
    }

    /// Copy of this resource with `options` applied.
    ///
    /// The copy always starts with a zero retry count and, unless `options`
    /// names one, a fresh unissued copy of this resource's request.
    pub fn get_derived_resource(&self, options: DerivedResourceOptions) -> Resource {
        let mut resource = self.clone();

        if let Some(url) = options.url.as_deref() {
            resource.parse_url(url, true, options.preserve_query_parameters, Some(&self.url));
        }
        if let Some(parameters) = options.query_parameters {
            resource.query_parameters =
                combine_query_parameters(&resource.query_parameters, &parameters, false);
        }
        if let Some(values) = options.template_values {
            resource.template_values.extend(values);
        }
        if let Some(headers) = options.headers {
            resource.headers.extend(headers);
        }
        if let Some(proxy) = options.proxy {
            resource.proxy = Some(proxy);
        }
        if let Some(request) = options.request {
            resource.request = request;
        }
        if let Some(callback) = options.retry_callback {
            resource.retry_callback = Some(callback);
        }
        if let Some(attempts) = options.retry_attempts {
            resource.retry_attempts = attempts;
        }
        resource
    }

    pub fn is_data_uri(&self) -> bool {
        data_uri::is_data_uri(&self.url)
    }

    pub fn is_blob_uri(&self) -> bool {
        data_uri::is_blob_uri(&self.url)
    }

    /// Lower-cased file extension, or the MIME subtype for `data:` URLs.
    pub fn extension(&self) -> String {
        uri::extension(&self.url)
    }

    /// URL up to and including the last `/`, optionally with the query.
    pub fn get_base_uri(&self, include_query: bool) -> String {
        let mut base = uri::base_uri(&self.url).to_string();
        if include_query {
            base.push_str(&stringify_query(&self.query_parameters));
        }
        base
    }

    /// Makes sure the stored URL ends with `/`.
    pub fn append_forward_slash(&mut self) {
        if !self.url.ends_with('/') {
            self.url.push('/');
        }
    }

    pub fn proxy(&self) -> Option<&Arc<dyn Proxy>> {
        self.proxy.as_ref()
    }

    pub fn set_proxy(&mut self, proxy: Option<Arc<dyn Proxy>>) {
        self.proxy = proxy;
    }

    pub fn set_retry_callback(&mut self, callback: Option<Arc<dyn RetryCallback>>) {
        self.retry_callback = callback;
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    pub fn set_retry_attempts(&mut self, attempts: u32) {
        self.retry_attempts = attempts;
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn request(&self) -> &SharedRequest {
        &self.request
    }

    pub fn set_request(&mut self, request: SharedRequest) {
        self.request = request;
    }

    pub fn credits(&self) -> &[Credit] {
        &self.credits
    }

    pub fn add_credit(&mut self, credit: Credit) {
        self.credits.push(credit);
    }

    pub fn context(&self) -> &FetchContext {
        &self.context
    }
}

impl Clone for Resource {
    /// Deep copy with a zero retry count and a fresh unissued request.
    fn clone(&self) -> Self {
        Self {
            url: self.url.clone(),
            query_parameters: self.query_parameters.clone(),
            template_values: self.template_values.clone(),
            headers: self.headers.clone(),
            proxy: self.proxy.clone(),
            retry_callback: self.retry_callback.clone(),
            retry_attempts: self.retry_attempts,
            retry_count: 0,
            request: self.request.lock().clone_unissued().shared(),
            credits: self.credits.clone(),
            context: self.context.clone(),
        }
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("url", &self.url)
            .field("query_parameters", &self.query_parameters)
            .field("template_values", &self.template_values)
            .field("headers", &self.headers)
            .field("proxy", &self.proxy)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_count", &self.retry_count)
            .field("state", &self.request.lock().state().name())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

impl TryFrom<&str> for Resource {
    type Error = FetchError;

    fn try_from(url: &str) -> FetchResult<Self> {
        Self::new(url)
    }
}

impl TryFrom<String> for Resource {
    type Error = FetchError;

    fn try_from(url: String) -> FetchResult<Self> {
        Self::new(url)
    }
}
