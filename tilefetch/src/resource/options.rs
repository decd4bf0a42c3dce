//! Option bags for building, deriving and fetching resources.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use image::DynamicImage;

use super::query::QueryParameters;
use super::retry::RetryCallback;
use crate::context::FetchContext;
use crate::credit::Credit;
use crate::proxy::Proxy;
use crate::request::SharedRequest;
use crate::transport::{Blob, Headers, ResponseType};

/// Values substituted into `{key}` URL tokens.
pub type TemplateValues = BTreeMap<String, String>;

/// Everything a [`Resource`](super::Resource) can be built from.
#[derive(Clone)]
pub struct ResourceOptions {
    /// Required.
    pub url: Option<String>,
    pub query_parameters: QueryParameters,
    pub template_values: TemplateValues,
    pub headers: Headers,
    pub proxy: Option<Arc<dyn Proxy>>,
    pub retry_callback: Option<Arc<dyn RetryCallback>>,
    pub retry_attempts: u32,
    /// Shared request slot. A fresh request is created when absent.
    pub request: Option<SharedRequest>,
    pub credits: Vec<Credit>,
    /// Split the query out of `url`. When false the URL is stored verbatim.
    pub parse_url: bool,
    /// Concatenate rather than override when the URL's query collides with
    /// `query_parameters`.
    pub preserve_query_parameters: bool,
    /// Scheduler and transports. The process-wide default when absent.
    pub context: Option<FetchContext>,
}

impl Default for ResourceOptions {
    fn default() -> Self {
        Self {
            url: None,
            query_parameters: QueryParameters::new(),
            template_values: TemplateValues::new(),
            headers: Headers::new(),
            proxy: None,
            retry_callback: None,
            retry_attempts: 0,
            request: None,
            credits: Vec::new(),
            parse_url: true,
            preserve_query_parameters: false,
            context: None,
        }
    }
}

impl ResourceOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }
}

impl fmt::Debug for ResourceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceOptions")
            .field("url", &self.url)
            .field("query_parameters", &self.query_parameters)
            .field("template_values", &self.template_values)
            .field("headers", &self.headers)
            .field("proxy", &self.proxy)
            .field("retry_attempts", &self.retry_attempts)
            .field("parse_url", &self.parse_url)
            .finish_non_exhaustive()
    }
}

/// Overrides applied by [`Resource::get_derived_resource`](super::Resource::get_derived_resource).
///
/// Maps given here win over the parent's on key collisions.
#[derive(Clone, Default)]
pub struct DerivedResourceOptions {
    /// Resolved against the parent's URL when relative.
    pub url: Option<String>,
    pub preserve_query_parameters: bool,
    pub query_parameters: Option<QueryParameters>,
    pub template_values: Option<TemplateValues>,
    pub headers: Option<Headers>,
    pub proxy: Option<Arc<dyn Proxy>>,
    /// Keep a specific request slot instead of a fresh copy of the parent's.
    pub request: Option<SharedRequest>,
    pub retry_callback: Option<Arc<dyn RetryCallback>>,
    pub retry_attempts: Option<u32>,
}

impl DerivedResourceOptions {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }
}

/// Per-call options for the generic verbs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOptions {
    pub response_type: ResponseType,
    /// Merged over the resource's headers for this call only.
    pub headers: Headers,
    pub override_mime_type: Option<String>,
}

impl FetchOptions {
    pub fn response_type(response_type: ResponseType) -> Self {
        Self {
            response_type,
            ..Self::default()
        }
    }
}

/// Options for [`Resource::fetch_image`](super::Resource::fetch_image).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageFetchOptions {
    /// Fetch the bytes first even when no custom headers are needed.
    pub prefer_blob: bool,
    /// Decode the blob directly when the decoder honours decode options.
    pub prefer_image_bitmap: bool,
    pub flip_y: bool,
    pub skip_color_space_conversion: bool,
}

/// A decoded image plus the blob it came from, when the blob path was used.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub image: DynamicImage,
    pub blob: Option<Blob>,
}

/// A well-formed XML response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    text: String,
}

impl XmlDocument {
    /// Validates `text` as XML.
    pub fn parse(text: String) -> Result<Self, roxmltree::Error> {
        roxmltree::Document::parse(&text)?;
        Ok(Self { text })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Parsed view borrowing the document text.
    pub fn document(&self) -> Result<roxmltree::Document<'_>, roxmltree::Error> {
        roxmltree::Document::parse(&self.text)
    }

    /// Tag name of the root element.
    pub fn root_name(&self) -> Option<String> {
        self.document()
            .ok()
            .map(|doc| doc.root_element().tag_name().name().to_string())
    }
}
