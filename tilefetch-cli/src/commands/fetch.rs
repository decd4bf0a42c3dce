//! Fetch command - fetch one resource and print or save it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use tilefetch::transport::BoxFuture;
use tilefetch::{
    DefaultProxy, FetchError, FetchOptions, ImageFetchOptions, Resource, ResourceOptions,
    RetryCallback,
};
use tracing::{info, warn};

use super::common::{
    headers_from_args, query_from_args, scheduled, templates_from_args, write_output,
};
use crate::error::CliError;
use crate::runner::CliRunner;

/// What to fetch the resource as.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum FetchAs {
    /// UTF-8 text
    Text,
    /// JSON, pretty-printed
    Json,
    /// XML document
    Xml,
    /// Raw bytes
    Bytes,
    /// Response headers of a HEAD request
    Headers,
    /// Decoded image (saved re-encoded when --output is given)
    Image,
}

/// Arguments for the fetch command.
pub struct FetchArgs {
    pub url: String,
    pub fetch_as: FetchAs,
    pub query: Vec<String>,
    pub headers: Vec<String>,
    pub templates: Vec<String>,
    pub retries: Option<u32>,
    pub proxy: Option<String>,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

/// Retries transport failures with a linear backoff.
#[derive(Debug, Clone, Copy)]
pub struct TransportRetry {
    pub backoff: Duration,
}

impl RetryCallback for TransportRetry {
    fn retry<'a>(&'a self, resource: &'a mut Resource, error: &'a FetchError) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            if !error.is_transport() || matches!(error, FetchError::Cancelled { .. }) {
                return false;
            }
            let attempt = resource.retry_count() + 1;
            warn!(url = %resource.url(), attempt, error = %error, "retrying");
            tokio::time::sleep(self.backoff * attempt).await;
            true
        })
    }
}

/// Builds the resource described by `args`.
pub fn build_resource(args: &FetchArgs, runner: &CliRunner) -> Result<Resource, CliError> {
    let mut resource = Resource::from_options(ResourceOptions {
        headers: headers_from_args(&args.headers)?,
        template_values: templates_from_args(&args.templates)?,
        retry_callback: Some(Arc::new(TransportRetry {
            backoff: Duration::from_millis(250),
        })),
        retry_attempts: args.retries.unwrap_or(runner.config().retry.attempts),
        context: Some(runner.context().clone()),
        ..ResourceOptions::new(args.url.as_str())
    })?;
    resource.append_query_parameters(query_from_args(&args.query));
    if let Some(proxy) = &args.proxy {
        resource.set_proxy(Some(Arc::new(DefaultProxy::new(proxy.as_str()))));
    }
    Ok(resource)
}

/// Run the fetch command.
pub async fn run(args: FetchArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(args.config.as_deref())?;
    runner.log_startup("fetch");

    let mut resource = build_resource(&args, &runner)?;
    info!(url = %resource.url(), fetch_as = ?args.fetch_as, "fetching");
    let start = std::time::Instant::now();

    match args.fetch_as {
        FetchAs::Text => {
            let text = scheduled!(resource.fetch_text());
            emit(&args, text.as_bytes())?;
        }
        FetchAs::Json => {
            let value = scheduled!(resource.fetch_json());
            let pretty = serde_json::to_string_pretty(&value)
                .map_err(|e| CliError::Argument(e.to_string()))?;
            emit(&args, pretty.as_bytes())?;
        }
        FetchAs::Xml => {
            let document = scheduled!(resource.fetch_xml());
            if let Some(root) = document.root_name() {
                info!(root = %root, "xml document");
            }
            emit(&args, document.text().as_bytes())?;
        }
        FetchAs::Bytes => {
            let bytes = scheduled!(resource.fetch_array_buffer());
            match &args.output {
                Some(path) => write_output(path, &bytes)?,
                None => println!("{} bytes", bytes.len()),
            }
        }
        FetchAs::Headers => {
            let headers = scheduled!(resource.head(FetchOptions::default()));
            for (name, value) in &headers {
                println!("{}: {}", name, value);
            }
        }
        FetchAs::Image => {
            let fetched = scheduled!(resource.fetch_image(ImageFetchOptions::default()));
            println!("{}x{} image", fetched.image.width(), fetched.image.height());
            if let Some(path) = &args.output {
                fetched
                    .image
                    .save(path)
                    .map_err(|error| CliError::ImageWrite {
                        path: path.display().to_string(),
                        error,
                    })?;
            }
        }
    }

    info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        retries = resource.retry_count(),
        "fetch complete"
    );
    Ok(())
}

fn emit(args: &FetchArgs, bytes: &[u8]) -> Result<(), CliError> {
    match &args.output {
        Some(path) => write_output(path, bytes),
        None => {
            println!("{}", String::from_utf8_lossy(bytes));
            Ok(())
        }
    }
}
