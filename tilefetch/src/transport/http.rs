//! Default binary/text loader backed by an async reqwest client.

use std::time::Duration;

use tracing::{debug, trace, warn};

use super::{BoxFuture, Headers, HttpLoader, LoadRequest, Method, Response};
use crate::error::{FetchError, FetchResult};

/// Default User-Agent string for HTTP requests.
/// Required by some tile servers (e.g., Google) that reject requests without a User-Agent.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// [`HttpLoader`] using a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestLoader {
    client: reqwest::Client,
}

impl ReqwestLoader {
    /// Creates a loader with the default tuning.
    ///
    /// Optimized for many small parallel tile requests:
    /// - Large connection pool with high idle limits
    /// - TCP keepalive to maintain warm connections
    /// - TCP nodelay for reduced latency
    pub fn new() -> reqwest::Result<Self> {
        Self::with_settings(Duration::from_secs(30), DEFAULT_USER_AGENT, 128)
    }

    /// Creates a loader with an explicit timeout, user agent and pool size.
    pub fn with_settings(
        timeout: Duration,
        user_agent: &str,
        pool_max_idle_per_host: usize,
    ) -> reqwest::Result<Self> {
        let client = build_client(timeout, user_agent, pool_max_idle_per_host)?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    async fn perform(&self, request: LoadRequest) -> FetchResult<Response> {
        let url = request.url;
        trace!(url = %url, method = request.method.as_str(), "HTTP request starting");

        let mut builder = self.client.request(reqwest_method(request.method), &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(data) = request.data {
            builder = builder.body(data);
        }

        let response = match builder.send().await {
            Ok(response) => {
                debug!(
                    url = %url,
                    status = response.status().as_u16(),
                    "HTTP response received"
                );
                response
            }
            Err(e) => {
                warn!(
                    url = %url,
                    error = %e,
                    is_connect = e.is_connect(),
                    is_timeout = e.is_timeout(),
                    is_request = e.is_request(),
                    "HTTP request failed"
                );
                return Err(FetchError::network(url, e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "HTTP error status");
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let mut headers = collect_headers(response.headers());
        if let Some(mime) = request.override_mime_type {
            headers.insert("content-type".to_string(), mime);
        }

        let body = if request.method.resolves_headers() {
            bytes::Bytes::new()
        } else {
            match response.bytes().await {
                Ok(bytes) => {
                    trace!(url = %url, bytes = bytes.len(), "HTTP response body read");
                    bytes
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Failed to read response body");
                    return Err(FetchError::network(url, e));
                }
            }
        };

        Ok(Response {
            url,
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

impl HttpLoader for ReqwestLoader {
    fn load(&self, request: LoadRequest) -> BoxFuture<'_, FetchResult<Response>> {
        Box::pin(self.perform(request))
    }
}

pub(crate) fn build_client(
    timeout: Duration,
    user_agent: &str,
    pool_max_idle_per_host: usize,
) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(30))
        .tcp_nodelay(true)
        .build()
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

fn collect_headers(map: &reqwest::header::HeaderMap) -> Headers {
    map.iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use bytes::Bytes;
    use parking_lot::Mutex;
    use tokio::sync::Notify;

    /// Scripted loader that records every request it sees.
    pub struct MockHttpLoader {
        responses: Mutex<VecDeque<FetchResult<Response>>>,
        calls: Mutex<Vec<LoadRequest>>,
        call_count: AtomicUsize,
        gate: Option<Arc<Notify>>,
        pub blob_support: bool,
    }

    impl Default for MockHttpLoader {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockHttpLoader {
        pub fn new() -> Self {
            Self {
                responses: Mutex::new(VecDeque::new()),
                calls: Mutex::new(Vec::new()),
                call_count: AtomicUsize::new(0),
                gate: None,
                blob_support: true,
            }
        }

        /// Queues a response; queued responses are returned in order.
        pub fn respond(self, response: FetchResult<Response>) -> Self {
            self.responses.lock().push_back(response);
            self
        }

        /// Queues a 200 response with the given body and content type.
        pub fn respond_ok(self, body: impl Into<Bytes>, content_type: &str) -> Self {
            self.respond(Ok(Self::response(200, body, content_type)))
        }

        /// Holds every load until the returned handle is notified.
        pub fn gated(mut self) -> (Self, Arc<Notify>) {
            let gate = Arc::new(Notify::new());
            self.gate = Some(gate.clone());
            (self, gate)
        }

        pub fn response(status: u16, body: impl Into<Bytes>, content_type: &str) -> Response {
            let mut headers = Headers::new();
            headers.insert("content-type".to_string(), content_type.to_string());
            Response {
                url: String::new(),
                status,
                headers,
                body: body.into(),
            }
        }

        pub fn calls(&self) -> Vec<LoadRequest> {
            self.calls.lock().clone()
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    impl HttpLoader for MockHttpLoader {
        fn load(&self, request: LoadRequest) -> BoxFuture<'_, FetchResult<Response>> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.calls.lock().push(request.clone());
            let next = self.responses.lock().pop_front();
            let gate = self.gate.clone();
            Box::pin(async move {
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                match next {
                    Some(Ok(mut response)) => {
                        response.url = request.url;
                        Ok(response)
                    }
                    Some(Err(e)) => Err(e),
                    None => Err(FetchError::network(request.url, "no scripted response")),
                }
            })
        }

        fn supports_blob(&self) -> bool {
            self.blob_support
        }
    }

    #[tokio::test]
    async fn test_mock_loader_replays_in_order() {
        let mock = MockHttpLoader::new()
            .respond_ok("first", "text/plain")
            .respond(Err(FetchError::Status {
                url: "http://x".to_string(),
                status: 503,
            }));

        let first = mock.load(LoadRequest::default()).await.unwrap();
        assert_eq!(first.body, Bytes::from("first"));
        assert_eq!(mock.load(LoadRequest::default()).await.unwrap_err().status(), Some(503));
        assert!(mock.load(LoadRequest::default()).await.unwrap_err().is_transport());
        assert_eq!(mock.call_count(), 3);
    }

    #[test]
    fn test_method_mapping() {
        assert_eq!(reqwest_method(Method::Options), reqwest::Method::OPTIONS);
        assert_eq!(reqwest_method(Method::Delete), reqwest::Method::DELETE);
    }

    #[test]
    fn test_collect_headers_lowercases_names() {
        let mut map = reqwest::header::HeaderMap::new();
        map.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("image/png"),
        );
        let headers = collect_headers(&map);
        assert_eq!(headers.get("content-type").map(String::as_str), Some("image/png"));
    }

    #[tokio::test]
    async fn test_reqwest_loader_reports_connect_failure_as_network() {
        let loader = ReqwestLoader::with_settings(Duration::from_secs(2), DEFAULT_USER_AGENT, 4)
            .unwrap();
        let request = LoadRequest {
            url: "http://127.0.0.1:9/unreachable".to_string(),
            ..LoadRequest::default()
        };
        let err = loader.load(request).await.unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }));
    }
}
