//! Fetch attempts and their lifecycle.
//!
//! A [`Request`] is one attempt to run a resource's transport operation. It is
//! shared behind a [`SharedRequest`] so the scheduler, the owning resource and
//! any derived resources that deliberately keep the same slot all observe the
//! same state.

mod state;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::FetchResult;
use crate::transport::{BoxFuture, Payload};

pub use state::{Completion, RequestEvent, RequestState};

/// Closure producing the transport future for one attempt.
pub type RequestFunction = Arc<dyn Fn() -> BoxFuture<'static, FetchResult<Payload>> + Send + Sync>;

/// Boxes an async closure into a [`RequestFunction`].
pub fn request_function<F, Fut>(f: F) -> RequestFunction
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FetchResult<Payload>> + Send + 'static,
{
    Arc::new(move || -> BoxFuture<'static, FetchResult<Payload>> { Box::pin(f()) })
}

/// A request shared between its resource and the scheduler.
pub type SharedRequest = Arc<Mutex<Request>>;

/// Kind of content a request fetches, used by schedulers for prioritisation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RequestType {
    Terrain,
    Imagery,
    Tiles3d,
    #[default]
    Other,
}

/// One fetch attempt bound to a resource.
pub struct Request {
    url: String,
    state: RequestState,
    request_function: Option<RequestFunction>,
    cancel_token: Option<CancellationToken>,
    server_key: Option<String>,
    /// Hint that the scheduler may delay this request against the global budget.
    pub throttle: bool,
    /// Hint that the scheduler may delay this request against a per-server budget.
    pub throttle_by_server: bool,
    /// Lower values are more important.
    pub priority: f64,
    pub request_type: RequestType,
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("url", &self.url)
            .field("state", &self.state)
            .field("throttle", &self.throttle)
            .field("throttle_by_server", &self.throttle_by_server)
            .field("priority", &self.priority)
            .field("request_type", &self.request_type)
            .field("server_key", &self.server_key)
            .finish_non_exhaustive()
    }
}

impl Request {
    /// Creates an unthrottled, unissued request.
    pub fn new() -> Self {
        Self {
            url: String::new(),
            state: RequestState::Unissued,
            request_function: None,
            cancel_token: None,
            server_key: None,
            throttle: false,
            throttle_by_server: false,
            priority: 0.0,
            request_type: RequestType::Other,
        }
    }

    pub fn with_throttle(mut self, throttle: bool) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_throttle_by_server(mut self, throttle_by_server: bool) -> Self {
        self.throttle_by_server = throttle_by_server;
        self
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_type(mut self, request_type: RequestType) -> Self {
        self.request_type = request_type;
        self
    }

    /// Wraps the request for sharing with a resource and the scheduler.
    pub fn shared(self) -> SharedRequest {
        Arc::new(Mutex::new(self))
    }

    /// Fully resolved URL of the current attempt.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    pub fn state(&self) -> &RequestState {
        &self.state
    }

    pub fn server_key(&self) -> Option<&str> {
        self.server_key.as_deref()
    }

    pub fn set_server_key(&mut self, key: Option<String>) {
        self.server_key = key;
    }

    pub fn request_function(&self) -> Option<RequestFunction> {
        self.request_function.clone()
    }

    pub fn set_request_function(&mut self, function: RequestFunction) {
        self.request_function = Some(function);
    }

    /// Applies a lifecycle event.
    pub fn apply(&mut self, event: RequestEvent) -> FetchResult<()> {
        self.state = self.state.transition(event)?;
        Ok(())
    }

    /// Moves the transport into `Active` and captures a fresh cancel handle.
    pub fn begin(&mut self) -> FetchResult<CancellationToken> {
        self.apply(RequestEvent::Start)?;
        let token = CancellationToken::new();
        self.cancel_token = Some(token.clone());
        Ok(token)
    }

    /// Puts a finished request back to `Unissued` so it can be submitted again.
    pub fn reset(&mut self) -> FetchResult<()> {
        self.apply(RequestEvent::Reset)?;
        self.cancel_token = None;
        Ok(())
    }

    /// Cancels the request.
    ///
    /// Returns `true` if the request moved to `Cancelled`. Cancelling a request
    /// that already finished does nothing.
    pub fn cancel(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        if let Some(token) = &self.cancel_token {
            token.cancel();
        }
        // Non-terminal states always accept Cancel.
        self.state = RequestState::Cancelled;
        true
    }

    /// Drops the cancel handle once the transport has settled.
    pub fn clear_cancel(&mut self) {
        self.cancel_token = None;
    }

    pub fn has_cancel_handle(&self) -> bool {
        self.cancel_token.is_some()
    }

    /// Copies the request configuration into a fresh, unissued request.
    pub fn clone_unissued(&self) -> Self {
        Self {
            url: self.url.clone(),
            state: RequestState::Unissued,
            request_function: self.request_function.clone(),
            cancel_token: None,
            server_key: self.server_key.clone(),
            throttle: self.throttle,
            throttle_by_server: self.throttle_by_server,
            priority: self.priority,
            request_type: self.request_type,
        }
    }
}
