//! Scheduler boundary.
//!
//! The scheduler is the only component that moves a request past `Unissued`.
//! Its contract is a single call:
//!
//! ```text
//! submit(request) -> Some(future)   accepted, the future settles the request
//!                 -> None           budget exhausted, nothing started
//! ```
//!
//! `None` is never an error. Callers retry later from their own loop.

mod throttling;

use std::sync::Arc;

use futures::future;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{FetchError, FetchResult};
use crate::request::{RequestEvent, RequestFunction, RequestState, SharedRequest};
use crate::transport::{BoxFuture, Payload};

pub use throttling::{
    server_key, SchedulerConfig, SchedulerStats, StatsSnapshot, ThrottlingScheduler,
    DEFAULT_MAX_REQUESTS, DEFAULT_MAX_REQUESTS_PER_SERVER,
};

/// Global concurrency and priority gate.
pub trait Scheduler: Send + Sync {
    /// Offers `request` for execution.
    ///
    /// Returns `None` if the request was throttled; the request stays
    /// `Unissued` in that case. An accepted request is `Issued` on return and
    /// becomes `Active` when the returned future is first polled.
    fn submit(&self, request: &SharedRequest) -> Option<BoxFuture<'static, FetchResult<Payload>>>;
}

/// Scheduler that starts every request at once.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn submit(&self, request: &SharedRequest) -> Option<BoxFuture<'static, FetchResult<Payload>>> {
        let pending: BoxFuture<'static, FetchResult<Payload>> = match issue(request) {
            Ok(function) => Box::pin(run(InFlight::new(request.clone()), function)),
            Err(e) => Box::pin(future::ready(Err(e))),
        };
        Some(pending)
    }
}

/// Moves `request` to `Issued` and hands back its transport function.
pub(crate) fn issue(request: &SharedRequest) -> FetchResult<RequestFunction> {
    let mut guard = request.lock();
    let function = guard.request_function().ok_or_else(|| FetchError::Unbound {
        url: guard.url().to_string(),
    })?;
    guard.apply(RequestEvent::Issue)?;
    debug!(url = guard.url(), "request issued");
    Ok(function)
}

/// An issued request whose driving future has not settled yet.
///
/// Dropping it before [`InFlight::disarm`] cancels the request, so an
/// abandoned fetch never leaves the slot stuck in `Issued` or `Active`.
pub(crate) struct InFlight {
    request: SharedRequest,
    armed: bool,
}

impl InFlight {
    pub(crate) fn new(request: SharedRequest) -> Self {
        Self {
            request,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.armed && self.request.lock().cancel() {
            debug!("abandoned request cancelled");
        }
    }
}

/// Drives an issued request to a terminal state.
///
/// The request turns `Active` on first poll, at which point its cancel handle
/// exists. A cancel that lands after the transport settled leaves the outcome
/// untouched.
pub(crate) async fn run(flight: InFlight, function: RequestFunction) -> FetchResult<Payload> {
    let (token, url) = start(&flight.request)?;

    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        result = function() => Some(result),
    };

    let result = settle(&flight.request, outcome, url);
    flight.disarm();
    result
}

fn start(request: &SharedRequest) -> FetchResult<(CancellationToken, String)> {
    let mut guard = request.lock();
    if matches!(guard.state(), RequestState::Cancelled) {
        return Err(FetchError::Cancelled {
            url: guard.url().to_string(),
        });
    }
    let token = guard.begin()?;
    Ok((token, guard.url().to_string()))
}

fn settle(
    request: &SharedRequest,
    outcome: Option<FetchResult<Payload>>,
    url: String,
) -> FetchResult<Payload> {
    let mut guard = request.lock();
    let result = match outcome {
        Some(result) if !matches!(guard.state(), RequestState::Cancelled) => result,
        _ => {
            debug!(url = %url, "request cancelled");
            return Err(FetchError::Cancelled { url });
        }
    };

    match result {
        Ok(payload) => {
            guard.apply(RequestEvent::Succeed(payload.completion()))?;
            Ok(payload)
        }
        Err(e) => {
            guard.apply(RequestEvent::Fail(e.clone()))?;
            Err(e)
        }
    }
}

/// Shared handle to any scheduler.
pub type SharedScheduler = Arc<dyn Scheduler>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{request_function, Request};
    use crate::transport::Response;

    fn bound(response: FetchResult<Response>) -> SharedRequest {
        let mut request = Request::new();
        request.set_url("http://x/a");
        let response = Arc::new(response);
        request.set_request_function(request_function(move || {
            let response = (*response).clone();
            async move { response.map(Payload::Response) }
        }));
        request.shared()
    }

    #[tokio::test]
    async fn test_immediate_scheduler_completes_request() {
        let request = bound(Ok(Response {
            status: 200,
            body: "abc".into(),
            ..Response::default()
        }));
        let future = ImmediateScheduler.submit(&request).unwrap();
        assert_eq!(request.lock().state(), &RequestState::Issued);

        future.await.unwrap();
        match request.lock().state() {
            RequestState::Complete(completion) => {
                assert_eq!(completion.status, Some(200));
                assert_eq!(completion.bytes, 3);
            }
            other => panic!("unexpected state {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_failure_is_recorded() {
        let request = bound(Err(FetchError::network("http://x/a", "refused")));
        let err = ImmediateScheduler.submit(&request).unwrap().await.unwrap_err();
        assert!(err.is_transport());
        assert!(request.lock().state().is_failed());
    }

    #[tokio::test]
    async fn test_unbound_request_is_rejected() {
        let request = Request::new().shared();
        let err = ImmediateScheduler.submit(&request).unwrap().await.unwrap_err();
        assert!(matches!(err, FetchError::Unbound { .. }));
        assert_eq!(request.lock().state(), &RequestState::Unissued);
    }

    #[tokio::test]
    async fn test_resubmitting_without_reset_is_rejected() {
        let request = bound(Ok(Response::default()));
        ImmediateScheduler.submit(&request).unwrap().await.unwrap();

        let err = ImmediateScheduler.submit(&request).unwrap().await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidTransition { .. }));

        request.lock().reset().unwrap();
        assert!(ImmediateScheduler.submit(&request).unwrap().await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_while_active() {
        let mut request = Request::new();
        request.set_url("http://x/slow");
        request.set_request_function(request_function(|| async {
            future::pending::<FetchResult<Payload>>().await
        }));
        let request = request.shared();

        let future = ImmediateScheduler.submit(&request).unwrap();
        let handle = tokio::spawn(future);
        while !request.lock().has_cancel_handle() {
            tokio::task::yield_now().await;
        }
        assert!(request.lock().cancel());

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, FetchError::Cancelled { .. }));
        assert_eq!(request.lock().state(), &RequestState::Cancelled);
    }

    #[tokio::test]
    async fn test_dropped_future_cancels_request() {
        let request = bound(Ok(Response::default()));
        let future = ImmediateScheduler.submit(&request).unwrap();
        drop(future);
        assert_eq!(request.lock().state(), &RequestState::Cancelled);

        request.lock().reset().unwrap();
        assert!(ImmediateScheduler.submit(&request).unwrap().await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let request = bound(Ok(Response::default()));
        let future = ImmediateScheduler.submit(&request).unwrap();
        request.lock().cancel();
        assert!(matches!(future.await, Err(FetchError::Cancelled { .. })));
    }
}
