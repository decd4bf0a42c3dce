//! Retry coordinator.
//!
//! A resource asks its [`RetryCallback`] whether a failed transport attempt
//! should be replayed, at most `retry_attempts` times. The callback may mutate
//! the resource first (refresh a token header, swap a query parameter) and
//! may do so asynchronously.

use tracing::debug;

use super::Resource;
use crate::error::FetchError;
use crate::transport::BoxFuture;

/// Decides whether a failed request should be retried.
pub trait RetryCallback: Send + Sync {
    fn retry<'a>(&'a self, resource: &'a mut Resource, error: &'a FetchError) -> BoxFuture<'a, bool>;
}

impl<F> RetryCallback for F
where
    F: Fn(&mut Resource, &FetchError) -> bool + Send + Sync,
{
    fn retry<'a>(&'a self, resource: &'a mut Resource, error: &'a FetchError) -> BoxFuture<'a, bool> {
        let decision = self(resource, error);
        Box::pin(async move { decision })
    }
}

impl Resource {
    /// Asks the retry callback whether to replay after `error`.
    ///
    /// Resolves `false` without calling anything when no callback is set or
    /// the attempt budget is spent. Otherwise awaits the callback and counts
    /// one attempt, whatever it decided.
    pub async fn retry_on_error(&mut self, error: &FetchError) -> bool {
        let callback = match &self.retry_callback {
            Some(callback) if self.retry_count < self.retry_attempts => callback.clone(),
            _ => return false,
        };

        let retry = callback.retry(self, error).await;
        self.retry_count += 1;
        debug!(
            url = %self.url,
            retry,
            attempt = self.retry_count,
            max_attempts = self.retry_attempts,
            "retry decision"
        );
        retry
    }
}
