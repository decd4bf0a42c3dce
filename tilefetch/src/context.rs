//! Scheduler and transport table shared by resources.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::config::{ConfigError, FetchConfig, HttpConfig};
use crate::scheduler::{Scheduler, ThrottlingScheduler};
use crate::transport::{build_client, TransportTable};

/// The collaborators a [`Resource`](crate::resource::Resource) fetches through.
///
/// Cheap to clone; clones share the scheduler budgets and transport overrides.
#[derive(Clone)]
pub struct FetchContext {
    scheduler: Arc<dyn Scheduler>,
    transports: Arc<TransportTable>,
}

impl fmt::Debug for FetchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchContext").finish_non_exhaustive()
    }
}

static GLOBAL: OnceLock<FetchContext> = OnceLock::new();

impl FetchContext {
    pub fn new(scheduler: Arc<dyn Scheduler>, transports: Arc<TransportTable>) -> Self {
        Self {
            scheduler,
            transports,
        }
    }

    /// Builds the reqwest client and throttling scheduler described by `config`.
    pub fn from_config(config: &FetchConfig) -> Result<Self, ConfigError> {
        let client = client_for(&config.http)?;
        debug!(
            timeout_secs = config.http.timeout.as_secs(),
            max_requests = config.scheduler.max_requests,
            max_requests_per_server = config.scheduler.max_requests_per_server,
            throttle = config.scheduler.throttle_requests,
            "fetch context created"
        );
        Ok(Self::new(
            Arc::new(ThrottlingScheduler::new(config.scheduler)),
            Arc::new(TransportTable::new(client)),
        ))
    }

    /// Process-wide default, created on first use with default settings.
    pub fn global() -> &'static FetchContext {
        GLOBAL.get_or_init(|| {
            let client = client_for(&HttpConfig::default()).unwrap_or_default();
            Self::new(
                Arc::new(ThrottlingScheduler::default()),
                Arc::new(TransportTable::new(client)),
            )
        })
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    pub fn transports(&self) -> &Arc<TransportTable> {
        &self.transports
    }
}

fn client_for(http: &HttpConfig) -> reqwest::Result<reqwest::Client> {
    build_client(http.timeout, &http.user_agent, http.pool_max_idle_per_host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_is_shared() {
        let a = FetchContext::global();
        let b = FetchContext::global();
        assert!(Arc::ptr_eq(a.transports(), b.transports()));
        assert!(Arc::ptr_eq(a.scheduler(), b.scheduler()));
    }

    #[test]
    fn test_clones_share_transport_table() {
        let context = FetchContext::from_config(&FetchConfig::default()).unwrap();
        let clone = context.clone();
        assert!(Arc::ptr_eq(context.transports(), clone.transports()));
    }
}
