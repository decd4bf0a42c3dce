//! Semaphore-based throttling scheduler.
//!
//! Two budgets gate a request:
//!
//! ```text
//! throttle            -> global pool (max_requests)
//! throttle_by_server  -> pool per scheme://host:port (max_requests_per_server)
//! ```
//!
//! Permits are taken with `try_acquire`, never awaited: an exhausted pool makes
//! `submit` return `None` and the caller tries again later. Permits are held by
//! the returned future and released when it settles or is dropped. `data:` and
//! `blob:` URLs never touch the network and are never throttled.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use super::{issue, run, InFlight, Scheduler};
use crate::error::{FetchError, FetchResult};
use crate::request::SharedRequest;
use crate::transport::{data_uri, BoxFuture, Payload};

/// Default global budget.
pub const DEFAULT_MAX_REQUESTS: usize = 50;

/// Default per-server budget.
pub const DEFAULT_MAX_REQUESTS_PER_SERVER: usize = 18;

/// Budgets for [`ThrottlingScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// When false every request starts immediately.
    pub throttle_requests: bool,
    pub max_requests: usize,
    pub max_requests_per_server: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            throttle_requests: true,
            max_requests: DEFAULT_MAX_REQUESTS,
            max_requests_per_server: DEFAULT_MAX_REQUESTS_PER_SERVER,
        }
    }
}

/// Counters kept by [`ThrottlingScheduler`].
#[derive(Debug, Default)]
pub struct SchedulerStats {
    issued: AtomicU64,
    throttled: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    active: AtomicUsize,
}

/// Point-in-time copy of [`SchedulerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub issued: u64,
    pub throttled: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub active: usize,
}

impl SchedulerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            issued: self.issued.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
        }
    }

    fn record(&self, result: &FetchResult<Payload>) {
        let counter = match result {
            Ok(_) => &self.completed,
            Err(FetchError::Cancelled { .. }) => &self.cancelled,
            Err(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Holds the permits of one accepted request and tracks it as active.
struct ActiveSlot {
    _permits: Vec<OwnedSemaphorePermit>,
    stats: Arc<SchedulerStats>,
}

impl ActiveSlot {
    fn new(permits: Vec<OwnedSemaphorePermit>, stats: Arc<SchedulerStats>) -> Self {
        stats.active.fetch_add(1, Ordering::Relaxed);
        Self {
            _permits: permits,
            stats,
        }
    }
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.stats.active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Scheduler enforcing a global and a per-server concurrency budget.
#[derive(Debug)]
pub struct ThrottlingScheduler {
    config: SchedulerConfig,
    global: Arc<Semaphore>,
    servers: DashMap<String, Arc<Semaphore>>,
    stats: Arc<SchedulerStats>,
}

impl Default for ThrottlingScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl ThrottlingScheduler {
    /// Creates a scheduler. Zero budgets are raised to one.
    pub fn new(config: SchedulerConfig) -> Self {
        let config = SchedulerConfig {
            max_requests: config.max_requests.max(1),
            max_requests_per_server: config.max_requests_per_server.max(1),
            ..config
        };
        Self {
            global: Arc::new(Semaphore::new(config.max_requests)),
            servers: DashMap::new(),
            stats: Arc::new(SchedulerStats::default()),
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Number of accepted requests that have not settled yet.
    pub fn active_requests(&self) -> usize {
        self.stats.active.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn acquire_server(&self, key: &str) -> Option<OwnedSemaphorePermit> {
        let semaphore = self
            .servers
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.max_requests_per_server)))
            .clone();
        semaphore.try_acquire_owned().ok()
    }

    fn throttled(&self, url: &str, budget: &'static str) -> Option<BoxFuture<'static, FetchResult<Payload>>> {
        self.stats.throttled.fetch_add(1, Ordering::Relaxed);
        debug!(url = url, budget, "request throttled");
        None
    }
}

impl Scheduler for ThrottlingScheduler {
    fn submit(&self, request: &SharedRequest) -> Option<BoxFuture<'static, FetchResult<Payload>>> {
        let (url, throttle, throttle_by_server) = {
            let guard = request.lock();
            (guard.url().to_string(), guard.throttle, guard.throttle_by_server)
        };

        let local = data_uri::is_data_uri(&url) || data_uri::is_blob_uri(&url);
        let gated = self.config.throttle_requests && !local;
        let mut permits = Vec::new();

        if gated && throttle {
            match self.global.clone().try_acquire_owned() {
                Ok(permit) => permits.push(permit),
                Err(_) => return self.throttled(&url, "global"),
            }
        }

        let key = if local { None } else { server_key(&url) };
        if gated && throttle_by_server {
            if let Some(key) = key.as_deref() {
                match self.acquire_server(key) {
                    Some(permit) => permits.push(permit),
                    None => return self.throttled(&url, "server"),
                }
            }
        }
        request.lock().set_server_key(key);

        let function = match issue(request) {
            Ok(function) => function,
            Err(e) => return Some(Box::pin(future::ready(Err(e)))),
        };
        self.stats.issued.fetch_add(1, Ordering::Relaxed);

        let slot = ActiveSlot::new(permits, self.stats.clone());
        let flight = InFlight::new(request.clone());
        Some(Box::pin(async move {
            let result = run(flight, function).await;
            slot.stats.record(&result);
            drop(slot);
            result
        }))
    }
}

/// `scheme://host:port` of an absolute URL, with the scheme's default port
/// filled in.
pub fn server_key(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let port = parsed.port_or_known_default()?;
    Some(format!("{}://{}:{}", parsed.scheme(), host, port))
}
