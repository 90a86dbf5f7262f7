//! Test doubles for the fetch transport, the clock and the host project.

use crate::cache::{CacheError, Clock, Fetch, HttpResponse};
use crate::resolution::{HostProject, IncrementalInvalidation};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// Scripted transport that counts requests per URL.
///
/// Unrouted URLs fail with `CACHE_HTTP`.
#[derive(Debug, Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, HttpResponse>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer `url` with `response` from now on.
    pub fn route(&self, url: &str, response: HttpResponse) {
        self.routes.lock().unwrap().insert(url.to_string(), response);
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Fetch for MockFetcher {
    async fn get(&self, url: &Url) -> Result<HttpResponse, CacheError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;
        self.routes
            .lock()
            .unwrap()
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| CacheError::http(format!("No route for {url}")))
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            now_ms: AtomicU64::new(start_ms),
        })
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(u64::try_from(by.as_millis()).unwrap(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct CountingIncremental {
    succeed: bool,
    calls: AtomicUsize,
}

impl IncrementalInvalidation for CountingIncremental {
    fn invalidate_resolutions(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.succeed
    }
}

/// Host that records refresh requests.
#[derive(Debug, Default)]
pub struct CountingHost {
    reloads: AtomicUsize,
    incremental: Option<CountingIncremental>,
}

impl CountingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Host with incremental invalidation that reports `succeed`.
    pub fn with_incremental(succeed: bool) -> Arc<Self> {
        Arc::new(Self {
            reloads: AtomicUsize::new(0),
            incremental: Some(CountingIncremental {
                succeed,
                calls: AtomicUsize::new(0),
            }),
        })
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn invalidations(&self) -> usize {
        self.incremental
            .as_ref()
            .map_or(0, |i| i.calls.load(Ordering::SeqCst))
    }
}

impl HostProject for CountingHost {
    fn incremental(&self) -> Option<&dyn IncrementalInvalidation> {
        self.incremental
            .as_ref()
            .map(|i| i as &dyn IncrementalInvalidation)
    }

    fn reload_project(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }
}
