//! Persistent fetch cache.
//!
//! Layout under the cache root:
//!
//! - `meta/<blake3(url)>.json`: one [`CacheEntry`] per tracked URL
//! - `types/`: declaration-file bodies, see [`store`]
//!
//! Only responses with a positive `max-age` are persisted. Entries are
//! removed lazily when a query finds them expired, corrupt, or missing their
//! body. Concurrent fetches of one URL are not de-duplicated here.

mod error;
pub mod fetch;
pub mod meta;
pub mod store;

pub use error::{codes, CacheError};
pub use fetch::{Fetch, HttpResponse, ReqwestFetcher};
pub use meta::{CacheEntry, Headers};
pub use store::{StoreKey, StoreLayout};

use crate::config::ResolverConfig;
use crate::extension::is_declaration_path;
use esmtypes_util::fs::{atomic_write, remove_if_exists};
use esmtypes_util::hash::blake3_str;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use url::Url;

/// Metadata directory under the cache root.
pub const META_DIR: &str = "meta";

/// Declaration store directory under the cache root.
pub const TYPES_DIR: &str = "types";

/// Source of "now" for expiry checks.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A response served from disk or the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// Final URL: the end of the redirect chain for cache hits, the request
    /// URL for network responses.
    pub url: Url,
    pub status: u16,
    pub headers: Headers,
    /// Set when the metadata record was written, `None` if never persisted.
    pub created_at: Option<u64>,
    /// A cached redirect chain was followed to reach `url`.
    pub redirected: bool,
    pub from_cache: bool,
    /// Persisted declaration body, if any.
    pub body_path: Option<PathBuf>,
}

impl CachedResponse {
    fn uncached(url: Url, status: u16, headers: Headers) -> Self {
        Self {
            url,
            status,
            headers,
            created_at: None,
            redirected: false,
            from_cache: false,
            body_path: None,
        }
    }

    #[must_use]
    pub fn is_redirect(&self) -> bool {
        meta::is_redirect(self.status)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        meta::is_success(self.status)
    }

    /// Redirect target of an upstream redirect response.
    #[must_use]
    pub fn location(&self) -> Option<Url> {
        meta::location(&self.headers, &self.url)
    }

    /// Sibling declaration file named by `x-typescript-types`.
    #[must_use]
    pub fn types_url(&self) -> Option<Url> {
        meta::types_url(&self.headers, &self.url)
    }

    /// Read the persisted declaration body.
    ///
    /// # Errors
    /// Returns an error if there is no body or it cannot be read.
    pub fn read_body(&self) -> Result<String, CacheError> {
        let path = self
            .body_path
            .as_ref()
            .ok_or_else(|| CacheError::new(codes::CACHE_IO, format!("No body stored for {}", self.url)))?;
        Ok(esmtypes_util::fs::read_to_string_lossy(path)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    /// Full check: validates bodies and evicts stale records.
    Query,
    /// Metadata only, never deletes.
    Head,
}

/// On-disk, `max-age` aware cache of remote modules and declaration files.
#[derive(Debug, Clone)]
pub struct FetchCache {
    root: PathBuf,
    store: StoreLayout,
    fetcher: Arc<dyn Fetch>,
    clock: Arc<dyn Clock>,
    max_redirects: usize,
}

impl FetchCache {
    /// Create a cache rooted at `root` using `fetcher` for network access.
    #[must_use]
    pub fn new(root: PathBuf, canonical_host: &str, fetcher: Arc<dyn Fetch>) -> Self {
        let store = StoreLayout::new(root.join(TYPES_DIR), canonical_host);
        Self {
            root,
            store,
            fetcher,
            clock: Arc::new(SystemClock),
            max_redirects: ResolverConfig::default().max_redirects,
        }
    }

    /// Create a cache from configuration with the `reqwest` transport.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_config(config: &ResolverConfig) -> Result<Self, CacheError> {
        let fetcher = Arc::new(ReqwestFetcher::new(config)?);
        Ok(Self::new(config.cache_root(), &config.canonical_host, fetcher)
            .with_max_redirects(config.max_redirects))
    }

    /// Replace the clock used for expiry.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_max_redirects(mut self, hops: usize) -> Self {
        self.max_redirects = hops;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root of the declaration store.
    #[must_use]
    pub fn store_root(&self) -> &Path {
        self.store.root()
    }

    /// Metadata file for `url`.
    #[must_use]
    pub fn meta_path(&self, url: &Url) -> PathBuf {
        self.root
            .join(META_DIR)
            .join(format!("{}.json", blake3_str(strip_fragment(url).as_str())))
    }

    /// Deterministic body location for `url`.
    #[must_use]
    pub fn store_path(&self, url: &Url) -> PathBuf {
        self.store.store_path(&strip_fragment(url))
    }

    /// The URL whose body lives at `path`, if `path` is inside the store.
    ///
    /// Hashed (query-string) paths are looked up in their metadata record.
    #[must_use]
    pub fn restore_url(&self, path: &Path) -> Option<Url> {
        match self.store.restore(path)? {
            StoreKey::Url(url) => Some(url),
            StoreKey::Hashed(hash) => {
                let meta = self.root.join(META_DIR).join(format!("{hash}.json"));
                let entry: CacheEntry = serde_json::from_str(&fs::read_to_string(meta).ok()?).ok()?;
                Url::parse(&entry.url).ok()
            }
        }
    }

    /// Whether `path` lies inside the declaration store.
    #[must_use]
    pub fn is_in_store(&self, path: &Path) -> bool {
        self.store.contains(path)
    }

    /// Local-only lookup.
    ///
    /// Follows cached redirects (marking the result `redirected`) and evicts
    /// records that are corrupt, expired, or missing their declaration body.
    #[must_use]
    pub fn query(&self, url: &Url) -> Option<CachedResponse> {
        self.lookup(&strip_fragment(url), Lookup::Query, &mut Vec::new())
    }

    /// Metadata-only lookup. Never touches bodies and never deletes.
    #[must_use]
    pub fn head(&self, url: &Url) -> Option<CachedResponse> {
        self.lookup(&strip_fragment(url), Lookup::Head, &mut Vec::new())
    }

    /// Serve `url` from disk, or fetch it and persist what is cacheable.
    ///
    /// Upstream redirects are returned as-is, never followed.
    ///
    /// # Errors
    /// Returns an error on transport failure or if the cache cannot be written.
    pub async fn fetch(&self, url: &Url) -> Result<CachedResponse, CacheError> {
        let url = strip_fragment(url);
        if let Some(hit) = self.query(&url) {
            debug!(url = %url, final_url = %hit.url, "Cache hit");
            return Ok(hit);
        }

        debug!(url = %url, "Fetching");
        let response = self.fetcher.get(&url).await?;
        let headers = meta::filter_headers(&response.headers);
        let status = response.status;
        let cacheable = meta::max_age(&headers).is_some();

        if meta::is_redirect(status) {
            if cacheable {
                self.write_entry(&url, status, &headers)?;
            }
            return Ok(CachedResponse::uncached(url, status, headers));
        }

        if !meta::is_success(status) {
            debug!(url = %url, status, "Upstream returned non-success status");
            return Ok(CachedResponse::uncached(url, status, headers));
        }

        if !cacheable {
            debug!(url = %url, "Response has no usable max-age, not caching");
            return Ok(CachedResponse::uncached(url, status, headers));
        }

        // Body before metadata, so a record never points at a missing body.
        let body_path = if is_declaration_path(url.path()) {
            let path = self.store_path(&url);
            atomic_write(&path, &response.body)?;
            Some(path)
        } else {
            None
        };
        let created_at = self.write_entry(&url, status, &headers)?;

        Ok(CachedResponse {
            url,
            status,
            headers,
            created_at: Some(created_at),
            redirected: false,
            from_cache: false,
            body_path,
        })
    }

    /// Delete every metadata record and stored body.
    ///
    /// # Errors
    /// Returns an error if a directory exists but cannot be removed.
    pub fn clear(&self) -> Result<(), CacheError> {
        for dir in [self.root.join(META_DIR), self.store.root().to_path_buf()] {
            match fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn lookup(&self, url: &Url, mode: Lookup, visited: &mut Vec<Url>) -> Option<CachedResponse> {
        let meta_path = self.meta_path(url);
        let bytes = match fs::read(&meta_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                if mode == Lookup::Query {
                    warn!(url = %url, error = %e, "Unreadable cache metadata, removing");
                    self.evict(url);
                }
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                if mode == Lookup::Query {
                    warn!(url = %url, error = %e, "Corrupt cache metadata, removing");
                    self.evict(url);
                }
                return None;
            }
        };

        if entry.is_expired(self.clock.now_ms()) {
            if mode == Lookup::Query {
                debug!(url = %url, "Cache entry expired");
                self.evict(url);
            }
            return None;
        }

        if meta::is_redirect(entry.status_code) {
            let target = entry.location(url)?;
            visited.push(url.clone());
            if visited.contains(&target) || visited.len() > self.max_redirects {
                warn!(url = %url, target = %target, "Cached redirect loop");
                return None;
            }
            let mut resolved = self.lookup(&target, mode, visited)?;
            resolved.redirected = true;
            return Some(resolved);
        }

        let mut body_path = None;
        if mode == Lookup::Query && is_declaration_path(url.path()) {
            let path = self.store_path(url);
            if !path.is_file() {
                debug!(url = %url, "Declaration body missing, removing metadata");
                self.evict(url);
                return None;
            }
            body_path = Some(path);
        }

        Some(CachedResponse {
            url: url.clone(),
            status: entry.status_code,
            headers: entry.headers,
            created_at: Some(entry.created_at),
            redirected: false,
            from_cache: true,
            body_path,
        })
    }

    fn write_entry(&self, url: &Url, status: u16, headers: &Headers) -> Result<u64, CacheError> {
        let created_at = self.clock.now_ms();
        let entry = CacheEntry {
            url: url.to_string(),
            status_code: status,
            headers: headers.clone(),
            created_at,
        };
        atomic_write(&self.meta_path(url), &serde_json::to_vec_pretty(&entry)?)?;
        Ok(created_at)
    }

    fn evict(&self, url: &Url) {
        for path in [self.meta_path(url), self.store_path(url)] {
            if let Err(e) = remove_if_exists(&path) {
                warn!(path = %path.display(), error = %e, "Failed to remove cache file");
            }
        }
    }
}

fn strip_fragment(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ManualClock, MockFetcher};
    use std::time::Duration;
    use tempfile::tempdir;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn cache_with(root: &Path, fetcher: &Arc<MockFetcher>, clock: &Arc<ManualClock>) -> FetchCache {
        FetchCache::new(root.to_path_buf(), "esm.sh", fetcher.clone()).with_clock(clock.clone())
    }

    #[tokio::test]
    async fn test_round_trip_then_expiry() {
        let dir = tempdir().unwrap();
        let fetcher = MockFetcher::new();
        let clock = ManualClock::new(1_000_000);
        let cache = cache_with(dir.path(), &fetcher, &clock);
        let u = url("https://esm.sh/react@18/index.js");

        fetcher.route(
            u.as_str(),
            HttpResponse::new(200)
                .header("cache-control", "public, max-age=60")
                .header("content-type", "application/javascript")
                .header("x-typescript-types", "/react@18/index.d.ts")
                .header("etag", "dropped")
                .body("export default {}"),
        );

        let fetched = cache.fetch(&u).await.unwrap();
        assert!(!fetched.from_cache);
        assert!(fetched.body_path.is_none());

        let hit = cache.query(&u).unwrap();
        assert!(hit.from_cache);
        assert!(!hit.redirected);
        assert_eq!(hit.headers["cache-control"], "public, max-age=60");
        assert_eq!(hit.headers["x-typescript-types"], "/react@18/index.d.ts");
        assert!(!hit.headers.contains_key("etag"));

        clock.advance(Duration::from_secs(61));
        assert!(cache.query(&u).is_none());
        assert!(!cache.meta_path(&u).exists());
    }

    #[tokio::test]
    async fn test_uncacheable_responses_not_persisted() {
        let dir = tempdir().unwrap();
        let fetcher = MockFetcher::new();
        let clock = ManualClock::new(0);
        let cache = cache_with(dir.path(), &fetcher, &clock);

        let zero = url("https://esm.sh/zero.d.ts");
        let missing = url("https://esm.sh/missing.d.ts");
        fetcher.route(
            zero.as_str(),
            HttpResponse::new(200).header("cache-control", "max-age=0").body("x"),
        );
        fetcher.route(missing.as_str(), HttpResponse::new(200).body("x"));

        for u in [&zero, &missing] {
            let response = cache.fetch(u).await.unwrap();
            assert!(response.is_success());
            assert!(response.body_path.is_none());
            assert!(cache.query(u).is_none());
            assert!(!cache.meta_path(u).exists());
            assert!(!cache.store_path(u).exists());
        }

        cache.fetch(&zero).await.unwrap();
        assert_eq!(fetcher.calls_for(zero.as_str()), 2);
    }

    #[tokio::test]
    async fn test_non_success_not_persisted() {
        let dir = tempdir().unwrap();
        let fetcher = MockFetcher::new();
        let cache = cache_with(dir.path(), &fetcher, &ManualClock::new(0));
        let u = url("https://esm.sh/nope@1");
        fetcher.route(u.as_str(), HttpResponse::new(404).header("cache-control", "max-age=600"));

        let response = cache.fetch(&u).await.unwrap();
        assert_eq!(response.status, 404);
        assert!(cache.head(&u).is_none());
    }

    #[tokio::test]
    async fn test_redirect_then_query_is_transitive() {
        let dir = tempdir().unwrap();
        let fetcher = MockFetcher::new();
        let cache = cache_with(dir.path(), &fetcher, &ManualClock::new(0));
        let short = url("https://esm.sh/react@18");
        let full = url("https://esm.sh/react@18.2.0/index.js");

        fetcher.route(
            short.as_str(),
            HttpResponse::new(302)
                .header("location", "/react@18.2.0/index.js")
                .header("cache-control", "max-age=600"),
        );
        fetcher.route(
            full.as_str(),
            HttpResponse::new(200).header("cache-control", "max-age=31536000"),
        );

        let redirect = cache.fetch(&short).await.unwrap();
        assert_eq!(redirect.status, 302);
        assert_eq!(redirect.location(), Some(full.clone()));

        // Only the redirect is known so far
        assert!(cache.query(&short).is_none());

        cache.fetch(&full).await.unwrap();
        let hit = cache.query(&short).unwrap();
        assert!(hit.redirected);
        assert_eq!(hit.url, full);
        assert_eq!(hit.status, 200);

        // Served from disk now
        let again = cache.fetch(&short).await.unwrap();
        assert!(again.from_cache);
        assert_eq!(fetcher.calls_for(short.as_str()), 1);
    }

    #[tokio::test]
    async fn test_redirect_loop_is_miss() {
        let dir = tempdir().unwrap();
        let fetcher = MockFetcher::new();
        let cache = cache_with(dir.path(), &fetcher, &ManualClock::new(0));
        let a = url("https://esm.sh/a");
        let b = url("https://esm.sh/b");
        for (from, to) in [(&a, "/b"), (&b, "/a")] {
            fetcher.route(
                from.as_str(),
                HttpResponse::new(301).header("location", to).header("cache-control", "max-age=60"),
            );
            cache.fetch(from).await.unwrap();
        }

        assert!(cache.query(&a).is_none());
        assert!(cache.head(&b).is_none());
    }

    #[tokio::test]
    async fn test_declaration_body_persisted_and_self_heals() {
        let dir = tempdir().unwrap();
        let fetcher = MockFetcher::new();
        let cache = cache_with(dir.path(), &fetcher, &ManualClock::new(0));
        let u = url("https://esm.sh/react@18.2.0/index.d.ts");
        fetcher.route(
            u.as_str(),
            HttpResponse::new(200)
                .header("cache-control", "max-age=600")
                .body("export declare const version: string;"),
        );

        let fetched = cache.fetch(&u).await.unwrap();
        let body_path = fetched.body_path.clone().unwrap();
        assert_eq!(body_path, dir.path().join("types/react@18.2.0/index.d.ts"));
        assert!(fetched.read_body().unwrap().contains("version"));

        fs::remove_file(&body_path).unwrap();
        assert!(cache.head(&u).is_some());
        assert!(cache.query(&u).is_none());
        assert!(!cache.meta_path(&u).exists());
    }

    #[test]
    fn test_corrupt_metadata_is_removed() {
        let dir = tempdir().unwrap();
        let cache = cache_with(dir.path(), &MockFetcher::new(), &ManualClock::new(0));
        let u = url("https://esm.sh/broken");
        let meta = cache.meta_path(&u);
        fs::create_dir_all(meta.parent().unwrap()).unwrap();
        fs::write(&meta, "{ not json").unwrap();

        assert!(cache.head(&u).is_none());
        assert!(meta.exists());
        assert!(cache.query(&u).is_none());
        assert!(!meta.exists());
    }

    #[test]
    fn test_non_utf8_metadata_is_removed() {
        let dir = tempdir().unwrap();
        let cache = cache_with(dir.path(), &MockFetcher::new(), &ManualClock::new(0));
        let u = url("https://esm.sh/broken");
        let meta = cache.meta_path(&u);
        fs::create_dir_all(meta.parent().unwrap()).unwrap();
        fs::write(&meta, [0xff, 0xfe, 0x00, 0x7b]).unwrap();

        assert!(cache.head(&u).is_none());
        assert!(meta.exists());
        assert!(cache.query(&u).is_none());
        assert!(!meta.exists());
    }

    #[tokio::test]
    async fn test_expired_declaration_body_is_removed() {
        let dir = tempdir().unwrap();
        let fetcher = MockFetcher::new();
        let clock = ManualClock::new(1_000_000);
        let cache = cache_with(dir.path(), &fetcher, &clock);
        let u = url("https://esm.sh/preact@10/index.d.ts");
        fetcher.route(
            u.as_str(),
            HttpResponse::new(200)
                .header("cache-control", "max-age=30")
                .body("export declare function h(): void;"),
        );

        cache.fetch(&u).await.unwrap();
        assert!(cache.store_path(&u).is_file());
        assert!(cache.query(&u).is_some());

        clock.advance(Duration::from_secs(31));
        assert!(cache.query(&u).is_none());
        assert!(!cache.meta_path(&u).exists());
        assert!(!cache.store_path(&u).exists());
    }

    #[tokio::test]
    async fn test_head_does_not_evict_expired() {
        let dir = tempdir().unwrap();
        let fetcher = MockFetcher::new();
        let clock = ManualClock::new(0);
        let cache = cache_with(dir.path(), &fetcher, &clock);
        let u = url("https://esm.sh/a@1/a.js");
        fetcher.route(u.as_str(), HttpResponse::new(200).header("cache-control", "max-age=1"));
        cache.fetch(&u).await.unwrap();

        clock.advance(Duration::from_secs(5));
        assert!(cache.head(&u).is_none());
        assert!(cache.meta_path(&u).exists());
    }

    #[tokio::test]
    async fn test_restore_url_for_hashed_path() {
        let dir = tempdir().unwrap();
        let fetcher = MockFetcher::new();
        let cache = cache_with(dir.path(), &fetcher, &ManualClock::new(0));
        let u = url("https://esm.sh/x@1/x.d.ts?target=es2022");
        fetcher.route(
            u.as_str(),
            HttpResponse::new(200).header("cache-control", "max-age=60").body("export {}"),
        );

        let fetched = cache.fetch(&u).await.unwrap();
        let path = fetched.body_path.unwrap();
        assert!(cache.is_in_store(&path));
        assert_eq!(cache.restore_url(&path), Some(u));
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let dir = tempdir().unwrap();
        let cache = cache_with(dir.path(), &MockFetcher::new(), &ManualClock::new(0));
        let err = cache.fetch(&url("https://esm.sh/unrouted")).await.unwrap_err();
        assert_eq!(err.code(), codes::CACHE_HTTP);
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let dir = tempdir().unwrap();
        let fetcher = MockFetcher::new();
        let cache = cache_with(dir.path(), &fetcher, &ManualClock::new(0));
        let u = url("https://esm.sh/a.d.ts");
        fetcher.route(u.as_str(), HttpResponse::new(200).header("cache-control", "max-age=60"));
        cache.fetch(&u).await.unwrap();

        cache.clear().unwrap();
        assert!(cache.query(&u).is_none());
        assert!(!cache.store_root().exists());
        cache.clear().unwrap();
    }
}
