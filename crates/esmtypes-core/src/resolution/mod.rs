//! Module resolution for remote ES modules.
//!
//! [`ModuleResolver::resolve_module_name`] is called synchronously by the
//! host for every import it cannot resolve itself. It answers from what is
//! already known (in memory, then on disk) and never waits on the network.
//! Unknown URLs are handed to a background task; when that task settles a
//! debounced refresh asks the host to resolve again, at which point the
//! answer is accurate.
//!
//! Each absolute module URL is in one [`ModuleState`], or unknown:
//!
//! ```text
//!            ┌──────────── fetch ok, types ──────────▶ Typed(path)
//!  unknown ──┼──────────── fetch ok, no types ───────▶ Runtime
//!            ├──────────── 3xx ──────────────────────▶ Redirected(url)
//!            └──────────── error / non-2xx / loop ───▶ Bad
//! ```
//!
//! States never change until [`ModuleResolver::reset`].

mod cdn;
mod debounce;
mod documents;
mod host;
mod state;

pub use cdn::CdnHeuristic;
pub use debounce::Debouncer;
pub use documents::ImportMapSet;
pub use host::{refresh_host, HostProject, IncrementalInvalidation, RefreshStrategy};
pub use state::{ModuleState, ResolverStats, StateTable};

use crate::cache::{CacheError, FetchCache};
use crate::config::ResolverConfig;
use crate::error::Error;
use crate::extension::{declaration_suffix, is_declaration_path, Extension};
use crate::import_map::{self, ImportMap, Resolution};
use esmtypes_util::fs::read_to_string_lossy;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, info, info_span, warn, Instrument, Span};
use url::Url;

/// A module location handed back to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedModule {
    /// Local file path, or the remote URL for runtime-only modules.
    pub resolved_path: String,
    pub extension: Extension,
    /// Set when `resolved_path` is a URL rather than a file on disk.
    pub uses_non_standard_extension: bool,
}

impl ResolvedModule {
    /// A local declaration file.
    #[must_use]
    pub fn declaration(path: &Path) -> Self {
        let extension = Extension::from_path(&path.to_string_lossy())
            .filter(|ext| ext.is_declaration())
            .unwrap_or(Extension::Dts);
        Self {
            resolved_path: path.display().to_string(),
            extension,
            uses_non_standard_extension: false,
        }
    }

    /// A remote module with no local types, identified by its URL.
    #[must_use]
    pub fn runtime(url: &Url) -> Self {
        let extension = match Extension::from_path(url.path()) {
            Some(ext @ (Extension::Mjs | Extension::Cjs)) => ext,
            _ => Extension::Js,
        };
        Self {
            resolved_path: url.to_string(),
            extension,
            uses_non_standard_extension: true,
        }
    }

    fn local(path: &Path, extension: Extension) -> Self {
        Self {
            resolved_path: path.display().to_string(),
            extension,
            uses_non_standard_extension: false,
        }
    }
}

/// One completion suggestion from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionEntry {
    pub name: String,
    /// File the suggestion would import from.
    pub source: Option<PathBuf>,
}

/// Why a resolution attempt was abandoned.
///
/// Never surfaces from the resolution hook, which logs it and returns `None`.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Cannot resolve '{specifier}' against {base}: {source}")]
    InvalidSpecifier {
        specifier: String,
        base: Url,
        #[source]
        source: url::ParseError,
    },

    #[error("Containing file is not an absolute path or URL: {0}")]
    InvalidContainingFile(String),

    #[error("Redirect chain from {0} is longer than {1} hops")]
    TooManyRedirects(Url, usize),
}

/// Builder for [`ModuleResolver`].
pub struct ModuleResolverBuilder {
    config: ResolverConfig,
    host: Arc<dyn HostProject>,
    project_root: Option<PathBuf>,
    project_name: Option<String>,
    cache: Option<FetchCache>,
    runtime: Option<Handle>,
}

impl ModuleResolverBuilder {
    /// Use an existing fetch cache instead of one built from the config.
    #[must_use]
    pub fn cache(mut self, cache: FetchCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Runtime for background tasks. Defaults to the current one.
    #[must_use]
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Directory import-map documents are looked up in. Defaults to the
    /// working directory.
    #[must_use]
    pub fn project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = Some(root.into());
        self
    }

    /// Name recorded on the resolver's tracing span.
    #[must_use]
    pub fn project_name(mut self, name: impl Into<String>) -> Self {
        self.project_name = Some(name.into());
        self
    }

    /// Build the resolver.
    ///
    /// # Errors
    /// Returns an error when no tokio runtime is available, the working
    /// directory cannot be read, or the HTTP client cannot be created.
    pub fn build(self) -> Result<ModuleResolver, Error> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current()
                .map_err(|e| Error::other(format!("No tokio runtime available: {e}")))?,
        };
        let project_root = match self.project_root {
            Some(root) => root,
            None => std::env::current_dir()?,
        };
        let cache = match self.cache {
            Some(cache) => cache,
            None => FetchCache::from_config(&self.config)?,
        };
        let project_name = self.project_name.unwrap_or_else(|| {
            project_root.file_name().map_or_else(
                || project_root.display().to_string(),
                |name| name.to_string_lossy().into_owned(),
            )
        });

        let span = info_span!("project", project = %project_name);
        let refresh_span = span.clone();
        let host = self.host;
        let refresh = Debouncer::spawn(&runtime, self.config.refresh_debounce(), move || {
            let _entered = refresh_span.enter();
            let strategy = refresh_host(host.as_ref());
            info!(%strategy, "Refreshed host project");
        });

        span.in_scope(|| {
            debug!(
                root = %project_root.display(),
                cache = %cache.root().display(),
                "Module resolver created"
            );
        });

        Ok(ModuleResolver {
            inner: Arc::new(Inner {
                cdn: CdnHeuristic::new(&self.config.cdn_hosts),
                config: self.config,
                project_root,
                project_name,
                cache,
                runtime,
                span,
                state: Mutex::new(StateTable::new()),
                documents: Mutex::new(ImportMapSet::new()),
                refresh,
                idle: Notify::new(),
            }),
        })
    }
}

/// Resolves remote module specifiers for one host project.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ModuleResolver {
    inner: Arc<Inner>,
}

impl fmt::Debug for ModuleResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleResolver")
            .field("project", &self.inner.project_name)
            .field("root", &self.inner.project_root)
            .finish_non_exhaustive()
    }
}

impl ModuleResolver {
    #[must_use]
    pub fn builder(config: ResolverConfig, host: Arc<dyn HostProject>) -> ModuleResolverBuilder {
        ModuleResolverBuilder {
            config,
            host,
            project_root: None,
            project_name: None,
            cache: None,
            runtime: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn cache(&self) -> &FetchCache {
        &self.inner.cache
    }

    #[must_use]
    pub fn project_root(&self) -> &Path {
        &self.inner.project_root
    }

    /// Resolve `specifier` imported from `containing_file`.
    ///
    /// `containing_file` is a local path or a remote module URL previously
    /// returned by this method. Returns `None` to let the host fall back to
    /// its own resolution.
    #[must_use]
    pub fn resolve_module_name(&self, specifier: &str, containing_file: &str) -> Option<ResolvedModule> {
        let _entered = self.inner.span.enter();
        match self.inner.resolve(specifier, containing_file, 0) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(specifier, containing = containing_file, error = %e, "Module resolution failed");
                None
            }
        }
    }

    /// Drop completion entries that would import from the cache store.
    #[must_use]
    pub fn filter_completions(&self, entries: Vec<CompletionEntry>) -> Vec<CompletionEntry> {
        entries
            .into_iter()
            .filter(|entry| {
                entry
                    .source
                    .as_deref()
                    .map_or(true, |source| !self.inner.cache.is_in_store(source))
            })
            .collect()
    }

    /// Re-read an import-map document.
    ///
    /// Returns `true` (and schedules a refresh) if its mappings changed.
    pub fn on_document_changed(&self, path: &Path, text: &str) -> bool {
        let _entered = self.inner.span.enter();
        let map = match ImportMap::from_document(path, text) {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring import map document");
                return false;
            }
        };

        let changed = self.inner.lock_documents().insert(path.to_path_buf(), map);
        if changed {
            info!(path = %path.display(), "Import map changed");
            self.inner.refresh.trigger();
        } else {
            debug!(path = %path.display(), "Import map unchanged");
        }
        changed
    }

    /// Forget an import-map document. Returns `true` if that changed anything.
    pub fn on_document_removed(&self, path: &Path) -> bool {
        let _entered = self.inner.span.enter();
        let changed = self.inner.lock_documents().remove(path);
        if changed {
            info!(path = %path.display(), "Import map removed");
            self.inner.refresh.trigger();
        }
        changed
    }

    /// Load the configured import-map documents from the project root.
    ///
    /// Unreadable documents are skipped with a warning. Does not refresh.
    ///
    /// # Errors
    /// Returns an error if a document path cannot be used as a base URL.
    pub fn load_documents(&self) -> Result<usize, Error> {
        let _entered = self.inner.span.enter();
        let mut loaded = 0;
        for path in self.inner.config.import_map_documents(&self.inner.project_root) {
            let text = match read_to_string_lossy(&path) {
                Ok(text) => text,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot read import map document");
                    continue;
                }
            };
            let map = ImportMap::from_document(&path, &text)?;
            self.inner.lock_documents().insert(path, map);
            loaded += 1;
        }
        info!(count = loaded, "Loaded import map documents");
        Ok(loaded)
    }

    /// Number of loaded import-map documents.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.inner.lock_documents().len()
    }

    /// The host could not find `path`. If it is a store path for an unknown
    /// URL, fetch that URL in the background.
    ///
    /// Returns `true` if a fetch was started.
    pub fn on_missing_file(&self, path: &Path) -> bool {
        let _entered = self.inner.span.enter();
        if !self.inner.cache.is_in_store(path) {
            return false;
        }
        let Some(url) = self.inner.cache.restore_url(path) else {
            debug!(path = %path.display(), "Missing store file maps to no URL");
            return false;
        };
        debug!(path = %path.display(), url = %url, "Missing store file");
        self.inner.spawn_background(&url, true)
    }

    /// Forget every classification, including `Bad` URLs.
    pub fn reset(&self) {
        self.inner.lock_state().reset();
        self.inner.idle.notify_waiters();
        self.inner.span.in_scope(|| info!("Resolution state reset"));
    }

    /// Wait until no background task is in flight.
    pub async fn settled(&self) {
        loop {
            let mut notified = std::pin::pin!(self.inner.idle.notified());
            notified.as_mut().enable();
            let pending = self.inner.lock_state().in_flight_count();
            if pending == 0 {
                return;
            }
            notified.await;
        }
    }

    #[must_use]
    pub fn stats(&self) -> ResolverStats {
        self.inner.lock_state().stats()
    }
}

struct Inner {
    config: ResolverConfig,
    project_root: PathBuf,
    project_name: String,
    cache: FetchCache,
    cdn: CdnHeuristic,
    runtime: Handle,
    span: Span,
    state: Mutex<StateTable>,
    documents: Mutex<ImportMapSet>,
    refresh: Debouncer,
    idle: Notify,
}

/// Where an import is written.
struct Containing {
    url: Url,
    /// Set for files in the project, not for remote or store files.
    file: Option<PathBuf>,
    in_store: bool,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, StateTable> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_documents(&self) -> MutexGuard<'_, ImportMapSet> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(
        self: &Arc<Self>,
        specifier: &str,
        containing: &str,
        depth: usize,
    ) -> Result<Option<ResolvedModule>, ResolveError> {
        let origin = self.containing(containing)?;
        let resolution = self.apply_import_maps(specifier, &origin);

        let relative = is_relative_specifier(specifier);
        if !resolution.matched && !relative && !is_remote_specifier(specifier) {
            return Ok(None);
        }

        let mut url = origin
            .url
            .join(&resolution.url)
            .map_err(|source| ResolveError::InvalidSpecifier {
                specifier: specifier.to_string(),
                base: origin.url.clone(),
                source,
            })?;
        url.set_fragment(None);
        if relative && !resolution.matched {
            inherit_declaration_extension(&mut url, &origin.url);
        }

        if !is_remote(&url) {
            return self.resolve_local(&url, resolution.matched, containing, depth);
        }

        let eager = resolution.matched
            || origin.file.is_none()
            || origin.in_store
            || depth > 0
            || self.cdn.is_package_url(&url)
            || self.is_jsx_runtime(specifier);
        self.resolve_url(&url, eager, 0)
    }

    /// A `file:` target: store files are mapped back to their URL, other
    /// files are only returned when an import map produced them.
    fn resolve_local(
        self: &Arc<Self>,
        url: &Url,
        matched: bool,
        containing: &str,
        depth: usize,
    ) -> Result<Option<ResolvedModule>, ResolveError> {
        let Ok(path) = url.to_file_path() else {
            return Ok(None);
        };

        if self.cache.is_in_store(&path) {
            if depth > 0 {
                return Ok(None);
            }
            return match self.cache.restore_url(&path) {
                Some(remote) => {
                    debug!(path = %path.display(), url = %remote, "Store path import");
                    self.resolve(remote.as_str(), containing, depth + 1)
                }
                None => Ok(None),
            };
        }

        if matched {
            if let Some(ext) = Extension::from_path(&path.to_string_lossy()) {
                return Ok(Some(ResolvedModule::local(&path, ext)));
            }
        }
        Ok(None)
    }

    fn resolve_url(
        self: &Arc<Self>,
        url: &Url,
        eager: bool,
        hops: usize,
    ) -> Result<Option<ResolvedModule>, ResolveError> {
        if hops > self.config.max_redirects {
            return Err(ResolveError::TooManyRedirects(url.clone(), self.config.max_redirects));
        }

        let known = self.lock_state().get(url).cloned();
        match known {
            Some(ModuleState::Bad) => Ok(None),
            Some(ModuleState::Redirected(target)) => self.resolve_url(&target, eager, hops + 1),
            Some(ModuleState::Typed(path)) => Ok(Some(ResolvedModule::declaration(&path))),
            Some(ModuleState::Runtime) => Ok(Some(ResolvedModule::runtime(url))),
            None => {
                let in_flight = self.lock_state().is_in_flight(url);
                if !in_flight {
                    if let Some(state) = classify_cached(&self.cache, url) {
                        debug!(url = %url, ?state, "Classified from disk cache");
                        self.memoize(None, url, state);
                        return self.resolve_url(url, eager, hops);
                    }
                    self.spawn_background(url, eager);
                }
                // Provisional answer until the refresh
                Ok(Some(ResolvedModule::runtime(url)))
            }
        }
    }

    fn containing(&self, containing: &str) -> Result<Containing, ResolveError> {
        let invalid = || ResolveError::InvalidContainingFile(containing.to_string());

        let path = match Url::parse(containing) {
            Ok(url) if is_remote(&url) => {
                return Ok(Containing {
                    url,
                    file: None,
                    in_store: false,
                })
            }
            Ok(url) if url.scheme() == "file" => url.to_file_path().map_err(|()| invalid())?,
            _ => PathBuf::from(containing),
        };

        if self.cache.is_in_store(&path) {
            if let Some(url) = self.cache.restore_url(&path) {
                return Ok(Containing {
                    url,
                    file: None,
                    in_store: true,
                });
            }
        }

        let url = Url::from_file_path(&path).map_err(|()| invalid())?;
        Ok(Containing {
            url,
            file: Some(path),
            in_store: false,
        })
    }

    fn apply_import_maps(&self, specifier: &str, origin: &Containing) -> Resolution {
        let documents = self.lock_documents();
        for map in documents.in_scope(origin.file.as_deref()) {
            let resolution = import_map::resolve(map, specifier, &origin.url);
            if resolution.matched {
                debug!(
                    specifier,
                    url = %resolution.url,
                    document = map.source_id().unwrap_or("<inline>"),
                    "Import map matched"
                );
                return resolution;
            }
        }
        Resolution {
            url: specifier.to_string(),
            matched: false,
        }
    }

    fn is_jsx_runtime(&self, specifier: &str) -> bool {
        self.config.jsx_import_source.as_deref().is_some_and(|source| {
            specifier
                .strip_prefix(source.trim_end_matches('/'))
                .is_some_and(|rest| rest == "/jsx-runtime" || rest == "/jsx-dev-runtime")
        })
    }

    /// Record a classification. `None` means the current generation.
    fn memoize(&self, generation: Option<u64>, url: &Url, state: ModuleState) -> bool {
        let mut table = self.lock_state();
        let generation = generation.unwrap_or_else(|| table.generation());
        table.transition(generation, url, state)
    }

    /// Start a background task for `url` unless one is running or the URL
    /// is already classified. Returns whether a task was started.
    fn spawn_background(self: &Arc<Self>, url: &Url, eager: bool) -> bool {
        let Some(generation) = self.lock_state().begin(url) else {
            return false;
        };
        debug!(url = %url, eager, "Starting background resolution");

        let inner = Arc::clone(self);
        let url = url.clone();
        self.runtime.spawn(
            async move {
                let recorded = if eager {
                    inner.fetch_chain(&url, generation).await
                } else {
                    inner.poll_local(&url, generation)
                };
                inner.complete(&url, generation, recorded);
            }
            .instrument(self.span.clone()),
        );
        true
    }

    /// Clear the in-flight marker. A refresh is only sent when the task
    /// `recorded` a state in the current generation.
    fn complete(&self, url: &Url, generation: u64, recorded: bool) {
        let (current, idle) = {
            let mut table = self.lock_state();
            let current = table.finish(generation, url);
            (current, table.in_flight_count() == 0)
        };
        if current && recorded {
            self.refresh.trigger();
        }
        if idle {
            self.idle.notify_waiters();
        }
    }

    /// Re-check the disk cache only. A miss leaves `url` unknown so a later
    /// eager reason can still fetch it.
    fn poll_local(&self, url: &Url, generation: u64) -> bool {
        match classify_cached(&self.cache, url) {
            Some(state) => {
                debug!(url = %url, ?state, "Local poll found cached module");
                self.memoize(Some(generation), url, state)
            }
            None => {
                debug!(url = %url, "Local poll missed");
                false
            }
        }
    }

    /// Fetch `url` and follow redirects, classifying every hop.
    ///
    /// Returns whether a state was recorded for `url` itself.
    async fn fetch_chain(&self, url: &Url, generation: u64) -> bool {
        let mut current = url.clone();
        let mut visited = vec![url.clone()];
        let mut hops = Vec::new();
        let mut recorded = false;

        loop {
            let state = match self.fetch_and_classify(&current).await {
                Ok(state) => state,
                Err(e) => {
                    warn!(url = %current, error = %e, "Fetch failed, marking module as bad");
                    ModuleState::Bad
                }
            };
            debug!(url = %current, ?state, "Fetched");

            let next = match &state {
                ModuleState::Redirected(target) => Some(target.clone()),
                _ => None,
            };
            let stored = self.memoize(Some(generation), &current, state);
            if current == *url {
                recorded = stored;
            }
            if !stored {
                break;
            }
            let Some(target) = next else { break };
            if visited.contains(&target) || visited.len() > self.config.max_redirects {
                warn!(url = %url, target = %target, "Redirect chain loops or is too long");
                break;
            }

            let began = self.lock_state().begin(&target);
            match began {
                Some(g) if g == generation => {}
                Some(g) => {
                    self.lock_state().finish(g, &target);
                    break;
                }
                // Classified already, or another task owns it
                None => break,
            }
            hops.push(target.clone());
            visited.push(target.clone());
            current = target;
        }

        for hop in &hops {
            self.complete(hop, generation, true);
        }
        recorded
    }

    async fn fetch_and_classify(&self, url: &Url) -> Result<ModuleState, CacheError> {
        let response = self.cache.fetch(url).await?;

        if response.is_redirect() {
            return response.location().map(ModuleState::Redirected).ok_or_else(|| {
                CacheError::invalid_url(format!("Redirect from {url} has no usable location"))
            });
        }
        if response.redirected {
            return Ok(ModuleState::Redirected(response.url));
        }
        if !response.is_success() {
            return Err(CacheError::status(response.status, url.as_str()));
        }
        if is_declaration_path(url.path()) {
            return Ok(response.body_path.map_or(ModuleState::Runtime, ModuleState::Typed));
        }
        match response.types_url() {
            Some(types) => self.fetch_types(&types).await,
            None => Ok(ModuleState::Runtime),
        }
    }

    /// Fetch the declaration file named by `x-typescript-types`.
    ///
    /// An unavailable declaration file leaves the module usable at runtime.
    async fn fetch_types(&self, types: &Url) -> Result<ModuleState, CacheError> {
        let mut current = types.clone();
        for _ in 0..=self.config.max_redirects {
            let response = self.cache.fetch(&current).await?;
            if response.is_redirect() {
                current = response.location().ok_or_else(|| {
                    CacheError::invalid_url(format!("Redirect from {current} has no usable location"))
                })?;
                continue;
            }

            if !response.is_success() {
                warn!(types = %current, status = response.status, "Declaration file unavailable");
            } else if let Some(path) = response.body_path {
                return Ok(ModuleState::Typed(path));
            } else {
                debug!(types = %current, "Declaration file is not cacheable");
            }
            return Ok(ModuleState::Runtime);
        }
        Err(CacheError::redirect_loop(types.as_str()))
    }
}

/// Classify `url` from the disk cache alone. `None` when inconclusive.
fn classify_cached(cache: &FetchCache, url: &Url) -> Option<ModuleState> {
    let hit = cache.query(url)?;
    if hit.redirected {
        return Some(ModuleState::Redirected(hit.url));
    }
    if !hit.is_success() {
        return None;
    }
    if is_declaration_path(url.path()) {
        return hit.body_path.map(ModuleState::Typed);
    }
    match hit.types_url() {
        Some(types) => cache
            .query(&types)
            .and_then(|t| t.body_path)
            .map(ModuleState::Typed),
        None => Some(ModuleState::Runtime),
    }
}

/// Extension-less imports inside declaration files refer to declaration
/// files of the same flavor.
fn inherit_declaration_extension(url: &mut Url, containing: &Url) {
    let Some(suffix) = declaration_suffix(containing.path()) else {
        return;
    };
    if url.path().ends_with('/') || Extension::from_path(url.path()).is_some() {
        return;
    }
    let path = format!("{}{suffix}", url.path());
    url.set_path(&path);
}

fn is_remote(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

fn is_remote_specifier(specifier: &str) -> bool {
    Url::parse(specifier).is_ok_and(|url| is_remote(&url))
}

fn is_relative_specifier(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/')
}
