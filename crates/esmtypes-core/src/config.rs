//! Project configuration.
//!
//! Loaded from `esmtypes.json` in the project root when present:
//!
//! ```json
//! {
//!   "canonicalHost": "esm.sh",
//!   "jsxImportSource": "https://esm.sh/react@18",
//!   "importMaps": ["index.html"],
//!   "refreshDebounceMs": 300
//! }
//! ```
//!
//! Every field is optional. Unknown fields are ignored.

use crate::error::Error;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name looked up in the project root.
pub const CONFIG_FILE: &str = "esmtypes.json";

/// Import-map documents picked up when `importMaps` is not configured.
pub const DEFAULT_IMPORT_MAP_DOCUMENTS: &[&str] = &["index.html", "importmap.json"];

/// Resolver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolverConfig {
    /// Cache root. Relative paths are resolved against the project root.
    pub cache_dir: Option<PathBuf>,

    /// CDN host whose URLs map to flat paths in the declaration store.
    pub canonical_host: String,

    /// Hosts treated as package CDNs for eager fetching.
    pub cdn_hosts: Vec<String>,

    /// Module providing `jsx-runtime`, e.g. `https://esm.sh/react@18`.
    pub jsx_import_source: Option<String>,

    /// Import-map documents (HTML or JSON), relative to the project root.
    pub import_maps: Option<Vec<PathBuf>>,

    /// Quiet window before a refresh is sent to the host.
    pub refresh_debounce_ms: u64,

    /// HTTP connect timeout.
    pub connect_timeout_ms: u64,

    /// HTTP request timeout.
    pub request_timeout_ms: u64,

    /// Redirect hops followed before a chain is treated as a loop.
    pub max_redirects: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            canonical_host: "esm.sh".to_string(),
            cdn_hosts: [
                "esm.sh",
                "cdn.jsdelivr.net",
                "unpkg.com",
                "cdn.skypack.dev",
                "ga.jspm.io",
                "esm.run",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            jsx_import_source: None,
            import_maps: None,
            refresh_debounce_ms: 300,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
            max_redirects: 10,
        }
    }
}

impl ResolverConfig {
    /// Load `esmtypes.json` from `root`, falling back to defaults when absent.
    ///
    /// A present but unreadable or malformed file is an error.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
            path: path.clone(),
            source,
        })?;
        let mut config: Self =
            serde_json::from_str(&text).map_err(|source| Error::ConfigParse { path, source })?;

        if let Some(dir) = config.cache_dir.take() {
            config.cache_dir = Some(if dir.is_absolute() { dir } else { root.join(dir) });
        }
        Ok(config)
    }

    /// Resolved cache root: the configured directory or the platform default.
    #[must_use]
    pub fn cache_root(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(paths::cache_dir)
    }

    /// Import-map documents under `root` that should be loaded.
    ///
    /// Configured documents are returned as given; the defaults only when they exist.
    #[must_use]
    pub fn import_map_documents(&self, root: &Path) -> Vec<PathBuf> {
        match &self.import_maps {
            Some(docs) => docs.iter().map(|d| root.join(d)).collect(),
            None => DEFAULT_IMPORT_MAP_DOCUMENTS
                .iter()
                .map(|d| root.join(d))
                .filter(|p| p.is_file())
                .collect(),
        }
    }

    #[must_use]
    pub fn refresh_debounce(&self) -> Duration {
        Duration::from_millis(self.refresh_debounce_ms)
    }

    /// Set the cache root.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Set the JSX import source.
    #[must_use]
    pub fn with_jsx_import_source(mut self, source: impl Into<String>) -> Self {
        self.jsx_import_source = Some(source.into());
        self
    }

    /// Set the refresh debounce window.
    #[must_use]
    pub fn with_refresh_debounce_ms(mut self, ms: u64) -> Self {
        self.refresh_debounce_ms = ms;
        self
    }
}
