//! Declaration-file store layout.
//!
//! Remote URLs map to paths under the store root:
//!
//! | URL                                   | Store path                                  |
//! |---------------------------------------|---------------------------------------------|
//! | `https://esm.sh/react@18/index.d.ts`  | `react@18/index.d.ts`                       |
//! | `https://unpkg.com/x@1/x.d.ts`        | `_hosts/https/unpkg.com/x@1/x.d.ts`         |
//! | `http://localhost:8080/a.d.ts`        | `_hosts/http/localhost+8080/a.d.ts`         |
//! | `https://esm.sh/x.d.ts?target=es2022` | `_query/<blake3 of url>/x.d.ts`             |
//!
//! The mapping depends on the URL alone, so callers can predict where a
//! declaration file will land before it is fetched.

use esmtypes_util::hash::blake3_str;
use std::path::{Component, Path, PathBuf};
use url::Url;

/// Directory holding URLs from non-canonical origins.
pub const HOSTS_DIR: &str = "_hosts";

/// Directory holding URLs that carry a query string.
pub const QUERY_DIR: &str = "_query";

/// File name used when a URL path ends in `/`.
const INDEX_FILE: &str = "index";

/// What a store path points back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKey {
    /// The path encodes its URL directly.
    Url(Url),
    /// The path is hashed; the URL lives in the metadata record for this hash.
    Hashed(String),
}

/// Pure URL ↔ path mapping rooted at one directory.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
    canonical_host: String,
}

impl StoreLayout {
    #[must_use]
    pub fn new(root: PathBuf, canonical_host: impl Into<String>) -> Self {
        Self {
            root,
            canonical_host: canonical_host.into(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the body of `url` is stored.
    #[must_use]
    pub fn store_path(&self, url: &Url) -> PathBuf {
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        let file_name = if url.path().ends_with('/') || segments.is_empty() {
            INDEX_FILE
        } else {
            segments[segments.len() - 1]
        };

        if url.query().is_some() {
            let mut keyed = url.clone();
            keyed.set_fragment(None);
            return self
                .root
                .join(QUERY_DIR)
                .join(blake3_str(keyed.as_str()))
                .join(file_name);
        }

        let mut path = if self.is_canonical(url, &segments) {
            self.root.clone()
        } else {
            self.root
                .join(HOSTS_DIR)
                .join(url.scheme())
                .join(host_dir(url))
        };
        for segment in &segments {
            path.push(segment);
        }
        if url.path().ends_with('/') || segments.is_empty() {
            path.push(INDEX_FILE);
        }
        path
    }

    /// Inverse of [`store_path`](Self::store_path).
    ///
    /// Returns `None` for paths outside the store or that no URL maps to.
    #[must_use]
    pub fn restore(&self, path: &Path) -> Option<StoreKey> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect::<Option<_>>()?;

        match parts.as_slice() {
            [] => None,
            [QUERY_DIR, hash, _file] => Some(StoreKey::Hashed((*hash).to_string())),
            [QUERY_DIR, ..] => None,
            [HOSTS_DIR, scheme, host, rest @ ..] if !rest.is_empty() => {
                let host = host.replacen('+', ":", 1);
                Url::parse(&format!("{scheme}://{host}/{}", rest.join("/")))
                    .ok()
                    .map(StoreKey::Url)
            }
            [HOSTS_DIR, ..] => None,
            rest => Url::parse(&format!("https://{}/{}", self.canonical_host, rest.join("/")))
                .ok()
                .map(StoreKey::Url),
        }
    }

    /// Whether `path` lies inside the store.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    fn is_canonical(&self, url: &Url, segments: &[&str]) -> bool {
        url.scheme() == "https"
            && url.host_str() == Some(self.canonical_host.as_str())
            && url.port().is_none()
            && !matches!(segments.first(), Some(&(HOSTS_DIR | QUERY_DIR)))
    }
}

fn host_dir(url: &Url) -> String {
    let host = url.host_str().unwrap_or("_");
    match url.port() {
        Some(port) => format!("{host}+{port}"),
        None => host.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> StoreLayout {
        StoreLayout::new(PathBuf::from("/cache/types"), "esm.sh")
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_canonical_host_is_flat() {
        let path = layout().store_path(&url("https://esm.sh/react@18.2.0/index.d.ts"));
        assert_eq!(path, PathBuf::from("/cache/types/react@18.2.0/index.d.ts"));
    }

    #[test]
    fn test_other_host_is_namespaced() {
        let path = layout().store_path(&url("https://cdn.jsdelivr.net/npm/preact@10/src/index.d.ts"));
        assert_eq!(
            path,
            PathBuf::from("/cache/types/_hosts/https/cdn.jsdelivr.net/npm/preact@10/src/index.d.ts")
        );
    }

    #[test]
    fn test_port_and_scheme_are_kept() {
        let path = layout().store_path(&url("http://localhost:8080/a.d.ts"));
        assert_eq!(path, PathBuf::from("/cache/types/_hosts/http/localhost+8080/a.d.ts"));

        let path = layout().store_path(&url("http://esm.sh/a.d.ts"));
        assert_eq!(path, PathBuf::from("/cache/types/_hosts/http/esm.sh/a.d.ts"));
    }

    #[test]
    fn test_query_is_hashed() {
        let a = layout().store_path(&url("https://esm.sh/x.d.ts?target=es2022"));
        let b = layout().store_path(&url("https://esm.sh/x.d.ts?target=es2020"));
        assert_ne!(a, b);
        assert!(a.starts_with("/cache/types/_query"));
        assert!(a.ends_with("x.d.ts"));
    }

    #[test]
    fn test_store_path_is_deterministic() {
        let u = url("https://esm.sh/x.d.ts?dev");
        assert_eq!(layout().store_path(&u), layout().store_path(&u));
    }

    #[test]
    fn test_restore_canonical_and_namespaced() {
        for s in [
            "https://esm.sh/react@18.2.0/index.d.ts",
            "https://esm.sh/@types/react@18/jsx-runtime.d.ts",
            "https://unpkg.com/x@1/x.d.ts",
            "http://localhost:8080/deep/a.d.ts",
        ] {
            let u = url(s);
            let restored = layout().restore(&layout().store_path(&u));
            assert_eq!(restored, Some(StoreKey::Url(u)), "round trip of {s}");
        }
    }

    #[test]
    fn test_reserved_first_segment_on_canonical_host_is_namespaced() {
        let u = url("https://esm.sh/_hosts/x.d.ts");
        let path = layout().store_path(&u);
        assert!(path.starts_with("/cache/types/_hosts/https/esm.sh"));
        assert_eq!(layout().restore(&path), Some(StoreKey::Url(u)));
    }

    #[test]
    fn test_restore_query_returns_hash() {
        let path = layout().store_path(&url("https://esm.sh/x.d.ts?dev"));
        assert!(matches!(layout().restore(&path), Some(StoreKey::Hashed(_))));
    }

    #[test]
    fn test_restore_outside_store() {
        assert_eq!(layout().restore(Path::new("/project/src/main.ts")), None);
        assert_eq!(layout().restore(Path::new("/cache/types")), None);
        assert_eq!(layout().restore(Path::new("/cache/types/_hosts/https")), None);
    }
}
