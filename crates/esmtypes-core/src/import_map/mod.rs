//! Import maps.
//!
//! Validated, immutable snapshots of the WICG import-map JSON shape:
//!
//! ```json
//! { "imports": { "react": "https://esm.sh/react@18" },
//!   "scopes": { "/legacy/": { "react": "https://esm.sh/react@16" } } }
//! ```
//!
//! A map is rebuilt from its source document on every change and compared
//! with the previous snapshot through [`ImportMap::is_same`].

pub mod html;
pub mod resolve;

pub use resolve::{match_import_url, resolve, same_origin, Resolution};

use crate::error::Error;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;
use url::Url;

/// Specifier prefix → target URL prefix.
pub type SpecifierMap = BTreeMap<String, String>;

/// A validated import map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportMap {
    base_url: Url,
    imports: SpecifierMap,
    scopes: BTreeMap<String, SpecifierMap>,
    source_id: Option<String>,
}

impl ImportMap {
    /// An import map with no entries.
    #[must_use]
    pub fn blank(base_url: Url) -> Self {
        Self {
            base_url,
            imports: SpecifierMap::new(),
            scopes: BTreeMap::new(),
            source_id: None,
        }
    }

    /// Build an import map from parsed JSON.
    ///
    /// Only non-empty string values survive in `imports` and in each scope;
    /// scopes that are not objects are dropped. Anything that is not an
    /// object degrades to a blank map. Never fails.
    #[must_use]
    pub fn validate(raw: &Value, base_url: Url) -> Self {
        let mut map = Self::blank(base_url);
        let Some(obj) = raw.as_object() else {
            warn!(base = %map.base_url, "Import map is not a JSON object, using blank map");
            return map;
        };

        if let Some(imports) = obj.get("imports") {
            map.imports = validate_specifier_map(imports, "imports");
        }

        if let Some(scopes) = obj.get("scopes") {
            match scopes.as_object() {
                Some(scopes) => {
                    for (scope, entries) in scopes {
                        if entries.is_object() {
                            map.scopes
                                .insert(scope.clone(), validate_specifier_map(entries, scope));
                        } else {
                            warn!(scope = %scope, "Ignoring non-object import map scope");
                        }
                    }
                }
                None => warn!("Ignoring non-object import map \"scopes\""),
            }
        }

        map
    }

    /// Parse import-map JSON text. Invalid JSON degrades to a blank map.
    #[must_use]
    pub fn parse(text: &str, base_url: Url) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(raw) => Self::validate(&raw, base_url),
            Err(e) => {
                warn!(base = %base_url, error = %e, "Malformed import map JSON, using blank map");
                Self::blank(base_url)
            }
        }
    }

    /// Load an import map from a source document.
    ///
    /// HTML documents go through [`html::extract`]; anything else is parsed as
    /// JSON. The document URL becomes the base URL and the path the source id.
    ///
    /// # Errors
    /// Returns an error only if `path` cannot be turned into a `file:` URL.
    pub fn from_document(path: &Path, text: &str) -> Result<Self, Error> {
        let base_url = Url::from_file_path(path)
            .map_err(|()| Error::other(format!("Not an absolute path: {}", path.display())))?;
        let map = if is_html_document(path) {
            match html::extract(text) {
                Some(json) => Self::parse(&json, base_url),
                None => Self::blank(base_url),
            }
        } else {
            Self::parse(text, base_url)
        };

        Ok(map.with_source_id(path.display().to_string()))
    }

    /// Tag the map with the document it came from.
    #[must_use]
    pub fn with_source_id(mut self, id: impl Into<String>) -> Self {
        self.source_id = Some(id.into());
        self
    }

    /// Copy of this map with one more global entry.
    #[must_use]
    pub fn with_import(mut self, specifier: impl Into<String>, target: impl Into<String>) -> Self {
        let (specifier, target) = (specifier.into(), target.into());
        if !specifier.is_empty() && !target.is_empty() {
            self.imports.insert(specifier, target);
        }
        self
    }

    /// Copy of this map with one more entry in `scope`.
    #[must_use]
    pub fn with_scope_import(
        mut self,
        scope: impl Into<String>,
        specifier: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        let (specifier, target) = (specifier.into(), target.into());
        if !specifier.is_empty() && !target.is_empty() {
            self.scopes
                .entry(scope.into())
                .or_default()
                .insert(specifier, target);
        }
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn imports(&self) -> &SpecifierMap {
        &self.imports
    }

    #[must_use]
    pub fn scopes(&self) -> &BTreeMap<String, SpecifierMap> {
        &self.scopes
    }

    #[must_use]
    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    /// True iff there are no global entries and no scopes.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.imports.is_empty() && self.scopes.is_empty()
    }

    /// Structural equality over `imports` and `scopes`.
    ///
    /// Base URL and source id are not compared: two saves of the same
    /// document with identical mappings are the same map.
    #[must_use]
    pub fn is_same(&self, other: &Self) -> bool {
        self.imports == other.imports && self.scopes == other.scopes
    }

    /// Serialize back to the import-map JSON shape.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "imports": self.imports,
            "scopes": self.scopes,
        })
    }
}

/// Whether `path` is an HTML document (import map in a `<script>` tag).
#[must_use]
pub fn is_html_document(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"))
}

fn validate_specifier_map(raw: &Value, context: &str) -> SpecifierMap {
    let mut out = SpecifierMap::new();
    let Some(obj) = raw.as_object() else {
        warn!(context = %context, "Ignoring non-object specifier map");
        return out;
    };

    for (specifier, target) in obj {
        match target.as_str() {
            Some(target) if !target.is_empty() && !specifier.is_empty() => {
                out.insert(specifier.clone(), target.to_string());
            }
            _ => {
                warn!(context = %context, specifier = %specifier, "Dropping invalid import map entry");
            }
        }
    }
    out
}
