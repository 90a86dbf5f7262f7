//! Specifier resolution against an import map.
//!
//! Scopes are tried before the global `imports` table, most specific scope
//! (most path segments) first. Ties keep key order.

use super::{ImportMap, SpecifierMap};
use std::cmp::Reverse;
use url::Url;

/// Outcome of resolving one specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The mapped URL, or the original specifier when nothing matched.
    pub url: String,
    /// Whether any import map entry matched.
    pub matched: bool,
}

impl Resolution {
    fn matched(url: String) -> Self {
        Self { url, matched: true }
    }

    fn unmatched(specifier: &str) -> Self {
        Self {
            url: specifier.to_string(),
            matched: false,
        }
    }
}

/// Resolve `specifier` imported from `containing` using `map`.
#[must_use]
pub fn resolve(map: &ImportMap, specifier: &str, containing: &Url) -> Resolution {
    let base = map.base_url();

    let mut scopes: Vec<(Url, &SpecifierMap)> = map
        .scopes()
        .iter()
        .filter_map(|(key, imports)| {
            let scope_url = join_against_base(base, key)?;
            same_origin(&scope_url, containing).then_some((scope_url, imports))
        })
        .collect();
    scopes.sort_by_key(|(scope_url, _)| Reverse(segment_count(scope_url)));

    for (scope_url, imports) in &scopes {
        if !containing.path().starts_with(scope_url.path()) {
            continue;
        }
        if let Some(target) = match_import_url(imports, specifier) {
            return Resolution::matched(absolutize(base, target));
        }
    }

    if same_origin(base, containing) {
        if let Some(target) = match_import_url(map.imports(), specifier) {
            return Resolution::matched(absolutize(base, target));
        }
    }

    Resolution::unmatched(specifier)
}

/// Match `specifier` against one specifier map.
///
/// An exact key wins outright. Otherwise the longest key that is a package
/// prefix of the specifier wins: keys ending in `/` match any specifier that
/// starts with them, other keys only match when followed by `/`. The
/// unmatched remainder is appended to the mapped value.
#[must_use]
pub fn match_import_url(imports: &SpecifierMap, specifier: &str) -> Option<String> {
    if let Some(target) = imports.get(specifier) {
        return Some(target.clone());
    }

    let (key, target) = imports
        .iter()
        .filter(|(key, _)| {
            if key.ends_with('/') {
                specifier.starts_with(key.as_str())
            } else {
                specifier
                    .strip_prefix(key.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
            }
        })
        .max_by_key(|(key, _)| key.len())?;

    let rest = &specifier[key.len()..];
    let joined = if target.ends_with('/') && rest.starts_with('/') {
        format!("{target}{}", &rest[1..])
    } else {
        format!("{target}{rest}")
    };
    Some(joined)
}

/// Scheme, host and port equality.
///
/// `Url::origin` treats every `file:` URL as a distinct opaque origin, which
/// would make local import maps unusable, so the tuple is compared directly.
#[must_use]
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

/// Resolve a scope key or mapped value against the map's base URL.
///
/// For `file:` bases a leading `/` is relative to the directory holding the
/// import-map document, which plays the role of the site root.
pub(crate) fn join_against_base(base: &Url, input: &str) -> Option<Url> {
    if base.scheme() == "file" {
        if let Some(rest) = input.strip_prefix('/') {
            if !rest.starts_with('/') {
                return base.join("./").ok()?.join(rest).ok();
            }
        }
    }
    base.join(input).ok()
}

fn absolutize(base: &Url, target: String) -> String {
    let relative =
        target.starts_with("./") || target.starts_with("../") || target.starts_with('/');
    if relative {
        if let Some(url) = join_against_base(base, &target) {
            return url.into();
        }
    }
    target
}

fn segment_count(url: &Url) -> usize {
    url.path_segments()
        .map_or(0, |segments| segments.filter(|s| !s.is_empty()).count())
}
