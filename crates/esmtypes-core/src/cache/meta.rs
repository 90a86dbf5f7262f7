//! On-disk metadata records and HTTP header handling.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Lower-cased header name → value.
pub type Headers = BTreeMap<String, String>;

pub const CACHE_CONTROL: &str = "cache-control";
pub const CONTENT_TYPE: &str = "content-type";
pub const X_TYPESCRIPT_TYPES: &str = "x-typescript-types";
pub const LOCATION: &str = "location";

/// Headers kept in metadata records. Everything else is dropped.
const PERSISTED_HEADERS: &[&str] = &[CACHE_CONTROL, CONTENT_TYPE, X_TYPESCRIPT_TYPES, LOCATION];

/// Metadata for one cached URL, stored as `meta/<hash>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub url: String,
    pub status_code: u16,
    pub headers: Headers,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
}

impl CacheEntry {
    /// Positive `max-age` in seconds, if the entry is cacheable at all.
    #[must_use]
    pub fn max_age(&self) -> Option<u64> {
        max_age(&self.headers)
    }

    /// `now > created_at + max_age * 1000`; entries without a usable
    /// `max-age` are always expired.
    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        match self.max_age() {
            Some(age) => now_ms > self.created_at.saturating_add(age.saturating_mul(1000)),
            None => true,
        }
    }

    /// Redirect target resolved against the entry URL.
    #[must_use]
    pub fn location(&self, url: &Url) -> Option<Url> {
        location(&self.headers, url)
    }
}

/// Keep only the persisted headers, lower-casing names.
#[must_use]
pub fn filter_headers(headers: &Headers) -> Headers {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let name = name.to_ascii_lowercase();
            PERSISTED_HEADERS
                .contains(&name.as_str())
                .then(|| (name, value.clone()))
        })
        .collect()
}

/// Positive `max-age` from `cache-control`.
///
/// `no-store`, a missing directive, and zero or negative values all mean
/// "do not cache".
#[must_use]
pub fn max_age(headers: &Headers) -> Option<u64> {
    let value = headers.get(CACHE_CONTROL)?;
    let mut age = None;
    for directive in value.split(',') {
        let directive = directive.trim().to_ascii_lowercase();
        if directive == "no-store" {
            return None;
        }
        if let Some(raw) = directive.strip_prefix("max-age=") {
            age = raw.trim().trim_matches('"').parse::<i64>().ok();
        }
    }
    age.filter(|a| *a > 0).and_then(|a| u64::try_from(a).ok())
}

/// Redirect `location` header resolved against `url`.
#[must_use]
pub fn location(headers: &Headers, url: &Url) -> Option<Url> {
    headers.get(LOCATION).and_then(|l| url.join(l).ok())
}

/// `x-typescript-types` header resolved against `url`.
#[must_use]
pub fn types_url(headers: &Headers, url: &Url) -> Option<Url> {
    headers.get(X_TYPESCRIPT_TYPES).and_then(|t| url.join(t).ok())
}

#[must_use]
pub fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

#[must_use]
pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}
