//! Recognizing URLs that point at versioned CDN packages.
//!
//! The check is deliberately loose: a miss only means the URL is polled
//! locally instead of fetched.

use regex_lite::Regex;
use url::Url;

/// `/[prefix/[prefix/]][npm:][@scope/]name@version[/...]`
const PACKAGE_PATH: &str =
    r"^/(?:[\w.-]+/){0,2}(?:npm:)?(?:@[\w.-]+/)?[\w.-]+@[\w.^~<>=*+%-]+(?:/|$)";

/// Package-CDN URL heuristic.
#[derive(Debug, Clone)]
pub struct CdnHeuristic {
    hosts: Vec<String>,
    package_path: Option<Regex>,
}

impl CdnHeuristic {
    #[must_use]
    pub fn new(hosts: &[String]) -> Self {
        Self {
            hosts: hosts.iter().map(|h| h.to_ascii_lowercase()).collect(),
            package_path: Regex::new(PACKAGE_PATH).ok(),
        }
    }

    /// Known CDN host, or a path shaped like `name@version`.
    #[must_use]
    pub fn is_package_url(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let known_host = url
            .host_str()
            .is_some_and(|host| self.hosts.iter().any(|h| h == host));
        known_host
            || self
                .package_path
                .as_ref()
                .is_some_and(|re| re.is_match(url.path()))
    }
}
