//! Fetch cache error types.

use std::fmt;
use std::io;

/// Fetch cache error codes.
pub mod codes {
    pub const CACHE_IO: &str = "CACHE_IO";
    pub const CACHE_HTTP: &str = "CACHE_HTTP";
    pub const CACHE_TIMEOUT: &str = "CACHE_TIMEOUT";
    pub const CACHE_INVALID_URL: &str = "CACHE_INVALID_URL";
    pub const CACHE_STATUS: &str = "CACHE_STATUS";
    pub const CACHE_REDIRECT_LOOP: &str = "CACHE_REDIRECT_LOOP";
}

/// Fetch cache error.
#[derive(Debug, Clone)]
pub struct CacheError {
    code: &'static str,
    message: String,
}

impl CacheError {
    /// Create a new error with the given code and message.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Transport-level failure.
    pub fn http(msg: impl Into<String>) -> Self {
        Self::new(codes::CACHE_HTTP, msg)
    }

    /// Unparseable URL or redirect target.
    pub fn invalid_url(msg: impl Into<String>) -> Self {
        Self::new(codes::CACHE_INVALID_URL, msg)
    }

    /// Upstream answered with a non-success status.
    #[must_use]
    pub fn status(status: u16, url: &str) -> Self {
        Self::new(codes::CACHE_STATUS, format!("{url} responded with status {status}"))
    }

    /// Redirect chain looped or exceeded the hop limit.
    #[must_use]
    pub fn redirect_loop(url: &str) -> Self {
        Self::new(
            codes::CACHE_REDIRECT_LOOP,
            format!("Too many redirects starting at {url}"),
        )
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CacheError {}

impl From<io::Error> for CacheError {
    fn from(e: io::Error) -> Self {
        Self::new(codes::CACHE_IO, e.to_string())
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::new(codes::CACHE_TIMEOUT, format!("Request timed out: {e}"))
        } else if e.is_connect() {
            Self::new(codes::CACHE_HTTP, format!("Connection failed: {e}"))
        } else {
            Self::new(codes::CACHE_HTTP, e.to_string())
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(codes::CACHE_IO, format!("Invalid cache metadata: {e}"))
    }
}

impl From<url::ParseError> for CacheError {
    fn from(e: url::ParseError) -> Self {
        Self::new(codes::CACHE_INVALID_URL, e.to_string())
    }
}
