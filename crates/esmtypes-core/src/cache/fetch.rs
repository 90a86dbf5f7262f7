//! HTTP transport for the fetch cache.

use super::error::CacheError;
use super::meta::Headers;
use crate::config::ResolverConfig;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::redirect::Policy;
use reqwest::Client;
use std::fmt;
use std::time::Duration;
use url::Url;

/// A raw upstream response. Redirects are never followed by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Lower-cased header names.
    pub headers: Headers,
    pub body: Bytes,
}

impl HttpResponse {
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// Performs a single GET without following redirects.
#[async_trait]
pub trait Fetch: Send + Sync + fmt::Debug {
    async fn get(&self, url: &Url) -> Result<HttpResponse, CacheError>;
}

/// [`Fetch`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    http: Client,
}

impl ReqwestFetcher {
    /// Create a fetcher with the configured timeouts.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &ResolverConfig) -> Result<Self, CacheError> {
        let http = Client::builder()
            .redirect(Policy::none())
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(concat!("esmtypes/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CacheError::http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { http })
    }
}

#[async_trait]
impl Fetch for ReqwestFetcher {
    async fn get(&self, url: &Url) -> Result<HttpResponse, CacheError> {
        let response = self.http.get(url.as_str()).send().await?;
        let status = response.status().as_u16();

        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
            }
        }

        let body = response.bytes().await?;
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_builder_lowercases_headers() {
        let response = HttpResponse::new(200)
            .header("Cache-Control", "max-age=60")
            .body("export {}");
        assert_eq!(response.headers["cache-control"], "max-age=60");
        assert_eq!(response.body, Bytes::from_static(b"export {}"));
    }

    #[test]
    fn test_client_creation() {
        assert!(ReqwestFetcher::new(&ResolverConfig::default()).is_ok());
    }
}
