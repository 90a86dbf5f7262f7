use crate::cache::CacheError;
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for esmtypes operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid URL '{input}': {source}")]
    InvalidUrl {
        input: String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    #[must_use]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Parse `input` as an absolute URL.
    pub fn parse_url(input: &str) -> Result<url::Url, Self> {
        url::Url::parse(input).map_err(|source| Self::InvalidUrl {
            input: input.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_error_mentions_input() {
        let err = Error::parse_url("not a url").unwrap_err();
        assert!(err.to_string().contains("not a url"));
    }

    #[test]
    fn test_cache_error_is_transparent() {
        let err: Error = CacheError::status(404, "https://esm.sh/missing").into();
        assert!(err.to_string().starts_with("CACHE_STATUS"));
    }
}
