//! Error types for URLFetch

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while validating a batch request
///
/// These are the only errors surfaced at the request level; they are
/// returned before any network activity starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No URLs supplied
    #[error("urls must contain at least one URL")]
    EmptyUrls,

    /// More URLs than the configured ceiling
    #[error("urls cannot contain more than {max} items")]
    TooManyUrls { max: usize },

    /// URL lacks a scheme or authority
    #[error("Invalid URL provided: {0}")]
    InvalidUrl(String),

    /// Timeout outside of the accepted range
    #[error("timeout must be between 1 and 60 seconds")]
    TimeoutOutOfRange,

    /// Concurrency outside of the accepted range
    #[error("concurrency must be between 1 and {max}")]
    ConcurrencyOutOfRange { max: usize },
}

/// Closed set of per-URL failure causes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// A network phase exceeded its bound
    Timeout,
    /// DNS, connection, TLS or protocol failure
    Transport,
    /// Response received with an error status
    HttpStatus,
    /// Response content-type not in the allow-list
    UnsupportedContentType,
    /// Parsing or conversion failed
    Extraction,
}

/// Errors that can occur while fetching a single URL
///
/// Never propagated past the fetch unit: each one ends up in the
/// `error`/`error_kind` fields of that URL's result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Request timed out in some network phase
    #[error("timeout: {0}")]
    Timeout(String),

    /// Any other network-layer failure
    #[error("Request failed: {0}")]
    Transport(String),

    /// Server answered with a non-2xx status
    #[error("HTTP error {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// Content-type rejected by the allow-list
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// Content could not be converted
    #[error("Extraction failed: {0}")]
    Extraction(String),
}

impl FetchError {
    /// Create an error from a reqwest error
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }

    /// The failure class of this error
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Timeout(_) => FetchErrorKind::Timeout,
            FetchError::Transport(_) => FetchErrorKind::Transport,
            FetchError::HttpStatus { .. } => FetchErrorKind::HttpStatus,
            FetchError::UnsupportedContentType(_) => FetchErrorKind::UnsupportedContentType,
            FetchError::Extraction(_) => FetchErrorKind::Extraction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_messages() {
        assert_eq!(
            ValidationError::EmptyUrls.to_string(),
            "urls must contain at least one URL"
        );
        assert_eq!(
            ValidationError::TooManyUrls { max: 64 }.to_string(),
            "urls cannot contain more than 64 items"
        );
        assert_eq!(
            ValidationError::InvalidUrl("example.com".into()).to_string(),
            "Invalid URL provided: example.com"
        );
        assert_eq!(
            ValidationError::TimeoutOutOfRange.to_string(),
            "timeout must be between 1 and 60 seconds"
        );
        assert_eq!(
            ValidationError::ConcurrencyOutOfRange { max: 64 }.to_string(),
            "concurrency must be between 1 and 64"
        );
    }

    #[test]
    fn test_fetch_error_messages() {
        assert_eq!(
            FetchError::UnsupportedContentType("application/pdf".into()).to_string(),
            "Unsupported content type: application/pdf"
        );
        assert_eq!(
            FetchError::HttpStatus {
                status: 404,
                message: "Not Found".into()
            }
            .to_string(),
            "HTTP error 404: Not Found"
        );
        assert!(FetchError::Timeout("read".into())
            .to_string()
            .starts_with("timeout"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            FetchError::Timeout(String::new()).kind(),
            FetchErrorKind::Timeout
        );
        assert_eq!(
            FetchError::Transport(String::new()).kind(),
            FetchErrorKind::Transport
        );
        assert_eq!(
            FetchError::HttpStatus {
                status: 500,
                message: String::new()
            }
            .kind(),
            FetchErrorKind::HttpStatus
        );
        assert_eq!(
            FetchError::UnsupportedContentType(String::new()).kind(),
            FetchErrorKind::UnsupportedContentType
        );
        assert_eq!(
            FetchError::Extraction(String::new()).kind(),
            FetchErrorKind::Extraction
        );
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&FetchErrorKind::UnsupportedContentType).unwrap();
        assert_eq!(json, "\"unsupported_content_type\"");
    }
}
