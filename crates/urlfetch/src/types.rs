//! Core types for URLFetch

use crate::config::FetchConfig;
use crate::error::{FetchError, FetchErrorKind, ValidationError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Default per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: f64 = 15.0;

/// Smallest accepted timeout in seconds
pub const MIN_TIMEOUT_SECS: f64 = 1.0;

/// Largest accepted timeout in seconds
pub const MAX_TIMEOUT_SECS: f64 = 60.0;

fn default_timeout() -> f64 {
    DEFAULT_TIMEOUT_SECS
}

/// Batch fetch request as received from a caller
///
/// Nothing here is trusted until [`FetchRequest::validate`] has turned it
/// into a [`ValidRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchRequest {
    /// URLs to fetch, in the order results should be reported
    pub urls: Vec<String>,

    /// Per-request timeout in seconds (1-60, default 15)
    #[serde(default = "default_timeout")]
    pub timeout: f64,

    /// Requested concurrency (optional, server default when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<i64>,

    /// Also convert each page to Markdown
    #[serde(default)]
    pub to_markdown: bool,
}

impl Default for FetchRequest {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            timeout: DEFAULT_TIMEOUT_SECS,
            concurrency: None,
            to_markdown: false,
        }
    }
}

impl FetchRequest {
    /// Create a new request for the given URLs
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Set the timeout in seconds
    pub fn timeout(mut self, secs: f64) -> Self {
        self.timeout = secs;
        self
    }

    /// Set the requested concurrency
    pub fn concurrency(mut self, concurrency: i64) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Enable markdown conversion
    pub fn to_markdown(mut self) -> Self {
        self.to_markdown = true;
        self
    }

    /// Validate against the configured ceilings
    ///
    /// Reports the first violated constraint. Duplicate URLs are kept and
    /// fetched independently.
    pub fn validate(self, config: &FetchConfig) -> Result<ValidRequest, ValidationError> {
        if self.urls.is_empty() {
            return Err(ValidationError::EmptyUrls);
        }
        if self.urls.len() > config.max_urls {
            return Err(ValidationError::TooManyUrls {
                max: config.max_urls,
            });
        }
        if let Some(bad) = self.urls.iter().find(|url| !is_absolute_url(url)) {
            return Err(ValidationError::InvalidUrl(bad.clone()));
        }

        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&self.timeout) {
            return Err(ValidationError::TimeoutOutOfRange);
        }

        let requested = match self.concurrency {
            None => config.default_concurrency,
            Some(value) => usize::try_from(value)
                .ok()
                .filter(|v| (1..=config.max_concurrency).contains(v))
                .ok_or(ValidationError::ConcurrencyOutOfRange {
                    max: config.max_concurrency,
                })?,
        };
        let concurrency = requested
            .min(self.urls.len())
            .min(config.max_concurrency)
            .max(1);

        Ok(ValidRequest {
            timeout: Duration::from_secs_f64(self.timeout),
            urls: self.urls,
            concurrency,
            to_markdown: self.to_markdown,
        })
    }
}

/// Absolute means a non-empty scheme and a written `//authority`
///
/// `Url::parse` fills in a host for `http:example.com`; that form is
/// rejected here.
fn is_absolute_url(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw) else {
        return false;
    };
    let has_authority = raw
        .trim_start()
        .get(url.scheme().len()..)
        .is_some_and(|rest| rest.starts_with("://"));
    has_authority && url.host_str().is_some_and(|h| !h.is_empty())
}

/// A request that passed validation
///
/// Always holds at least one URL, a timeout within 1-60 seconds and an
/// effective concurrency no larger than the URL count or the ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRequest {
    urls: Vec<String>,
    timeout: Duration,
    concurrency: usize,
    to_markdown: bool,
}

impl ValidRequest {
    /// URLs in input order
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Effective concurrency
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Whether markdown conversion was requested
    pub fn to_markdown(&self) -> bool {
        self.to_markdown
    }
}

/// Outcome of fetching one URL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FetchResult {
    /// The requested URL, echoed back
    pub url: String,

    /// True when the status, content-type and extraction all succeeded
    pub ok: bool,

    /// HTTP status code, whenever a response was received
    pub status_code: Option<u16>,

    /// Charset used to decode the body
    pub charset: Option<String>,

    /// Plain-text extraction (only when ok)
    pub text: Option<String>,

    /// Markdown conversion (only when ok and requested)
    pub markdown: Option<String>,

    /// Human-readable failure cause (only when not ok)
    pub error: Option<String>,

    /// Failure class (only when not ok)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FetchErrorKind>,

    /// Body length before truncation
    pub bytes_downloaded: Option<u64>,

    /// Time spent on this URL, excluding the wait for a gate slot
    pub elapsed_ms: Option<u64>,
}

impl FetchResult {
    /// Create a not-yet-successful result for a URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Record a failure, discarding any extracted content
    pub fn fail(&mut self, err: &FetchError) {
        self.ok = false;
        self.text = None;
        self.markdown = None;
        self.error = Some(err.to_string());
        self.error_kind = Some(err.kind());
    }
}

/// Aggregated outcome of one batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FetchResponse {
    /// Number of URLs processed
    pub total: usize,

    /// Effective concurrency used
    pub concurrency: usize,

    /// Wall-clock time for the whole batch
    pub elapsed_ms: u64,

    /// One result per input URL, in input order
    pub results: Vec<FetchResult>,
}
