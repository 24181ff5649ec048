//! Process-wide fetch configuration
//!
//! [`FetchConfig`] holds the ceilings every request is clamped against.
//! It is built once at startup (usually via [`FetchConfig::from_env`]) and
//! handed to [`BatchFetcher`](crate::BatchFetcher); nothing mutates it afterwards.

use std::time::Duration;
use tracing::warn;

/// Default User-Agent string
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; URLFetch/0.1; +https://github.com/everruns/urlfetch)";

/// Default content-type keywords considered extractable
pub const DEFAULT_CONTENT_KEYWORDS: &[&str] = &["text", "html", "xml"];

const DEFAULT_CONCURRENCY: usize = 10;
const MAX_CONCURRENCY_FLOOR: usize = 64;
const DEFAULT_MAX_URLS: usize = 64;
const DEFAULT_MAX_BODY_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_CONNECT_TIMEOUT_SECS: f64 = 10.0;
const DEFAULT_READ_TIMEOUT_SECS: f64 = 15.0;
const MIN_TIMEOUT_SECS: f64 = 0.1;

/// Environment variable names
pub mod env {
    pub const DEFAULT_CONCURRENCY: &str = "URL_CRAWLER_DEFAULT_CONCURRENCY";
    pub const MAX_CONCURRENCY: &str = "URL_CRAWLER_MAX_CONCURRENCY";
    pub const MAX_URLS: &str = "URL_CRAWLER_MAX_URLS";
    pub const MAX_BODY_BYTES: &str = "URL_CRAWLER_MAX_BODY_BYTES";
    pub const MAX_CONNECTIONS: &str = "URL_CRAWLER_MAX_CONNECTIONS";
    pub const MAX_KEEPALIVE_CONNECTIONS: &str = "URL_CRAWLER_MAX_KEEPALIVE_CONNECTIONS";
    pub const CONNECT_TIMEOUT: &str = "URL_CRAWLER_CONNECT_TIMEOUT";
    pub const READ_TIMEOUT: &str = "URL_CRAWLER_READ_TIMEOUT";
    pub const ALLOWED_CONTENT_KEYWORDS: &str = "URL_CRAWLER_ALLOWED_CONTENT_KEYWORDS";
    pub const USER_AGENT: &str = "URL_CRAWLER_USER_AGENT";
}

/// Resource ceilings and defaults shared by every batch
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    /// Concurrency used when a request does not ask for one
    pub default_concurrency: usize,
    /// Upper bound for requested concurrency
    pub max_concurrency: usize,
    /// Maximum number of URLs in one batch
    pub max_urls: usize,
    /// Body bytes kept for decoding; the rest is counted and dropped
    pub max_body_bytes: usize,
    /// Baseline connection pool size
    pub max_connections: usize,
    /// Baseline idle (keep-alive) connections
    pub max_keepalive_connections: usize,
    /// Ceiling for the connect phase
    pub connect_timeout: Duration,
    /// Ceiling for the read phase
    pub read_timeout: Duration,
    /// Lower-cased substrings a `content-type` must contain (any of).
    /// Empty disables the check.
    pub allowed_content_keywords: Vec<String>,
    /// User-Agent sent with every request
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            default_concurrency: DEFAULT_CONCURRENCY,
            max_concurrency: DEFAULT_CONCURRENCY.max(MAX_CONCURRENCY_FLOOR),
            max_urls: DEFAULT_MAX_URLS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_connections: DEFAULT_CONCURRENCY * 4,
            max_keepalive_connections: DEFAULT_CONCURRENCY * 2,
            connect_timeout: Duration::from_secs_f64(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs_f64(DEFAULT_READ_TIMEOUT_SECS),
            allowed_content_keywords: DEFAULT_CONTENT_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetchConfig {
    /// Load configuration from the process environment
    ///
    /// Malformed values fall back to their defaults with a warning; startup
    /// never fails because of a bad override.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default_concurrency =
            read_usize(&lookup, env::DEFAULT_CONCURRENCY, DEFAULT_CONCURRENCY, 1);
        let max_concurrency = read_usize(
            &lookup,
            env::MAX_CONCURRENCY,
            default_concurrency.max(MAX_CONCURRENCY_FLOOR),
            default_concurrency,
        );
        let max_connections = read_usize(
            &lookup,
            env::MAX_CONNECTIONS,
            default_concurrency.saturating_mul(4),
            1,
        )
        .max(default_concurrency);
        let max_keepalive_connections = read_usize(
            &lookup,
            env::MAX_KEEPALIVE_CONNECTIONS,
            default_concurrency.saturating_mul(2),
            1,
        )
        .max(default_concurrency);

        let allowed_content_keywords = match lookup(env::ALLOWED_CONTENT_KEYWORDS) {
            Some(raw) => parse_keywords(&raw),
            None => DEFAULT_CONTENT_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        };

        let user_agent = lookup(env::USER_AGENT)
            .map(|ua| ua.trim().to_string())
            .filter(|ua| !ua.is_empty())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        Self {
            default_concurrency,
            max_concurrency,
            max_urls: read_usize(&lookup, env::MAX_URLS, DEFAULT_MAX_URLS, 1),
            max_body_bytes: read_usize(&lookup, env::MAX_BODY_BYTES, DEFAULT_MAX_BODY_BYTES, 1),
            max_connections,
            max_keepalive_connections,
            connect_timeout: read_secs(
                &lookup,
                env::CONNECT_TIMEOUT,
                DEFAULT_CONNECT_TIMEOUT_SECS,
            ),
            read_timeout: read_secs(&lookup, env::READ_TIMEOUT, DEFAULT_READ_TIMEOUT_SECS),
            allowed_content_keywords,
            user_agent,
        }
    }

    /// Check a lower-cased `content-type` value against the allow-list
    pub fn allows_content_type(&self, content_type: &str) -> bool {
        self.allowed_content_keywords.is_empty()
            || self
                .allowed_content_keywords
                .iter()
                .any(|keyword| content_type.contains(keyword.as_str()))
    }
}

fn read_usize<F>(lookup: &F, name: &str, default: usize, minimum: usize) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return default.max(minimum);
    };
    match raw.trim().parse::<i64>() {
        Ok(value) => (value.max(minimum as i64)) as usize,
        Err(_) => {
            warn!(variable = name, value = %raw, fallback = default, "Not a valid integer, using default");
            default
        }
    }
}

fn read_secs<F>(lookup: &F, name: &str, default: f64) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    let fallback = Duration::from_secs_f64(default);
    let Some(raw) = lookup(name) else {
        return fallback;
    };
    let parsed = raw
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(|value| Duration::try_from_secs_f64(value.max(MIN_TIMEOUT_SECS)).ok());
    match parsed {
        Some(duration) => duration,
        None => {
            warn!(variable = name, value = %raw, fallback = default, "Not a valid duration, using default");
            fallback
        }
    }
}

fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|keyword| keyword.trim().to_lowercase())
        .filter(|keyword| !keyword.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = FetchConfig::default();
        assert_eq!(config.default_concurrency, 10);
        assert_eq!(config.max_concurrency, 64);
        assert_eq!(config.max_urls, 64);
        assert_eq!(config.max_body_bytes, 5 * 1024 * 1024);
        assert_eq!(config.max_connections, 40);
        assert_eq!(config.max_keepalive_connections, 20);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Duration::from_secs(15));
        assert_eq!(config.allowed_content_keywords, vec!["text", "html", "xml"]);
    }

    #[test]
    fn test_empty_environment_matches_defaults() {
        let config = FetchConfig::from_lookup(|_| None);
        assert_eq!(config, FetchConfig::default());
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = FetchConfig::from_lookup(lookup_from(&[
            (env::DEFAULT_CONCURRENCY, "4"),
            (env::MAX_URLS, "8"),
            (env::READ_TIMEOUT, "2.5"),
            (env::ALLOWED_CONTENT_KEYWORDS, " HTML, json ,,"),
        ]));
        assert_eq!(config.default_concurrency, 4);
        assert_eq!(config.max_concurrency, 64);
        assert_eq!(config.max_urls, 8);
        assert_eq!(config.max_connections, 16);
        assert_eq!(config.max_keepalive_connections, 8);
        assert_eq!(config.read_timeout, Duration::from_millis(2500));
        assert_eq!(config.allowed_content_keywords, vec!["html", "json"]);
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let config = FetchConfig::from_lookup(lookup_from(&[
            (env::MAX_URLS, "lots"),
            (env::CONNECT_TIMEOUT, "soon"),
            (env::READ_TIMEOUT, "NaN"),
        ]));
        assert_eq!(config.max_urls, 64);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Duration::from_secs(15));

        let config = FetchConfig::from_lookup(lookup_from(&[
            (env::CONNECT_TIMEOUT, "1e30"),
            (env::READ_TIMEOUT, "inf"),
        ]));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_huge_concurrency_does_not_overflow() {
        let config = FetchConfig::from_lookup(lookup_from(&[(
            env::DEFAULT_CONCURRENCY,
            "9223372036854775807",
        )]));
        assert_eq!(config.default_concurrency, i64::MAX as usize);
        assert_eq!(config.max_concurrency, config.default_concurrency);
        assert_eq!(config.max_connections, usize::MAX);
        assert_eq!(config.max_keepalive_connections, usize::MAX);
    }

    #[test]
    fn test_values_are_raised_to_floors() {
        let config = FetchConfig::from_lookup(lookup_from(&[
            (env::DEFAULT_CONCURRENCY, "20"),
            (env::MAX_CONCURRENCY, "5"),
            (env::MAX_CONNECTIONS, "2"),
            (env::MAX_URLS, "-3"),
            (env::CONNECT_TIMEOUT, "0"),
        ]));
        assert_eq!(config.max_concurrency, 20);
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.max_urls, 1);
        assert_eq!(config.connect_timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_allows_content_type() {
        let config = FetchConfig::default();
        assert!(config.allows_content_type("text/html; charset=utf-8"));
        assert!(config.allows_content_type("application/xhtml+xml"));
        assert!(!config.allows_content_type("application/pdf"));
        assert!(!config.allows_content_type(""));

        let open = FetchConfig {
            allowed_content_keywords: Vec::new(),
            ..FetchConfig::default()
        };
        assert!(open.allows_content_type("application/pdf"));
    }
}
