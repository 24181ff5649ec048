//! Batch orchestration
//!
//! Turns a validated request into a [`FetchResponse`]: derives the
//! transport limits, fans out one [`FetchUnit`] per URL behind a shared
//! concurrency gate and reassembles the results in input order.

use crate::config::{FetchConfig, DEFAULT_USER_AGENT};
use crate::error::{FetchError, ValidationError};
use crate::fetch::FetchUnit;
use crate::rules::ContentRules;
use crate::types::{FetchRequest, FetchResponse, FetchResult, ValidRequest};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::redirect::Policy;
use schemars::schema_for;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

/// Accept header sent with every request
const ACCEPT_VALUE: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Accept-Language header sent with every request
const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.5";

/// Redirect hops followed before giving up
const MAX_REDIRECTS: usize = 20;

/// Fetch a batch using the default configuration
///
/// For a long-lived service, build a [`BatchFetcher`] once and reuse it.
pub async fn fetch_batch(request: FetchRequest) -> Result<FetchResponse, ValidationError> {
    BatchFetcher::new(FetchConfig::default()).fetch(request).await
}

/// Connection-pool and timeout settings derived for one batch
///
/// Each value is clamped against the process-wide ceilings, so a request
/// can reach them but never exceed them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportPlan {
    /// Gate width
    pub concurrency: usize,
    /// Pool size: `max(configured, 2 * concurrency)`
    pub max_connections: usize,
    /// Idle connections kept: `max(configured, concurrency)`
    pub max_keepalive: usize,
    /// `min(connect ceiling, request timeout)`
    pub connect_timeout: Duration,
    /// `min(read ceiling, request timeout)`
    pub read_timeout: Duration,
    /// Bound on sending the request and receiving the response head
    pub write_timeout: Duration,
    /// Bound on waiting for a pooled connection
    pub pool_timeout: Duration,
}

impl TransportPlan {
    /// Derive the plan for a validated request
    pub fn new(config: &FetchConfig, request: &ValidRequest) -> Self {
        let concurrency = request.concurrency();
        let timeout = request.timeout();
        Self {
            concurrency,
            max_connections: config.max_connections.max(concurrency * 2),
            max_keepalive: config.max_keepalive_connections.max(concurrency),
            connect_timeout: config.connect_timeout.min(timeout),
            read_timeout: config.read_timeout.min(timeout),
            write_timeout: timeout,
            pool_timeout: timeout,
        }
    }

    /// Build the HTTP client for this batch
    ///
    /// reqwest has no cap on total connections; the gate keeps in-flight
    /// requests at `concurrency`, which never exceeds `max_connections`.
    fn build_client(&self, config: &FetchConfig) -> Result<reqwest::Client, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_USER_AGENT)),
        );
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_VALUE));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE));

        reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout)
            .pool_max_idle_per_host(self.max_keepalive)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to create HTTP client: {e}")))
    }
}

/// Aborts units that are still running if the batch is dropped early
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Batch fetcher holding the process-wide configuration
///
/// No state survives between batches: each call gets its own client and
/// gate.
#[derive(Debug, Clone)]
pub struct BatchFetcher {
    config: Arc<FetchConfig>,
    rules: Arc<ContentRules>,
}

impl Default for BatchFetcher {
    fn default() -> Self {
        Self::new(FetchConfig::default())
    }
}

impl BatchFetcher {
    /// Create a fetcher with the built-in content rules
    pub fn new(config: FetchConfig) -> Self {
        Self::with_rules(config, ContentRules::with_defaults())
    }

    /// Create a fetcher with a custom rule set
    pub fn with_rules(config: FetchConfig, rules: ContentRules) -> Self {
        Self {
            config: Arc::new(config),
            rules: Arc::new(rules),
        }
    }

    /// The configuration in use
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Validate a request against this fetcher's ceilings
    pub fn validate(&self, request: FetchRequest) -> Result<ValidRequest, ValidationError> {
        request.validate(&self.config)
    }

    /// Validate and fetch a batch
    ///
    /// Validation is the only failure path; individual URL failures are
    /// reported in their results.
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, ValidationError> {
        let request = self.validate(request)?;
        Ok(self.fetch_valid(request).await)
    }

    /// Fetch an already validated batch
    pub async fn fetch_valid(&self, request: ValidRequest) -> FetchResponse {
        let started = Instant::now();
        let plan = TransportPlan::new(&self.config, &request);

        info!(
            urls = request.urls().len(),
            concurrency = plan.concurrency,
            timeout_secs = request.timeout().as_secs_f64(),
            to_markdown = request.to_markdown(),
            "Incoming fetch"
        );
        debug!(?plan, "Transport plan");

        let results = match plan.build_client(&self.config) {
            Ok(client) => self.run_units(client, &plan, &request).await,
            Err(err) => {
                warn!(error = %err, "Could not create HTTP client, failing batch");
                request
                    .urls()
                    .iter()
                    .map(|url| failed_result(url, &err))
                    .collect()
            }
        };

        FetchResponse {
            total: results.len(),
            concurrency: plan.concurrency,
            elapsed_ms: started.elapsed().as_millis() as u64,
            results,
        }
    }

    async fn run_units(
        &self,
        client: reqwest::Client,
        plan: &TransportPlan,
        request: &ValidRequest,
    ) -> Vec<FetchResult> {
        let unit = FetchUnit::new(
            client,
            Arc::new(Semaphore::new(plan.concurrency)),
            Arc::clone(&self.config),
            Arc::clone(&self.rules),
            plan.write_timeout,
            request.to_markdown(),
        );

        // Launched in input order; completion order is up to the network
        let handles: Vec<JoinHandle<FetchResult>> = request
            .urls()
            .iter()
            .map(|url| {
                let unit = unit.clone();
                let url = url.clone();
                tokio::spawn(async move { unit.run(url).await })
            })
            .collect();
        drop(unit);

        let _guard = AbortOnDrop(handles.iter().map(JoinHandle::abort_handle).collect());

        let mut results = Vec::with_capacity(handles.len());
        for (url, handle) in request.urls().iter().zip(handles) {
            let result = match handle.await {
                Ok(result) => result,
                Err(err) => {
                    warn!(url = %url, error = %err, "Fetch task aborted");
                    failed_result(url, &FetchError::Extraction(format!("fetch task aborted: {err}")))
                }
            };
            results.push(result);
        }
        results
    }

    /// JSON Schema of [`FetchRequest`]
    pub fn input_schema(&self) -> serde_json::Value {
        let schema = schema_for!(FetchRequest);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        // Surface the configured ceilings alongside the schema
        if let Some(props) = value.get_mut("properties").and_then(|p| p.as_object_mut()) {
            if let Some(urls) = props.get_mut("urls").and_then(|u| u.as_object_mut()) {
                urls.insert("minItems".into(), 1.into());
                urls.insert("maxItems".into(), self.config.max_urls.into());
            }
            if let Some(concurrency) = props
                .get_mut("concurrency")
                .and_then(|c| c.as_object_mut())
            {
                concurrency.insert("minimum".into(), 1.into());
                concurrency.insert("maximum".into(), self.config.max_concurrency.into());
            }
        }

        value
    }

    /// JSON Schema of [`FetchResponse`]
    pub fn output_schema(&self) -> serde_json::Value {
        let schema = schema_for!(FetchResponse);
        serde_json::to_value(schema).unwrap_or_default()
    }
}

fn failed_result(url: &str, err: &FetchError) -> FetchResult {
    let mut result = FetchResult::new(url);
    result.fail(err);
    result.elapsed_ms = Some(0);
    result
}
