//! URLFetch - concurrent batch URL fetching with text extraction
//!
//! This crate fetches a batch of URLs under bounded concurrency and turns
//! each response into readable plain text and, optionally, Markdown.
//!
//! ## Pipeline
//!
//! 1. [`FetchRequest::validate`] checks the batch against [`FetchConfig`]
//! 2. [`BatchFetcher`] derives a [`TransportPlan`] and fans out one
//!    [`FetchUnit`] per URL behind a shared concurrency gate
//! 3. Each unit classifies its outcome into a [`FetchResult`]; a failing URL
//!    never affects its siblings
//! 4. Results come back in input order inside a [`FetchResponse`]
//!
//! ## Content rules
//!
//! Markdown conversion consults a [`ContentRules`] registry so templated
//! sites can render only their main content. Built-in rules:
//! - [`WikipediaRule`] - article body under the page title

mod batch;
mod config;
mod error;
mod extract;
mod fetch;
mod rules;
mod types;

pub use batch::{fetch_batch, BatchFetcher, TransportPlan};
pub use config::{env, FetchConfig, DEFAULT_CONTENT_KEYWORDS, DEFAULT_USER_AGENT};
pub use error::{FetchError, FetchErrorKind, ValidationError};
pub use extract::{
    html_to_markdown, html_to_markdown_with_rules, html_to_text, normalize_markdown,
    FALLBACK_TITLE,
};
pub use fetch::FetchUnit;
pub use rules::{ContentRule, ContentRules, ContentSelection, WikipediaRule};
pub use types::{
    FetchRequest, FetchResponse, FetchResult, ValidRequest, DEFAULT_TIMEOUT_SECS,
    MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS,
};
