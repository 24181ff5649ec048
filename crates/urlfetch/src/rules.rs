//! Site-specific content rules
//!
//! Design: generic chrome stripping is not enough for heavily templated
//! sites. A rule recognises such a site by URL and picks the DOM subtree
//! that feeds the Markdown renderer. ContentRules dispatches to the first
//! matching rule.

use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::debug;

/// Subtree chosen by a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSelection {
    /// Outer HTML of the content container
    pub html: String,
    /// Page heading, when the site exposes one separately from `<title>`
    pub heading: Option<String>,
}

/// Trait for site-specific content selection
///
/// Each rule declares which URLs it handles via `matches()` and locates
/// the main content via `select()`.
pub trait ContentRule: Send + Sync {
    /// Unique identifier for this rule (for logging/debugging)
    fn name(&self) -> &'static str;

    /// Returns true if this rule applies to the given URL
    fn matches(&self, url: &str) -> bool;

    /// Locate the content container
    ///
    /// Called only if `matches()` returned true. `None` means the page did
    /// not have the expected structure and the whole document is rendered.
    fn select(&self, doc: &Html) -> Option<ContentSelection>;
}

/// Ordered set of content rules
pub struct ContentRules {
    rules: Vec<Box<dyn ContentRule>>,
}

impl Default for ContentRules {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for ContentRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|rule| rule.name()))
            .finish()
    }
}

impl ContentRules {
    /// Create an empty rule set
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Create a rule set with the built-in rules
    pub fn with_defaults() -> Self {
        let mut rules = Self::new();
        rules.register(Box::new(WikipediaRule));
        rules
    }

    /// Register a rule
    ///
    /// Rules are checked in registration order.
    pub fn register(&mut self, rule: Box<dyn ContentRule>) {
        self.rules.push(rule);
    }

    /// Pick the content subtree for a URL, if a rule applies and finds it
    pub fn select(&self, url: &str, doc: &Html) -> Option<ContentSelection> {
        let rule = self.rules.iter().find(|rule| rule.matches(url))?;
        let selection = rule.select(doc);
        if selection.is_none() {
            debug!(rule = rule.name(), url, "Content container not found, rendering whole document");
        }
        selection
    }
}

static WIKI_CONTENT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div#mw-content-text").expect("valid selector"));
static WIKI_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.mw-page-title-main").expect("valid selector"));

/// Wikipedia article pages
///
/// Renders only `#mw-content-text`, headed by `.mw-page-title-main`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WikipediaRule;

impl ContentRule for WikipediaRule {
    fn name(&self) -> &'static str {
        "wikipedia"
    }

    fn matches(&self, url: &str) -> bool {
        url.contains("wikipedia.org")
    }

    fn select(&self, doc: &Html) -> Option<ContentSelection> {
        let content = doc.select(&WIKI_CONTENT).next()?;
        let heading = doc
            .select(&WIKI_TITLE)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|title| !title.is_empty());

        Some(ContentSelection {
            html: content.html(),
            heading,
        })
    }
}
