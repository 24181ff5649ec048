//! HTML to plain text and Markdown extraction
//!
//! Both transforms are pure: the same input always yields the same output.

use crate::error::FetchError;
use crate::rules::ContentRules;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;

/// Title used when a document has none
pub const FALLBACK_TITLE: &str = "No Title";

static NON_CONTENT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script, style, noscript").expect("valid selector"));

static CHROME: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("nav, footer, aside, form, figure, header").expect("valid selector")
});

static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));

/// Blank-line runs, including lines holding only spaces or tabs
static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n)+").expect("valid regex"));

/// Convert HTML to plain text
///
/// Drops script/style/noscript, emits every remaining text node on its own
/// line, trims each line and removes empty ones.
pub fn html_to_text(html: &str) -> String {
    let mut doc = Html::parse_document(html);
    remove_matching(&mut doc, &NON_CONTENT);

    let lines: Vec<&str> = doc
        .tree
        .root()
        .descendants()
        .filter_map(|node| node.value().as_text())
        .flat_map(|text| text.lines())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    lines.join("\n")
}

/// Convert HTML to Markdown using the built-in site rules
pub fn html_to_markdown(html: &str, url: &str) -> Result<String, FetchError> {
    html_to_markdown_with_rules(html, url, &ContentRules::with_defaults())
}

/// Convert HTML to Markdown
///
/// Chrome elements (nav, footer, aside, form, figure, header) are removed
/// first. If a rule claims `url` and finds its content container, only that
/// subtree is rendered under a level-1 heading; otherwise the whole document
/// is. The output always starts with a `# ` heading.
pub fn html_to_markdown_with_rules(
    html: &str,
    url: &str,
    rules: &ContentRules,
) -> Result<String, FetchError> {
    let mut doc = Html::parse_document(html);
    let title = document_title(&doc);

    remove_matching(&mut doc, &NON_CONTENT);
    remove_matching(&mut doc, &CHROME);

    let body = match rules.select(url, &doc) {
        Some(selection) => {
            let heading = selection.heading.as_deref().unwrap_or(&title);
            format!("# {heading}\n\n{}", render_markdown(&selection.html)?)
        }
        None => render_markdown(&doc.html())?,
    };

    let body = normalize_markdown(&body);
    if body.starts_with("# ") {
        Ok(body)
    } else if body.is_empty() {
        Ok(format!("# {title}"))
    } else {
        Ok(format!("# {title}\n\n{body}"))
    }
}

/// Text of the first `<title>`, or [`FALLBACK_TITLE`]
fn document_title(doc: &Html) -> String {
    doc.select(&TITLE)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| FALLBACK_TITLE.to_string())
}

/// Detach every element matching `selector`
fn remove_matching(doc: &mut Html, selector: &Selector) {
    let ids: Vec<_> = doc.select(selector).map(|el| el.id()).collect();
    for id in ids {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn render_markdown(html: &str) -> Result<String, FetchError> {
    // <head> is skipped: the title is handled separately
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["head", "script", "style", "noscript"])
        .build();

    converter
        .convert(html)
        .map_err(|e| FetchError::Extraction(format!("markdown conversion failed: {e}")))
}

/// Unify line endings, collapse blank-line runs to one, trim
pub fn normalize_markdown(markdown: &str) -> String {
    let unified = markdown.replace("\r\n", "\n").replace('\r', "\n");
    BLANK_RUN.replace_all(&unified, "\n\n").trim().to_string()
}
