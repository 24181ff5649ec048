//! Fetch unit
//!
//! Performs one bounded GET for one URL and turns every outcome, good or
//! bad, into a [`FetchResult`]. Nothing here returns an error to the batch.

use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::extract::{html_to_markdown_with_rules, html_to_text};
use crate::rules::ContentRules;
use crate::types::FetchResult;
use bytes::{Bytes, BytesMut};
use encoding_rs::{Encoding, UTF_8};
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Charset reported when the response does not declare one
const DEFAULT_CHARSET: &str = "utf-8";

/// Initial body buffer size; grows up to the configured cap
const INITIAL_BODY_CAPACITY: usize = 64 * 1024;

/// Everything a fetch unit needs, shared read-only across one batch
///
/// Cloning is cheap: the client and the gate are reference counted.
#[derive(Clone)]
pub struct FetchUnit {
    client: reqwest::Client,
    gate: Arc<Semaphore>,
    config: Arc<FetchConfig>,
    rules: Arc<ContentRules>,
    send_timeout: Duration,
    to_markdown: bool,
}

impl FetchUnit {
    /// Create a unit sharing `client` and `gate` with its siblings
    pub fn new(
        client: reqwest::Client,
        gate: Arc<Semaphore>,
        config: Arc<FetchConfig>,
        rules: Arc<ContentRules>,
        send_timeout: Duration,
        to_markdown: bool,
    ) -> Self {
        Self {
            client,
            gate,
            config,
            rules,
            send_timeout,
            to_markdown,
        }
    }

    /// Fetch and extract one URL
    ///
    /// Waits for a gate slot first; the slot is released when this returns,
    /// whatever the outcome. `elapsed_ms` excludes the wait.
    pub async fn run(&self, url: String) -> FetchResult {
        let mut result = FetchResult::new(url);

        let Ok(_permit) = self.gate.acquire().await else {
            result.fail(&FetchError::Transport("concurrency gate closed".to_string()));
            result.elapsed_ms = Some(0);
            return result;
        };

        let started = Instant::now();
        match self.fetch_into(&mut result).await {
            Ok(()) => {
                result.ok = true;
                debug!(
                    url = %result.url,
                    status = ?result.status_code,
                    bytes = ?result.bytes_downloaded,
                    "Fetched"
                );
            }
            Err(err) => {
                warn!(url = %result.url, kind = ?err.kind(), error = %err, "Fetch failed");
                result.fail(&err);
            }
        }
        result.elapsed_ms = Some(started.elapsed().as_millis() as u64);
        result
    }

    async fn fetch_into(&self, result: &mut FetchResult) -> Result<(), FetchError> {
        let response = tokio::time::timeout(self.send_timeout, self.client.get(&result.url).send())
            .await
            .map_err(|_| {
                FetchError::Timeout(format!(
                    "no response within {:.1}s",
                    self.send_timeout.as_secs_f64()
                ))
            })?
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();
        let charset = charset_from_content_type(&content_type);

        result.status_code = Some(status.as_u16());
        result.charset = Some(charset.unwrap_or(DEFAULT_CHARSET).to_string());

        // Anything but 2xx, including unfollowed 3xx and stray 1xx
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        if !self.config.allows_content_type(&content_type) {
            return Err(FetchError::UnsupportedContentType(content_type));
        }

        let (body, total) = read_capped_body(response, self.config.max_body_bytes).await?;
        result.bytes_downloaded = Some(total);

        let content = decode_body(&body, charset);
        result.text = Some(html_to_text(&content));
        if self.to_markdown {
            result.markdown = Some(html_to_markdown_with_rules(
                &content,
                &result.url,
                &self.rules,
            )?);
        }

        Ok(())
    }
}

/// Extract the `charset` parameter from a lower-cased content-type
fn charset_from_content_type(content_type: &str) -> Option<&str> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().strip_prefix("charset="))
        .map(|value| value.trim().trim_matches(|c| c == '"' || c == '\''))
        .find(|value| !value.is_empty())
}

/// Decode with the declared charset, falling back to UTF-8
///
/// Undecodable bytes become U+FFFD instead of failing.
fn decode_body(body: &[u8], charset: Option<&str>) -> String {
    let encoding = charset
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);
    let (content, _, _) = encoding.decode(body);
    content.into_owned()
}

/// Read the whole body, keeping at most `cap` bytes
///
/// Returns the kept bytes and the total number of bytes received.
async fn read_capped_body(
    response: reqwest::Response,
    cap: usize,
) -> Result<(Bytes, u64), FetchError> {
    let mut body = BytesMut::with_capacity(cap.min(INITIAL_BODY_CAPACITY));
    let mut total: u64 = 0;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::from_reqwest)?;
        total += chunk.len() as u64;

        let room = cap.saturating_sub(body.len());
        if room > 0 {
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
        }
    }

    if total > body.len() as u64 {
        debug!(total, kept = body.len(), "Body truncated");
    }

    Ok((body.freeze(), total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charset_from_content_type() {
        assert_eq!(
            charset_from_content_type("text/html; charset=utf-8"),
            Some("utf-8")
        );
        assert_eq!(
            charset_from_content_type("text/html;charset=\"iso-8859-1\""),
            Some("iso-8859-1")
        );
        assert_eq!(
            charset_from_content_type("text/html; boundary=x; charset=shift_jis"),
            Some("shift_jis")
        );
        assert_eq!(charset_from_content_type("text/html"), None);
        assert_eq!(charset_from_content_type("text/html; charset="), None);
        assert_eq!(charset_from_content_type(""), None);
    }

    #[test]
    fn test_decode_body_with_declared_charset() {
        let latin1 = [0x63, 0x61, 0x66, 0xE9];
        assert_eq!(decode_body(&latin1, Some("iso-8859-1")), "café");
    }

    #[test]
    fn test_decode_body_falls_back_to_utf8() {
        assert_eq!(decode_body("héllo".as_bytes(), None), "héllo");
        assert_eq!(decode_body("héllo".as_bytes(), Some("no-such-charset")), "héllo");
    }

    #[test]
    fn test_decode_body_replaces_invalid_bytes() {
        let decoded = decode_body(&[0x61, 0xFF, 0x62], None);
        assert_eq!(decoded, "a\u{FFFD}b");
    }

    #[test]
    fn test_decode_body_tolerates_split_multibyte_char() {
        // "é" is two bytes in UTF-8; truncation can cut it in half
        let bytes = "aé".as_bytes();
        let decoded = decode_body(&bytes[..2], None);
        assert_eq!(decoded, "a\u{FFFD}");
    }
}
