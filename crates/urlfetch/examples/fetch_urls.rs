//! Example: Fetch a batch of live URLs and check each result
//!
//! Run with: cargo run -p urlfetch --example fetch_urls
//!
//! All cases go out as one batch, so this also shows result ordering and
//! per-URL failure isolation against real servers.

use urlfetch::{fetch_batch, FetchErrorKind, FetchRequest, FetchResult};

/// Test case definition
struct TestCase {
    url: &'static str,
    description: &'static str,
    expect_ok: bool,
    expect_kind: Option<FetchErrorKind>,
    expect_contains: Option<&'static str>,
}

/// Define test cases here
const TEST_CASES: &[TestCase] = &[
    TestCase {
        url: "https://example.com",
        description: "Simple HTML page",
        expect_ok: true,
        expect_kind: None,
        expect_contains: Some("Example Domain"),
    },
    TestCase {
        url: "https://httpbin.org/html",
        description: "HTML endpoint",
        expect_ok: true,
        expect_kind: None,
        expect_contains: Some("Herman Melville"),
    },
    TestCase {
        url: "https://en.wikipedia.org/wiki/Rust_(programming_language)",
        description: "Wikipedia article (uses WikipediaRule)",
        expect_ok: true,
        expect_kind: None,
        expect_contains: Some("# Rust"),
    },
    TestCase {
        url: "https://httpbin.org/image/png",
        description: "Binary content",
        expect_ok: false,
        expect_kind: Some(FetchErrorKind::UnsupportedContentType),
        expect_contains: None,
    },
    TestCase {
        url: "https://httpbin.org/status/404",
        description: "Missing page",
        expect_ok: false,
        expect_kind: Some(FetchErrorKind::HttpStatus),
        expect_contains: None,
    },
];

#[tokio::main]
async fn main() {
    println!("URLFetch Batch Example");
    println!("======================\n");

    let request = FetchRequest::new(TEST_CASES.iter().map(|c| c.url))
        .timeout(20.0)
        .to_markdown();

    let response = match fetch_batch(request).await {
        Ok(response) => response,
        Err(e) => {
            println!("Request rejected: {}", e);
            std::process::exit(1);
        }
    };

    println!(
        "Fetched {} URLs with concurrency {} in {} ms\n",
        response.total, response.concurrency, response.elapsed_ms
    );

    let mut passed = 0;
    let mut failed = 0;

    for (i, (case, result)) in TEST_CASES.iter().zip(&response.results).enumerate() {
        println!("{}. {}", i + 1, case.description);
        println!("   URL: {}", case.url);
        print_result_summary(result);

        if check_expectations(case, result) {
            println!("   ✓ PASS\n");
            passed += 1;
        } else {
            println!("   ✗ FAIL (expectations not met)\n");
            failed += 1;
        }
    }

    println!("======================");
    println!("Results: {} passed, {} failed", passed, failed);

    if failed > 0 {
        std::process::exit(1);
    }
}

fn print_result_summary(result: &FetchResult) {
    if let Some(status) = result.status_code {
        println!("   Status: {}", status);
    }

    if let Some(ref charset) = result.charset {
        println!("   Charset: {}", charset);
    }

    if let Some(bytes) = result.bytes_downloaded {
        println!("   Downloaded: {} bytes", bytes);
    }

    if let Some(ref markdown) = result.markdown {
        let preview = markdown.chars().take(100).collect::<String>();
        let preview = preview.replace('\n', " ");
        println!(
            "   Preview: {}{}",
            preview,
            if markdown.len() > 100 { "..." } else { "" }
        );
    }

    if let Some(ref error) = result.error {
        println!("   Error: {}", error);
    }
}

fn check_expectations(case: &TestCase, result: &FetchResult) -> bool {
    if result.ok != case.expect_ok {
        println!("   Expected ok={}, got ok={}", case.expect_ok, result.ok);
        return false;
    }

    if case.expect_kind.is_some() && result.error_kind != case.expect_kind {
        println!(
            "   Expected error kind {:?}, got {:?}",
            case.expect_kind, result.error_kind
        );
        return false;
    }

    if let Some(expected_text) = case.expect_contains {
        let content = result.markdown.as_deref().unwrap_or("");
        if !content.contains(expected_text) {
            println!("   Expected markdown to contain '{}'", expected_text);
            return false;
        }
    }

    true
}
