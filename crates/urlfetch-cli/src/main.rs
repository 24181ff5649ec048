//! URLFetch CLI - HTTP service and demo client for batch URL fetching

mod server;

use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use urlfetch::{BatchFetcher, FetchConfig, FetchRequest, FetchResponse, DEFAULT_TIMEOUT_SECS};

/// Bound on a `--endpoint` round trip when the timeout cannot be scaled
const MAX_REMOTE_WAIT: Duration = Duration::from_secs(300);

/// URLs fetched by `urlfetch fetch` when none are given
const DEFAULT_URLS: &[&str] = &["https://www.python.org", "https://github.com"];

/// URLFetch - concurrent URL content fetching service
#[derive(Parser, Debug)]
#[command(name = "urlfetch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the fetch API over HTTP
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:8000")]
        bind: SocketAddr,
    },
    /// Fetch a batch of URLs and print the JSON response
    Fetch {
        /// URLs to fetch
        urls: Vec<String>,

        /// Per-request timeout in seconds (1-60)
        #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
        timeout: f64,

        /// Override the default concurrency
        #[arg(long)]
        concurrency: Option<i64>,

        /// Return plain text only
        #[arg(long)]
        no_markdown: bool,

        /// Send the batch to a running service instead of fetching locally
        #[arg(long)]
        endpoint: Option<String>,
    },
    /// Print request and response JSON Schemas
    Schema,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { bind }) => {
            let fetcher = BatchFetcher::new(FetchConfig::from_env());
            if let Err(e) = server::run_server(bind, fetcher).await {
                eprintln!("Server error: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Fetch {
            urls,
            timeout,
            concurrency,
            no_markdown,
            endpoint,
        }) => {
            let urls = if urls.is_empty() {
                DEFAULT_URLS.iter().map(|u| u.to_string()).collect()
            } else {
                urls
            };
            let mut request = FetchRequest::new(urls).timeout(timeout);
            request.concurrency = concurrency;
            request.to_markdown = !no_markdown;

            run_fetch(request, endpoint.as_deref()).await;
        }
        Some(Commands::Schema) => {
            let fetcher = BatchFetcher::new(FetchConfig::from_env());
            let schemas = serde_json::json!({
                "input": fetcher.input_schema(),
                "output": fetcher.output_schema(),
            });
            writeln_safe(&serde_json::to_string_pretty(&schemas).unwrap_or_default());
        }
        None => {
            eprintln!("Usage: urlfetch serve [--bind ADDR]");
            eprintln!("   or: urlfetch fetch <URL>...");
            eprintln!("   or: urlfetch --help");
            std::process::exit(1);
        }
    }
}

async fn run_fetch(request: FetchRequest, endpoint: Option<&str>) {
    let outcome = match endpoint {
        Some(endpoint) => fetch_remote(endpoint, &request).await,
        None => BatchFetcher::new(FetchConfig::from_env())
            .fetch(request)
            .await
            .map_err(|e| e.to_string()),
    };

    match outcome {
        Ok(response) => {
            let json = serde_json::to_string_pretty(&response).unwrap_or_else(|e| {
                eprintln!("Error serializing response: {}", e);
                std::process::exit(1);
            });
            writeln_safe(&json);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// POST the batch to a running service
async fn fetch_remote(endpoint: &str, request: &FetchRequest) -> Result<FetchResponse, String> {
    let client = reqwest::Client::builder()
        .timeout(remote_wait(request.timeout))
        .build()
        .map_err(|e| format!("failed to create HTTP client: {}", e))?;

    let response = client
        .post(endpoint)
        .json(request)
        .send()
        .await
        .map_err(|e| format!("request to {} failed: {}", endpoint, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(format!("service returned {}: {}", status, body));
    }

    response
        .json::<FetchResponse>()
        .await
        .map_err(|e| format!("invalid response from {}: {}", endpoint, e))
}

/// Leave the service room to answer after its own per-URL timeouts
///
/// Out-of-range timeouts are left for the service to reject.
fn remote_wait(timeout: f64) -> Duration {
    Duration::try_from_secs_f64(timeout.max(1.0) * 4.0)
        .map(|wait| wait.min(MAX_REMOTE_WAIT))
        .unwrap_or(MAX_REMOTE_WAIT)
}

/// Write to stdout, exit silently on broken pipe
fn writeln_safe(s: &str) {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if let Err(e) = writeln!(handle, "{}", s) {
        if e.kind() == io::ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
        eprintln!("Error writing to stdout: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_defaults() {
        let cli = Cli::try_parse_from(["urlfetch", "fetch"]).unwrap();
        match cli.command {
            Some(Commands::Fetch {
                urls,
                timeout,
                concurrency,
                no_markdown,
                endpoint,
            }) => {
                assert!(urls.is_empty());
                assert_eq!(timeout, 15.0);
                assert!(concurrency.is_none());
                assert!(!no_markdown);
                assert!(endpoint.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_fetch_arguments() {
        let cli = Cli::try_parse_from([
            "urlfetch",
            "fetch",
            "https://example.com",
            "https://example.org",
            "--timeout",
            "12",
            "--concurrency",
            "32",
            "--no-markdown",
            "--endpoint",
            "http://127.0.0.1:8000/fetch",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Fetch {
                urls,
                timeout,
                concurrency,
                no_markdown,
                endpoint,
            }) => {
                assert_eq!(urls, vec!["https://example.com", "https://example.org"]);
                assert_eq!(timeout, 12.0);
                assert_eq!(concurrency, Some(32));
                assert!(no_markdown);
                assert_eq!(endpoint.as_deref(), Some("http://127.0.0.1:8000/fetch"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_remote_wait() {
        assert_eq!(remote_wait(15.0), Duration::from_secs(60));
        assert_eq!(remote_wait(0.0), Duration::from_secs(4));
        assert_eq!(remote_wait(1e308), MAX_REMOTE_WAIT);
        assert_eq!(remote_wait(f64::INFINITY), MAX_REMOTE_WAIT);
        assert_eq!(remote_wait(f64::NAN), Duration::from_secs(4));
    }

    #[test]
    fn test_serve_default_bind() {
        let cli = Cli::try_parse_from(["urlfetch", "serve"]).unwrap();
        match cli.command {
            Some(Commands::Serve { bind }) => assert_eq!(bind.port(), 8000),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
