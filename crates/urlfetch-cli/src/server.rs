//! HTTP service exposing the batch fetcher

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use urlfetch::{BatchFetcher, FetchRequest, FetchResponse};

#[derive(Clone)]
struct AppState {
    fetcher: Arc<BatchFetcher>,
}

/// Request-level failure, reported as 422 with a `detail` message
#[derive(Debug)]
struct ApiError(String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "detail": self.0 })),
        )
            .into_response()
    }
}

/// Build the service routes
pub fn router(fetcher: BatchFetcher) -> Router {
    let state = AppState {
        fetcher: Arc::new(fetcher),
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/fetch", post(fetch_handler))
        .route("/schema", get(schema_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C
pub async fn run_server(addr: SocketAddr, fetcher: BatchFetcher) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "URLFetch listening");

    axum::serve(listener, router(fetcher))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn fetch_handler(
    State(state): State<AppState>,
    payload: Result<Json<FetchRequest>, JsonRejection>,
) -> Result<Json<FetchResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError(rejection.body_text()))?;
    state
        .fetcher
        .fetch(request)
        .await
        .map(Json)
        .map_err(|e| ApiError(e.to_string()))
}

async fn schema_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "input": state.fetcher.input_schema(),
        "output": state.fetcher.output_schema(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        let response = router(BatchFetcher::default())
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/fetch")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_fetch_validation_error_is_422() {
        let (status, body) = send(post_json(r#"{"urls": []}"#)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["detail"], "urls must contain at least one URL");
    }

    #[tokio::test]
    async fn test_fetch_timeout_out_of_range_is_422() {
        let (status, body) =
            send(post_json(r#"{"urls": ["https://example.com"], "timeout": 0.5}"#)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["detail"], "timeout must be between 1 and 60 seconds");
    }

    #[tokio::test]
    async fn test_fetch_malformed_body_is_422() {
        let (status, body) = send(post_json(r#"{"urls": "https://example.com"}"#)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn test_schema() {
        let request = Request::builder().uri("/schema").body(Body::empty()).unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["input"]["properties"]["urls"].is_object());
        assert!(body["output"]["properties"]["results"].is_object());
    }
}
