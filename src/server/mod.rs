//! HTTP backend: document API, provider proxy and changefeed.

mod data;
mod proxy;
mod ws;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::error::{Error, StoreError};
use crate::store::JsonFileStore;

/// Request bodies up to this size are accepted (full-store restores are large).
const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<JsonFileStore>,
    /// Outbound client used by the provider proxy.
    pub http: reqwest::Client,
    /// Total limit for buffered proxy calls; the idle limit for streamed ones.
    pub proxy_timeout: Duration,
}

impl AppState {
    pub fn new(store: Arc<JsonFileStore>, proxy_timeout: Duration) -> Self {
        Self {
            store,
            http: crate::llm::http::build_client_with(proxy_timeout),
            proxy_timeout,
        }
    }
}

/// Build the Axum router with data, proxy and changefeed routes.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/data", get(data::dump).post(data::replace_all))
        .route(
            "/api/data/{*path}",
            get(data::get_document).post(data::put_document),
        )
        .route("/api/proxy/openai", post(proxy::openai))
        .route("/ws/data/{*path}", get(ws::ws_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "cms-studio"
    }))
}

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Validation failures are the caller's fault; everything else is ours.
pub(crate) fn store_error_response(err: Error) -> Response {
    let status = match &err {
        Error::Store(StoreError::NotAnObject { .. }) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "Store request failed");
    }
    error_response(status, err.to_string())
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;

    fn test_app() -> (Router, Arc<JsonFileStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path().join("db.json")));
        let app = routes(AppState::new(Arc::clone(&store), Duration::from_secs(5)));
        (app, store, dir)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (app, _store, _dir) = test_app();
        let (status, body) = send(&app, get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn document_roundtrip_with_nested_path() {
        let (app, _store, _dir) = test_app();

        let (status, _) = send(
            &app,
            post_json("/api/data/sites/quickstor-staging", r#"{"title":"QuickStor"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, get_req("/api/data/sites/quickstor-staging")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"title": "QuickStor"}));
    }

    #[tokio::test]
    async fn missing_document_is_404_with_error_body() {
        let (app, _store, _dir) = test_app();
        let (status, body) = send(&app, get_req("/api/data/sites/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn non_object_body_is_400() {
        let (app, store, _dir) = test_app();
        let (status, body) = send(&app, post_json("/api/data/a", "[1,2,3]")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, _) = send(&app, post_json("/api/data/a", "not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        use crate::store::DocumentStore;
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn full_dump_and_overwrite() {
        let (app, _store, _dir) = test_app();
        send(&app, post_json("/api/data/a", r#"{"v":1}"#)).await;

        let (status, body) = send(&app, get_req("/api/data")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"a": {"v": 1}}));

        let (status, _) = send(&app, post_json("/api/data", r#"{"b":{"v":2}}"#)).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = send(&app, get_req("/api/data")).await;
        assert_eq!(body, json!({"b": {"v": 2}}));
    }

    #[tokio::test]
    async fn corrupt_store_is_500() {
        let (app, store, _dir) = test_app();
        tokio::fs::write(store.path(), "{ not json").await.unwrap();
        let (status, body) = send(&app, get_req("/api/data/a")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("corrupt"));
    }

    #[tokio::test]
    async fn proxy_requires_url() {
        let (app, _store, _dir) = test_app();
        let (status, body) = send(
            &app,
            post_json("/api/proxy/openai", r#"{"apiKey":"sk","body":{}}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn proxy_unreachable_upstream_is_502() {
        let (app, _store, _dir) = test_app();
        let (status, _) = send(
            &app,
            post_json(
                "/api/proxy/openai",
                r#"{"url":"http://127.0.0.1:9/v1/chat/completions","apiKey":"sk","body":{}}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }
}
