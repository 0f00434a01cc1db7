//! Forwarder for OpenAI-compatible endpoints the browser cannot reach
//! directly (CORS, mixed content).

use axum::{
    Json,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{AppState, error_response};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ProxyRequest {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    body: Value,
}

pub(super) async fn openai(
    State(state): State<AppState>,
    request: Result<Json<ProxyRequest>, JsonRejection>,
) -> Response {
    let request = match request {
        Ok(Json(r)) => r,
        Err(rejection) => return error_response(rejection.status(), rejection.body_text()),
    };
    let Some(url) = request.url.filter(|u| !u.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing url");
    };

    let streaming = request
        .body
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    debug!(url = %url, streaming, "Proxying provider request");

    let mut upstream = state.http.post(&url).json(&request.body);
    if !streaming {
        upstream = upstream.timeout(state.proxy_timeout);
    }
    if let Some(key) = request.api_key.filter(|k| !k.is_empty()) {
        upstream = upstream.bearer_auth(key);
    }

    let response = match upstream.send().await {
        Ok(r) => r,
        Err(e) => {
            warn!(url = %url, error = %e, "Proxy upstream unreachable");
            return error_response(StatusCode::BAD_GATEWAY, format!("Upstream request failed: {e}"));
        }
    };
    let status = response.status();

    if streaming && status.is_success() {
        return (
            status,
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            Body::from_stream(response.bytes_stream()),
        )
            .into_response();
    }

    let bytes = match response.bytes().await {
        Ok(b) => b,
        Err(e) => {
            warn!(url = %url, error = %e, "Proxy upstream body read failed");
            return error_response(StatusCode::BAD_GATEWAY, format!("Upstream read failed: {e}"));
        }
    };
    if !status.is_success() {
        warn!(url = %url, status = status.as_u16(), "Proxy upstream returned error");
    }

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(value) => (status, Json(value)).into_response(),
        Err(_) => (status, bytes).into_response(),
    }
}
