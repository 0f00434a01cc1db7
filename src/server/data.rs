//! `/api/data` routes over the JSON-file store.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{AppState, error_response, store_error_response};
use crate::store::DocumentStore;

/// Unwrap a JSON body, turning extractor rejections into `{error}` responses.
fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, Response> {
    body.map(|Json(v)| v)
        .map_err(|rejection| error_response(rejection.status(), rejection.body_text()))
}

pub(super) async fn dump(State(state): State<AppState>) -> Response {
    match state.store.dump().await {
        Ok(map) => Json(Value::Object(map)).into_response(),
        Err(e) => store_error_response(e),
    }
}

pub(super) async fn replace_all(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let value = match json_body(body) {
        Ok(v) => v,
        Err(response) => return response,
    };
    let Value::Object(map) = value else {
        return error_response(StatusCode::BAD_REQUEST, "Body must be a JSON object");
    };

    let count = map.len();
    match state.store.replace_all(map).await {
        Ok(()) => {
            info!(documents = count, "Store overwritten");
            Json(json!({ "success": true })).into_response()
        }
        Err(e) => store_error_response(e),
    }
}

pub(super) async fn get_document(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Response {
    match state.store.get(&path).await {
        Ok(Some(value)) => Json(value).into_response(),
        Ok(None) => {
            debug!(path = %path, "Document not found");
            error_response(StatusCode::NOT_FOUND, "Not found")
        }
        Err(e) => store_error_response(e),
    }
}

pub(super) async fn put_document(
    State(state): State<AppState>,
    Path(path): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let value = match json_body(body) {
        Ok(v) => v,
        Err(response) => return response,
    };

    match state.store.put(&path, value).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))).into_response(),
        Err(e) => store_error_response(e),
    }
}
