//! Shared HTTP plumbing for providers.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;

use crate::error::LlmError;

/// Default timeout for provider requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn build_client() -> reqwest::Client {
    build_client_with(DEFAULT_TIMEOUT)
}

/// Client bounded by connect time and by `idle_timeout` between reads.
///
/// There is no whole-response limit, so a stream runs as long as bytes keep
/// arriving. Non-streaming calls set their own total via
/// `RequestBuilder::timeout`.
pub(crate) fn build_client_with(idle_timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(idle_timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> LlmError {
    LlmError::Transport {
        provider: provider.to_string(),
        reason: err.to_string(),
    }
}

/// Turn a non-2xx response into [`LlmError::Http`], keeping any `Retry-After`
/// hint (seconds form only).
pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();

    Err(LlmError::Http {
        provider: provider.to_string(),
        status: status.as_u16(),
        body,
        retry_after,
    })
}
