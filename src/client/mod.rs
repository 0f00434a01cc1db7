//! HTTP client for the document backend.
//!
//! [`HttpDocumentClient`] implements [`DocumentStore`] against the
//! `/api/data` routes, so code written against the trait runs unchanged in a
//! separate process from the server.

pub mod watch;

pub use watch::{DEFAULT_POLL_INTERVAL, WatchHandle, watch, watch_with_interval};

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::store::{DocumentStore, normalize_path};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// `DocumentStore` over the backend's REST API.
#[derive(Clone)]
pub struct HttpDocumentClient {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpDocumentClient {
    /// `base_url` is the server root, e.g. `http://localhost:3001`.
    pub fn new(base_url: &str) -> std::result::Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self::with_client(base_url, client)
    }

    pub fn with_client(
        base_url: &str,
        client: reqwest::Client,
    ) -> std::result::Result<Self, ClientError> {
        let invalid = |reason: String| ClientError::InvalidUrl {
            url: base_url.to_string(),
            reason,
        };
        let mut url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if url.cannot_be_a_base() {
            return Err(invalid("not a hierarchical URL".to_string()));
        }
        url.set_query(None);
        url.set_fragment(None);
        Ok(Self {
            base_url: url,
            client,
        })
    }

    /// `{base}/api/data` followed by `segments`, each percent-encoded on its own.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base_url.clone();
        // with_client rejects cannot-be-a-base URLs, so this always succeeds.
        if let Ok(mut parts) = url.path_segments_mut() {
            parts.pop_if_empty().extend(["api", "data"]).extend(segments);
        }
        url
    }

    fn dump_url(&self) -> Url {
        self.endpoint([])
    }

    /// Document paths keep `/` as a separator; every other character that is
    /// not URL-safe (`#`, `?`, `%`, spaces) is escaped.
    fn document_url(&self, path: &str) -> Url {
        self.endpoint(normalize_path(path).split('/'))
    }

    async fn send(&self, url: &Url, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await.map_err(|e| ClientError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(response)
    }

    async fn expect_success(url: &Url, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        }
        .into())
    }

    async fn decode(url: &Url, response: reqwest::Response) -> Result<Value> {
        response.json::<Value>().await.map_err(|e| {
            ClientError::Decode {
                url: url.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentClient {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let url = self.document_url(path);
        let response = self.send(&url, self.client.get(url.clone())).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(path = %path, "Document not found");
            return Ok(None);
        }
        let response = Self::expect_success(&url, response).await?;
        Ok(Some(Self::decode(&url, response).await?))
    }

    async fn put(&self, path: &str, value: Value) -> Result<()> {
        if !value.is_object() {
            return Err(ClientError::NotAnObject {
                path: path.to_string(),
            }
            .into());
        }
        let url = self.document_url(path);
        let response = self.send(&url, self.client.post(url.clone()).json(&value)).await?;
        Self::expect_success(&url, response).await?;
        Ok(())
    }

    async fn dump(&self) -> Result<Map<String, Value>> {
        let url = self.dump_url();
        let response = self.send(&url, self.client.get(url.clone())).await?;
        let response = Self::expect_success(&url, response).await?;
        match Self::decode(&url, response).await? {
            Value::Object(map) => Ok(map),
            other => Err(ClientError::Decode {
                url: url.to_string(),
                reason: format!("expected an object, got {other}"),
            }
            .into()),
        }
    }

    async fn replace_all(&self, data: Map<String, Value>) -> Result<()> {
        let url = self.dump_url();
        let response = self
            .send(&url, self.client.post(url.clone()).json(&Value::Object(data)))
            .await?;
        Self::expect_success(&url, response).await?;
        Ok(())
    }
}
