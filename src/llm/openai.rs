//! OpenAI Chat Completions provider.
//!
//! Also serves OpenAI-compatible hosts (local runtimes, proxies) through a
//! custom base URL.

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::http::{DEFAULT_TIMEOUT, build_client, check_status, transport_error};
use super::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
    StreamDelta, TextStream, terminate_stream,
};
use super::sse::parse_sse_lines;
use crate::error::LlmError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const PROVIDER: &str = "openai";

/// OpenAI-compatible chat completions provider.
pub struct OpenAiProvider {
    api_key: SecretString,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: SecretString, model: &str, base_url: Option<&str>) -> Self {
        Self {
            api_key,
            model: model.to_string(),
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            client: build_client(),
        }
    }

    /// Completions URL; accepts base URLs with or without a trailing `/v1`.
    pub(crate) fn endpoint(&self) -> String {
        if self.base_url.ends_with("/v1") {
            format!("{}/chat/completions", self.base_url)
        } else {
            format!("{}/v1/chat/completions", self.base_url)
        }
    }

    pub(crate) fn build_request_body(&self, request: &CompletionRequest, stream: bool) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(to_openai_message).collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
        });
        if let Some(t) = request.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(max) = request.max_tokens {
            body["max_tokens"] = json!(max);
        }
        if request.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response, LlmError> {
        let url = self.endpoint();
        debug!(model = %self.model, url = %url, "calling OpenAI API");

        let mut request = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(body);
        if body.get("stream").and_then(Value::as_bool) != Some(true) {
            request = request.timeout(DEFAULT_TIMEOUT);
        }
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        check_status(PROVIDER, response).await
    }
}

/// Plain string content, or a content-block array when images are attached.
fn to_openai_message(msg: &ChatMessage) -> Value {
    let role = match msg.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    let text = msg.text_with_attachments();

    let image_urls: Vec<String> = msg.images().filter_map(|a| a.data_url()).collect();
    if image_urls.is_empty() {
        return json!({ "role": role, "content": text });
    }

    let mut blocks = vec![json!({ "type": "text", "text": text })];
    for url in image_urls {
        blocks.push(json!({ "type": "image_url", "image_url": { "url": url } }));
    }
    json!({ "role": role, "content": blocks })
}

fn finish_reason(parsed: &Value) -> FinishReason {
    let reason = parsed
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("finish_reason"))
        .and_then(|r| r.as_str());
    match reason {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Unknown,
    }
}

fn usage_count(parsed: &Value, field: &str) -> u32 {
    parsed
        .get("usage")
        .and_then(|u| u.get(field))
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32
}

/// Text of `choices[0].delta.content` in a streamed chunk.
fn delta_text(event: &Value) -> Option<String> {
    event
        .get("choices")?
        .as_array()?
        .first()?
        .get("delta")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request_body(&request, false);
        let response = self.send(&body).await?;

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        let content = parsed
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: "response has no choices[0].message.content".to_string(),
            })?
            .to_string();

        Ok(CompletionResponse {
            content,
            input_tokens: usage_count(&parsed, "prompt_tokens"),
            output_tokens: usage_count(&parsed, "completion_tokens"),
            finish_reason: finish_reason(&parsed),
        })
    }

    async fn stream(&self, request: CompletionRequest) -> Result<TextStream, LlmError> {
        let body = self.build_request_body(&request, true);
        let response = self.send(&body).await?;

        let deltas = parse_sse_lines(response.bytes_stream(), PROVIDER.to_string()).filter_map(
            |item| async move {
                match item {
                    Ok(data) => match serde_json::from_str::<Value>(&data) {
                        Ok(event) => delta_text(&event)
                            .filter(|t| !t.is_empty())
                            .map(|t| Ok(StreamDelta::Text(t))),
                        Err(e) => {
                            warn!(provider = PROVIDER, error = %e, "Failed to parse SSE event");
                            None
                        }
                    },
                    Err(e) => Some(Err(e)),
                }
            },
        );

        Ok(terminate_stream(deltas))
    }
}
