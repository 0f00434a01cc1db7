//! Google Gemini provider (`generateContent` / `streamGenerateContent`).

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
use crate::attachment::Attachment;
use crate::error::LlmError;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const PROVIDER: &str = "gemini";

/// Google Gemini LLM provider.
pub struct GeminiProvider {
    api_key: SecretString,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiProvider {
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

    fn endpoint(&self, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, self.model, method)
    }

    /// Convert messages to Gemini's `contents` shape. System messages become
    /// `systemInstruction`; assistant turns use the `model` role; images are
    /// `inlineData` parts.
    pub(crate) fn build_request_body(&self, request: &CompletionRequest) -> Value {
        let contents: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(to_gemini_content)
            .collect();

        let mut generation_config = json!({});
        if let Some(t) = request.temperature {
            generation_config["temperature"] = json!(t);
        }
        if let Some(max) = request.max_tokens {
            generation_config["maxOutputTokens"] = json!(max);
        }
        if request.json_mode {
            generation_config["responseMimeType"] = json!("application/json");
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": generation_config,
        });
        if let Some(system) = request.system_text() {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        body
    }
}

fn to_gemini_content(msg: &ChatMessage) -> Value {
    let role = match msg.role {
        Role::Assistant => "model",
        _ => "user",
    };

    let mut parts = vec![json!({ "text": msg.text_with_attachments() })];
    for att in msg.images() {
        if let Attachment::Image { mime_type, data, .. } = att {
            parts.push(json!({
                "inlineData": { "mimeType": mime_type, "data": data }
            }));
        }
    }

    json!({ "role": role, "parts": parts })
}

/// Concatenated text of the first candidate.
fn candidate_text(parsed: &Value) -> Option<String> {
    let parts = parsed
        .get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?;
    Some(
        parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect::<String>(),
    )
}

fn finish_reason(parsed: &Value) -> FinishReason {
    let reason = parsed
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("finishReason"))
        .and_then(|r| r.as_str());
    match reason {
        Some("STOP") => FinishReason::Stop,
        Some("MAX_TOKENS") => FinishReason::Length,
        Some("SAFETY") | Some("RECITATION") | Some("BLOCKLIST") => FinishReason::ContentFilter,
        _ => FinishReason::Unknown,
    }
}

fn usage_count(parsed: &Value, field: &str) -> u32 {
    parsed
        .get("usageMetadata")
        .and_then(|u| u.get(field))
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request_body(&request);
        debug!(model = %self.model, "calling Gemini API");

        let response = self
            .client
            .post(self.endpoint("generateContent"))
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .timeout(DEFAULT_TIMEOUT)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        let response = check_status(PROVIDER, response).await?;

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        let content = candidate_text(&parsed).ok_or_else(|| LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: "response has no candidate content".to_string(),
        })?;

        Ok(CompletionResponse {
            content,
            input_tokens: usage_count(&parsed, "promptTokenCount"),
            output_tokens: usage_count(&parsed, "candidatesTokenCount"),
            finish_reason: finish_reason(&parsed),
        })
    }

    async fn stream(&self, request: CompletionRequest) -> Result<TextStream, LlmError> {
        let body = self.build_request_body(&request);
        debug!(model = %self.model, "calling Gemini API (streaming)");

        let response = self
            .client
            .post(format!("{}?alt=sse", self.endpoint("streamGenerateContent")))
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        let response = check_status(PROVIDER, response).await?;

        let deltas = parse_sse_lines(response.bytes_stream(), PROVIDER.to_string()).filter_map(
            |item| async move {
                match item {
                    Ok(data) => match serde_json::from_str::<Value>(&data) {
                        Ok(event) => candidate_text(&event)
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
