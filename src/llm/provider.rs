//! LLM provider trait and the wire-neutral request/response types.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::attachment::Attachment;
use crate::error::LlmError;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Message text with every text attachment appended. Image attachments are
    /// carried separately by each provider's wire format.
    pub fn text_with_attachments(&self) -> String {
        let mut text = self.content.clone();
        for att in &self.attachments {
            if let Attachment::Text { name, content } = att {
                text.push_str(&format!("\n\n--- Attachment: {name} ---\n{content}"));
            }
        }
        text
    }

    pub fn images(&self) -> impl Iterator<Item = &Attachment> {
        self.attachments.iter().filter(|a| a.is_image())
    }
}

/// A completion request.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Ask the provider for a JSON object response.
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    /// Joined text of the system messages, if any.
    pub fn system_text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }
}

/// Why the model stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Unknown,
}

/// A non-streaming completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: FinishReason,
}

/// One item of a streamed completion. A stream ends with either `Done` or an
/// `Err` item; nothing follows either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamDelta {
    Text(String),
    Done,
}

/// Stream of text deltas. Dropping it cancels the underlying request.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<StreamDelta, LlmError>> + Send>>;

/// Trait implemented by each provider (Gemini, OpenAI-compatible).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier ("gemini", "openai").
    fn name(&self) -> &str;

    fn model_name(&self) -> &str;

    /// Single request, no retry.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Start a streaming request. Errors before the first byte are returned
    /// directly; later failures arrive as an `Err` item.
    async fn stream(&self, request: CompletionRequest) -> Result<TextStream, LlmError>;
}

/// Append the terminal `Done` item to a delta stream, and stop after the first
/// error.
pub fn terminate_stream<S>(inner: S) -> TextStream
where
    S: Stream<Item = Result<StreamDelta, LlmError>> + Send + 'static,
{
    Box::pin(futures::stream::unfold(
        (Box::pin(inner), false),
        |(mut inner, finished)| async move {
            if finished {
                return None;
            }
            match inner.next().await {
                Some(Ok(delta)) => Some((Ok(delta), (inner, false))),
                Some(Err(e)) => Some((Err(e), (inner, true))),
                None => Some((Ok(StreamDelta::Done), (inner, true))),
            }
        },
    ))
}

/// Drain a stream into its full text. Fails on the first error item.
pub async fn collect_text(mut stream: TextStream) -> Result<String, LlmError> {
    let mut text = String::new();
    while let Some(item) = stream.next().await {
        match item? {
            StreamDelta::Text(t) => text.push_str(&t),
            StreamDelta::Done => break,
        }
    }
    Ok(text)
}
