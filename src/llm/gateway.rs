//! AI gateway: routes requests to the configured provider.
//!
//! The gateway is built from an explicit [`AiConfig`] and only changes provider
//! through [`AiGateway::reload`]. Non-streaming calls go through the retry
//! policy; streaming calls do not. Oversized text attachments are summarized
//! before dispatch so the prompt fits the provider's context window.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use super::provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, TextStream};
use super::retry::{RetryPolicy, with_retry};
use super::create_provider;
use crate::attachment::Attachment;
use crate::config::AiConfig;
use crate::error::LlmError;
use crate::summarize::{ChunkSummarizer, SummarizeOptions, estimate_token_count, summarize_to_fit};

const SUMMARIZER_PROMPT: &str = "You condense reference documents for a website copywriter. \
Keep product names, numbers, specifications and claims. Drop repetition and boilerplate. \
Reply with the condensed text only.";

/// Attachments always get at least this many tokens, however long the prompt.
const MIN_ATTACHMENT_TOKENS: usize = 256;

#[derive(Clone)]
struct ActiveProvider {
    provider: Arc<dyn LlmProvider>,
    context_window_tokens: usize,
}

/// Entry point for every AI call.
pub struct AiGateway {
    active: RwLock<ActiveProvider>,
    retry: RetryPolicy,
}

impl AiGateway {
    /// Build a gateway for `config` with the default retry policy.
    pub fn new(config: &AiConfig) -> Result<Self, LlmError> {
        let provider = create_provider(config)?;
        Ok(Self::with_provider(provider, config.context_window_tokens))
    }

    /// Build a gateway around an existing provider.
    pub fn with_provider(provider: Arc<dyn LlmProvider>, context_window_tokens: usize) -> Self {
        Self {
            active: RwLock::new(ActiveProvider {
                provider,
                context_window_tokens,
            }),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Swap to the provider described by `config`. The old provider stays in
    /// use if the new one cannot be built.
    pub async fn reload(&self, config: &AiConfig) -> Result<(), LlmError> {
        let provider = create_provider(config)?;
        info!(
            provider = provider.name(),
            model = provider.model_name(),
            "AI gateway reloaded"
        );
        *self.active.write().await = ActiveProvider {
            provider,
            context_window_tokens: config.context_window_tokens,
        };
        Ok(())
    }

    pub async fn provider_name(&self) -> String {
        self.active.read().await.provider.name().to_string()
    }

    pub async fn context_window_tokens(&self) -> usize {
        self.active.read().await.context_window_tokens
    }

    /// Non-streaming completion with retry.
    pub async fn generate(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let active = self.active.read().await.clone();
        let request = self.fit_to_context(request, active.context_window_tokens).await;
        self.complete_with_retry(&active.provider, request).await
    }

    /// Streaming completion. Not retried; failures after the first byte end
    /// the stream with an error item.
    pub async fn stream(&self, request: CompletionRequest) -> Result<TextStream, LlmError> {
        let active = self.active.read().await.clone();
        let request = self.fit_to_context(request, active.context_window_tokens).await;
        active.provider.stream(request).await
    }

    async fn complete_with_retry(
        &self,
        provider: &Arc<dyn LlmProvider>,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        with_retry(&self.retry, provider.name(), || {
            let provider = Arc::clone(provider);
            let request = request.clone();
            async move { provider.complete(request).await }
        })
        .await
    }

    /// Summarize text attachments that would push the request past half of the
    /// context window. The other half is left for the reply.
    async fn fit_to_context(&self, mut request: CompletionRequest, window: usize) -> CompletionRequest {
        let prompt_tokens: usize = request
            .messages
            .iter()
            .map(|m| estimate_token_count(&m.content))
            .sum();
        let budget = (window / 2)
            .saturating_sub(prompt_tokens)
            .max(MIN_ATTACHMENT_TOKENS);

        let attachment_tokens: usize = request
            .messages
            .iter()
            .flat_map(|m| m.attachments.iter())
            .map(|a| match a {
                Attachment::Text { content, .. } => estimate_token_count(content),
                Attachment::Image { .. } => 0,
            })
            .sum();
        if attachment_tokens <= budget {
            return request;
        }

        for msg in &mut request.messages {
            for att in &mut msg.attachments {
                if let Attachment::Text { name, content } = att {
                    let tokens = estimate_token_count(content);
                    let share = (budget * tokens / attachment_tokens).max(1);
                    let options = SummarizeOptions::new(share, window);
                    let summary = summarize_to_fit(self, content.as_str(), &options).await;
                    info!(
                        attachment = %name,
                        from_tokens = tokens,
                        to_tokens = estimate_token_count(&summary.text),
                        passes = summary.passes,
                        truncated = summary.truncated,
                        "Attachment condensed to fit context"
                    );
                    *content = summary.text;
                }
            }
        }
        request
    }
}

#[async_trait]
impl ChunkSummarizer for AiGateway {
    async fn summarize_chunk(&self, chunk: &str, target_chars: usize) -> Result<String, LlmError> {
        let provider = self.active.read().await.provider.clone();
        let request = CompletionRequest::new(vec![
            ChatMessage::system(SUMMARIZER_PROMPT),
            ChatMessage::user(format!(
                "Condense the following text to at most {target_chars} characters.\n\n{chunk}"
            )),
        ])
        .with_temperature(0.2)
        .with_max_tokens((target_chars / 4 + 64) as u32);

        let response = self.complete_with_retry(&provider, request).await?;
        Ok(response.content.trim().to_string())
    }
}
