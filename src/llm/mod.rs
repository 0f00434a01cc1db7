//! LLM integration.
//!
//! Supports:
//! - **Gemini**: `generateContent` over the public Generative Language API
//! - **OpenAI**: Chat Completions, including OpenAI-compatible hosts
//!
//! Providers speak HTTP through reqwest directly so a base URL can be swapped
//! per provider. Everything above them goes through [`AiGateway`].

pub mod gateway;
pub mod gemini;
pub(crate) mod http;
pub mod json;
pub mod openai;
pub mod provider;
pub mod retry;
pub(crate) mod sse;

pub use gateway::AiGateway;
pub use gemini::GeminiProvider;
pub use json::extract_json_object;
pub use openai::OpenAiProvider;
pub use provider::*;
pub use retry::RetryPolicy;

use std::sync::Arc;

use secrecy::ExposeSecret;

use crate::config::{AiConfig, ProviderKind};
use crate::error::LlmError;

/// Create an LLM provider from configuration.
pub fn create_provider(config: &AiConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    if config.api_key.expose_secret().trim().is_empty() {
        return Err(LlmError::NotConfigured {
            provider: config.provider.name().to_string(),
            reason: "API key is empty".to_string(),
        });
    }

    let base_url = config.base_url.as_deref();
    match config.provider {
        ProviderKind::Gemini => {
            tracing::info!("Using Gemini (model: {})", config.model);
            Ok(Arc::new(GeminiProvider::new(
                config.api_key.clone(),
                &config.model,
                base_url,
            )))
        }
        ProviderKind::OpenAi => {
            tracing::info!(
                "Using OpenAI (model: {}, base: {})",
                config.model,
                base_url.unwrap_or("default")
            );
            Ok(Arc::new(OpenAiProvider::new(
                config.api_key.clone(),
                &config.model,
                base_url,
            )))
        }
    }
}
