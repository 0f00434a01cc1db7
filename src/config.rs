//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::settings::{SettingsStore, keys};

/// Backend server configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port the HTTP API listens on.
    pub port: u16,
    /// JSON file backing the document store.
    pub data_file: PathBuf,
    /// JSON file backing local settings.
    pub settings_file: PathBuf,
    /// Directory for rolling log files (stderr only when unset).
    pub log_dir: Option<PathBuf>,
    /// Timeout for outbound HTTP calls made by the proxy.
    pub request_timeout: Duration,
    /// Remote backend for the CLI commands; the local data file when unset.
    pub backend_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            data_file: PathBuf::from("./data/db.json"),
            settings_file: PathBuf::from("./data/settings.json"),
            log_dir: None,
            request_timeout: Duration::from_secs(120),
            backend_url: None,
        }
    }
}

impl ServerConfig {
    /// Build config from `CMS_*` environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port: u16 = std::env::var("CMS_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.port);

        let data_file = std::env::var("CMS_DATA_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_file);

        let settings_file = std::env::var("CMS_SETTINGS_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.settings_file);

        let log_dir = std::env::var("CMS_LOG_DIR").ok().map(PathBuf::from);

        let request_timeout = std::env::var("CMS_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        let backend_url = std::env::var("CMS_BACKEND_URL")
            .ok()
            .filter(|s| !s.trim().is_empty());

        Self {
            port,
            data_file,
            settings_file,
            log_dir,
            request_timeout,
            backend_url,
        }
    }
}

/// Supported AI providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    OpenAi,
}

impl ProviderKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Some(Self::Gemini),
            "openai" | "open_ai" | "openai-compatible" => Some(Self::OpenAi),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini-2.5-flash",
            Self::OpenAi => "gpt-4o-mini",
        }
    }

    /// Context window in tokens assumed when settings do not override it.
    pub fn default_context_window(&self) -> usize {
        match self {
            Self::Gemini => 1_048_576,
            Self::OpenAi => 128_000,
        }
    }
}

/// AI provider configuration passed explicitly into the gateway.
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub provider: ProviderKind,
    pub api_key: SecretString,
    pub model: String,
    /// Override for the provider endpoint (OpenAI-compatible hosts, tests).
    pub base_url: Option<String>,
    pub context_window_tokens: usize,
}

impl AiConfig {
    pub fn new(provider: ProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: SecretString::from(api_key.into()),
            model: provider.default_model().to_string(),
            base_url: None,
            context_window_tokens: provider.default_context_window(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_context_window(mut self, tokens: usize) -> Self {
        self.context_window_tokens = tokens;
        self
    }

    /// Load the active provider configuration from local settings.
    ///
    /// Defaults to Gemini when no provider is selected.
    pub async fn from_settings(settings: &SettingsStore) -> Result<Self, ConfigError> {
        let provider = match settings.get_str(keys::AI_PROVIDER).await {
            Some(raw) => ProviderKind::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: keys::AI_PROVIDER.to_string(),
                message: format!("unknown provider '{raw}'"),
            })?,
            None => ProviderKind::Gemini,
        };

        let (key_name, model_name) = match provider {
            ProviderKind::Gemini => (keys::GEMINI_API_KEY, keys::GEMINI_MODEL),
            ProviderKind::OpenAi => (keys::OPENAI_API_KEY, keys::OPENAI_MODEL),
        };

        let api_key = settings
            .get_str(key_name)
            .await
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: key_name.to_string(),
                hint: format!("Set an API key for {} in the AI settings.", provider.name()),
            })?;

        let mut config = Self::new(provider, api_key);

        if let Some(model) = settings.get_str(model_name).await.filter(|m| !m.is_empty()) {
            config.model = model;
        }

        if provider == ProviderKind::OpenAi {
            config.base_url = settings
                .get_str(keys::OPENAI_BASE_URL)
                .await
                .filter(|u| !u.is_empty());
        }

        if let Some(value) = settings.get(keys::CONTEXT_WINDOW_TOKENS).await {
            let tokens = value
                .as_u64()
                .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
                .filter(|t| *t > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: keys::CONTEXT_WINDOW_TOKENS.to_string(),
                    message: format!("expected a positive integer, got {value}"),
                })?;
            config.context_window_tokens = tokens as usize;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    async fn settings_with(pairs: &[(&str, serde_json::Value)]) -> (SettingsStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let settings = SettingsStore::open(dir.path().join("settings.json")).await.unwrap();
        for (k, v) in pairs {
            settings.set(k, v.clone()).await.unwrap();
        }
        (settings, dir)
    }

    #[test]
    fn provider_parse_aliases() {
        assert_eq!(ProviderKind::parse("Gemini"), Some(ProviderKind::Gemini));
        assert_eq!(ProviderKind::parse("openai"), Some(ProviderKind::OpenAi));
        assert_eq!(ProviderKind::parse("claude"), None);
    }

    #[tokio::test]
    async fn defaults_to_gemini() {
        let (settings, _dir) = settings_with(&[(keys::GEMINI_API_KEY, json!("g-key"))]).await;
        let config = AiConfig::from_settings(&settings).await.unwrap();
        assert_eq!(config.provider, ProviderKind::Gemini);
        assert_eq!(config.api_key.expose_secret(), "g-key");
        assert_eq!(config.model, "gemini-2.5-flash");
        assert_eq!(config.context_window_tokens, 1_048_576);
    }

    #[tokio::test]
    async fn openai_reads_base_url_and_model() {
        let (settings, _dir) = settings_with(&[
            (keys::AI_PROVIDER, json!("openai")),
            (keys::OPENAI_API_KEY, json!("sk-test")),
            (keys::OPENAI_MODEL, json!("llama-3")),
            (keys::OPENAI_BASE_URL, json!("http://localhost:11434")),
            (keys::CONTEXT_WINDOW_TOKENS, json!("8192")),
        ])
        .await;
        let config = AiConfig::from_settings(&settings).await.unwrap();
        assert_eq!(config.provider, ProviderKind::OpenAi);
        assert_eq!(config.model, "llama-3");
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:11434"));
        assert_eq!(config.context_window_tokens, 8192);
    }

    #[tokio::test]
    async fn missing_key_is_an_error() {
        let (settings, _dir) = settings_with(&[(keys::AI_PROVIDER, json!("openai"))]).await;
        let err = AiConfig::from_settings(&settings).await.unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
    }

    #[tokio::test]
    async fn unknown_provider_is_an_error() {
        let (settings, _dir) = settings_with(&[(keys::AI_PROVIDER, json!("claude"))]).await;
        let err = AiConfig::from_settings(&settings).await.unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
