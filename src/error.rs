//! Error types for CMS Studio.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Backup error: {0}")]
    Backup(#[from] BackupError),

    #[error("Attachment error: {0}")]
    Attachment(#[from] AttachmentError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Settings file {path} is corrupt: {reason}")]
    CorruptSettings { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Document store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Data file {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Document at {path} must be a JSON object")]
    NotAnObject { path: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP document client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("Unexpected HTTP {status} from {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("Document at {path} must be a JSON object")]
    NotAnObject { path: String },

    #[error("Invalid backend URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} returned HTTP {status}: {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider {provider} request failed: {reason}")]
    Transport { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Malformed JSON in model output: {reason}")]
    MalformedJson { reason: String },

    #[error("Provider {provider} is not configured: {reason}")]
    NotConfigured { provider: String, reason: String },
}

impl LlmError {
    /// Rate limits (429), unavailability (503) and transport failures are
    /// worth another attempt. Everything else is surfaced immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Http { status, .. } => matches!(status, 429 | 503),
            LlmError::Transport { .. } => true,
            _ => false,
        }
    }

    /// Server-provided backoff hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Backup bundle errors.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Backup file is not valid JSON: {0}")]
    Parse(String),

    #[error("Backup file is missing required field: {field}")]
    MissingField { field: String },

    #[error("Backup field {field} is invalid: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Store error during restore: {0}")]
    Store(String),

    #[error("Settings error during restore: {0}")]
    Settings(#[from] ConfigError),
}

/// Attachment validation errors.
#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    #[error("Attachment {name} is too large: {size} bytes > {max} bytes")]
    TooLarge { name: String, size: usize, max: usize },

    #[error("Attachment {name} is not valid UTF-8 text")]
    NotText { name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> LlmError {
        LlmError::Http {
            provider: "test".into(),
            status,
            body: String::new(),
            retry_after: None,
        }
    }

    #[test]
    fn only_rate_limit_and_unavailable_statuses_retry() {
        assert!(http(429).is_retryable());
        assert!(http(503).is_retryable());
        assert!(!http(400).is_retryable());
        assert!(!http(401).is_retryable());
        assert!(!http(404).is_retryable());
        assert!(!http(500).is_retryable());
    }

    #[test]
    fn malformed_json_is_not_retryable() {
        let err = LlmError::MalformedJson {
            reason: "eof".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn transport_errors_retry() {
        let err = LlmError::Transport {
            provider: "gemini".into(),
            reason: "connection reset".into(),
        };
        assert!(err.is_retryable());
    }
}
