//! Local persisted configuration: string keys mapped to JSON values.
//!
//! Backs provider selection and credentials, custom prompts and cached prompt
//! templates. Nothing in the business logic reads this on its own: callers
//! load typed configuration from it explicitly (see [`crate::config::AiConfig`]).

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::ConfigError;

/// Well-known settings keys.
pub mod keys {
    pub const AI_PROVIDER: &str = "ai_provider";
    pub const GEMINI_API_KEY: &str = "gemini_api_key";
    pub const GEMINI_MODEL: &str = "gemini_model";
    pub const OPENAI_API_KEY: &str = "openai_api_key";
    pub const OPENAI_BASE_URL: &str = "openai_base_url";
    pub const OPENAI_MODEL: &str = "openai_model";
    pub const CONTEXT_WINDOW_TOKENS: &str = "context_window_tokens";
    pub const CUSTOM_SYSTEM_PROMPT: &str = "custom_system_prompt";
    pub const CONTENT_FILLING_PROMPT: &str = "content_filling_prompt";
    pub const CACHED_PROMPTS: &str = "cached_prompts";
}

/// File-backed key/value settings.
pub struct SettingsStore {
    path: PathBuf,
    values: RwLock<Map<String, Value>>,
}

impl SettingsStore {
    /// Open the settings file, treating a missing file as empty.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let values = read_settings(&path).await?;
        debug!(path = %path.display(), keys = values.len(), "Settings loaded");
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    /// Re-read the settings file, discarding the in-memory copy.
    pub async fn reload(&self) -> Result<(), ConfigError> {
        let fresh = read_settings(&self.path).await?;
        *self.values.write().await = fresh;
        Ok(())
    }

    /// Raw value for `key`.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.values.read().await.get(key).cloned()
    }

    /// String value for `key`. Non-string values read as absent.
    pub async fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key).await? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Decode the value for `key`. `None` when absent, `Some(Err)` when the
    /// stored value does not have the expected shape.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<Result<T, serde_json::Error>> {
        let value = self.get(key).await?;
        // Values written by older clients may be JSON-encoded strings.
        let decoded = match value {
            Value::String(ref s) => serde_json::from_str(s).or_else(|_| serde_json::from_value(value.clone())),
            other => serde_json::from_value(other),
        };
        Some(decoded)
    }

    /// Set `key` and persist.
    pub async fn set(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        let mut values = self.values.write().await;
        values.insert(key.to_string(), value);
        write_settings(&self.path, &values).await
    }

    /// Remove `key` and persist. Returns the removed value.
    pub async fn remove(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        let mut values = self.values.write().await;
        let removed = values.remove(key);
        if removed.is_some() {
            write_settings(&self.path, &values).await?;
        }
        Ok(removed)
    }

    /// Copy of every setting.
    pub async fn snapshot(&self) -> Map<String, Value> {
        self.values.read().await.clone()
    }

    /// Replace every setting and persist.
    pub async fn replace_all(&self, settings: Map<String, Value>) -> Result<(), ConfigError> {
        let mut values = self.values.write().await;
        write_settings(&self.path, &settings).await?;
        *values = settings;
        Ok(())
    }
}

async fn read_settings(path: &Path) -> Result<Map<String, Value>, ConfigError> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(e) => return Err(e.into()),
    };
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ConfigError::CorruptSettings {
            path: path.display().to_string(),
            reason: "top-level value is not an object".to_string(),
        }),
        Err(e) => Err(ConfigError::CorruptSettings {
            path: path.display().to_string(),
            reason: e.to_string(),
        }),
    }
}

async fn write_settings(path: &Path, values: &Map<String, Value>) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let json = serde_json::to_string_pretty(values).map_err(|e| ConfigError::InvalidValue {
        key: "settings".to_string(),
        message: e.to_string(),
    })?;
    fs::write(path, json).await?;
    Ok(())
}
