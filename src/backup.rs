//! Backup bundles: a full snapshot of the document store, local settings and
//! the admin UI's state.
//!
//! Restore validates the whole bundle before touching anything. Bundles from
//! older releases carry settings under `localConfig` and restore the same way.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{BackupError, Result};
use crate::settings::SettingsStore;
use crate::store::DocumentStore;

/// Version written into new bundles.
pub const BACKUP_VERSION: &str = "2";

/// A validated backup bundle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupBundle {
    pub version: String,
    pub timestamp: String,
    pub app_state: Value,
    pub settings: Map<String, Value>,
    pub backend_data: Map<String, Value>,
}

impl BackupBundle {
    /// Parse and validate a bundle without side effects.
    pub fn parse(json: &str) -> std::result::Result<Self, BackupError> {
        let value: Value = serde_json::from_str(json).map_err(|e| BackupError::Parse(e.to_string()))?;
        let Value::Object(mut root) = value else {
            return Err(BackupError::InvalidField {
                field: "(root)".to_string(),
                reason: "expected a JSON object".to_string(),
            });
        };

        let backend_data = match root.remove("backendData") {
            None | Some(Value::Null) => {
                return Err(BackupError::MissingField {
                    field: "backendData".to_string(),
                });
            }
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(BackupError::InvalidField {
                    field: "backendData".to_string(),
                    reason: "expected an object".to_string(),
                });
            }
        };

        let (settings_field, settings) = match root.remove("settings") {
            Some(v) => ("settings", Some(v)),
            None => ("localConfig", root.remove("localConfig")),
        };
        let settings = match settings {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(BackupError::InvalidField {
                    field: settings_field.to_string(),
                    reason: "expected an object".to_string(),
                });
            }
        };

        let version = match root.remove("version") {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => "1".to_string(),
        };
        let timestamp = match root.remove("timestamp") {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };

        Ok(Self {
            version,
            timestamp,
            app_state: root.remove("appState").unwrap_or(Value::Null),
            settings,
            backend_data,
        })
    }

    pub fn to_json_pretty(&self) -> std::result::Result<String, BackupError> {
        serde_json::to_string_pretty(self).map_err(|e| BackupError::Parse(e.to_string()))
    }
}

/// Snapshot settings and the full store.
pub async fn create_backup<S>(app_state: Value, settings: &SettingsStore, store: &S) -> Result<BackupBundle>
where
    S: DocumentStore + ?Sized,
{
    let backend_data = store.dump().await?;
    let bundle = BackupBundle {
        version: BACKUP_VERSION.to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        app_state,
        settings: settings.snapshot().await,
        backend_data,
    };
    info!(
        documents = bundle.backend_data.len(),
        settings = bundle.settings.len(),
        "Backup created"
    );
    Ok(bundle)
}

/// Validate `json`, then replace the store mapping and settings with its
/// contents. Returns the bundle's `appState` for the caller to apply.
///
/// Nothing is written unless validation passes.
pub async fn restore_backup<S>(
    json: &str,
    settings: &SettingsStore,
    store: &S,
) -> std::result::Result<Value, BackupError>
where
    S: DocumentStore + ?Sized,
{
    let bundle = BackupBundle::parse(json)?;
    let documents = bundle.backend_data.len();

    store
        .replace_all(bundle.backend_data)
        .await
        .map_err(|e| BackupError::Store(e.to_string()))?;
    settings.replace_all(bundle.settings).await?;

    info!(
        version = %bundle.version,
        timestamp = %bundle.timestamp,
        documents,
        "Backup restored"
    );
    Ok(bundle.app_state)
}
