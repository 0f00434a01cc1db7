//! JSON-file document store.
//!
//! The whole mapping lives in one JSON object on disk and every operation
//! reads or rewrites the whole file. File access is serialized by one async
//! mutex so writes to distinct paths never clobber each other; two writers on
//! the same path are still last-write-wins.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::Stream;
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::{Mutex, broadcast};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, info, warn};

use super::traits::{DocumentChange, DocumentStore, normalize_path};
use crate::error::{Result, StoreError};

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Document store backed by a single JSON file.
pub struct JsonFileStore {
    path: PathBuf,
    io_lock: Mutex<()>,
    tx: broadcast::Sender<DocumentChange>,
}

impl JsonFileStore {
    /// Create a store over `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Self {
            path: path.into(),
            io_lock: Mutex::new(()),
            tx,
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Subscribe to every change written through this store.
    pub fn subscribe(&self) -> broadcast::Receiver<DocumentChange> {
        self.tx.subscribe()
    }

    /// Push-based feed of the values written to one path.
    ///
    /// Lagged receivers skip the missed changes; callers that need the latest
    /// value after a lag should re-read with [`DocumentStore::get`].
    pub fn changes(&self, path: &str) -> impl Stream<Item = Option<Value>> + Send + use<> {
        let wanted = normalize_path(path).to_string();
        BroadcastStream::new(self.subscribe()).filter_map(move |item| match item {
            Ok(change) if change.path == wanted => Some(change.value),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                warn!(missed = n, path = %wanted, "Changefeed subscriber lagged");
                None
            }
        })
    }

    async fn read_all(&self) -> std::result::Result<Map<String, Value>, StoreError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(StoreError::Corrupt {
                path: self.path.display().to_string(),
                reason: "top-level value is not an object".to_string(),
            }),
            Err(e) => Err(StoreError::Corrupt {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn write_all(&self, data: &Map<String, Value>) -> std::result::Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, json).await?;
        Ok(())
    }

    fn publish(&self, change: DocumentChange) {
        // Ok if nobody is listening.
        let _ = self.tx.send(change);
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let path = normalize_path(path);
        let _guard = self.io_lock.lock().await;
        let data = self.read_all().await?;
        Ok(data.get(path).cloned())
    }

    async fn put(&self, path: &str, value: Value) -> Result<()> {
        let path = normalize_path(path);
        if !value.is_object() {
            return Err(StoreError::NotAnObject {
                path: path.to_string(),
            }
            .into());
        }

        {
            let _guard = self.io_lock.lock().await;
            let mut data = self.read_all().await?;
            data.insert(path.to_string(), value.clone());
            self.write_all(&data).await?;
        }

        debug!(path = %path, "Document written");
        self.publish(DocumentChange {
            path: path.to_string(),
            value: Some(value),
        });
        Ok(())
    }

    async fn dump(&self) -> Result<Map<String, Value>> {
        let _guard = self.io_lock.lock().await;
        Ok(self.read_all().await?)
    }

    async fn replace_all(&self, data: Map<String, Value>) -> Result<()> {
        let previous = {
            let _guard = self.io_lock.lock().await;
            // A corrupt file is being replaced wholesale, so its contents do
            // not matter beyond change notification.
            let previous = self.read_all().await.unwrap_or_default();
            self.write_all(&data).await?;
            previous
        };

        info!(documents = data.len(), "Document store replaced");

        for path in previous.keys().filter(|k| !data.contains_key(*k)) {
            self.publish(DocumentChange {
                path: path.clone(),
                value: None,
            });
        }
        for (path, value) in &data {
            if previous.get(path) != Some(value) {
                self.publish(DocumentChange {
                    path: path.clone(),
                    value: Some(value.clone()),
                });
            }
        }
        Ok(())
    }
}
