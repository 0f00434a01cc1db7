//! `DocumentStore` trait: single async interface for path-keyed JSON documents.
//!
//! Implemented by the local JSON-file backend and by the HTTP client, so the
//! backup and generation code runs against either.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;

/// Write options for [`DocumentStore::set`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    /// Shallow-merge top-level fields onto the existing value instead of
    /// replacing it. Read-then-write, not atomic.
    pub merge: bool,
}

impl SetOptions {
    pub fn merge() -> Self {
        Self { merge: true }
    }
}

/// A change observed at the store boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    pub path: String,
    /// New value, `None` when the document was removed by a full overwrite.
    pub value: Option<Value>,
}

/// Backend-agnostic document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document. `Ok(None)` when the path was never written.
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    /// Overwrite a document unconditionally.
    async fn put(&self, path: &str, value: Value) -> Result<()>;

    /// Dump the full mapping.
    async fn dump(&self) -> Result<Map<String, Value>>;

    /// Replace the full mapping.
    async fn replace_all(&self, data: Map<String, Value>) -> Result<()>;

    /// Write a document, optionally merging onto the current value.
    ///
    /// Returns the value that was written. Concurrent writers on the same path
    /// race; the later write wins.
    async fn set(&self, path: &str, value: Value, options: SetOptions) -> Result<Value> {
        let value = if options.merge {
            let existing = self.get(path).await?;
            shallow_merge(existing, value)
        } else {
            value
        };
        self.put(path, value.clone()).await?;
        Ok(value)
    }
}

/// Merge the top-level fields of `incoming` onto `existing`.
///
/// Non-object values on either side mean `incoming` wins outright.
pub fn shallow_merge(existing: Option<Value>, incoming: Value) -> Value {
    match (existing, incoming) {
        (Some(Value::Object(mut base)), Value::Object(fields)) => {
            base.extend(fields);
            Value::Object(base)
        }
        (_, incoming) => incoming,
    }
}

/// Strip leading/trailing slashes so `/sites/a/` and `sites/a` address the same
/// document.
pub fn normalize_path(path: &str) -> &str {
    path.trim_matches('/')
}
