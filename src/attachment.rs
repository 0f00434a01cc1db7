//! User-supplied files attached to AI prompts.
//!
//! Images travel inline as base64 with their MIME type; everything else must be
//! UTF-8 text. Raw input is capped at [`MAX_ATTACHMENT_BYTES`].

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::AttachmentError;

/// Largest accepted attachment, in raw bytes.
pub const MAX_ATTACHMENT_BYTES: usize = 2 * 1024 * 1024;

/// A file attached to a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attachment {
    Image {
        name: String,
        mime_type: String,
        /// Base64 (standard alphabet, padded).
        data: String,
    },
    Text {
        name: String,
        content: String,
    },
}

impl Attachment {
    /// Build an attachment from raw bytes.
    pub fn from_bytes(name: impl Into<String>, mime_type: &str, bytes: &[u8]) -> Result<Self, AttachmentError> {
        let name = name.into();
        if bytes.len() > MAX_ATTACHMENT_BYTES {
            return Err(AttachmentError::TooLarge {
                name,
                size: bytes.len(),
                max: MAX_ATTACHMENT_BYTES,
            });
        }

        if mime_type.starts_with("image/") {
            return Ok(Self::Image {
                name,
                mime_type: mime_type.to_string(),
                data: STANDARD.encode(bytes),
            });
        }

        match std::str::from_utf8(bytes) {
            Ok(text) => Ok(Self::Text {
                name,
                content: text.to_string(),
            }),
            Err(_) => Err(AttachmentError::NotText { name }),
        }
    }

    /// Read an attachment from disk, guessing the MIME type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self, AttachmentError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
            .to_string();

        let size = tokio::fs::metadata(path).await?.len() as usize;
        if size > MAX_ATTACHMENT_BYTES {
            return Err(AttachmentError::TooLarge {
                name,
                size,
                max: MAX_ATTACHMENT_BYTES,
            });
        }

        let bytes = tokio::fs::read(path).await?;
        Self::from_bytes(name, mime_for_path(path), &bytes)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Image { name, .. } | Self::Text { name, .. } => name,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image { .. })
    }

    /// `data:` URL form used by OpenAI image content blocks.
    pub fn data_url(&self) -> Option<String> {
        match self {
            Self::Image { mime_type, data, .. } => Some(format!("data:{mime_type};base64,{data}")),
            Self::Text { .. } => None,
        }
    }
}

/// MIME type from a file extension. Unknown extensions are treated as text.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "json" => "application/json",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        _ => "text/plain",
    }
}
