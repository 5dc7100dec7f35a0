//! Image attachments for outgoing messages.
//!
//! Each attachment owns its bytes; they are released when the attachment
//! (or the [`Attachments`] set holding it) is dropped or taken.

use std::path::Path;

use base64::Engine;
use bytes::Bytes;
use tracing::debug;

use crate::error::ClientError;

/// Largest accepted image.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

pub const ALLOWED_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

#[derive(Debug, Clone)]
pub struct Attachment {
    pub id: String,
    pub content_type: &'static str,
    bytes: Bytes,
}

impl Attachment {
    /// Wrap raw image bytes, detecting the type from their signature.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Result<Self, ClientError> {
        let bytes = bytes.into();
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(ClientError::ImageTooLarge {
                size: bytes.len(),
                max: MAX_IMAGE_BYTES,
            });
        }
        let content_type = sniff(&bytes).ok_or_else(|| ClientError::UnsupportedImage("unknown format".into()))?;
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            content_type,
            bytes,
        })
    }

    pub async fn from_path(path: &Path) -> Result<Self, ClientError> {
        let bytes = tokio::fs::read(path).await?;
        Self::from_bytes(bytes).map_err(|e| match e {
            ClientError::UnsupportedImage(_) => ClientError::UnsupportedImage(path.display().to_string()),
            other => other,
        })
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Inline `data:` URI for the message's `images` list.
    pub fn to_data_uri(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        format!("data:{};base64,{encoded}", self.content_type)
    }
}

fn sniff(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(ALLOWED_TYPES[0])
    } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some(ALLOWED_TYPES[1])
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some(ALLOWED_TYPES[2])
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some(ALLOWED_TYPES[3])
    } else {
        None
    }
}

/// Pending attachments for the next message.
#[derive(Debug, Default)]
pub struct Attachments {
    items: Vec<Attachment>,
}

impl Attachments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, attachment: Attachment) -> &str {
        debug!(id = %attachment.id, size = attachment.size(), "Attachment added");
        self.items.push(attachment);
        self.items.last().map(|a| a.id.as_str()).unwrap_or_default()
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|a| a.id != id);
        self.items.len() != before
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Encode every attachment and clear the set.
    pub fn take_data_uris(&mut self) -> Vec<String> {
        self.items.drain(..).map(|a| a.to_data_uri()).collect()
    }
}
