//! File attachments carried on the last chunk of a delivery.

use crate::error::DeliveryError;
use crate::Result;
use bytes::Bytes;
use std::path::PathBuf;

/// A file attached to an outbound message.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// File name shown on the platform.
    pub filename: String,

    /// MIME type.
    pub mime_type: String,

    /// Content source.
    pub source: AttachmentSource,

    /// Alt text.
    pub description: Option<String>,

    /// Whether the platform should blur the file.
    pub spoiler: bool,
}

/// Source of attachment data.
#[derive(Debug, Clone)]
pub enum AttachmentSource {
    /// Bytes in memory.
    Bytes(Bytes),

    /// Local file path, read at send time.
    Path(PathBuf),
}

impl Attachment {
    /// Create an attachment from bytes.
    pub fn from_bytes(
        bytes: impl Into<Bytes>,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            source: AttachmentSource::Bytes(bytes.into()),
            description: None,
            spoiler: false,
        }
    }

    /// Create an attachment from a file path, guessing its MIME type.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if !path.is_file() {
            return Err(DeliveryError::Attachment(format!(
                "File not found: {}",
                path.display()
            )));
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());

        let mime_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .to_string();

        Ok(Self {
            filename,
            mime_type,
            source: AttachmentSource::Path(path),
            description: None,
            spoiler: false,
        })
    }

    /// Set the alt text.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark as spoiler.
    pub fn as_spoiler(mut self) -> Self {
        self.spoiler = true;
        self
    }

    /// File name to upload under. Spoilers get the platform's `SPOILER_` prefix.
    pub fn upload_name(&self) -> String {
        if self.spoiler && !self.filename.starts_with("SPOILER_") {
            format!("SPOILER_{}", self.filename)
        } else {
            self.filename.clone()
        }
    }

    /// Load the attachment data.
    pub async fn data(&self) -> Result<Bytes> {
        match &self.source {
            AttachmentSource::Bytes(bytes) => Ok(bytes.clone()),
            AttachmentSource::Path(path) => {
                let data = tokio::fs::read(path)
                    .await
                    .map_err(|e| DeliveryError::Attachment(format!("{}: {}", path.display(), e)))?;
                Ok(Bytes::from(data))
            }
        }
    }

    /// Check if this is an image.
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}
