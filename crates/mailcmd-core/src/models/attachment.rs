//! Attachment data structures

use serde::{Deserialize, Serialize};

/// Attachment metadata carried on an email record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Provider attachment ID
    #[serde(default)]
    pub id: String,

    /// Original filename
    pub filename: String,

    /// MIME type
    #[serde(default = "default_mime_type")]
    pub mime_type: String,

    /// Size in bytes
    #[serde(default)]
    pub size: u64,
}

fn default_mime_type() -> String {
    "application/octet-stream".to_string()
}

impl Attachment {
    /// Create a new attachment descriptor
    pub fn new(
        id: impl Into<String>,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            mime_type: mime_type.into(),
            size,
        }
    }
}
