//! Email data structures

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::Attachment;

/// Record source tag for messages mirrored after a send
pub const SOURCE_COMMAND_PROCESSOR: &str = "command_processor";

/// Entity type stored on every email record
pub const EMAIL_RECORD_TYPE: &str = "email";

/// Provider label names
pub mod labels {
    pub const INBOX: &str = "INBOX";
    pub const UNREAD: &str = "UNREAD";
    pub const STARRED: &str = "STARRED";
    pub const IMPORTANT: &str = "IMPORTANT";
    pub const ARCHIVED: &str = "ARCHIVED";
    pub const TRASH: &str = "TRASH";
    pub const SENT: &str = "SENT";
}

static ADDRESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([^>]+)>|([a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,})")
        .expect("valid address regex")
});

/// Extract email addresses from a header value like "Name <email>, Name2 <email2>"
pub fn parse_email_addresses(header_value: &str) -> Vec<String> {
    ADDRESS_PATTERN
        .captures_iter(header_value)
        .filter_map(|cap| cap.get(1).or(cap.get(2)).map(|m| m.as_str().trim().to_string()))
        .collect()
}

/// Bare, lowercased address of a "Name <email>" value (or the value itself)
pub fn bare_address(value: &str) -> String {
    parse_email_addresses(value)
        .into_iter()
        .next()
        .unwrap_or_else(|| value.trim().to_string())
        .to_lowercase()
}

/// Display name of a "Name <email>" value, if any
pub fn display_name(value: &str) -> Option<String> {
    let (name, _) = value.split_once('<')?;
    let name = name.trim().trim_matches('"').trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Message body in its stored renditions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailBody {
    /// Plain text body
    #[serde(default)]
    pub text: String,

    /// HTML body (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,

    /// Preview snippet (first ~200 chars)
    #[serde(default)]
    pub snippet: String,
}

impl EmailBody {
    /// Build a body from plain text, deriving the snippet
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let snippet = make_snippet(&text);
        Self {
            text,
            html: None,
            snippet,
        }
    }
}

/// First ~200 characters of a body with whitespace collapsed
pub fn make_snippet(text: &str) -> String {
    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(200).collect()
}

/// Email payload of an index record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailData {
    /// Provider message ID
    #[serde(default)]
    pub message_id: String,

    /// Provider thread ID
    #[serde(default)]
    pub thread_id: String,

    /// From address ("Name <email>" or "email")
    pub from: String,

    /// To addresses
    #[serde(default)]
    pub to: Vec<String>,

    /// CC addresses
    #[serde(default)]
    pub cc: Vec<String>,

    /// BCC addresses
    #[serde(default)]
    pub bcc: Vec<String>,

    /// Subject line
    #[serde(default)]
    pub subject: String,

    /// Body renditions
    #[serde(default)]
    pub body: EmailBody,

    /// Date sent
    pub sent_at: DateTime<Utc>,

    #[serde(default)]
    pub is_read: bool,

    #[serde(default)]
    pub is_starred: bool,

    #[serde(default)]
    pub is_important: bool,

    /// Attachment metadata
    #[serde(default)]
    pub attachments: Vec<Attachment>,

    /// Provider labels
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Provenance of an index record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    /// Which collaborator created the record (e.g. "gmail_sync", "command_processor")
    #[serde(default)]
    pub source: String,

    /// User id that created the record
    #[serde(default)]
    pub created_by: String,
}

fn email_record_type() -> String {
    EMAIL_RECORD_TYPE.to_string()
}

/// An email record in the workspace index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRecord {
    /// Internal UUID
    pub id: String,

    /// Owning workspace
    pub workspace_id: String,

    /// Entity type, always "email"
    #[serde(rename = "type", default = "email_record_type")]
    pub record_type: String,

    pub data: EmailData,

    #[serde(default)]
    pub metadata: RecordMetadata,

    /// When the record entered the index
    pub created_at: DateTime<Utc>,
}

impl EmailRecord {
    /// Create a new record with a fresh id
    pub fn new(workspace_id: impl Into<String>, data: EmailData, metadata: RecordMetadata) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workspace_id: workspace_id.into(),
            record_type: email_record_type(),
            data,
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Bare sender address
    pub fn sender_address(&self) -> String {
        bare_address(&self.data.from)
    }

    /// Check whether the message was sent by the given address
    pub fn is_from(&self, address: &str) -> bool {
        self.sender_address() == bare_address(address)
    }

    /// Check if the email has attachments
    pub fn has_attachments(&self) -> bool {
        !self.data.attachments.is_empty()
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.data.labels.iter().any(|l| l.eq_ignore_ascii_case(label))
    }

    pub fn add_label(&mut self, label: &str) {
        if !self.has_label(label) {
            self.data.labels.push(label.to_string());
        }
    }

    pub fn remove_label(&mut self, label: &str) {
        self.data.labels.retain(|l| !l.eq_ignore_ascii_case(label));
    }

    /// Text used for content matching and model prompts
    pub fn body_text(&self) -> &str {
        if self.data.body.text.is_empty() {
            &self.data.body.snippet
        } else {
            &self.data.body.text
        }
    }

    /// Generate a markdown summary
    pub fn markdown_summary(&self) -> String {
        format!(
            "**From:** {}\n**Subject:** {}\n**Date:** {}\n\n{}",
            self.data.from,
            self.data.subject,
            self.data.sent_at.format("%b %d, %Y %I:%M %p"),
            self.data.body.snippet
        )
    }
}

/// Lightweight email summary for command responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSummary {
    pub id: String,
    pub message_id: String,
    pub thread_id: String,
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub snippet: String,
    pub sent_at: DateTime<Utc>,
    pub is_read: bool,
    pub is_starred: bool,
    pub is_important: bool,
    pub has_attachments: bool,
    pub labels: Vec<String>,
}

impl From<&EmailRecord> for EmailSummary {
    fn from(email: &EmailRecord) -> Self {
        Self {
            id: email.id.clone(),
            message_id: email.data.message_id.clone(),
            thread_id: email.data.thread_id.clone(),
            from: email.data.from.clone(),
            to: email.data.to.clone(),
            subject: email.data.subject.clone(),
            snippet: email.data.body.snippet.clone(),
            sent_at: email.data.sent_at,
            is_read: email.data.is_read,
            is_starred: email.data.is_starred,
            is_important: email.data.is_important,
            has_attachments: email.has_attachments(),
            labels: email.data.labels.clone(),
        }
    }
}
