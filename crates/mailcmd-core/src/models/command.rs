//! Command, context and confirmation data structures

use serde::{Deserialize, Deserializer, Serialize};

use super::Draft;

/// Canonical and alias action names produced by the intent parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    SendEmail,
    Compose,
    SearchEmails,
    ShowEmails,
    Summarize,
    DraftReply,
    Forward,
    BulkAction,
    QuickAction,
    ExtractInfo,
    Analyze,
    #[serde(other)]
    Unknown,
}

impl ActionKind {
    /// Every action name the parser may emit, in schema order
    pub const ALL: [ActionKind; 12] = [
        ActionKind::SendEmail,
        ActionKind::Compose,
        ActionKind::SearchEmails,
        ActionKind::ShowEmails,
        ActionKind::Summarize,
        ActionKind::DraftReply,
        ActionKind::Forward,
        ActionKind::BulkAction,
        ActionKind::QuickAction,
        ActionKind::ExtractInfo,
        ActionKind::Analyze,
        ActionKind::Unknown,
    ];

    /// Collapse alias spellings onto the action that owns the handler
    pub fn canonical(self) -> ActionKind {
        match self {
            ActionKind::Compose => ActionKind::SendEmail,
            ActionKind::ShowEmails => ActionKind::SearchEmails,
            ActionKind::QuickAction => ActionKind::BulkAction,
            other => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::SendEmail => "SEND_EMAIL",
            ActionKind::Compose => "COMPOSE",
            ActionKind::SearchEmails => "SEARCH_EMAILS",
            ActionKind::ShowEmails => "SHOW_EMAILS",
            ActionKind::Summarize => "SUMMARIZE",
            ActionKind::DraftReply => "DRAFT_REPLY",
            ActionKind::Forward => "FORWARD",
            ActionKind::BulkAction => "BULK_ACTION",
            ActionKind::QuickAction => "QUICK_ACTION",
            ActionKind::ExtractInfo => "EXTRACT_INFO",
            ActionKind::Analyze => "ANALYZE",
            ActionKind::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accept either `"a@x.com"` or `["a@x.com", ...]` for recipient fields
fn string_or_vec<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Null,
    }

    let values = match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => value.split(',').map(str::to_string).collect(),
        OneOrMany::Many(values) => values,
        OneOrMany::Null => Vec::new(),
    };

    Ok(values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect())
}

/// Loosely-typed parameter bag extracted from a command
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandParams {
    // === Composition ===
    #[serde(default, deserialize_with = "string_or_vec", skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<String>,

    #[serde(default, deserialize_with = "string_or_vec", skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,

    #[serde(default, deserialize_with = "string_or_vec", skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// What the message is about, when no explicit subject/body was given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    // === Search filters ===
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_attachments: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_important: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_starred: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_response: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    // === Actions ===
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bulk_action: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_intent: Option<String>,
}


/// The intent produced from free text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedCommand {
    pub action: ActionKind,
    #[serde(default)]
    pub parameters: CommandParams,
    pub original_command: String,
}

impl ParsedCommand {
    /// A command nobody could make sense of
    pub fn unknown(original: impl Into<String>) -> Self {
        Self {
            action: ActionKind::Unknown,
            parameters: CommandParams::default(),
            original_command: original.into(),
        }
    }
}

/// Tenant and user scope of a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandContext {
    pub workspace_id: String,
    pub user_id: String,
    pub user_email: String,
}

impl CommandContext {
    pub fn new(
        workspace_id: impl Into<String>,
        user_id: impl Into<String>,
        user_email: impl Into<String>,
    ) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            user_id: user_id.into(),
            user_email: user_email.into(),
        }
    }
}

/// What the caller wants done with an echoed draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationAction {
    Send,
    SaveDraft,
    Cancel,
}

/// Payload a caller resubmits to act on a pending draft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    pub action: ConfirmationAction,
    pub draft: Draft,
}
