//! Structured command responses

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Draft, EmailRecord, EmailSummary};
use crate::error::{Error, ErrorKind};

/// Response type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    SearchResults,
    Summary,
    DraftEmail,
    DraftReply,
    ForwardEmail,
    EmailSent,
    DraftSaved,
    DraftCancelled,
    BulkAction,
    Extraction,
    Analysis,
    Help,
    Error,
}

/// A follow-up the caller can offer the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseAction {
    pub id: String,
    pub label: String,
}

impl ResponseAction {
    fn new(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
        }
    }

    /// The send / edit / cancel triple offered with every draft
    pub fn draft_actions() -> Vec<Self> {
        vec![
            Self::new("send", "Send"),
            Self::new("edit", "Edit"),
            Self::new("cancel", "Cancel"),
        ]
    }
}

/// What the command processor hands back for every command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    #[serde(rename = "type")]
    pub kind: ResponseKind,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emails: Option<Vec<EmailSummary>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<Draft>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_confirmation: Option<bool>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ResponseAction>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl CommandResponse {
    pub fn new(kind: ResponseKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            emails: None,
            draft: None,
            requires_confirmation: None,
            actions: Vec::new(),
            data: None,
            error_kind: None,
        }
    }

    pub fn with_emails(mut self, emails: &[EmailRecord]) -> Self {
        self.emails = Some(emails.iter().map(EmailSummary::from).collect());
        self
    }

    /// Attach a draft that must be confirmed before anything is sent
    pub fn with_draft(mut self, draft: Draft) -> Self {
        self.draft = Some(draft);
        self.requires_confirmation = Some(true);
        self.actions = ResponseAction::draft_actions();
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Convert a failure into the user-facing error shape
    pub fn from_error(err: &Error) -> Self {
        let mut response = Self::new(ResponseKind::Error, err.user_message());
        response.error_kind = Some(err.kind());
        response
    }

    pub fn requires_confirmation(&self) -> bool {
        self.requires_confirmation.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_response_serialization() {
        let draft = Draft::new(vec!["a@example.com".into()], "Hi", "Body");
        let response = CommandResponse::new(ResponseKind::DraftEmail, "Here's a draft")
            .with_draft(draft);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["type"], "draft_email");
        assert_eq!(json["requiresConfirmation"], true);
        assert_eq!(json["draft"]["isDraft"], true);
        assert_eq!(json["actions"][0]["id"], "send");
        assert!(json.get("errorKind").is_none());
    }

    #[test]
    fn test_error_response() {
        let response = CommandResponse::from_error(&Error::Validation("nope".into()));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "nope");
        assert_eq!(json["errorKind"], "validation_error");
    }
}
