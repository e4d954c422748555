//! Unsent drafts awaiting confirmation

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn default_true() -> bool {
    true
}

/// A fully composed message that has not been sent.
///
/// Drafts are never stored server-side; the caller echoes them back in a
/// [`Confirmation`](super::Confirmation).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    #[serde(default)]
    pub to: Vec<String>,

    #[serde(default)]
    pub cc: Vec<String>,

    #[serde(default)]
    pub bcc: Vec<String>,

    #[serde(default)]
    pub subject: String,

    #[serde(default)]
    pub body: String,

    #[serde(default = "default_true")]
    pub is_draft: bool,

    /// Message-ID of the message being answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,

    /// Provider thread the reply belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    /// Index id of the email being replied to or forwarded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_email_id: Option<String>,
}

/// How a draft will be dispatched once confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftKind {
    New,
    Reply,
    Forward,
}

impl Draft {
    pub fn new(to: Vec<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to,
            subject: subject.into(),
            body: body.into(),
            is_draft: true,
            ..Default::default()
        }
    }

    pub fn kind(&self) -> DraftKind {
        match (&self.in_reply_to, &self.original_email_id) {
            (Some(_), _) => DraftKind::Reply,
            (None, Some(_)) => DraftKind::Forward,
            (None, None) => DraftKind::New,
        }
    }

    /// Check that the draft can be handed to the provider
    pub fn validate(&self) -> Result<()> {
        if self.to.is_empty() {
            return Err(Error::Validation(
                "The draft has no recipients. Add at least one email address.".to_string(),
            ));
        }

        let multiline = self
            .to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .chain(std::iter::once(&self.subject))
            .any(|value| value.contains(['\r', '\n']));
        if multiline {
            return Err(Error::Validation(
                "Recipients and subject must each fit on a single line.".to_string(),
            ));
        }

        let invalid: Vec<&str> = self
            .to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .filter(|addr| !addr.contains('@'))
            .map(String::as_str)
            .collect();
        if !invalid.is_empty() {
            return Err(Error::Validation(format!(
                "These recipients are not email addresses: {}",
                invalid.join(", ")
            )));
        }

        if self.subject.trim().is_empty() && self.body.trim().is_empty() {
            return Err(Error::Validation(
                "The draft is empty. Add a subject or a message body.".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_threading_fields() {
        let mut draft = Draft::new(vec!["a@example.com".into()], "Hi", "Body");
        assert_eq!(draft.kind(), DraftKind::New);

        draft.original_email_id = Some("e1".into());
        assert_eq!(draft.kind(), DraftKind::Forward);

        draft.in_reply_to = Some("<m1@mail>".into());
        assert_eq!(draft.kind(), DraftKind::Reply);
    }

    #[test]
    fn test_validate() {
        assert!(Draft::new(vec!["a@example.com".into()], "Hi", "").validate().is_ok());
        assert!(Draft::new(vec![], "Hi", "Body").validate().is_err());
        assert!(Draft::new(vec!["john".into()], "Hi", "Body").validate().is_err());
        assert!(Draft::new(vec!["a@example.com".into()], " ", "").validate().is_err());

        let injected = Draft::new(
            vec!["a@example.com".into()],
            "Hi\r\nBcc: evil@attacker.com",
            "Body",
        );
        assert!(matches!(injected.validate(), Err(Error::Validation(_))));
        let mut injected = Draft::new(vec!["a@example.com".into()], "Hi", "Body");
        injected.cc = vec!["b@example.com\nBcc: evil@attacker.com".into()];
        assert!(injected.validate().is_err());
    }
}
