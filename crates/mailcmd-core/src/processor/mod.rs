//! Command processor
//!
//! Entry point of the crate. A command is parsed into an intent, its action is
//! normalized onto a canonical [`ActionKind`], and the registered handler runs.
//! Anything that sends mail goes through a draft first; only a
//! [`Confirmation`] reaches the provider's send path.

mod drafts;
mod handlers;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ProcessorConfig};
use crate::error::Result;
use crate::extract::Extractor;
use crate::intent::IntentParser;
use crate::llm::CompletionService;
use crate::models::{
    ActionKind, CommandContext, CommandResponse, Confirmation, ConfirmationAction, DraftKind,
    ParsedCommand, ResponseKind,
};
use crate::oauth::OAuthManager;
use crate::provider::{MailAdapter, MailTransport};
use crate::store::EmailStore;

pub use crate::provider::Clock;

/// Executes one kind of parsed command
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Stable handler name, used in logs
    fn name(&self) -> &'static str;

    async fn handle(
        &self,
        command: &ParsedCommand,
        context: &CommandContext,
    ) -> Result<CommandResponse>;
}

/// Collaborators shared by every handler
#[derive(Clone)]
pub(crate) struct Services {
    pub config: ProcessorConfig,
    pub timezone: Tz,
    pub llm: Arc<dyn CompletionService>,
    pub store: Arc<dyn EmailStore>,
    pub transport: Arc<dyn MailTransport>,
    pub oauth: Arc<OAuthManager>,
    pub extractor: Extractor,
    pub clock: Clock,
}

impl Services {
    /// Current time in the configured timezone
    pub fn now(&self) -> DateTime<Tz> {
        (self.clock)().with_timezone(&self.timezone)
    }

    pub fn adapter(&self, context: &CommandContext) -> MailAdapter {
        MailAdapter::new(
            context.clone(),
            self.transport.clone(),
            self.store.clone(),
            self.oauth.clone(),
        )
        .with_clock(self.clock.clone())
    }
}

/// Natural-language mailbox command processor
pub struct CommandProcessor {
    parser: IntentParser,
    services: Arc<Services>,
    handlers: HashMap<ActionKind, Arc<dyn ActionHandler>>,
}

impl CommandProcessor {
    pub fn new(
        config: &Config,
        llm: Arc<dyn CompletionService>,
        store: Arc<dyn EmailStore>,
        transport: Arc<dyn MailTransport>,
        oauth: Arc<OAuthManager>,
    ) -> Self {
        let services = Services {
            config: config.processor.clone(),
            timezone: config.timezone(),
            llm: llm.clone(),
            store,
            transport,
            oauth,
            extractor: Extractor::new(llm.clone(), config.processor.clone()),
            clock: Arc::new(Utc::now),
        };
        Self::from_services(IntentParser::new(llm), services)
    }

    /// Replace the clock, for deterministic date handling
    pub fn with_clock(self, clock: Clock) -> Self {
        let mut services = Services::clone(&self.services);
        services.clock = clock;
        Self::from_services(self.parser, services)
    }

    fn from_services(parser: IntentParser, services: Services) -> Self {
        let services = Arc::new(services);
        let handlers = handlers::registry(&services);
        debug!("Registered {} action handlers", handlers.len());
        Self {
            parser,
            services,
            handlers,
        }
    }

    /// Handler for an action; aliases resolve to their canonical handler
    pub fn handler_for(&self, action: ActionKind) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(&action.canonical()).cloned()
    }

    /// Process one command (or a draft confirmation) and never fail.
    ///
    /// With a `confirmation` the command text is ignored and the draft is
    /// sent, saved or discarded.
    pub async fn process_command(
        &self,
        command: &str,
        context: &CommandContext,
        confirmation: Option<Confirmation>,
    ) -> CommandResponse {
        let start = Instant::now();

        let (label, result) = match confirmation {
            Some(confirmation) => (
                format!("confirm:{:?}", confirmation.action),
                self.confirm(confirmation, context).await,
            ),
            None => self.execute(command, context).await,
        };

        let elapsed = start.elapsed().as_millis();
        match result {
            Ok(response) => {
                info!(
                    "← {} in {} → {:?} ({}ms)",
                    label, context.workspace_id, response.kind, elapsed
                );
                response
            }
            Err(e) => {
                error!(
                    "← {} in {} failed ({}ms): {}",
                    label, context.workspace_id, elapsed, e
                );
                CommandResponse::from_error(&e)
            }
        }
    }

    async fn execute(
        &self,
        command: &str,
        context: &CommandContext,
    ) -> (String, Result<CommandResponse>) {
        info!("→ command in {} by {}", context.workspace_id, context.user_id);

        let parsed = match self.parser.parse(command).await {
            Ok(parsed) => parsed,
            Err(e) => return ("parse".to_string(), Err(e)),
        };

        let label = parsed.action.to_string();
        let result = match self.handler_for(parsed.action) {
            Some(handler) => {
                debug!("Dispatching {} to {}", parsed.action, handler.name());
                handler.handle(&parsed, context).await
            }
            None => {
                warn!("No handler registered for {}", parsed.action);
                Ok(handlers::help_response())
            }
        };
        (label, result)
    }

    /// The draft confirmation protocol; the only path that sends mail
    async fn confirm(
        &self,
        confirmation: Confirmation,
        context: &CommandContext,
    ) -> Result<CommandResponse> {
        let draft = confirmation.draft;

        match confirmation.action {
            ConfirmationAction::Cancel => {
                Ok(CommandResponse::new(ResponseKind::DraftCancelled, "Draft discarded."))
            }
            ConfirmationAction::SaveDraft => {
                draft.validate()?;
                let adapter = self.services.adapter(context);
                let draft_id = adapter.create_draft(&draft).await?;
                Ok(CommandResponse::new(
                    ResponseKind::DraftSaved,
                    format!("Saved your draft to {}.", draft.to.join(", ")),
                )
                .with_data(json!({ "draftId": draft_id })))
            }
            ConfirmationAction::Send => {
                draft.validate()?;
                let adapter = self.services.adapter(context);
                let sent = match draft.kind() {
                    DraftKind::New => adapter.send_email(&draft).await?,
                    DraftKind::Reply => adapter.reply_to_email(&draft).await?,
                    DraftKind::Forward => adapter.forward_email(&draft).await?,
                };
                let verb = match draft.kind() {
                    DraftKind::New => "Email sent",
                    DraftKind::Reply => "Reply sent",
                    DraftKind::Forward => "Email forwarded",
                };
                Ok(CommandResponse::new(
                    ResponseKind::EmailSent,
                    format!("{} to {}.", verb, draft.to.join(", ")),
                )
                .with_data(json!({ "messageId": sent.id, "threadId": sent.thread_id })))
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::error::ErrorKind;
    use crate::intent::test_support::FakeLlm;
    use crate::llm::Completion;
    use crate::models::{labels, Draft, SOURCE_COMMAND_PROCESSOR};
    use crate::search::test_support::email;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_alias_pairs_share_handlers() {
        let h = harness(FakeLlm::new(), vec![]);
        for (alias, canonical) in [
            (ActionKind::Compose, ActionKind::SendEmail),
            (ActionKind::ShowEmails, ActionKind::SearchEmails),
            (ActionKind::QuickAction, ActionKind::BulkAction),
        ] {
            let a = h.processor.handler_for(alias).unwrap();
            let b = h.processor.handler_for(canonical).unwrap();
            assert!(Arc::ptr_eq(&a, &b), "{} should route like {}", alias, canonical);
        }
        for action in ActionKind::ALL {
            assert!(h.processor.handler_for(action).is_some(), "{} has no handler", action);
        }
    }

    #[tokio::test]
    async fn test_compose_scenario_returns_draft() {
        let llm = FakeLlm::new()
            .intent(json!({
                "action": "SEND_EMAIL",
                "parameters": {"to": ["john@example.com"], "topic": "the Q3 budget"}
            }))
            .reply(Completion::text(
                r#"{"subject": "Q3 budget", "body": "Hi John,\n\nCould we go over the Q3 budget this week?"}"#,
            ));
        let h = harness(llm, vec![]);

        let response = h
            .processor
            .process_command("Email john@example.com about the Q3 budget", &context(), None)
            .await;

        assert_eq!(response.kind, ResponseKind::DraftEmail);
        assert!(response.requires_confirmation());
        let ids: Vec<&str> = response.actions.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["send", "edit", "cancel"]);
        let draft = response.draft.unwrap();
        assert_eq!(draft.to, vec!["john@example.com"]);
        assert_eq!(draft.subject, "Q3 budget");
        assert!(draft.is_draft);
        assert_eq!(h.transport.call_count(), 0);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_compose_alias_without_model_body_falls_back() {
        let llm = FakeLlm::new()
            .intent(json!({
                "action": "COMPOSE",
                "parameters": {"to": "john@example.com", "topic": "the Q3 budget"}
            }))
            .reply(Completion::text("not json at all"));
        let h = harness(llm, vec![]);

        let response = h.processor.process_command("email john", &context(), None).await;
        assert_eq!(response.kind, ResponseKind::DraftEmail);
        let draft = response.draft.unwrap();
        assert!(!draft.subject.is_empty());
        assert!(draft.subject.to_lowercase().contains("q3 budget"));
        assert_eq!(h.transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_confirmation_sends_once_and_mirrors() {
        let h = harness(FakeLlm::new(), vec![]);
        let confirmation = Confirmation {
            action: ConfirmationAction::Send,
            draft: Draft::new(vec!["john@example.com".into()], "Q3 budget", "Let's talk."),
        };

        let response = h
            .processor
            .process_command("", &context(), Some(confirmation))
            .await;

        assert_eq!(response.kind, ResponseKind::EmailSent);
        assert_eq!(h.transport.sent.lock().len(), 1);
        assert_eq!(h.llm.calls(), 0);
        let records = h.store.records("ws1");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].metadata.source, SOURCE_COMMAND_PROCESSOR);
        assert_eq!(records[0].data.sent_at, fixed_now());
        assert_eq!(records[0].created_at, fixed_now());
    }

    #[tokio::test]
    async fn test_invalid_draft_is_rejected_without_sending() {
        let h = harness(FakeLlm::new(), vec![]);
        let confirmation = Confirmation {
            action: ConfirmationAction::Send,
            draft: Draft::new(vec!["john".into()], "Hi", "Body"),
        };

        let response = h
            .processor
            .process_command("", &context(), Some(confirmation))
            .await;
        assert_eq!(response.kind, ResponseKind::Error);
        assert_eq!(response.error_kind, Some(ErrorKind::ValidationError));
        assert_eq!(h.transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_multiline_subject_is_rejected_without_sending() {
        let h = harness(FakeLlm::new(), vec![]);
        let confirmation = Confirmation {
            action: ConfirmationAction::Send,
            draft: Draft::new(
                vec!["john@example.com".into()],
                "Hi\r\nBcc: evil@attacker.com",
                "Body",
            ),
        };

        let response = h
            .processor
            .process_command("", &context(), Some(confirmation))
            .await;
        assert_eq!(response.error_kind, Some(ErrorKind::ValidationError));
        assert_eq!(h.transport.call_count(), 0);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_and_save_draft() {
        let h = harness(FakeLlm::new(), vec![]);
        let draft = Draft::new(vec!["john@example.com".into()], "Hi", "Body");

        let response = h
            .processor
            .process_command(
                "",
                &context(),
                Some(Confirmation {
                    action: ConfirmationAction::Cancel,
                    draft: draft.clone(),
                }),
            )
            .await;
        assert_eq!(response.kind, ResponseKind::DraftCancelled);
        assert_eq!(h.transport.call_count(), 0);

        let response = h
            .processor
            .process_command(
                "",
                &context(),
                Some(Confirmation {
                    action: ConfirmationAction::SaveDraft,
                    draft,
                }),
            )
            .await;
        assert_eq!(response.kind, ResponseKind::DraftSaved);
        assert_eq!(h.transport.drafts.lock().len(), 1);
        assert!(h.transport.sent.lock().is_empty());
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_missing_credentials_is_provider_error() {
        let h = harness_with(FakeLlm::new(), vec![], false);
        let confirmation = Confirmation {
            action: ConfirmationAction::Send,
            draft: Draft::new(vec!["john@example.com".into()], "Hi", "Body"),
        };

        let response = h
            .processor
            .process_command("", &context(), Some(confirmation))
            .await;
        assert_eq!(response.error_kind, Some(ErrorKind::ProviderError));
        assert!(!response.message.contains("ws1"));
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_unread_this_week_scenario() {
        let now = fixed_now();
        let mut read = email("ws1", "a@example.com", "read", "", now - Duration::hours(2));
        read.data.is_read = true;
        let unread = email("ws1", "b@example.com", "unread", "", now - Duration::days(1));
        let last_week = email("ws1", "c@example.com", "old", "", now - Duration::days(5));
        let other_ws = email("ws2", "d@example.com", "other", "", now);

        let llm = FakeLlm::new().intent(json!({
            "action": "SHOW_EMAILS",
            "parameters": {"isRead": false, "dateRange": "this week"}
        }));
        let h = harness(llm, vec![read, unread.clone(), last_week, other_ws]);

        let response = h
            .processor
            .process_command("show me unread emails this week", &context(), None)
            .await;
        assert_eq!(response.kind, ResponseKind::SearchResults);
        let emails = response.emails.unwrap();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].id, unread.id);
    }

    #[tokio::test]
    async fn test_archive_yesterday_scenario() {
        let now = fixed_now();
        let records: Vec<_> = (0..3)
            .map(|i| {
                email(
                    "ws1",
                    "a@example.com",
                    &format!("y{i}"),
                    "",
                    now - Duration::hours(20 + i),
                )
            })
            .collect();
        let today = email("ws1", "a@example.com", "today", "", now - Duration::hours(1));

        let llm = FakeLlm::new().intent(json!({
            "action": "QUICK_ACTION",
            "parameters": {"bulkAction": "archive", "dateRange": "yesterday"}
        }));
        let mut all = records.clone();
        all.push(today.clone());
        let h = harness(llm, all);

        let response = h
            .processor
            .process_command("archive emails from yesterday", &context(), None)
            .await;
        assert_eq!(response.kind, ResponseKind::BulkAction);
        assert_eq!(response.message, "Archived 3 emails.");

        for record in &records {
            let stored = h.store.get("ws1", &record.id).await.unwrap().unwrap();
            assert!(stored.has_label(labels::ARCHIVED));
        }
        let untouched = h.store.get("ws1", &today.id).await.unwrap().unwrap();
        assert!(!untouched.has_label(labels::ARCHIVED));
    }

    #[tokio::test]
    async fn test_unknown_bulk_verb_touches_nothing() {
        let now = fixed_now();
        let record = email("ws1", "a@example.com", "x", "", now - Duration::hours(1));
        let llm = FakeLlm::new().intent(json!({
            "action": "BULK_ACTION",
            "parameters": {"bulkAction": "levitate", "dateRange": "today"}
        }));
        let h = harness(llm, vec![record.clone()]);

        let response = h
            .processor
            .process_command("levitate today's email", &context(), None)
            .await;
        assert_eq!(response.kind, ResponseKind::Error);
        assert_eq!(response.error_kind, Some(ErrorKind::ValidationError));
        assert!(response.message.contains("archive"));
        assert_eq!(h.transport.call_count(), 0);
        assert_eq!(h.store.get("ws1", &record.id).await.unwrap().unwrap(), record);
    }

    #[tokio::test]
    async fn test_unknown_intent_gets_help() {
        let h = harness(FakeLlm::new().reply(Completion::text("no idea")), vec![]);
        let response = h.processor.process_command("what's the weather", &context(), None).await;
        assert_eq!(response.kind, ResponseKind::Help);
        assert!(response.error_kind.is_none());
    }

    #[tokio::test]
    async fn test_parse_failure_is_parse_error() {
        let h = harness(
            FakeLlm::new().fail(crate::error::Error::Parse("timeout".into())),
            vec![],
        );
        let response = h.processor.process_command("show unread", &context(), None).await;
        assert_eq!(response.kind, ResponseKind::Error);
        assert_eq!(response.error_kind, Some(ErrorKind::ParseError));
        assert!(response.message.contains("couldn't understand"));
    }
}
