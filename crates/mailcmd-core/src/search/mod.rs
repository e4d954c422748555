//! Composable email filters
//!
//! Search parameters become a list of independent [`Predicate`]s combined
//! with a single AND. Storage backends evaluate the same predicate values
//! without needing to know how they were built.

mod dates;

pub use dates::{resolve_date_range, DateRange, RECOGNIZED_PHRASES};

use chrono::{DateTime, TimeZone};
use tracing::debug;

use crate::models::{bare_address, labels, CommandContext, CommandParams, EmailRecord};

/// One independent filter over the email index
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Case-insensitive substring match on the sender
    SenderContains(String),

    /// Case-insensitive substring match on subject OR body text
    TextContains(String),

    /// Exact match on read state
    ReadState(bool),

    /// Attachment count > 0 (or == 0 when false)
    HasAttachments(bool),

    /// Starred or marked important
    StarredOrImportant,

    /// Read, not sent by the user, and no later message from the user in the thread
    NeedsResponse { user_email: String },

    /// Sent within the interval
    SentWithin(DateRange),

    /// Records carrying this label are excluded
    WithoutLabel(String),
}

impl Predicate {
    /// Evaluate against one record.
    ///
    /// `corpus` is every record in the same workspace, needed by thread-aware predicates.
    pub fn matches(&self, email: &EmailRecord, corpus: &[EmailRecord]) -> bool {
        match self {
            Predicate::SenderContains(needle) => email
                .data
                .from
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            Predicate::TextContains(needle) => {
                let needle = needle.to_lowercase();
                email.data.subject.to_lowercase().contains(&needle)
                    || email.body_text().to_lowercase().contains(&needle)
            }
            Predicate::ReadState(is_read) => email.data.is_read == *is_read,
            Predicate::HasAttachments(wanted) => email.has_attachments() == *wanted,
            Predicate::StarredOrImportant => email.data.is_starred || email.data.is_important,
            Predicate::NeedsResponse { user_email } => {
                needs_response(email, corpus, &bare_address(user_email))
            }
            Predicate::SentWithin(range) => range.contains(email.data.sent_at),
            Predicate::WithoutLabel(label) => !email.has_label(label),
        }
    }
}

fn needs_response(email: &EmailRecord, corpus: &[EmailRecord], user: &str) -> bool {
    if email.sender_address() == user || !email.data.is_read {
        return false;
    }
    if email.data.thread_id.is_empty() {
        return true;
    }
    !corpus.iter().any(|other| {
        other.id != email.id
            && other.data.thread_id == email.data.thread_id
            && other.sender_address() == user
            && other.data.sent_at > email.data.sent_at
    })
}

/// A conjunction of predicates with a result cap
#[derive(Debug, Clone, PartialEq)]
pub struct EmailQuery {
    pub predicates: Vec<Predicate>,
    pub limit: usize,
}

impl EmailQuery {
    pub fn new(limit: usize) -> Self {
        Self {
            predicates: Vec::new(),
            limit,
        }
    }

    /// True when some predicate besides the trash exclusion restricts the result
    pub fn narrows(&self) -> bool {
        self.predicates
            .iter()
            .any(|p| !matches!(p, Predicate::WithoutLabel(_)))
    }

    /// Add a predicate to the conjunction
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn matches(&self, email: &EmailRecord, corpus: &[EmailRecord]) -> bool {
        self.predicates.iter().all(|p| p.matches(email, corpus))
    }

    /// Filter `corpus`, newest first, capped at `limit`
    pub fn evaluate(&self, corpus: &[EmailRecord]) -> Vec<EmailRecord> {
        let mut matched: Vec<EmailRecord> = corpus
            .iter()
            .filter(|email| self.matches(email, corpus))
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            b.data
                .sent_at
                .cmp(&a.data.sent_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        matched.truncate(self.limit);
        matched
    }
}

/// Build the query for a command's search parameters.
///
/// Trashed records are always excluded. An unrecognized `dateRange` phrase
/// adds no date constraint.
pub fn build_query<Tz: TimeZone>(
    params: &CommandParams,
    context: &CommandContext,
    now: &DateTime<Tz>,
    default_limit: usize,
) -> EmailQuery {
    let limit = params
        .limit
        .filter(|l| *l > 0)
        .map_or(default_limit, |l| l.min(default_limit));

    let mut query = EmailQuery::new(limit).and(Predicate::WithoutLabel(labels::TRASH.to_string()));

    if let Some(from) = non_empty(&params.from) {
        query = query.and(Predicate::SenderContains(from));
    }
    if let Some(text) = non_empty(&params.search_query) {
        query = query.and(Predicate::TextContains(text));
    }
    if let Some(is_read) = params.is_read {
        query = query.and(Predicate::ReadState(is_read));
    }
    if params.has_attachments == Some(true) {
        query = query.and(Predicate::HasAttachments(true));
    }
    if params.is_starred == Some(true) || params.is_important == Some(true) {
        query = query.and(Predicate::StarredOrImportant);
    }
    if params.needs_response == Some(true) {
        query = query.and(Predicate::NeedsResponse {
            user_email: context.user_email.clone(),
        });
    }
    if let Some(phrase) = non_empty(&params.date_range) {
        match resolve_date_range(&phrase, now) {
            Some(range) => query = query.and(Predicate::SentWithin(range)),
            None => debug!("Ignoring unrecognized date range '{}'", phrase),
        }
    }

    debug!("Built query with {} predicates", query.predicates.len());
    query
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use chrono::{Duration, Utc};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-15T14:30:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn context() -> CommandContext {
        CommandContext::new("ws1", "user-1", "me@example.com")
    }

    #[test]
    fn test_predicates_are_anded() {
        let mut unread_alice =
            email("ws1", "Alice <alice@example.com>", "Budget", "Q3 numbers", now());
        unread_alice.data.is_read = false;
        let mut read_alice = email("ws1", "alice@example.com", "Budget", "Q3", now());
        read_alice.data.is_read = true;
        let bob = email("ws1", "bob@example.com", "Budget", "Q3", now());
        let corpus = vec![unread_alice.clone(), read_alice, bob];

        let params = CommandParams {
            from: Some("alice".into()),
            is_read: Some(false),
            ..Default::default()
        };
        let results = build_query(&params, &context(), &now(), 20).evaluate(&corpus);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, unread_alice.id);
    }

    #[test]
    fn test_text_matches_subject_or_body() {
        let by_subject = email("ws1", "a@example.com", "Q3 budget", "numbers", now());
        let by_body = email("ws1", "b@example.com", "Numbers", "the q3 BUDGET is attached", now());
        let neither = email("ws1", "c@example.com", "Lunch", "tacos", now());
        let corpus = vec![by_subject, by_body, neither];

        let query = EmailQuery::new(20).and(Predicate::TextContains("Q3 Budget".into()));
        assert_eq!(query.evaluate(&corpus).len(), 2);
    }

    #[test]
    fn test_attachments_and_flags() {
        let plain = email("ws1", "a@example.com", "A", "", now());
        let attached = with_attachment(email("ws1", "b@example.com", "B", "", now()));
        let mut starred = email("ws1", "c@example.com", "C", "", now());
        starred.data.is_starred = true;
        let mut important = email("ws1", "d@example.com", "D", "", now());
        important.data.is_important = true;
        let corpus = vec![plain, attached, starred, important];

        let query = EmailQuery::new(20).and(Predicate::HasAttachments(true));
        assert_eq!(query.evaluate(&corpus).len(), 1);

        let params = CommandParams {
            is_important: Some(true),
            ..Default::default()
        };
        assert_eq!(build_query(&params, &context(), &now(), 20).evaluate(&corpus).len(), 2);
    }

    #[test]
    fn test_needs_response_uses_thread_history() {
        let mut answered =
            email("ws1", "alice@example.com", "Plan", "", now() - Duration::hours(5));
        answered.data.thread_id = "t1".into();
        answered.data.is_read = true;
        let mut my_reply =
            email("ws1", "Me <me@example.com>", "Re: Plan", "", now() - Duration::hours(4));
        my_reply.data.thread_id = "t1".into();
        my_reply.data.is_read = true;

        let mut waiting =
            email("ws1", "bob@example.com", "Question", "", now() - Duration::hours(3));
        waiting.data.thread_id = "t2".into();
        waiting.data.is_read = true;

        let mut unread = email("ws1", "carol@example.com", "FYI", "", now());
        unread.data.thread_id = "t3".into();

        let corpus = vec![answered, my_reply, waiting.clone(), unread];
        let query = EmailQuery::new(20).and(Predicate::NeedsResponse {
            user_email: "me@example.com".into(),
        });
        let results = query.evaluate(&corpus);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, waiting.id);
    }

    #[test]
    fn test_newest_first_and_capped() {
        let corpus: Vec<EmailRecord> = (0..30)
            .map(|i| {
                email(
                    "ws1",
                    "a@example.com",
                    &format!("#{i}"),
                    "",
                    now() - Duration::minutes(i),
                )
            })
            .collect();
        let results = EmailQuery::new(20).evaluate(&corpus);
        assert_eq!(results.len(), 20);
        assert_eq!(results[0].data.subject, "#0");
        assert_eq!(results[19].data.subject, "#19");
    }

    #[test]
    fn test_date_range_and_unknown_phrase() {
        let today = email("ws1", "a@example.com", "today", "", now() - Duration::hours(1));
        let old = email("ws1", "a@example.com", "old", "", now() - Duration::days(40));
        let corpus = vec![today, old];

        let params = CommandParams {
            date_range: Some("today".into()),
            ..Default::default()
        };
        assert_eq!(build_query(&params, &context(), &now(), 20).evaluate(&corpus).len(), 1);

        let params = CommandParams {
            date_range: Some("sometime soon".into()),
            ..Default::default()
        };
        assert_eq!(build_query(&params, &context(), &now(), 20).evaluate(&corpus).len(), 2);
    }

    #[test]
    fn test_trash_is_excluded_and_limit_param_lowers_cap() {
        let mut trashed = email("ws1", "a@example.com", "gone", "", now());
        trashed.add_label(labels::TRASH);
        let kept = email("ws1", "a@example.com", "kept", "", now());
        let kept2 = email("ws1", "a@example.com", "kept2", "", now());
        let corpus = vec![trashed, kept, kept2];

        let params = CommandParams {
            limit: Some(1),
            ..Default::default()
        };
        let results = build_query(&params, &context(), &now(), 20).evaluate(&corpus);
        assert_eq!(results.len(), 1);
        assert_ne!(results[0].data.subject, "gone");
    }

    #[test]
    fn test_narrows_ignores_empty_and_false_filters() {
        let params = CommandParams {
            from: Some(" ".into()),
            search_query: Some(String::new()),
            is_starred: Some(false),
            has_attachments: Some(false),
            needs_response: Some(false),
            date_range: Some("last year".into()),
            ..Default::default()
        };
        assert!(!build_query(&params, &context(), &now(), 20).narrows());

        let params = CommandParams {
            is_read: Some(false),
            ..Default::default()
        };
        assert!(build_query(&params, &context(), &now(), 20).narrows());
    }
}
