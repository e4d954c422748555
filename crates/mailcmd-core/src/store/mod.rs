//! Workspace-scoped email index
//!
//! The processor only talks to the [`EmailStore`] trait. [`MemoryEmailStore`]
//! keeps records in memory and can persist them as a JSON snapshot.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::EmailRecord;
use crate::search::EmailQuery;

/// Read/write access to email records, always scoped by workspace
#[async_trait]
pub trait EmailStore: Send + Sync {
    /// Point lookup; records from other workspaces are invisible
    async fn get(&self, workspace_id: &str, id: &str) -> Result<Option<EmailRecord>>;

    /// Evaluate a query over the workspace, newest first, capped
    async fn query(&self, workspace_id: &str, query: &EmailQuery) -> Result<Vec<EmailRecord>>;

    /// Insert a new record
    async fn insert(&self, record: EmailRecord) -> Result<()>;

    /// Replace an existing record (matched by workspace and id)
    async fn update(&self, record: &EmailRecord) -> Result<()>;
}

/// In-memory email index with optional JSON snapshot persistence
#[derive(Default)]
pub struct MemoryEmailStore {
    records: RwLock<Vec<EmailRecord>>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryEmailStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing records
    pub fn with_records(records: Vec<EmailRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            snapshot_path: None,
        }
    }

    /// Open a snapshot file; missing files start empty. Writes are persisted back.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            let records: Vec<EmailRecord> = serde_json::from_str(&contents)?;
            info!("Loaded {} email records from {:?}", records.len(), path);
            records
        } else {
            info!("No email snapshot at {:?}, starting empty", path);
            Vec::new()
        };

        Ok(Self {
            records: RwLock::new(records),
            snapshot_path: Some(path),
        })
    }

    /// All records of a workspace
    pub fn records(&self, workspace_id: &str) -> Vec<EmailRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.workspace_id == workspace_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Write `records` to the snapshot file, if there is one
    fn persist(&self, records: &[EmailRecord]) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(records)?;
        std::fs::write(path, contents)?;
        debug!("Persisted email snapshot to {:?}", path);
        Ok(())
    }
}

#[async_trait]
impl EmailStore for MemoryEmailStore {
    async fn get(&self, workspace_id: &str, id: &str) -> Result<Option<EmailRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .find(|r| r.workspace_id == workspace_id && r.id == id)
            .cloned())
    }

    async fn query(&self, workspace_id: &str, query: &EmailQuery) -> Result<Vec<EmailRecord>> {
        let corpus = self.records(workspace_id);
        let results = query.evaluate(&corpus);
        debug!(
            "Query over {} records in {} matched {}",
            corpus.len(),
            workspace_id,
            results.len()
        );
        Ok(results)
    }

    async fn insert(&self, record: EmailRecord) -> Result<()> {
        let mut records = self.records.write();
        if records
            .iter()
            .any(|r| r.workspace_id == record.workspace_id && r.id == record.id)
        {
            return Err(Error::Store(format!("Duplicate email id {}", record.id)));
        }

        // A failed snapshot write leaves memory as it was
        records.push(record);
        if let Err(e) = self.persist(&records) {
            records.pop();
            return Err(e);
        }
        Ok(())
    }

    async fn update(&self, record: &EmailRecord) -> Result<()> {
        let mut records = self.records.write();
        let index = records
            .iter()
            .position(|r| r.workspace_id == record.workspace_id && r.id == record.id)
            .ok_or_else(|| Error::EmailNotFound(record.id.clone()))?;

        let previous = std::mem::replace(&mut records[index], record.clone());
        if let Err(e) = self.persist(&records) {
            records[index] = previous;
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::test_support::email;
    use crate::search::Predicate;
    use chrono::Utc;

    #[tokio::test]
    async fn test_workspace_isolation() {
        let mine = email("ws1", "a@example.com", "mine", "", Utc::now());
        let theirs = email("ws2", "a@example.com", "theirs", "", Utc::now());
        let theirs_id = theirs.id.clone();
        let store = MemoryEmailStore::with_records(vec![mine, theirs.clone()]);

        assert!(store.get("ws1", &theirs_id).await.unwrap().is_none());
        assert!(store.get("ws2", &theirs_id).await.unwrap().is_some());

        let results = store.query("ws1", &EmailQuery::new(20)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].data.subject, "mine");

        // Updating through the wrong workspace must not touch the record
        let mut hijack = theirs;
        hijack.workspace_id = "ws1".to_string();
        hijack.data.subject = "changed".to_string();
        assert!(matches!(
            store.update(&hijack).await,
            Err(Error::EmailNotFound(_))
        ));
        let untouched = store.get("ws2", &theirs_id).await.unwrap().unwrap();
        assert_eq!(untouched.data.subject, "theirs");
    }

    #[tokio::test]
    async fn test_query_applies_predicates() {
        let mut read = email("ws1", "a@example.com", "read", "", Utc::now());
        read.data.is_read = true;
        let unread = email("ws1", "a@example.com", "unread", "", Utc::now());
        let store = MemoryEmailStore::with_records(vec![read, unread]);

        let query = EmailQuery::new(20).and(Predicate::ReadState(false));
        let results = store.query("ws1", &query).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].data.subject, "unread");
    }

    #[tokio::test]
    async fn test_snapshot_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emails.json");

        let store = MemoryEmailStore::open(&path).unwrap();
        assert!(store.is_empty());
        store
            .insert(email("ws1", "a@example.com", "saved", "", Utc::now()))
            .await
            .unwrap();

        let reopened = MemoryEmailStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.records("ws1")[0].data.subject, "saved");
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let record = email("ws1", "a@example.com", "once", "", Utc::now());
        let store = MemoryEmailStore::new();
        store.insert(record.clone()).await.unwrap();
        assert!(store.insert(record).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_snapshot_write_keeps_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emails.json");
        let existing = email("ws1", "a@example.com", "before", "", Utc::now());

        let store = MemoryEmailStore::open(&path).unwrap();
        store.insert(existing.clone()).await.unwrap();

        // Writing over a directory fails
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        let fresh = email("ws1", "b@example.com", "new", "", Utc::now());
        assert!(matches!(store.insert(fresh).await, Err(Error::Io(_))));
        assert_eq!(store.len(), 1);

        let mut changed = existing.clone();
        changed.data.subject = "after".to_string();
        assert!(store.update(&changed).await.is_err());
        let stored = store.get("ws1", &existing.id).await.unwrap().unwrap();
        assert_eq!(stored.data.subject, "before");
    }
}
