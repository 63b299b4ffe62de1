//! Shared record store service used by every sync component.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    Database, LibSqlPendingRepository, LibSqlRecordRepository, PendingRepository,
    RecordRepository,
};
use crate::models::{HistoryRecord, PendingSubmission, RecordId};
use crate::Result;

/// Cloneable handle to the local record store.
///
/// One writer at a time: every operation takes the connection lock for the
/// duration of a single statement group.
#[derive(Clone)]
pub struct StoreService {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl StoreService {
    /// Open a store at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::debug!("Opening record store at {}", db_path.display());
        let db = Database::open(&db_path).await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Filesystem location, when not in-memory.
    pub fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    /// Fetch a record by id.
    pub async fn get_record(&self, id: &RecordId) -> Result<Option<HistoryRecord>> {
        let db = self.db.lock().await;
        let repo = LibSqlRecordRepository::new(db.connection());
        repo.get(id).await
    }

    /// List all records, most recently written first.
    pub async fn list_records(&self) -> Result<Vec<HistoryRecord>> {
        let db = self.db.lock().await;
        let repo = LibSqlRecordRepository::new(db.connection());
        repo.list().await
    }

    /// Replace a record wholesale.
    pub async fn upsert_record(&self, record: &HistoryRecord) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlRecordRepository::new(db.connection());
        repo.upsert(record).await
    }

    /// Delete a record. Returns whether it existed.
    pub async fn delete_record(&self, id: &RecordId) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlRecordRepository::new(db.connection());
        repo.delete(id).await
    }

    /// Ids of all stored records.
    pub async fn record_ids(&self) -> Result<Vec<RecordId>> {
        let db = self.db.lock().await;
        let repo = LibSqlRecordRepository::new(db.connection());
        repo.ids().await
    }

    /// Records waiting for their remote identifier.
    pub async fn list_unlinked(&self) -> Result<Vec<HistoryRecord>> {
        let db = self.db.lock().await;
        let repo = LibSqlRecordRepository::new(db.connection());
        repo.list_unlinked().await
    }

    /// Records eligible for lifecycle polling.
    pub async fn list_trackable(&self) -> Result<Vec<HistoryRecord>> {
        let db = self.db.lock().await;
        let repo = LibSqlRecordRepository::new(db.connection());
        repo.list_trackable().await
    }

    /// Fetch a pending submission by id.
    pub async fn get_pending(&self, id: &str) -> Result<Option<PendingSubmission>> {
        let db = self.db.lock().await;
        let repo = LibSqlPendingRepository::new(db.connection());
        repo.get(id).await
    }

    /// Insert or replace a pending submission.
    pub async fn upsert_pending(&self, pending: &PendingSubmission) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlPendingRepository::new(db.connection());
        repo.upsert(pending).await
    }

    /// Delete a pending submission.
    pub async fn delete_pending(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlPendingRepository::new(db.connection());
        repo.delete(id).await
    }

    /// Drop pending submissions created before `cutoff` (Unix ms).
    pub async fn purge_pending_older_than(&self, cutoff: i64) -> Result<u64> {
        let db = self.db.lock().await;
        let repo = LibSqlPendingRepository::new(db.connection());
        let purged = repo.purge_older_than(cutoff).await?;
        if purged > 0 {
            tracing::debug!("Purged {purged} finished pending submissions");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn in_memory_upsert_and_list_roundtrip() {
        let store = StoreService::open_in_memory().await.unwrap();

        let record = HistoryRecord::new("local", serde_json::json!({"customer": "Rossi"}));
        store.upsert_record(&record).await.unwrap();

        let records = store.list_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, record.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_path_creates_parent_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("archive.db");

        let store = StoreService::open_path(&db_path).await.unwrap();
        assert!(db_path.parent().unwrap().exists());
        assert_eq!(store.db_path(), Some(&db_path));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clones_share_the_same_database() {
        let store = StoreService::open_in_memory().await.unwrap();
        let clone = store.clone();

        clone
            .upsert_pending(&PendingSubmission::new("p-1"))
            .await
            .unwrap();
        assert!(store.get_pending("p-1").await.unwrap().is_some());
    }
}
