//! Push/pull synchronization against the remote authority.
//!
//! Conflict policy is whole-record last-writer-wins: a remote copy replaces
//! the local one only when its `updated_at` is strictly newer. Fields are
//! never merged individually. Records missing from the remote listing are
//! removed locally when they carry a `source` marker; records without one
//! predate provenance tracking and are left alone.
//!
//! Nothing here returns an error. Failures are logged and reported as
//! `false` or zero changes so callers can simply retry on the next cycle.

use std::collections::{HashMap, HashSet};

use crate::models::{HistoryRecord, RecordId};
use crate::remote::{RemoteAuthority, RemoteError};
use crate::services::StoreService;

/// Result of a push-then-pull cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pushed: bool,
    pub changed: usize,
}

pub struct SyncEngine<'a, R> {
    store: &'a StoreService,
    remote: &'a R,
}

impl<'a, R: RemoteAuthority> SyncEngine<'a, R> {
    pub const fn new(store: &'a StoreService, remote: &'a R) -> Self {
        Self { store, remote }
    }

    /// Upload a batch. The batch succeeds or fails as a whole.
    pub async fn push(&self, records: &[HistoryRecord]) -> bool {
        if records.is_empty() {
            return true;
        }

        match self.remote.upload(records).await {
            Ok(summary) => {
                tracing::debug!(
                    "Pushed {} records ({} accepted, {} rejected)",
                    records.len(),
                    summary.accepted,
                    summary.rejected
                );
                true
            }
            Err(error) => {
                log_remote_failure("push", &error);
                false
            }
        }
    }

    /// Upload every local record.
    pub async fn push_all(&self) -> bool {
        match self.store.list_records().await {
            Ok(records) => self.push(&records).await,
            Err(error) => {
                tracing::warn!("Could not read local records for push: {error}");
                false
            }
        }
    }

    /// Fetch the authoritative set and apply it locally. Returns records changed.
    pub async fn pull(&self) -> usize {
        let remote_records = match self.remote.fetch_all().await {
            Ok(records) => records,
            Err(error) => {
                log_remote_failure("pull", &error);
                return 0;
            }
        };

        let local_records = match self.store.list_records().await {
            Ok(records) => records,
            Err(error) => {
                tracing::warn!("Could not read local records for pull: {error}");
                return 0;
            }
        };

        let (changed, deleted) = self.apply_remote_set(remote_records, local_records).await;
        if changed + deleted > 0 {
            tracing::info!("Pull applied {changed} updates and {deleted} deletions");
        }
        changed + deleted
    }

    /// Push everything local first, then pull.
    ///
    /// The pull is skipped when the push fails: locally created records that
    /// never reached the remote would otherwise look deleted elsewhere.
    pub async fn full_sync(&self) -> SyncReport {
        let pushed = self.push_all().await;
        if !pushed {
            return SyncReport {
                pushed,
                changed: 0,
            };
        }

        SyncReport {
            pushed,
            changed: self.pull().await,
        }
    }

    async fn apply_remote_set(
        &self,
        remote_records: Vec<HistoryRecord>,
        local_records: Vec<HistoryRecord>,
    ) -> (usize, usize) {
        let remote_ids: HashSet<RecordId> =
            remote_records.iter().map(|record| record.id.clone()).collect();
        let local_by_id: HashMap<RecordId, HistoryRecord> = local_records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();

        let mut changed = 0;
        for remote in &remote_records {
            let newer = local_by_id
                .get(&remote.id)
                .is_none_or(|local| remote.updated_at > local.updated_at);
            if !newer {
                continue;
            }
            match self.store.upsert_record(remote).await {
                Ok(()) => changed += 1,
                Err(error) => tracing::warn!("Could not store pulled record {}: {error}", remote.id),
            }
        }

        let mut deleted = 0;
        for local in local_by_id.values() {
            if remote_ids.contains(&local.id) || local.source.is_none() {
                continue;
            }
            match self.store.delete_record(&local.id).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(error) => tracing::warn!("Could not delete absent record {}: {error}", local.id),
            }
        }

        (changed, deleted)
    }
}

/// Log a remote failure at a level matching its kind.
pub(crate) fn log_remote_failure(operation: &str, error: &RemoteError) {
    if error.is_auth() {
        tracing::debug!("Skipping {operation}: {error}");
    } else {
        tracing::warn!("Remote {operation} failed: {error}");
    }
}
