//! The engine facade handed to UI layers and schedulers.
//!
//! Construct one [`ArchiveEngine`] at startup and share it. Every operation
//! here is infallible from the caller's point of view: remote and store
//! failures are logged and show up as `false` or zero counts.

use std::sync::{Mutex, PoisonError};

use crate::config::EngineConfig;
use crate::lifecycle::LifecycleAggregator;
use crate::models::{HistoryRecord, RecordId};
use crate::observers::{Observers, Subscription, UpdateNotice};
use crate::realtime::{OperationProgress, ProgressMap, RealtimeBridge};
use crate::reconcile::ReconciliationResolver;
use crate::remote::RemoteAuthority;
use crate::services::StoreService;
use crate::state::SyncState;
use crate::sync::{log_remote_failure, SyncEngine, SyncReport};
use crate::util::unix_millis_now;

/// Result of a combined reconcile and aggregate cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleReport {
    /// Records linked to a remote order by the resolver
    pub linked: usize,
    /// Records whose derived lifecycle fields changed
    pub updated: usize,
    /// Whether every resulting push succeeded
    pub pushed: bool,
}

impl LifecycleReport {
    pub const fn changed(&self) -> usize {
        self.linked + self.updated
    }
}

pub struct ArchiveEngine<R> {
    store: StoreService,
    remote: R,
    config: EngineConfig,
    observers: Observers,
    progress: ProgressMap,
    state: Mutex<SyncState>,
}

impl<R: RemoteAuthority> ArchiveEngine<R> {
    pub fn new(store: StoreService, remote: R, config: EngineConfig) -> Self {
        Self {
            store,
            remote,
            config,
            observers: Observers::new(),
            progress: ProgressMap::new(),
            state: Mutex::new(SyncState::default()),
        }
    }

    pub const fn store(&self) -> &StoreService {
        &self.store
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sync_state(&self) -> SyncState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SyncState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn sync_engine(&self) -> SyncEngine<'_, R> {
        SyncEngine::new(&self.store, &self.remote)
    }

    /// Push every local record, then pull.
    pub async fn full_sync(&self) -> SyncReport {
        self.set_state(SyncState::Syncing);
        let report = self.sync_engine().full_sync().await;
        self.set_state(if report.pushed {
            SyncState::Synced
        } else {
            SyncState::Error
        });
        if report.changed > 0 {
            self.observers.notify(&UpdateNotice::RecordsChanged {
                changed: report.changed,
            });
        }
        report
    }

    pub async fn pull(&self) -> usize {
        let changed = self.sync_engine().pull().await;
        if changed > 0 {
            self.observers
                .notify(&UpdateNotice::RecordsChanged { changed });
        }
        changed
    }

    pub async fn push(&self, records: &[HistoryRecord]) -> bool {
        self.sync_engine().push(records).await
    }

    pub async fn push_all(&self) -> bool {
        self.sync_engine().push_all().await
    }

    /// Delete a record remotely, then locally.
    ///
    /// The local copy is kept when the remote delete fails, otherwise the
    /// next pull would bring it straight back.
    pub async fn delete_record(&self, id: &RecordId) -> bool {
        if let Err(error) = self.remote.delete(id).await {
            log_remote_failure("delete", &error);
            return false;
        }
        self.progress.remove(id);
        match self.store.delete_record(id).await {
            Ok(_) => {
                self.observers
                    .notify(&UpdateNotice::RecordRemoved { id: id.clone() });
                true
            }
            Err(error) => {
                tracing::warn!("Could not delete record {id} locally: {error}");
                false
            }
        }
    }

    /// Link records created from pending submissions. Returns records linked.
    pub async fn reconcile_unlinked(&self) -> usize {
        let outcome = ReconciliationResolver::new(&self.store, &self.remote)
            .run()
            .await;
        if outcome.linked > 0 {
            self.observers.notify(&UpdateNotice::LifecyclesChanged {
                changed: outcome.linked,
            });
        }
        outcome.linked
    }

    /// Reconcile unlinked records, then refresh lifecycle state.
    ///
    /// Reconciliation runs first so freshly linked records are aggregated in
    /// the same cycle.
    pub async fn sync_lifecycles(&self) -> LifecycleReport {
        let resolved = ReconciliationResolver::new(&self.store, &self.remote)
            .run()
            .await;
        let aggregated =
            LifecycleAggregator::new(&self.store, &self.remote, self.config.lifecycle_batch_size)
                .run()
                .await;

        let report = LifecycleReport {
            linked: resolved.linked,
            updated: aggregated.updated,
            pushed: resolved.pushed && aggregated.pushed,
        };
        if report.changed() > 0 {
            self.observers.notify(&UpdateNotice::LifecyclesChanged {
                changed: report.changed(),
            });
        }
        tracing::info!(
            "Lifecycle sync linked {} and updated {} records",
            report.linked,
            report.updated
        );
        report
    }

    /// Drop finished pending submissions older than the retention window.
    pub async fn purge_stale_pending(&self) -> u64 {
        let cutoff = unix_millis_now().saturating_sub(self.config.pending_retention_ms);
        match self.store.purge_pending_older_than(cutoff).await {
            Ok(purged) => purged,
            Err(error) => {
                tracing::warn!("Could not purge pending submissions: {error}");
                0
            }
        }
    }

    pub fn observers(&self) -> &Observers {
        &self.observers
    }

    /// Register an update handler. Keep the subscription to unsubscribe.
    pub fn on_update<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&UpdateNotice) + Send + Sync + 'static,
    {
        self.observers.on_update(handler)
    }

    pub fn progress(&self, id: &RecordId) -> Option<OperationProgress> {
        self.progress.get(id)
    }

    pub fn progress_entries(&self) -> Vec<(RecordId, OperationProgress)> {
        self.progress.snapshot()
    }

    /// Bridge for feeding push events into this engine.
    pub const fn realtime(&self) -> RealtimeBridge<'_, R> {
        RealtimeBridge::new(&self.store, &self.remote, &self.observers, &self.progress)
    }
}
