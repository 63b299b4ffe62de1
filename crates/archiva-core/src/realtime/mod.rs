//! Realtime invalidation bridge.
//!
//! Push events never carry record bodies the bridge trusts. Create, update
//! and bulk-import events trigger a pull; delete events act on the local
//! store directly. A stale update that arrives after a delete therefore
//! only causes a pull, which sees the record gone remotely too.

mod events;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::{FutureExt, Stream, StreamExt};

pub use events::{
    EventPayload, OperationProgress, ProgressKind, RealtimeEnvelope, RealtimeEvent,
};

use crate::models::RecordId;
use crate::observers::{Observers, UpdateNotice};
use crate::remote::RemoteAuthority;
use crate::services::StoreService;
use crate::sync::SyncEngine;
use crate::util::unix_millis_now;

/// Non-durable progress entries keyed by record id.
#[derive(Debug, Clone, Default)]
pub struct ProgressMap {
    entries: Arc<Mutex<HashMap<RecordId, OperationProgress>>>,
}

impl ProgressMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RecordId, OperationProgress>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, id: &RecordId) -> Option<OperationProgress> {
        self.lock().get(id).cloned()
    }

    /// All entries, ordered by record id.
    pub fn snapshot(&self) -> Vec<(RecordId, OperationProgress)> {
        let mut entries: Vec<_> = self
            .lock()
            .iter()
            .map(|(id, progress)| (id.clone(), progress.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Store an entry unless a newer one is already present.
    pub fn apply(&self, id: RecordId, progress: OperationProgress) -> bool {
        let mut entries = self.lock();
        if entries
            .get(&id)
            .is_some_and(|existing| existing.updated_at > progress.updated_at)
        {
            return false;
        }
        entries.insert(id, progress);
        true
    }

    pub fn remove(&self, id: &RecordId) -> bool {
        self.lock().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct RealtimeBridge<'a, R> {
    store: &'a StoreService,
    remote: &'a R,
    observers: &'a Observers,
    progress: &'a ProgressMap,
}

impl<'a, R: RemoteAuthority> RealtimeBridge<'a, R> {
    pub const fn new(
        store: &'a StoreService,
        remote: &'a R,
        observers: &'a Observers,
        progress: &'a ProgressMap,
    ) -> Self {
        Self {
            store,
            remote,
            observers,
            progress,
        }
    }

    /// Dispatch events until the stream ends. Returns how many were received.
    pub async fn run<S>(&self, events: S) -> usize
    where
        S: Stream<Item = RealtimeEnvelope>,
    {
        let mut events = std::pin::pin!(events);
        let mut received = 0;
        while let Some(envelope) = events.next().await {
            received += 1;
            if AssertUnwindSafe(self.dispatch(&envelope))
                .catch_unwind()
                .await
                .is_err()
            {
                tracing::warn!("Realtime handler for {} panicked", envelope.event);
            }
        }
        tracing::debug!("Realtime stream closed after {received} events");
        received
    }

    /// Handle one event. Failures are logged, never returned.
    pub async fn dispatch(&self, envelope: &RealtimeEnvelope) {
        let Some(event) = envelope.kind() else {
            tracing::debug!("Ignoring unknown realtime event {}", envelope.event);
            return;
        };
        let payload = match envelope.decode_payload() {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!("Malformed payload for {event}: {error}");
                return;
            }
        };

        match event {
            RealtimeEvent::Created | RealtimeEvent::Updated | RealtimeEvent::BulkImported => {
                self.refresh(event).await;
            }
            RealtimeEvent::Deleted => self.remove_local(&payload).await,
            RealtimeEvent::DeleteProgress | RealtimeEvent::EditProgress => {
                if let Some(kind) = event.progress_kind() {
                    self.track_progress(kind, &payload);
                }
            }
        }
    }

    async fn refresh(&self, event: RealtimeEvent) {
        let changed = SyncEngine::new(self.store, self.remote).pull().await;
        tracing::debug!("{event} pulled {changed} changes");
        self.observers
            .notify(&UpdateNotice::RecordsChanged { changed });
    }

    async fn remove_local(&self, payload: &EventPayload) {
        let Some(id) = payload.target().cloned() else {
            tracing::warn!("Delete event without record id");
            return;
        };
        self.progress.remove(&id);
        match self.store.delete_record(&id).await {
            Ok(true) => tracing::debug!("Deleted record {id} from push event"),
            Ok(false) => tracing::debug!("Record {id} was already gone locally"),
            Err(error) => {
                tracing::warn!("Could not delete record {id}: {error}");
                return;
            }
        }
        self.observers.notify(&UpdateNotice::RecordRemoved { id });
    }

    fn track_progress(&self, kind: ProgressKind, payload: &EventPayload) {
        let Some(id) = payload.target().cloned() else {
            tracing::debug!("Progress event without record id");
            return;
        };
        let changed = if payload.done {
            self.progress.remove(&id)
        } else {
            let progress = OperationProgress::from_payload(kind, payload, unix_millis_now());
            self.progress.apply(id.clone(), progress)
        };
        if changed {
            self.observers
                .notify(&UpdateNotice::ProgressChanged { id });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HistoryRecord;
    use crate::testing::{FakeRemote, Outage};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Harness {
        store: StoreService,
        remote: FakeRemote,
        observers: Observers,
        progress: ProgressMap,
        notices: Arc<Mutex<Vec<UpdateNotice>>>,
    }

    impl Harness {
        async fn new() -> Self {
            let observers = Observers::new();
            let notices = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&notices);
            let _subscription = observers.on_update(move |notice| {
                sink.lock().unwrap().push(notice.clone());
            });
            Self {
                store: StoreService::open_in_memory().await.unwrap(),
                remote: FakeRemote::new(),
                observers,
                progress: ProgressMap::new(),
                notices,
            }
        }

        fn bridge(&self) -> RealtimeBridge<'_, FakeRemote> {
            RealtimeBridge::new(&self.store, &self.remote, &self.observers, &self.progress)
        }

        fn notices(&self) -> Vec<UpdateNotice> {
            self.notices.lock().unwrap().clone()
        }
    }

    fn envelope(event: RealtimeEvent, payload: serde_json::Value) -> RealtimeEnvelope {
        RealtimeEnvelope::new(event, payload)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn updated_event_pulls_and_notifies() {
        let harness = Harness::new().await;
        let record = HistoryRecord::new("device-b", json!({"total": "88,00"}));
        harness.remote.put_record(record.clone());

        harness
            .bridge()
            .dispatch(&envelope(RealtimeEvent::Updated, json!({"id": record.id})))
            .await;

        assert_eq!(harness.store.get_record(&record.id).await.unwrap(), Some(record));
        assert_eq!(
            harness.notices(),
            vec![UpdateNotice::RecordsChanged { changed: 1 }]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stale_update_after_delete_does_not_resurrect() {
        let harness = Harness::new().await;
        let record = HistoryRecord::new("local", json!({}));
        harness.store.upsert_record(&record).await.unwrap();
        harness.remote.put_record(record.clone());

        // Remote deletion happened; the update was emitted before it
        harness.remote.remove_record(&record.id);
        let events = futures::stream::iter(vec![
            envelope(RealtimeEvent::Deleted, json!({"id": record.id})),
            envelope(RealtimeEvent::Updated, json!({"id": record.id})),
        ]);

        assert_eq!(harness.bridge().run(events).await, 2);
        assert!(harness.store.get_record(&record.id).await.unwrap().is_none());
        assert_eq!(
            harness.notices(),
            vec![
                UpdateNotice::RecordRemoved {
                    id: record.id.clone()
                },
                UpdateNotice::RecordsChanged { changed: 0 },
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn duplicate_delete_is_harmless() {
        let harness = Harness::new().await;
        let record = HistoryRecord::new("local", json!({}));
        harness.store.upsert_record(&record).await.unwrap();
        let delete = envelope(RealtimeEvent::Deleted, json!({"id": record.id}));

        let bridge = harness.bridge();
        bridge.dispatch(&delete).await;
        bridge.dispatch(&delete).await;

        assert!(harness.store.get_record(&record.id).await.unwrap().is_none());
        assert_eq!(harness.notices().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn progress_events_update_map_and_ignore_stale_entries() {
        let harness = Harness::new().await;
        let bridge = harness.bridge();
        let id = RecordId::from("rec-9");

        bridge
            .dispatch(&envelope(
                RealtimeEvent::EditProgress,
                json!({"id": "rec-9", "timestamp": 200, "progress": 60, "message": "Updating ERP"}),
            ))
            .await;
        bridge
            .dispatch(&envelope(
                RealtimeEvent::EditProgress,
                json!({"id": "rec-9", "timestamp": 100, "progress": 20}),
            ))
            .await;

        let progress = harness.progress.get(&id).unwrap();
        assert_eq!(progress.kind, ProgressKind::Edit);
        assert_eq!(progress.percent, Some(60));
        assert_eq!(progress.message.as_deref(), Some("Updating ERP"));
        assert_eq!(harness.notices().len(), 1);

        bridge
            .dispatch(&envelope(
                RealtimeEvent::EditProgress,
                json!({"id": "rec-9", "timestamp": 300, "done": true}),
            ))
            .await;
        assert!(harness.progress.is_empty());
        assert_eq!(harness.notices().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_and_malformed_events_are_ignored() {
        let harness = Harness::new().await;
        let events = futures::stream::iter(vec![
            envelope(RealtimeEvent::Deleted, json!("not an object")),
            RealtimeEnvelope {
                event: "history:archived".to_string(),
                payload: json!({"id": "rec-1"}),
            },
            envelope(RealtimeEvent::Deleted, json!({})),
        ]);

        assert_eq!(harness.bridge().run(events).await, 3);
        assert!(harness.notices().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_pull_still_notifies_and_keeps_running() {
        let harness = Harness::new().await;
        harness.remote.set_outage(Some(Outage::Offline));
        let events = futures::stream::iter(vec![
            envelope(RealtimeEvent::BulkImported, json!({"timestamp": 1})),
            envelope(RealtimeEvent::Created, json!({"id": "rec-2"})),
        ]);

        assert_eq!(harness.bridge().run(events).await, 2);
        assert_eq!(
            harness.notices(),
            vec![
                UpdateNotice::RecordsChanged { changed: 0 },
                UpdateNotice::RecordsChanged { changed: 0 },
            ]
        );
    }
}
