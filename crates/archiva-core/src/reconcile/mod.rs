//! Linking records created from pending submissions to their remote orders.
//!
//! Pending submissions are purged locally a few seconds after completion, so
//! the resolver first tries the local pending row and then falls back to the
//! remote copy of the record itself. A record that resolves through neither
//! path is simply retried on the next pass.

use crate::linked_ids::LinkedIds;
use crate::models::HistoryRecord;
use crate::remote::RemoteAuthority;
use crate::services::StoreService;
use crate::sync::{log_remote_failure, SyncEngine};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOutcome {
    pub linked: usize,
    pub pushed: bool,
}

pub struct ReconciliationResolver<'a, R> {
    store: &'a StoreService,
    remote: &'a R,
}

impl<'a, R: RemoteAuthority> ReconciliationResolver<'a, R> {
    pub const fn new(store: &'a StoreService, remote: &'a R) -> Self {
        Self { store, remote }
    }

    /// Try to link every unresolved record, then push the linked ones.
    pub async fn run(&self) -> ResolveOutcome {
        let unlinked = match self.store.list_unlinked().await {
            Ok(records) => records,
            Err(error) => {
                tracing::warn!("Could not read unlinked records: {error}");
                return ResolveOutcome::default();
            }
        };

        let mut linked = Vec::new();
        for mut record in unlinked {
            if !self.resolve(&mut record).await {
                continue;
            }
            record.touch();
            if record.current_state.is_some() {
                record.state_updated_at = Some(record.updated_at);
            }
            match self.store.upsert_record(&record).await {
                Ok(()) => linked.push(record),
                Err(error) => tracing::warn!("Could not store link for record {}: {error}", record.id),
            }
        }

        if linked.is_empty() {
            return ResolveOutcome {
                linked: 0,
                pushed: true,
            };
        }

        tracing::info!("Linked {} records to remote orders", linked.len());
        let pushed = SyncEngine::new(self.store, self.remote).push(&linked).await;
        ResolveOutcome {
            linked: linked.len(),
            pushed,
        }
    }

    async fn resolve(&self, record: &mut HistoryRecord) -> bool {
        let Some(pending_id) = record.merged_into_pending_id.clone() else {
            return false;
        };

        match self.store.get_pending(&pending_id).await {
            Ok(Some(pending)) => match pending.remote_id() {
                Some(remote_id) => {
                    self.adopt_from_lookup(record, remote_id).await;
                    true
                }
                None => {
                    tracing::debug!("Pending submission {pending_id} has no remote order yet");
                    false
                }
            },
            Ok(None) => self.adopt_from_remote_copy(record).await,
            Err(error) => {
                tracing::warn!("Could not read pending submission {pending_id}: {error}");
                false
            }
        }
    }

    /// Fast path. The identifier is known locally; the lookup only adds state.
    async fn adopt_from_lookup(&self, record: &mut HistoryRecord, remote_id: &str) {
        record.remote_ids = Some(LinkedIds::Single(remote_id.to_string()));

        let ids = [remote_id.to_string()];
        let snapshot = match self.remote.lookup_lifecycles(&ids).await {
            Ok(mut found) => found.remove(remote_id),
            Err(error) => {
                log_remote_failure("order state lookup", &error);
                None
            }
        };
        let Some(snapshot) = snapshot else {
            return;
        };

        if let Some(order_number) = LinkedIds::from_values(snapshot.order_number.clone()) {
            record.remote_numbers = Some(order_number);
        }
        if let Some(state) = snapshot.order_state() {
            record.current_state = Some(state);
            record.lifecycle = Some(snapshot.details());
        }
    }

    /// Fallback path. Another device or the server may have linked it.
    async fn adopt_from_remote_copy(&self, record: &mut HistoryRecord) -> bool {
        let remote_copy = match self.remote.fetch_one(&record.id).await {
            Ok(copy) => copy,
            Err(error) => {
                log_remote_failure("record fetch", &error);
                return false;
            }
        };
        let Some(remote_copy) = remote_copy.filter(HistoryRecord::has_remote_ids) else {
            return false;
        };

        record.remote_ids = remote_copy.remote_ids;
        if remote_copy.remote_numbers.is_some() {
            record.remote_numbers = remote_copy.remote_numbers;
        }
        if remote_copy.current_state.is_some() {
            record.current_state = remote_copy.current_state;
            record.lifecycle = remote_copy.lifecycle;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderState, PendingSubmission};
    use crate::testing::{snapshot, FakeRemote, Outage};
    use pretty_assertions::assert_eq;

    fn unlinked_record(pending_id: &str) -> HistoryRecord {
        let mut record = HistoryRecord::new("local", serde_json::json!({"customer": "C001"}));
        record.merged_into_pending_id = Some(pending_id.to_string());
        record
    }

    async fn setup(record: &HistoryRecord) -> (StoreService, FakeRemote) {
        let store = StoreService::open_in_memory().await.unwrap();
        store.upsert_record(record).await.unwrap();
        (store, FakeRemote::new())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fast_path_uses_local_pending_submission() {
        let record = unlinked_record("p-1");
        let (store, remote) = setup(&record).await;
        let mut pending = PendingSubmission::new("p-1");
        pending.resolved_remote_id = Some("70.962".to_string());
        store.upsert_pending(&pending).await.unwrap();
        remote.set_lifecycle("70.962", snapshot(OrderState::SentToHub, "ORD/26/00417"));

        let outcome = ReconciliationResolver::new(&store, &remote).run().await;
        assert_eq!(outcome, ResolveOutcome { linked: 1, pushed: true });
        assert_eq!(remote.lookups(), vec![vec!["70.962".to_string()]]);
        assert!(remote.single_fetches().is_empty());

        let stored = store.get_record(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.remote_ids, Some(LinkedIds::Single("70.962".to_string())));
        assert_eq!(
            stored.remote_numbers,
            Some(LinkedIds::Single("ORD/26/00417".to_string()))
        );
        assert_eq!(stored.current_state, Some(OrderState::SentToHub));
        assert!(stored.updated_at > record.updated_at);
        assert_eq!(remote.record(&record.id), Some(stored));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fast_path_links_even_when_lookup_fails() {
        let record = unlinked_record("p-1");
        let (store, remote) = setup(&record).await;
        let mut pending = PendingSubmission::new("p-1");
        pending.resolved_remote_id = Some("70.962".to_string());
        store.upsert_pending(&pending).await.unwrap();
        remote.set_outage(Some(Outage::Offline));

        let outcome = ReconciliationResolver::new(&store, &remote).run().await;
        assert_eq!(outcome, ResolveOutcome { linked: 1, pushed: false });

        let stored = store.get_record(&record.id).await.unwrap().unwrap();
        assert!(stored.has_remote_ids());
        assert_eq!(stored.current_state, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fallback_adopts_identifier_from_remote_copy() {
        let record = unlinked_record("purged");
        let (store, remote) = setup(&record).await;

        let mut remote_copy = record.clone();
        remote_copy.remote_ids = LinkedIds::from_values(["70.962", "70.963"]);
        remote_copy.current_state = Some(OrderState::Transferred);
        remote.put_record(remote_copy);

        let outcome = ReconciliationResolver::new(&store, &remote).run().await;
        assert_eq!(outcome.linked, 1);
        assert_eq!(remote.single_fetches(), vec![record.id.clone()]);

        let stored = store.get_record(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.remote_ids, LinkedIds::from_values(["70.962", "70.963"]));
        assert_eq!(stored.current_state, Some(OrderState::Transferred));
        assert!(!stored.is_unlinked());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fallback_without_identifier_leaves_record_unresolved() {
        let record = unlinked_record("purged");
        let (store, remote) = setup(&record).await;
        remote.put_record(record.clone());

        let outcome = ReconciliationResolver::new(&store, &remote).run().await;
        assert_eq!(outcome.linked, 0);
        assert!(remote.uploads().is_empty());
        assert_eq!(store.get_record(&record.id).await.unwrap(), Some(record));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn queued_pending_submission_is_retried_later() {
        let record = unlinked_record("p-queued");
        let (store, remote) = setup(&record).await;
        store
            .upsert_pending(&PendingSubmission::new("p-queued"))
            .await
            .unwrap();

        let outcome = ReconciliationResolver::new(&store, &remote).run().await;
        assert_eq!(outcome.linked, 0);
        assert!(remote.lookups().is_empty());
        assert!(remote.single_fetches().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remote_outage_on_fallback_is_not_an_error() {
        let record = unlinked_record("purged");
        let (store, remote) = setup(&record).await;
        remote.set_outage(Some(Outage::SignedOut));

        let outcome = ReconciliationResolver::new(&store, &remote).run().await;
        assert_eq!(outcome.linked, 0);
        assert!(store.get_record(&record.id).await.unwrap().unwrap().is_unlinked());
    }
}
