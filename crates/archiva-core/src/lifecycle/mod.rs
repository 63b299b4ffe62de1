//! ERP lifecycle aggregation across linked remote orders.
//!
//! A record linked to several remote orders (an order merge) gets the state
//! of whichever sibling has progressed furthest. All identifiers referenced
//! by trackable records are looked up together, once per pass.

use std::collections::{HashMap, HashSet};

use crate::linked_ids::LinkedIds;
use crate::models::{HistoryRecord, LifecycleSnapshot, OrderState};
use crate::remote::RemoteAuthority;
use crate::services::StoreService;
use crate::sync::{log_remote_failure, SyncEngine};

/// Result of one aggregation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateOutcome {
    pub updated: usize,
    pub pushed: bool,
}

pub struct LifecycleAggregator<'a, R> {
    store: &'a StoreService,
    remote: &'a R,
    batch_size: usize,
}

impl<'a, R: RemoteAuthority> LifecycleAggregator<'a, R> {
    pub fn new(store: &'a StoreService, remote: &'a R, batch_size: usize) -> Self {
        Self {
            store,
            remote,
            batch_size: batch_size.max(1),
        }
    }

    /// Refresh lifecycle state for every trackable record.
    pub async fn run(&self) -> AggregateOutcome {
        let trackable = match self.store.list_trackable().await {
            Ok(records) => records,
            Err(error) => {
                tracing::warn!("Could not read trackable records: {error}");
                return AggregateOutcome::default();
            }
        };
        if trackable.is_empty() {
            return AggregateOutcome {
                updated: 0,
                pushed: true,
            };
        }

        let remote_ids = collect_remote_ids(&trackable);
        let Some(snapshots) = self.lookup(&remote_ids).await else {
            return AggregateOutcome::default();
        };

        let mut dirty = Vec::new();
        for mut record in trackable {
            if !apply_snapshots(&mut record, &snapshots) {
                continue;
            }
            match self.store.upsert_record(&record).await {
                Ok(()) => dirty.push(record),
                Err(error) => {
                    tracing::warn!("Could not store lifecycle for record {}: {error}", record.id);
                }
            }
        }

        if dirty.is_empty() {
            return AggregateOutcome {
                updated: 0,
                pushed: true,
            };
        }

        tracing::info!("Lifecycle state changed for {} records", dirty.len());
        let pushed = SyncEngine::new(self.store, self.remote).push(&dirty).await;
        AggregateOutcome {
            updated: dirty.len(),
            pushed,
        }
    }

    /// Batched lookup. Any failed chunk voids the whole pass so a record is
    /// never judged on a partial sibling set.
    async fn lookup(&self, remote_ids: &[String]) -> Option<HashMap<String, LifecycleSnapshot>> {
        let mut snapshots = HashMap::with_capacity(remote_ids.len());
        for chunk in remote_ids.chunks(self.batch_size) {
            match self.remote.lookup_lifecycles(chunk).await {
                Ok(found) => snapshots.extend(found),
                Err(error) => {
                    log_remote_failure("lifecycle lookup", &error);
                    return None;
                }
            }
        }
        tracing::debug!(
            "Resolved {} of {} remote order states",
            snapshots.len(),
            remote_ids.len()
        );
        Some(snapshots)
    }
}

/// Distinct identifiers across all records, in first-seen order.
fn collect_remote_ids(records: &[HistoryRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(|record| record.remote_ids.as_ref())
        .flat_map(|ids| ids.iter())
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}

/// Highest forward-progress snapshot; earlier entries win ties.
pub fn select_snapshot<'s, I>(snapshots: I) -> Option<(OrderState, &'s LifecycleSnapshot)>
where
    I: IntoIterator<Item = &'s LifecycleSnapshot>,
{
    let mut best: Option<(OrderState, &LifecycleSnapshot)> = None;
    for snapshot in snapshots {
        let Some(state) = snapshot.order_state() else {
            continue;
        };
        if best.is_none_or(|(current, _)| state.priority() > current.priority()) {
            best = Some((state, snapshot));
        }
    }
    best
}

/// Write the winning sibling's fields onto `record`.
///
/// Returns false, leaving the record untouched, when no sibling resolved or
/// nothing would change.
fn apply_snapshots(
    record: &mut HistoryRecord,
    snapshots: &HashMap<String, LifecycleSnapshot>,
) -> bool {
    let Some(remote_ids) = record.remote_ids.as_ref() else {
        return false;
    };
    let siblings: Vec<&LifecycleSnapshot> = remote_ids
        .iter()
        .filter_map(|id| snapshots.get(id))
        .collect();
    let Some((state, chosen)) = select_snapshot(siblings.iter().copied()) else {
        return false;
    };

    let remote_numbers = LinkedIds::from_values(
        siblings
            .iter()
            .filter_map(|snapshot| snapshot.order_number.clone()),
    )
    .or_else(|| record.remote_numbers.clone());
    let details = Some(chosen.details());

    if record.current_state == Some(state)
        && record.remote_numbers == remote_numbers
        && record.lifecycle == details
    {
        return false;
    }

    record.current_state = Some(state);
    record.remote_numbers = remote_numbers;
    record.lifecycle = details;
    record.touch();
    record.state_updated_at = Some(record.updated_at);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BillingRefs, LogisticsRefs};
    use crate::testing::{snapshot, FakeRemote, Outage};
    use pretty_assertions::assert_eq;

    async fn store_with(records: &[HistoryRecord]) -> StoreService {
        let store = StoreService::open_in_memory().await.unwrap();
        for record in records {
            store.upsert_record(record).await.unwrap();
        }
        store
    }

    fn linked_record(ids: &[&str]) -> HistoryRecord {
        let mut record = HistoryRecord::new("local", serde_json::Value::Null);
        record.remote_ids = LinkedIds::from_values(ids.iter().copied());
        record
    }

    #[test]
    fn select_prefers_highest_priority() {
        let shipped = snapshot(OrderState::Shipped, "ORD/1");
        let invoiced = snapshot(OrderState::Invoiced, "ORD/2");
        let (state, chosen) = select_snapshot([&shipped, &invoiced]).unwrap();
        assert_eq!(state, OrderState::Invoiced);
        assert_eq!(chosen.order_number.as_deref(), Some("ORD/2"));
    }

    #[test]
    fn select_never_prefers_transfer_error() {
        let failed = snapshot(OrderState::TransferError, "ORD/1");
        let transferred = snapshot(OrderState::Transferred, "ORD/2");
        let (state, _) = select_snapshot([&failed, &transferred]).unwrap();
        assert_eq!(state, OrderState::Transferred);

        let (state, _) = select_snapshot([&failed]).unwrap();
        assert_eq!(state, OrderState::TransferError);
    }

    #[test]
    fn select_keeps_first_on_ties_and_skips_unknown_states() {
        let first = snapshot(OrderState::Shipped, "ORD/1");
        let second = snapshot(OrderState::Shipped, "ORD/2");
        let mut unknown = snapshot(OrderState::Paid, "ORD/3");
        unknown.state = "archived".to_string();

        let (_, chosen) = select_snapshot([&unknown, &first, &second]).unwrap();
        assert_eq!(chosen.order_number.as_deref(), Some("ORD/1"));
        assert!(select_snapshot([&unknown]).is_none());
    }

    #[test]
    fn collect_remote_ids_deduplicates_across_records() {
        let records = [
            linked_record(&["A", "B"]),
            linked_record(&["B", "C"]),
            linked_record(&["A"]),
        ];
        assert_eq!(collect_remote_ids(&records), vec!["A", "B", "C"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn merges_siblings_with_one_lookup_and_pushes_result() {
        let merged = linked_record(&["70.001", "70.002"]);
        let single = linked_record(&["70.002"]);
        let store = store_with(&[merged.clone(), single.clone()]).await;

        let remote = FakeRemote::new();
        remote.set_lifecycle("70.001", snapshot(OrderState::Shipped, "ORD/1"));
        let mut invoiced = snapshot(OrderState::Invoiced, "ORD/2");
        invoiced.billing = Some(BillingRefs {
            invoice_number: Some("FT/26001234".to_string()),
            ..BillingRefs::default()
        });
        remote.set_lifecycle("70.002", invoiced);

        let outcome = LifecycleAggregator::new(&store, &remote, 200).run().await;
        assert_eq!(outcome, AggregateOutcome { updated: 2, pushed: true });
        assert_eq!(remote.lookups().len(), 1);
        assert_eq!(remote.uploads().len(), 1);

        let stored = store.get_record(&merged.id).await.unwrap().unwrap();
        assert_eq!(stored.current_state, Some(OrderState::Invoiced));
        assert_eq!(
            stored.remote_numbers,
            LinkedIds::from_values(["ORD/1", "ORD/2"])
        );
        assert_eq!(
            stored
                .lifecycle
                .and_then(|details| details.billing)
                .and_then(|billing| billing.invoice_number)
                .as_deref(),
            Some("FT/26001234")
        );
        assert!(stored.updated_at > merged.updated_at);
        assert_eq!(stored.state_updated_at, Some(stored.updated_at));

        let single = store.get_record(&single.id).await.unwrap().unwrap();
        assert_eq!(single.remote_numbers, LinkedIds::from_values(["ORD/2"]));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_pass_without_remote_change_dirties_nothing() {
        let record = linked_record(&["70.001"]);
        let store = store_with(&[record]).await;
        let remote = FakeRemote::new();
        let mut delivered = snapshot(OrderState::Delivered, "ORD/1");
        delivered.logistics = Some(LogisticsRefs {
            tracking_number: Some("445291888246".to_string()),
            courier: Some("FedEx".to_string()),
            ..LogisticsRefs::default()
        });
        remote.set_lifecycle("70.001", delivered);

        let aggregator = LifecycleAggregator::new(&store, &remote, 200);
        assert_eq!(aggregator.run().await.updated, 1);
        assert_eq!(aggregator.run().await.updated, 0);
        assert_eq!(remote.uploads().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unresolved_records_are_left_untouched() {
        let record = linked_record(&["unknown"]);
        let store = store_with(&[record.clone()]).await;
        let remote = FakeRemote::new();

        let outcome = LifecycleAggregator::new(&store, &remote, 200).run().await;
        assert_eq!(outcome.updated, 0);
        assert_eq!(store.get_record(&record.id).await.unwrap(), Some(record));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn settled_records_are_not_polled() {
        let mut settled = linked_record(&["70.009"]);
        settled.current_state = Some(OrderState::Paid);
        let store = store_with(&[settled]).await;
        let remote = FakeRemote::new();

        LifecycleAggregator::new(&store, &remote, 200).run().await;
        assert!(remote.lookups().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lookups_are_chunked_by_batch_size() {
        let store = store_with(&[linked_record(&["A", "B", "C"])]).await;
        let remote = FakeRemote::new();

        LifecycleAggregator::new(&store, &remote, 2).run().await;
        assert_eq!(
            remote.lookups(),
            vec![
                vec!["A".to_string(), "B".to_string()],
                vec!["C".to_string()]
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lookup_failure_changes_nothing() {
        let record = linked_record(&["70.001"]);
        let store = store_with(&[record.clone()]).await;
        let remote = FakeRemote::new();
        remote.set_lifecycle("70.001", snapshot(OrderState::Shipped, "ORD/1"));
        remote.set_outage(Some(Outage::Offline));

        let outcome = LifecycleAggregator::new(&store, &remote, 200).run().await;
        assert_eq!(outcome, AggregateOutcome::default());
        assert_eq!(store.get_record(&record.id).await.unwrap(), Some(record));
    }
}
