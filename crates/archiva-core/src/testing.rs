//! In-process remote authority for unit tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::{HistoryRecord, LifecycleSnapshot, OrderState, RecordId};
use crate::remote::{RemoteAuthority, RemoteError, RemoteResult, UploadSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outage {
    Offline,
    SignedOut,
}

/// Scripted remote that behaves like a last-writer-wins server and records calls.
#[derive(Default)]
pub struct FakeRemote {
    records: Mutex<BTreeMap<RecordId, HistoryRecord>>,
    lifecycles: Mutex<HashMap<String, LifecycleSnapshot>>,
    outage: Mutex<Option<Outage>>,
    uploads: Mutex<Vec<Vec<RecordId>>>,
    lookups: Mutex<Vec<Vec<String>>>,
    single_fetches: Mutex<Vec<RecordId>>,
    deletes: Mutex<Vec<RecordId>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn snapshot(state: OrderState, order_number: &str) -> LifecycleSnapshot {
    LifecycleSnapshot {
        state: state.as_str().to_string(),
        erp_status: None,
        order_number: Some(order_number.to_string()),
        logistics: None,
        billing: None,
    }
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_record(&self, record: HistoryRecord) {
        lock(&self.records).insert(record.id.clone(), record);
    }

    pub fn remove_record(&self, id: &RecordId) {
        lock(&self.records).remove(id);
    }

    pub fn record(&self, id: &RecordId) -> Option<HistoryRecord> {
        lock(&self.records).get(id).cloned()
    }

    pub fn set_lifecycle(&self, remote_id: &str, snapshot: LifecycleSnapshot) {
        lock(&self.lifecycles).insert(remote_id.to_string(), snapshot);
    }

    pub fn set_outage(&self, outage: Option<Outage>) {
        *lock(&self.outage) = outage;
    }

    pub fn uploads(&self) -> Vec<Vec<RecordId>> {
        lock(&self.uploads).clone()
    }

    pub fn lookups(&self) -> Vec<Vec<String>> {
        lock(&self.lookups).clone()
    }

    pub fn single_fetches(&self) -> Vec<RecordId> {
        lock(&self.single_fetches).clone()
    }

    pub fn deletes(&self) -> Vec<RecordId> {
        lock(&self.deletes).clone()
    }

    fn check_outage(&self) -> RemoteResult<()> {
        match *lock(&self.outage) {
            None => Ok(()),
            Some(Outage::SignedOut) => Err(RemoteError::MissingCredentials),
            Some(Outage::Offline) => Err(RemoteError::Status {
                status: 503,
                body: "offline".to_string(),
            }),
        }
    }
}

impl RemoteAuthority for FakeRemote {
    async fn upload(&self, records: &[HistoryRecord]) -> RemoteResult<UploadSummary> {
        self.check_outage()?;
        lock(&self.uploads).push(records.iter().map(|r| r.id.clone()).collect());

        let mut stored = lock(&self.records);
        let mut summary = UploadSummary::default();
        for record in records {
            let newer = stored
                .get(&record.id)
                .is_none_or(|existing| record.updated_at > existing.updated_at);
            if newer {
                stored.insert(record.id.clone(), record.clone());
                summary.accepted += 1;
            } else {
                summary.rejected += 1;
            }
        }
        Ok(summary)
    }

    async fn fetch_all(&self) -> RemoteResult<Vec<HistoryRecord>> {
        self.check_outage()?;
        Ok(lock(&self.records).values().cloned().collect())
    }

    async fn fetch_one(&self, id: &RecordId) -> RemoteResult<Option<HistoryRecord>> {
        self.check_outage()?;
        lock(&self.single_fetches).push(id.clone());
        Ok(lock(&self.records).get(id).cloned())
    }

    async fn delete(&self, id: &RecordId) -> RemoteResult<()> {
        self.check_outage()?;
        lock(&self.deletes).push(id.clone());
        lock(&self.records).remove(id);
        Ok(())
    }

    async fn lookup_lifecycles(
        &self,
        remote_ids: &[String],
    ) -> RemoteResult<HashMap<String, LifecycleSnapshot>> {
        self.check_outage()?;
        lock(&self.lookups).push(remote_ids.to_vec());
        let known = lock(&self.lifecycles);
        Ok(remote_ids
            .iter()
            .filter_map(|id| known.get(id).map(|snapshot| (id.clone(), snapshot.clone())))
            .collect())
    }
}
