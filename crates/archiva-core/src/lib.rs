//! archiva-core - Core library for Archiva
//!
//! Offline-first archive of submitted ERP orders: a local record store,
//! last-writer-wins sync against the remote authority, ERP lifecycle
//! aggregation across merged orders, reconciliation of records created from
//! pending submissions, and a realtime invalidation bridge.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod linked_ids;
pub mod models;
pub mod observers;
pub mod realtime;
pub mod reconcile;
pub mod remote;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

#[cfg(test)]
mod testing;

pub use config::{EngineConfig, RemoteConfig};
pub use engine::{ArchiveEngine, LifecycleReport};
pub use error::{Error, Result};
pub use linked_ids::LinkedIds;
pub use models::{
    HistoryRecord, LifecycleSnapshot, OrderState, PendingSubmission, RecordId,
};
pub use observers::{Observers, Subscription, UpdateNotice};
pub use realtime::{RealtimeEnvelope, RealtimeEvent};
pub use remote::{HttpRemote, RemoteAuthority, RemoteError, TokenSource};
pub use services::StoreService;
pub use state::SyncState;
pub use sync::SyncReport;
