//! Data models for Archiva

mod lifecycle;
mod pending;
mod record;

pub use lifecycle::{BillingRefs, LifecycleDetails, LifecycleSnapshot, LogisticsRefs, OrderState};
pub use pending::{PendingStatus, PendingSubmission};
pub use record::{HistoryRecord, RecordId};
