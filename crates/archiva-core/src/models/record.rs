//! Archived order record model

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lifecycle::{LifecycleDetails, OrderState};
use crate::linked_ids::{self, LinkedIds};
use crate::util::next_write_timestamp;

/// Opaque record identifier, assigned at creation and never changed.
///
/// Locally created records use UUID v7; records created on other devices keep
/// whatever identifier the remote authority handed out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Create a new unique record ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A durable archived order.
///
/// Conflict resolution is whole-record last-writer-wins on `updated_at`;
/// `payload` (line items, customer snapshot, totals) round-trips untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: RecordId,
    /// Last write timestamp (Unix ms)
    pub updated_at: i64,
    #[serde(default, with = "linked_ids::wire")]
    pub remote_ids: Option<LinkedIds>,
    #[serde(default, with = "linked_ids::wire")]
    pub remote_numbers: Option<LinkedIds>,
    #[serde(default)]
    pub current_state: Option<OrderState>,
    /// When `current_state` was last derived (Unix ms)
    #[serde(default)]
    pub state_updated_at: Option<i64>,
    #[serde(default)]
    pub lifecycle: Option<LifecycleDetails>,
    #[serde(default)]
    pub merged_into_pending_id: Option<String>,
    /// Provenance marker. Only records carrying one are removed when they
    /// disappear from the remote listing.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl HistoryRecord {
    /// Create a new record originating on this device.
    #[must_use]
    pub fn new(source: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: RecordId::new(),
            updated_at: next_write_timestamp(0),
            remote_ids: None,
            remote_numbers: None,
            current_state: None,
            state_updated_at: None,
            lifecycle: None,
            merged_into_pending_id: None,
            source: Some(source.into()),
            payload,
        }
    }

    /// Advance `updated_at` for a local mutation.
    pub fn touch(&mut self) {
        self.updated_at = next_write_timestamp(self.updated_at);
    }

    pub fn has_remote_ids(&self) -> bool {
        self.remote_ids.as_ref().is_some_and(|ids| !ids.is_empty())
    }

    /// Eligible for lifecycle polling: linked and not yet settled.
    pub fn is_trackable(&self) -> bool {
        self.has_remote_ids() && !self.current_state.is_some_and(OrderState::is_terminal)
    }

    /// Created from a pending submission whose remote order is not known yet.
    pub fn is_unlinked(&self) -> bool {
        self.merged_into_pending_id.is_some() && !self.has_remote_ids()
    }
}
