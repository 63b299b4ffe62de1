//! Pending submission model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::util::unix_millis_now;

/// Progress of the out-of-band automation creating the remote order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl PendingStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PendingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PendingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown pending status: {other}")),
        }
    }
}

/// Short-lived local record for a remote order still being created.
///
/// An external process deletes these within seconds of completion, whether
/// or not the originating history record has been linked yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSubmission {
    pub id: String,
    #[serde(default)]
    pub resolved_remote_id: Option<String>,
    pub status: PendingStatus,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

impl PendingSubmission {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resolved_remote_id: None,
            status: PendingStatus::Queued,
            created_at: unix_millis_now(),
        }
    }

    /// Remote order identifier, once the remote system confirmed it.
    pub fn remote_id(&self) -> Option<&str> {
        self.resolved_remote_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}
