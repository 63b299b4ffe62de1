//! Remote authority contract and HTTP client.
//!
//! The remote authority is the system of record every device syncs against.
//! [`RemoteAuthority`] is the seam the engine talks to; [`HttpRemote`] is the
//! JSON-over-HTTP implementation.

mod http;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{HistoryRecord, LifecycleSnapshot, RecordId};

pub use http::HttpRemote;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("No access token available")]
    MissingCredentials,
    #[error("Remote rejected credentials (HTTP {0})")]
    Unauthorized(u16),
    #[error("Remote HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Remote API error: HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),
    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),
}

impl RemoteError {
    /// Authentication problems are left to whoever owns the session.
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::MissingCredentials | Self::Unauthorized(_))
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Outcome of a batch upload. Partial rejections are not tracked per record.
///
/// Both counts are required on the wire; an error body served with 200 must
/// not read as an accepted push.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub accepted: usize,
    pub rejected: usize,
}

/// Operations the engine needs from the remote authority.
#[allow(async_fn_in_trait)]
pub trait RemoteAuthority {
    /// Upload a batch of records.
    async fn upload(&self, records: &[HistoryRecord]) -> RemoteResult<UploadSummary>;

    /// Fetch the full authoritative record set.
    async fn fetch_all(&self) -> RemoteResult<Vec<HistoryRecord>>;

    /// Fetch one record by id. `None` when the remote does not know it.
    async fn fetch_one(&self, id: &RecordId) -> RemoteResult<Option<HistoryRecord>>;

    /// Delete one record by id.
    async fn delete(&self, id: &RecordId) -> RemoteResult<()>;

    /// Batched lifecycle lookup. Unknown identifiers are simply absent.
    async fn lookup_lifecycles(
        &self,
        remote_ids: &[String],
    ) -> RemoteResult<HashMap<String, LifecycleSnapshot>>;
}

/// Supplies bearer tokens. Session renewal happens elsewhere.
pub trait TokenSource: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// Fixed token, or none at all.
#[derive(Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self(crate::util::normalize_text_option(token))
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_tuple("StaticToken")
            .field(&self.0.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl TokenSource for StaticToken {
    fn access_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Reads the token from an environment variable on every request.
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl TokenSource for EnvToken {
    fn access_token(&self) -> Option<String> {
        crate::util::normalize_text_option(std::env::var(&self.var).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_token_debug_redacts_token() {
        let token = StaticToken::new(Some("secret".to_string()));
        let debug = format!("{token:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn blank_static_token_counts_as_missing() {
        assert_eq!(StaticToken::new(Some("  ".to_string())).access_token(), None);
    }

    #[test]
    fn auth_errors_are_classified() {
        assert!(RemoteError::MissingCredentials.is_auth());
        assert!(RemoteError::Unauthorized(401).is_auth());
        assert!(!RemoteError::InvalidPayload("x".to_string()).is_auth());
    }
}
