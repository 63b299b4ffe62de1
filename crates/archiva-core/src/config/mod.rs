//! Runtime configuration for the remote client and sync engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_BASE_MS: u64 = 250;
const DEFAULT_BACKOFF_MAX_MS: u64 = 4_000;
const DEFAULT_LIFECYCLE_BATCH_SIZE: usize = 200;
const DEFAULT_PENDING_RETENTION_MS: i64 = 60_000;

/// Connection settings for the remote authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Total attempts per request, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl RemoteConfig {
    /// Build a config for `base_url` with default timeouts and retries.
    pub fn new(base_url: impl Into<String>) -> Result<Self, String> {
        Ok(Self {
            base_url: normalize_base_url(base_url.into())?,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
        })
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Validate and normalize values loaded from a file.
    pub fn validated(mut self) -> Result<Self, String> {
        self.base_url = normalize_base_url(self.base_url)?;
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.request_timeout_ms == 0 {
            return Err("request_timeout_ms must be greater than 0".to_string());
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            return Err("backoff_max_ms must not be lower than backoff_base_ms".to_string());
        }
        Ok(self)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub const fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub const fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

/// Tuning knobs for the engine passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on identifiers per lifecycle lookup request.
    #[serde(default = "default_lifecycle_batch_size")]
    pub lifecycle_batch_size: usize,
    /// Local retention window for pending submissions (ms).
    #[serde(default = "default_pending_retention_ms")]
    pub pending_retention_ms: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lifecycle_batch_size: DEFAULT_LIFECYCLE_BATCH_SIZE,
            pending_retention_ms: DEFAULT_PENDING_RETENTION_MS,
        }
    }
}

const fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

const fn default_backoff_base_ms() -> u64 {
    DEFAULT_BACKOFF_BASE_MS
}

const fn default_backoff_max_ms() -> u64 {
    DEFAULT_BACKOFF_MAX_MS
}

const fn default_lifecycle_batch_size() -> usize {
    DEFAULT_LIFECYCLE_BATCH_SIZE
}

const fn default_pending_retention_ms() -> i64 {
    DEFAULT_PENDING_RETENTION_MS
}

fn normalize_base_url(raw: String) -> Result<String, String> {
    let value = normalize_text_option(Some(raw))
        .ok_or_else(|| "remote base URL must not be empty".to_string())?;
    if is_http_url(&value) {
        Ok(value.trim_end_matches('/').to_string())
    } else {
        Err("remote base URL must include http:// or https://".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_trims_trailing_slash() {
        let config = RemoteConfig::new(" https://api.example.com/ ").unwrap();
        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn new_rejects_invalid_urls() {
        assert!(RemoteConfig::new("").is_err());
        assert!(RemoteConfig::new("api.example.com").is_err());
    }

    #[test]
    fn parsed_config_fills_defaults_and_validates() {
        let config: RemoteConfig =
            serde_json::from_str(r#"{"base_url": "http://localhost:3000/"}"#).unwrap();
        let config = config.validated().unwrap();
        assert_eq!(config.base_url, "http://localhost:3000");
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn validated_rejects_zero_attempts() {
        let config = RemoteConfig::new("https://api.example.com")
            .unwrap()
            .with_max_attempts(0);
        let error = config.validated().unwrap_err();
        assert!(error.contains("max_attempts"));
    }

    #[test]
    fn parse_rejects_unknown_fields() {
        let error =
            serde_json::from_str::<RemoteConfig>(r#"{"base_url": "https://a.b", "retries": 2}"#)
                .unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }
}
