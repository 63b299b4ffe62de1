//! JSON-over-HTTP remote authority client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::{RemoteAuthority, RemoteError, RemoteResult, TokenSource, UploadSummary};
use crate::config::RemoteConfig;
use crate::models::{HistoryRecord, LifecycleSnapshot, RecordId};
use crate::util::compact_text;

/// HTTP client for the remote authority.
#[derive(Clone)]
pub struct HttpRemote {
    config: RemoteConfig,
    tokens: Arc<dyn TokenSource>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpRemote {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemote")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct UploadRequest<'a> {
    records: &'a [HistoryRecord],
}

// `records` is required: an empty listing deletes source-tagged local records.
#[derive(Deserialize)]
struct RecordsResponse {
    records: Vec<HistoryRecord>,
}

#[derive(Deserialize)]
struct RecordResponse {
    #[serde(default)]
    record: Option<HistoryRecord>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LifecycleRequest<'a> {
    order_ids: &'a [String],
}

#[derive(Deserialize)]
struct LifecycleResponse {
    states: HashMap<String, Option<serde_json::Value>>,
}

impl HttpRemote {
    pub fn new(config: RemoteConfig, tokens: Arc<dyn TokenSource>) -> RemoteResult<Self> {
        let config = config
            .validated()
            .map_err(RemoteError::InvalidConfiguration)?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            config,
            tokens,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.config.base_url, route)
    }

    fn record_url(&self, id: &RecordId) -> String {
        self.url(&format!(
            "/api/history/{}",
            urlencoding::encode(id.as_str())
        ))
    }

    /// Send a request with bearer auth, retrying transport failures, 429 and 5xx.
    ///
    /// `build` is called once per attempt since request builders are single-use.
    async fn send<F>(&self, label: &str, build: F) -> RemoteResult<Response>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let token = self
            .tokens
            .access_token()
            .ok_or(RemoteError::MissingCredentials)?;

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = build(&self.client)
                .bearer_auth(&token)
                .header(reqwest::header::ACCEPT, "application/json")
                .send()
                .await;

            let retry = match &result {
                Ok(response) => is_retryable_status(response.status()),
                Err(error) => error.is_timeout() || error.is_connect(),
            };

            if !retry || attempt >= max_attempts {
                return match result {
                    Ok(response) => Ok(response),
                    Err(error) => Err(error.into()),
                };
            }

            let delay = backoff_delay(
                attempt,
                self.config.backoff_base(),
                self.config.backoff_max(),
            );
            match &result {
                Ok(response) => tracing::debug!(
                    "{label} returned HTTP {}; retrying in {delay:?} (attempt {attempt}/{max_attempts})",
                    response.status().as_u16()
                ),
                Err(error) => tracing::debug!(
                    "{label} failed: {error}; retrying in {delay:?} (attempt {attempt}/{max_attempts})"
                ),
            }
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

impl RemoteAuthority for HttpRemote {
    async fn upload(&self, records: &[HistoryRecord]) -> RemoteResult<UploadSummary> {
        let url = self.url("/api/history/sync");
        let body = UploadRequest { records };
        let response = self
            .send("history upload", |client| client.post(&url).json(&body))
            .await?;
        let response = ensure_success(response).await?;
        response
            .json::<UploadSummary>()
            .await
            .map_err(|error| RemoteError::InvalidPayload(error.to_string()))
    }

    async fn fetch_all(&self) -> RemoteResult<Vec<HistoryRecord>> {
        let url = self.url("/api/history");
        let response = self
            .send("history fetch", |client| client.get(&url))
            .await?;
        let response = ensure_success(response).await?;
        let payload = response
            .json::<RecordsResponse>()
            .await
            .map_err(|error| RemoteError::InvalidPayload(error.to_string()))?;
        Ok(payload.records)
    }

    async fn fetch_one(&self, id: &RecordId) -> RemoteResult<Option<HistoryRecord>> {
        let url = self.record_url(id);
        let response = self
            .send("history record fetch", |client| client.get(&url))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response).await?;
        let payload = response
            .json::<RecordResponse>()
            .await
            .map_err(|error| RemoteError::InvalidPayload(error.to_string()))?;
        Ok(payload.record)
    }

    async fn delete(&self, id: &RecordId) -> RemoteResult<()> {
        let url = self.record_url(id);
        let response = self
            .send("history record delete", |client| client.delete(&url))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(response).await?;
        Ok(())
    }

    async fn lookup_lifecycles(
        &self,
        remote_ids: &[String],
    ) -> RemoteResult<HashMap<String, LifecycleSnapshot>> {
        if remote_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = self.url("/api/history/order-states");
        let body = LifecycleRequest {
            order_ids: remote_ids,
        };
        let response = self
            .send("order state lookup", |client| client.post(&url).json(&body))
            .await?;
        let response = ensure_success(response).await?;
        let payload = response
            .json::<LifecycleResponse>()
            .await
            .map_err(|error| RemoteError::InvalidPayload(error.to_string()))?;

        Ok(parse_snapshots(payload.states))
    }
}

/// Keep well-formed snapshots, drop nulls and entries that fail to parse.
fn parse_snapshots(
    states: HashMap<String, Option<serde_json::Value>>,
) -> HashMap<String, LifecycleSnapshot> {
    states
        .into_iter()
        .filter_map(|(remote_id, value)| {
            let value = value?;
            match serde_json::from_value::<LifecycleSnapshot>(value) {
                Ok(snapshot) => Some((remote_id, snapshot)),
                Err(error) => {
                    tracing::debug!("Skipping malformed lifecycle snapshot for {remote_id}: {error}");
                    None
                }
            }
        })
        .collect()
}

async fn ensure_success(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(RemoteError::Unauthorized(status.as_u16()));
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body: compact_text(&body),
    })
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Exponential backoff capped at `max`, with the upper half randomized.
fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let ceiling = base.saturating_mul(1 << exponent).min(max);
    let ceiling_ms = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
    if ceiling_ms == 0 {
        return Duration::ZERO;
    }
    let floor_ms = ceiling_ms / 2;
    Duration::from_millis(rand::thread_rng().gen_range(floor_ms..=ceiling_ms))
}
