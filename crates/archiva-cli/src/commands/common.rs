use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use archiva_core::remote::EnvToken;
use archiva_core::{
    ArchiveEngine, EngineConfig, HistoryRecord, HttpRemote, LinkedIds, RecordId, StoreService,
};
use chrono::Utc;
use serde::Serialize;

use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

pub const DB_PATH_ENV: &str = "ARCHIVA_DB_PATH";
pub const ACCESS_TOKEN_ENV: &str = "ARCHIVA_ACCESS_TOKEN";

#[derive(Debug, Serialize)]
pub struct RecordListItem {
    pub id: String,
    pub state: Option<String>,
    pub remote_ids: Vec<String>,
    pub remote_numbers: Vec<String>,
    pub source: Option<String>,
    pub unlinked: bool,
    pub updated_at: i64,
    pub relative_time: String,
}

/// Resolved profile plus the database path commands should use.
pub struct CliContext {
    pub profile_name: String,
    pub profile: CliProfile,
    pub db_path: PathBuf,
}

impl CliContext {
    pub fn load(cli_db_path: Option<PathBuf>, profile: Option<&str>) -> Result<Self, CliError> {
        let config = CliProfilesConfig::load().map_err(CliError::Config)?;
        let profile_name = config.resolve_profile_name(profile);
        let profile = config.profile(&profile_name).cloned().unwrap_or_default();
        let db_path = resolve_db_path(cli_db_path, &profile);
        Ok(Self {
            profile_name,
            profile,
            db_path,
        })
    }

    pub async fn open_store(&self) -> Result<StoreService, CliError> {
        Ok(StoreService::open_path(&self.db_path).await?)
    }

    /// Engine backed by the HTTP remote. The token is read from the
    /// environment on every request.
    pub async fn open_engine(&self) -> Result<ArchiveEngine<HttpRemote>, CliError> {
        let remote_config = self
            .profile
            .remote_config()
            .map_err(CliError::Config)?
            .ok_or(CliError::RemoteNotConfigured)?;
        let remote = HttpRemote::new(remote_config, Arc::new(EnvToken::new(ACCESS_TOKEN_ENV)))?;
        if env::var_os(ACCESS_TOKEN_ENV).is_none() {
            tracing::warn!("{ACCESS_TOKEN_ENV} is not set; remote calls will be skipped");
        }
        tracing::debug!(
            "Using profile '{}' against {}",
            self.profile_name,
            remote.base_url()
        );

        let store = self.open_store().await?;
        Ok(ArchiveEngine::new(store, remote, EngineConfig::default()))
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>, profile: &CliProfile) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from))
        .or_else(|| profile.db_path.clone())
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join("archiva")
        .join("archiva.db")
}

pub fn normalize_record_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyRecordId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Find a record by exact id or unique id prefix.
pub async fn resolve_record(
    query: &str,
    store: &StoreService,
) -> Result<HistoryRecord, CliError> {
    let query = normalize_record_identifier(query)?;
    if let Some(record) = store.get_record(&RecordId::from(query.as_str())).await? {
        return Ok(record);
    }

    let matching_ids: Vec<RecordId> = store
        .record_ids()
        .await?
        .into_iter()
        .filter(|id| id.as_str().starts_with(&query))
        .collect();

    match matching_ids.as_slice() {
        [] => Err(CliError::RecordNotFound(query)),
        [id] => store
            .get_record(id)
            .await?
            .ok_or(CliError::RecordNotFound(query)),
        _ => {
            let options = matching_ids
                .iter()
                .take(3)
                .map(short_id)
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousRecordId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &RecordId) -> String {
    id.as_str().chars().take(13).collect()
}

fn linked_values(ids: Option<&LinkedIds>) -> Vec<String> {
    ids.map(|ids| ids.as_slice().to_vec()).unwrap_or_default()
}

pub fn record_to_list_item(record: &HistoryRecord) -> RecordListItem {
    let now_ms = Utc::now().timestamp_millis();
    RecordListItem {
        id: record.id.to_string(),
        state: record.current_state.map(|state| state.to_string()),
        remote_ids: linked_values(record.remote_ids.as_ref()),
        remote_numbers: linked_values(record.remote_numbers.as_ref()),
        source: record.source.clone(),
        unlinked: record.is_unlinked(),
        updated_at: record.updated_at,
        relative_time: format_relative_time(record.updated_at, now_ms),
    }
}

pub fn format_record_lines(records: &[HistoryRecord]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    records
        .iter()
        .map(|record| {
            let short_id = short_id(&record.id);
            let state = record
                .current_state
                .map_or_else(|| "-".to_string(), |state| state.to_string());
            let numbers = record
                .remote_numbers
                .as_ref()
                .map(|numbers| numbers.iter().collect::<Vec<_>>().join(", "))
                .unwrap_or_else(|| {
                    if record.is_unlinked() {
                        "(unlinked)".to_string()
                    } else {
                        "-".to_string()
                    }
                });
            let relative_time = format_relative_time(record.updated_at, now_ms);
            format!("{short_id:<13}  {state:<18}  {numbers:<30}  {relative_time}")
        })
        .collect()
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}
