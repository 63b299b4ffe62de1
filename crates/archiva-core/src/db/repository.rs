//! History record repository implementation

use crate::error::{Error, Result};
use crate::linked_ids;
use crate::models::{HistoryRecord, LifecycleDetails, OrderState, RecordId};
use libsql::{Connection, Row, Value};

const RECORD_COLUMNS: &str = "id, updated_at, remote_ids, remote_numbers, current_state, \
     state_updated_at, merged_into_pending_id, source, payload, lifecycle";

/// Trait for history record storage operations (async)
#[allow(async_fn_in_trait)]
pub trait RecordRepository {
    /// Get a record by ID
    async fn get(&self, id: &RecordId) -> Result<Option<HistoryRecord>>;

    /// List all records, most recently written first
    async fn list(&self) -> Result<Vec<HistoryRecord>>;

    /// Insert or replace the whole record
    async fn upsert(&self, record: &HistoryRecord) -> Result<()>;

    /// Hard delete a record. Returns whether a row was removed.
    async fn delete(&self, id: &RecordId) -> Result<bool>;

    /// IDs of every stored record
    async fn ids(&self) -> Result<Vec<RecordId>>;

    /// Records that reference a pending submission but carry no remote ids
    async fn list_unlinked(&self) -> Result<Vec<HistoryRecord>>;

    /// Records eligible for lifecycle polling
    async fn list_trackable(&self) -> Result<Vec<HistoryRecord>>;
}

/// libSQL implementation of `RecordRepository`
pub struct LibSqlRecordRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlRecordRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn query_records(&self, sql: &str) -> Result<Vec<HistoryRecord>> {
        let mut rows = self.conn.query(sql, ()).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(parse_record(&row)?);
        }
        Ok(records)
    }
}

impl RecordRepository for LibSqlRecordRepository<'_> {
    async fn get(&self, id: &RecordId) -> Result<Option<HistoryRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {RECORD_COLUMNS} FROM history_records WHERE id = ?"),
                [id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<HistoryRecord>> {
        self.query_records(&format!(
            "SELECT {RECORD_COLUMNS} FROM history_records ORDER BY updated_at DESC"
        ))
        .await
    }

    async fn upsert(&self, record: &HistoryRecord) -> Result<()> {
        let lifecycle = record
            .lifecycle
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let params: Vec<Value> = vec![
            Value::Text(record.id.as_str().to_string()),
            Value::Integer(record.updated_at),
            opt_text(record.remote_ids.as_ref().map(linked_ids::encode)),
            opt_text(record.remote_numbers.as_ref().map(linked_ids::encode)),
            opt_text(record.current_state.map(|state| state.as_str().to_string())),
            opt_integer(record.state_updated_at),
            opt_text(record.merged_into_pending_id.clone()),
            opt_text(record.source.clone()),
            Value::Text(serde_json::to_string(&record.payload)?),
            opt_text(lifecycle),
        ];

        self.conn
            .execute(
                &format!(
                    "INSERT OR REPLACE INTO history_records ({RECORD_COLUMNS})
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                ),
                params,
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &RecordId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM history_records WHERE id = ?", [id.as_str()])
            .await?;
        Ok(rows > 0)
    }

    async fn ids(&self) -> Result<Vec<RecordId>> {
        let mut rows = self.conn.query("SELECT id FROM history_records", ()).await?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(RecordId::from(row.get::<String>(0)?));
        }
        Ok(ids)
    }

    async fn list_unlinked(&self) -> Result<Vec<HistoryRecord>> {
        let candidates = self
            .query_records(&format!(
                "SELECT {RECORD_COLUMNS} FROM history_records
                 WHERE merged_into_pending_id IS NOT NULL
                 ORDER BY updated_at DESC"
            ))
            .await?;
        // Stored identifier lists can be blank or "[]", so filter after decoding
        Ok(candidates
            .into_iter()
            .filter(HistoryRecord::is_unlinked)
            .collect())
    }

    async fn list_trackable(&self) -> Result<Vec<HistoryRecord>> {
        let candidates = self
            .query_records(&format!(
                "SELECT {RECORD_COLUMNS} FROM history_records
                 WHERE remote_ids IS NOT NULL
                 ORDER BY updated_at DESC"
            ))
            .await?;
        Ok(candidates
            .into_iter()
            .filter(HistoryRecord::is_trackable)
            .collect())
    }
}

/// Parse a record from a database row
fn parse_record(row: &Row) -> Result<HistoryRecord> {
    let id: String = row.get(0)?;
    let current_state = text_column(row, 4)?.and_then(|raw| match raw.parse::<OrderState>() {
        Ok(state) => Some(state),
        Err(error) => {
            tracing::warn!("Ignoring stored state for record {id}: {error}");
            None
        }
    });
    // Corrupt JSON columns must not make the whole table unreadable.
    let payload = match text_column(row, 8)? {
        Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|error| {
            tracing::warn!("Keeping unparsable payload of record {id} as text: {error}");
            serde_json::Value::String(raw)
        }),
        None => serde_json::Value::Null,
    };
    let lifecycle = text_column(row, 9)?.and_then(|raw| {
        match serde_json::from_str::<LifecycleDetails>(&raw) {
            Ok(details) => Some(details),
            Err(error) => {
                tracing::warn!("Ignoring stored lifecycle details for record {id}: {error}");
                None
            }
        }
    });

    Ok(HistoryRecord {
        id: RecordId::from(id),
        updated_at: row.get(1)?,
        remote_ids: linked_ids::decode_option(text_column(row, 2)?.as_deref()),
        remote_numbers: linked_ids::decode_option(text_column(row, 3)?.as_deref()),
        current_state,
        state_updated_at: integer_column(row, 5)?,
        lifecycle,
        merged_into_pending_id: text_column(row, 6)?,
        source: text_column(row, 7)?,
        payload,
    })
}

pub(super) fn text_column(row: &Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(text) => Ok(Some(text)),
        other => Err(Error::Database(format!(
            "expected text in column {idx}, found {other:?}"
        ))),
    }
}

pub(super) fn integer_column(row: &Row, idx: i32) -> Result<Option<i64>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Integer(value) => Ok(Some(value)),
        other => Err(Error::Database(format!(
            "expected integer in column {idx}, found {other:?}"
        ))),
    }
}

pub(super) fn opt_text(value: Option<String>) -> Value {
    value.map_or(Value::Null, Value::Text)
}

fn opt_integer(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}
