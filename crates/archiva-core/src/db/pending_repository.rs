//! Pending submission repository implementation

use crate::error::{Error, Result};
use crate::models::{PendingStatus, PendingSubmission};
use libsql::{Connection, Row, Value};

use super::repository::{integer_column, opt_text, text_column};

/// Trait for pending submission storage operations (async)
#[allow(async_fn_in_trait)]
pub trait PendingRepository {
    /// Get a pending submission by ID
    async fn get(&self, id: &str) -> Result<Option<PendingSubmission>>;

    /// Insert or replace a pending submission
    async fn upsert(&self, pending: &PendingSubmission) -> Result<()>;

    /// Delete a pending submission. Returns whether a row was removed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Delete finished (completed or failed) submissions created before
    /// `cutoff` (Unix ms). In-flight rows are kept. Returns the count removed.
    async fn purge_older_than(&self, cutoff: i64) -> Result<u64>;
}

/// libSQL implementation of `PendingRepository`
pub struct LibSqlPendingRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlPendingRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl PendingRepository for LibSqlPendingRepository<'_> {
    async fn get(&self, id: &str) -> Result<Option<PendingSubmission>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, resolved_remote_id, status, created_at
                 FROM pending_submissions WHERE id = ?",
                [id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_pending(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, pending: &PendingSubmission) -> Result<()> {
        let params: Vec<Value> = vec![
            Value::Text(pending.id.clone()),
            opt_text(pending.resolved_remote_id.clone()),
            Value::Text(pending.status.as_str().to_string()),
            Value::Integer(pending.created_at),
        ];
        self.conn
            .execute(
                "INSERT OR REPLACE INTO pending_submissions (id, resolved_remote_id, status, created_at)
                 VALUES (?, ?, ?, ?)",
                params,
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM pending_submissions WHERE id = ?", [id])
            .await?;
        Ok(rows > 0)
    }

    async fn purge_older_than(&self, cutoff: i64) -> Result<u64> {
        let params: Vec<Value> = vec![
            Value::Integer(cutoff),
            Value::Text(PendingStatus::Completed.as_str().to_string()),
            Value::Text(PendingStatus::Failed.as_str().to_string()),
        ];
        let rows = self
            .conn
            .execute(
                "DELETE FROM pending_submissions
                 WHERE created_at < ? AND status IN (?, ?)",
                params,
            )
            .await?;
        Ok(rows)
    }
}

fn parse_pending(row: &Row) -> Result<PendingSubmission> {
    let status_raw: String = row.get(2)?;
    let status = status_raw
        .parse::<PendingStatus>()
        .map_err(Error::Database)?;

    Ok(PendingSubmission {
        id: row.get(0)?,
        resolved_remote_id: text_column(row, 1)?,
        status,
        created_at: integer_column(row, 3)?.unwrap_or_default(),
    })
}
