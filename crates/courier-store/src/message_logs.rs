use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use tracing::instrument;

use courier_core::{AuditError, AuditLog, MessageLogEntry, NewLogEntry, SendOutcome};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const TABLE: &str = "message_logs";
const SELECT_COLUMNS: &str =
    "SELECT id, recipient, body, outcome, failure_reason, created_at FROM message_logs";

/// Append-only repository of send attempts.
#[derive(Clone)]
pub struct MessageLogRepo {
    db: Database,
}

impl MessageLogRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append one attempt. Returns the stored row with its assigned id.
    #[instrument(skip(self, entry), fields(recipient = %entry.recipient_address, outcome = %entry.outcome))]
    pub fn insert(&self, entry: &NewLogEntry) -> Result<MessageLogEntry, StoreError> {
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO message_logs (recipient, body, outcome, failure_reason, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    entry.recipient_address,
                    entry.body,
                    entry.outcome.as_str(),
                    entry.failure_reason,
                    created_at,
                ],
            )?;

            Ok(MessageLogEntry {
                id: conn.last_insert_rowid(),
                recipient_address: entry.recipient_address.clone(),
                body: entry.body.clone(),
                outcome: entry.outcome,
                failure_reason: entry.failure_reason.clone(),
                created_at,
            })
        })
    }

    /// The `limit` most recent rows, newest first by id.
    #[instrument(skip(self))]
    pub fn recent(&self, limit: usize) -> Result<Vec<MessageLogEntry>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT ?1"))?;
            let mut rows = stmt.query([limit])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_entry(row)?);
            }
            Ok(results)
        })
    }

    pub fn get(&self, id: i64) -> Result<MessageLogEntry, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?;
            let mut rows = stmt.query([id])?;
            match rows.next()? {
                Some(row) => row_to_entry(row),
                None => Err(StoreError::NotFound(format!("message log {id}"))),
            }
        })
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM message_logs", [], |row| row.get(0))
                .map_err(StoreError::from)
        })
    }
}

#[async_trait]
impl AuditLog for MessageLogRepo {
    async fn insert(&self, entry: NewLogEntry) -> Result<MessageLogEntry, AuditError> {
        let repo = self.clone();
        tokio::task::spawn_blocking(move || MessageLogRepo::insert(&repo, &entry))
            .await
            .map_err(|e| AuditError::Task(e.to_string()))?
            .map_err(AuditError::from)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<MessageLogEntry>, AuditError> {
        let repo = self.clone();
        tokio::task::spawn_blocking(move || MessageLogRepo::recent(&repo, limit))
            .await
            .map_err(|e| AuditError::Task(e.to_string()))?
            .map_err(AuditError::from)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> Result<MessageLogEntry, StoreError> {
    let outcome: String = row_helpers::get(row, 3, TABLE, "outcome")?;
    Ok(MessageLogEntry {
        id: row_helpers::get(row, 0, TABLE, "id")?,
        recipient_address: row_helpers::get(row, 1, TABLE, "recipient")?,
        body: row_helpers::get(row, 2, TABLE, "body")?,
        outcome: row_helpers::parse_enum::<SendOutcome>(&outcome, TABLE, "outcome")?,
        failure_reason: row_helpers::get_opt(row, 4, TABLE, "failure_reason")?,
        created_at: row_helpers::get(row, 5, TABLE, "created_at")?,
    })
}
