//! Local persistence of warn+ events.
//!
//! Suppressed failures (transport teardown, stray task errors) are logged at
//! warn and end up here, so they can be inspected after the fact without ever
//! being pushed to observers.

use std::path::Path;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// A persisted warn+ event.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub id: i64,
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
    pub fields: Option<String>,
    pub generation: Option<i64>,
}

/// Query parameters for persisted diagnostics.
#[derive(Clone, Debug, Default)]
pub struct DiagnosticsQuery {
    pub level: Option<String>,
    pub generation: Option<i64>,
    pub limit: Option<u32>,
}

/// SQLite sink for warn+ events.
pub struct DiagnosticsSink {
    conn: Mutex<Connection>,
}

impl DiagnosticsSink {
    pub fn new(db_path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        Self::from_connection(Connection::open(db_path)?)
    }

    pub fn in_memory() -> Result<Self, rusqlite::Error> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             CREATE TABLE IF NOT EXISTS diagnostics (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 timestamp TEXT NOT NULL,
                 level TEXT NOT NULL,
                 target TEXT NOT NULL,
                 message TEXT NOT NULL,
                 fields TEXT,
                 generation INTEGER
             );
             CREATE INDEX IF NOT EXISTS idx_diagnostics_level ON diagnostics(level);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn insert(&self, record: &DiagnosticInsert) {
        let conn = self.conn.lock();
        let _ = conn.execute(
            "INSERT INTO diagnostics (timestamp, level, target, message, fields, generation)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                record.timestamp,
                record.level,
                record.target,
                record.message,
                record.fields,
                record.generation,
            ],
        );
    }

    /// Most recent diagnostics first.
    pub fn query(&self, q: &DiagnosticsQuery) -> Result<Vec<Diagnostic>, rusqlite::Error> {
        let conn = self.conn.lock();
        let mut sql = String::from(
            "SELECT id, timestamp, level, target, message, fields, generation FROM diagnostics WHERE 1=1",
        );
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(level) = &q.level {
            sql.push_str(&format!(" AND level = ?{}", params.len() + 1));
            params.push(Box::new(level.to_uppercase()));
        }
        if let Some(generation) = q.generation {
            sql.push_str(&format!(" AND generation = ?{}", params.len() + 1));
            params.push(Box::new(generation));
        }

        let limit = q.limit.unwrap_or(100);
        sql.push_str(&format!(" ORDER BY id DESC LIMIT {limit}"));

        let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            Ok(Diagnostic {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                level: row.get(2)?,
                target: row.get(3)?,
                message: row.get(4)?,
                fields: row.get(5)?,
                generation: row.get(6)?,
            })
        })?;

        rows.collect()
    }

    pub fn count(&self) -> Result<i64, rusqlite::Error> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM diagnostics", [], |row| row.get(0))
    }
}

struct DiagnosticInsert {
    timestamp: String,
    level: String,
    target: String,
    message: String,
    fields: Option<String>,
    generation: Option<i64>,
}

/// tracing Layer that writes warn+ events to a [`DiagnosticsSink`].
pub struct DiagnosticsLayer {
    sink: Arc<DiagnosticsSink>,
}

impl DiagnosticsLayer {
    pub fn new(sink: Arc<DiagnosticsSink>) -> Self {
        Self { sink }
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    generation: Option<i64>,
    fields: serde_json::Map<String, serde_json::Value>,
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let val = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(val);
        } else {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::String(val));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.insert(
                field.name().to_string(),
                serde_json::Value::String(value.to_string()),
            );
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == "generation" {
            self.generation = i64::try_from(value).ok();
        }
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Number(value.into()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }
}

impl<S> Layer<S> for DiagnosticsLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > tracing::Level::WARN {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let fields = if visitor.fields.is_empty() {
            None
        } else {
            serde_json::to_string(&visitor.fields).ok()
        };

        self.sink.insert(&DiagnosticInsert {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level: level.to_string().to_uppercase(),
            target: event.metadata().target().to_string(),
            message: visitor.message.unwrap_or_default(),
            fields,
            generation: visitor.generation,
        });
    }
}
