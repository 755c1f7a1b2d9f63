use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::StoreError;
use crate::schema;

/// Thread-safe SQLite connection wrapper.
/// Uses parking_lot::Mutex for synchronous access; writers are serialized here.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("create dir: {e}")))?;
        }

        let conn = Connection::open(path)?;
        prepare(&conn)?;

        info!(path = %path.display(), "audit database opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_owned(),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        prepare(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: PathBuf::from(":memory:"),
        })
    }

    /// Execute a closure with the database connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn prepare(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(schema::PRAGMAS)
        .map_err(|e| StoreError::Database(format!("pragmas: {e}")))?;

    conn.execute_batch(schema::CREATE_TABLES)
        .map_err(|e| StoreError::Database(format!("schema: {e}")))?;

    let version: Option<u32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .optional()
        .map_err(|e| StoreError::Database(format!("schema version: {e}")))?;

    match version {
        None => {
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [schema::SCHEMA_VERSION],
            )
            .map_err(|e| StoreError::Database(format!("schema version: {e}")))?;
        }
        Some(found) if found != schema::SCHEMA_VERSION => {
            return Err(StoreError::Database(format!(
                "schema version {found} does not match expected {}",
                schema::SCHEMA_VERSION
            )));
        }
        Some(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.path(), Path::new(":memory:"));
    }

    #[test]
    fn schema_version_set() {
        let db = Database::in_memory().unwrap();
        let version: u32 = db
            .with_conn(|conn| {
                conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))
                    .map_err(StoreError::from)
            })
            .unwrap();
        assert_eq!(version, schema::SCHEMA_VERSION);
    }

    #[test]
    fn message_logs_table_created() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            let tables: Vec<String> = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?
                .query_map([], |row| row.get(0))?
                .collect::<Result<_, _>>()?;
            assert!(tables.contains(&"message_logs".to_string()));
            assert!(tables.contains(&"schema_version".to_string()));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn reopen_file_database_keeps_single_version_row() {
        let dir = std::env::temp_dir().join(format!("courier-store-test-{}", uuid::Uuid::now_v7()));
        let path = dir.join("audit.db");
        let db = Database::open(&path).unwrap();
        assert!(path.exists());
        drop(db);

        let db = Database::open(&path).unwrap();
        let rows: i64 = db
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
                    .map_err(StoreError::from)
            })
            .unwrap();
        assert_eq!(rows, 1);
        drop(db);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn mismatched_schema_version_is_rejected() {
        let dir = std::env::temp_dir().join(format!("courier-store-test-{}", uuid::Uuid::now_v7()));
        let path = dir.join("audit.db");
        let db = Database::open(&path).unwrap();
        db.with_conn(|conn| {
            conn.execute("UPDATE schema_version SET version = 99", [])?;
            Ok(())
        })
        .unwrap();
        drop(db);

        match Database::open(&path) {
            Err(StoreError::Database(msg)) => assert!(msg.contains("99")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("stale schema accepted"),
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn outcome_reason_constraint_enforced() {
        let db = Database::in_memory().unwrap();
        let result = db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO message_logs (recipient, body, outcome, failure_reason, created_at)
                 VALUES ('0812', 'hi', 'SENT', 'should not be here', '2026-01-01T00:00:00Z')",
                [],
            )?;
            Ok(())
        });
        assert!(matches!(result, Err(StoreError::Database(_))));
    }
}
