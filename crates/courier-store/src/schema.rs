/// SQL DDL for the courier audit database.
/// WAL mode enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS message_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recipient TEXT NOT NULL,
    body TEXT NOT NULL,
    outcome TEXT NOT NULL CHECK (outcome IN ('SENT', 'FAILED')),
    failure_reason TEXT,
    created_at TEXT NOT NULL,
    CHECK ((outcome = 'FAILED') = (failure_reason IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS idx_message_logs_outcome ON message_logs(outcome);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
