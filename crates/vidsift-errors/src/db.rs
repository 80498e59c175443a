use rusqlite::{Connection, Result};

/// Initialise the error-event table. Safe to call on every startup
/// (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS error_events (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            message    TEXT NOT NULL,
            error_type TEXT NOT NULL,
            stack      TEXT,
            context    TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_error_events_type
            ON error_events(error_type, created_at);",
    )
}
