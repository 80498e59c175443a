use rusqlite::{Connection, Result};

/// Initialise the locks table. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS locks (
            resource_id TEXT PRIMARY KEY,
            lock_id     TEXT NOT NULL,
            expires_at  TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );",
    )
}
