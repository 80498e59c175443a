use rusqlite::{Connection, Result};

/// Initialise the cache table. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS cache_entries (
            key        TEXT PRIMARY KEY,
            value      TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_cache_expiry
            ON cache_entries(expires_at);",
    )
}
