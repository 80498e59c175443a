use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::db::init_db;
use crate::error::Result;

/// Buffered events are flushed once this many accumulate.
const BUFFER_CAP: usize = 100;
/// Cadence of the background flush.
const FLUSH_INTERVAL_SECS: u64 = 30;

/// Context keys whose values are replaced with `[REDACTED]` before an
/// event is persisted. Matched case-insensitively at every nesting level.
const SENSITIVE_KEYS: &[&str] = &["password", "token", "apikey", "secret", "authorization"];

#[derive(Debug, Clone)]
struct BufferedEvent {
    message: String,
    error_type: String,
    stack: Option<String>,
    context: serde_json::Value,
    created_at: String,
}

/// Per-type counts for the monitor surface.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorStats {
    pub total: i64,
    pub by_type: Vec<(String, i64)>,
}

/// Buffered error capture. `capture` never blocks on the store; events
/// reach SQLite via the flush tick or a full buffer.
pub struct ErrorSink {
    db: Mutex<Connection>,
    buffer: Mutex<Vec<BufferedEvent>>,
}

impl ErrorSink {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            buffer: Mutex::new(Vec::new()),
        })
    }

    /// Record an error with a structured context object. Sensitive keys are
    /// redacted immediately, so raw secrets never sit in the buffer.
    pub fn capture(
        &self,
        error_type: &str,
        message: &str,
        stack: Option<&str>,
        context: serde_json::Value,
    ) {
        let event = BufferedEvent {
            message: message.to_string(),
            error_type: error_type.to_string(),
            stack: stack.map(str::to_string),
            context: redact(context),
            created_at: Utc::now().to_rfc3339(),
        };

        let should_flush = {
            let mut buffer = self.buffer.lock().unwrap();
            buffer.push(event);
            buffer.len() >= BUFFER_CAP
        };
        if should_flush {
            if let Err(e) = self.flush() {
                warn!(error = %e, "error sink flush failed; events retained");
            }
        }
    }

    /// Write all buffered events to the store. Events are re-buffered on
    /// failure rather than dropped.
    pub fn flush(&self) -> Result<()> {
        let events: Vec<BufferedEvent> = {
            let mut buffer = self.buffer.lock().unwrap();
            std::mem::take(&mut *buffer)
        };
        if events.is_empty() {
            return Ok(());
        }

        let result = {
            let db = self.db.lock().unwrap();
            let mut stmt_result = Ok(());
            for event in &events {
                let context = serde_json::to_string(&event.context).unwrap_or_default();
                if let Err(e) = db.execute(
                    "INSERT INTO error_events (message, error_type, stack, context, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![
                        event.message,
                        event.error_type,
                        event.stack,
                        context,
                        event.created_at
                    ],
                ) {
                    stmt_result = Err(e);
                    break;
                }
            }
            stmt_result
        };

        match result {
            Ok(()) => {
                debug!(count = events.len(), "flushed error events");
                Ok(())
            }
            Err(e) => {
                let mut buffer = self.buffer.lock().unwrap();
                let mut retained = events;
                retained.extend(std::mem::take(&mut *buffer));
                retained.truncate(BUFFER_CAP);
                *buffer = retained;
                Err(e.into())
            }
        }
    }

    /// Counts by type over the whole table, for `/api/errors/stats`.
    pub fn stats(&self) -> Result<ErrorStats> {
        let db = self.db.lock().unwrap();
        let total: i64 = db.query_row("SELECT COUNT(*) FROM error_events", [], |r| r.get(0))?;
        let mut stmt = db.prepare(
            "SELECT error_type, COUNT(*) AS n FROM error_events
             GROUP BY error_type ORDER BY n DESC",
        )?;
        let by_type = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ErrorStats { total, by_type })
    }

    /// Flush loop: drains the buffer every 30 s until shutdown, then once
    /// more on the way out.
    pub async fn run_flusher(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(FLUSH_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.flush() {
                        warn!(error = %e, "scheduled error flush failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        if let Err(e) = self.flush() {
                            warn!(error = %e, "final error flush failed");
                        }
                        break;
                    }
                }
            }
        }
    }
}

/// Replace the values of sensitive keys with `[REDACTED]`, recursing into
/// nested objects and arrays.
fn redact(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let redacted = map
                .into_iter()
                .map(|(k, v)| {
                    if SENSITIVE_KEYS.contains(&k.to_lowercase().as_str()) {
                        (k, serde_json::Value::String("[REDACTED]".to_string()))
                    } else {
                        (k, redact(v))
                    }
                })
                .collect();
            serde_json::Value::Object(redacted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(redact).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sink() -> ErrorSink {
        ErrorSink::new(Connection::open_in_memory().expect("open db")).expect("init")
    }

    #[test]
    fn redacts_sensitive_keys_at_any_depth() {
        let context = json!({
            "video_id": "abc123",
            "apiKey": "sk-live-xyz",
            "nested": { "Authorization": "Bearer tok", "retries": 2 },
            "list": [{ "password": "hunter2" }]
        });
        let out = redact(context);
        assert_eq!(out["video_id"], "abc123");
        assert_eq!(out["apiKey"], "[REDACTED]");
        assert_eq!(out["nested"]["Authorization"], "[REDACTED]");
        assert_eq!(out["nested"]["retries"], 2);
        assert_eq!(out["list"][0]["password"], "[REDACTED]");
    }

    #[test]
    fn capture_buffers_until_flush() {
        let s = sink();
        s.capture("StoreError", "insert failed", None, json!({"table": "videos"}));
        assert_eq!(s.stats().unwrap().total, 0);
        s.flush().unwrap();
        let stats = s.stats().unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.by_type[0].0, "StoreError");
    }

    #[test]
    fn full_buffer_triggers_flush() {
        let s = sink();
        for i in 0..BUFFER_CAP {
            s.capture("Internal", &format!("boom {i}"), None, json!({}));
        }
        assert_eq!(s.stats().unwrap().total, BUFFER_CAP as i64);
    }

    #[test]
    fn stats_group_by_type() {
        let s = sink();
        s.capture("LLM_ERROR", "timeout", None, json!({}));
        s.capture("LLM_ERROR", "timeout", None, json!({}));
        s.capture("STORE_ERROR", "locked", None, json!({}));
        s.flush().unwrap();
        let stats = s.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_type[0], ("LLM_ERROR".to_string(), 2));
    }
}
