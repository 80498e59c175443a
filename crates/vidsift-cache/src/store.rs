use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use lru::LruCache;
use md5::{Digest, Md5};
use rusqlite::Connection;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::db::init_db;
use crate::error::Result;

/// Default entry lifetime (15 minutes).
pub const DEFAULT_TTL_SECS: u64 = 15 * 60;
/// Video summaries live longer (60 minutes).
pub const SUMMARY_TTL_SECS: u64 = 60 * 60;
/// Bound on the memory tier. The backing table is unbounded; the LRU cap
/// keeps a single process from growing without limit.
const MEMORY_CAP: usize = 10_000;
/// Cadence of the expired-entry sweeper.
const SWEEP_INTERVAL_SECS: u64 = 5 * 60;

/// Build a cache key: `<prefix>:<md5 of params joined with ":">`.
pub fn cache_key(prefix: &str, params: &[&str]) -> String {
    let digest = Md5::digest(params.join(":").as_bytes());
    format!("{prefix}:{}", hex::encode(digest))
}

struct MemEntry {
    value: serde_json::Value,
    expires_at: DateTime<Utc>,
}

/// Two-tier cache: bounded in-process LRU in front of a SQLite table.
pub struct CacheStore {
    mem: Mutex<LruCache<String, MemEntry>>,
    db: Mutex<Connection>,
}

impl CacheStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            mem: Mutex::new(LruCache::new(
                NonZeroUsize::new(MEMORY_CAP).expect("cap is non-zero"),
            )),
            db: Mutex::new(conn),
        })
    }

    /// Probe memory, then the store. A store hit warms the memory tier.
    pub fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let now = Utc::now();

        {
            let mut mem = self.mem.lock().unwrap();
            if let Some(entry) = mem.get(key) {
                if entry.expires_at > now {
                    return Ok(Some(entry.value.clone()));
                }
                mem.pop(key);
            }
        }

        let row: Option<(String, String)> = {
            let db = self.db.lock().unwrap();
            db.query_row(
                "SELECT value, expires_at FROM cache_entries WHERE key = ?1",
                [key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?
        };

        let Some((raw, expires_at)) = row else {
            return Ok(None);
        };
        let expires: DateTime<Utc> = expires_at
            .parse()
            .unwrap_or_else(|_| now - chrono::Duration::seconds(1));
        if expires <= now {
            return Ok(None);
        }

        let value: serde_json::Value = serde_json::from_str(&raw)?;
        self.mem.lock().unwrap().put(
            key.to_string(),
            MemEntry {
                value: value.clone(),
                expires_at: expires,
            },
        );
        Ok(Some(value))
    }

    /// Write to both tiers.
    pub fn set(&self, key: &str, value: &serde_json::Value, ttl_secs: u64) -> Result<()> {
        let expires = Utc::now() + chrono::Duration::seconds(ttl_secs as i64);
        let raw = serde_json::to_string(value)?;

        {
            let db = self.db.lock().unwrap();
            db.execute(
                "INSERT INTO cache_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = ?2, expires_at = ?3",
                rusqlite::params![key, raw, expires.to_rfc3339()],
            )?;
        }

        self.mem.lock().unwrap().put(
            key.to_string(),
            MemEntry {
                value: value.clone(),
                expires_at: expires,
            },
        );
        Ok(())
    }

    /// Prune expired entries from both tiers. Returns rows removed from the
    /// store tier.
    pub fn sweep(&self) -> Result<usize> {
        let now = Utc::now();

        {
            let mut mem = self.mem.lock().unwrap();
            let expired: Vec<String> = mem
                .iter()
                .filter(|(_, e)| e.expires_at <= now)
                .map(|(k, _)| k.clone())
                .collect();
            for key in expired {
                mem.pop(&key);
            }
        }

        let db = self.db.lock().unwrap();
        let n = db.execute(
            "DELETE FROM cache_entries WHERE expires_at <= ?1",
            [now.to_rfc3339()],
        )?;
        Ok(n)
    }

    /// Sweeper loop: prunes both tiers every 5 minutes until shutdown.
    pub async fn run_sweeper(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.sweep() {
                        Ok(n) if n > 0 => debug!(count = n, "swept expired cache entries"),
                        Err(e) => warn!(error = %e, "cache sweep failed"),
                        _ => {}
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> CacheStore {
        CacheStore::new(Connection::open_in_memory().expect("open db")).expect("init")
    }

    #[test]
    fn key_is_prefix_plus_md5() {
        let key = cache_key("chat", &["vid123", "what is ownership"]);
        assert!(key.starts_with("chat:"));
        // md5 hex digest is 32 chars
        assert_eq!(key.len(), "chat:".len() + 32);
        // Same params, same key; different params, different key.
        assert_eq!(key, cache_key("chat", &["vid123", "what is ownership"]));
        assert_ne!(key, cache_key("chat", &["vid123", "what is borrowing"]));
    }

    #[test]
    fn get_after_set_returns_value() {
        let cache = store();
        let value = json!({"answer": 42});
        cache.set("k", &value, 60).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(value));
    }

    #[test]
    fn expired_entry_reads_as_miss() {
        let cache = store();
        cache.set("k", &json!("v"), 0).unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn sweep_prunes_expired_rows() {
        let cache = store();
        cache.set("dead", &json!(1), 0).unwrap();
        cache.set("live", &json!(2), 300).unwrap();
        assert_eq!(cache.sweep().unwrap(), 1);
        assert_eq!(cache.get("live").unwrap(), Some(json!(2)));
    }

    #[test]
    fn store_hit_warms_memory_tier() {
        let cache = store();
        cache.set("k", &json!("v"), 300).unwrap();
        // Drop the memory tier entry, leaving only the store row.
        cache.mem.lock().unwrap().pop("k");
        assert_eq!(cache.get("k").unwrap(), Some(json!("v")));
        assert!(cache.mem.lock().unwrap().contains("k"));
    }
}
