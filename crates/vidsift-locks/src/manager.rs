use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use rusqlite::Connection;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::init_db;
use crate::error::Result;

/// Seconds before expiry at which a held lease is proactively released.
const SAFETY_MARGIN_SECS: u64 = 10;
/// Cadence of the expired-row sweeper.
const SWEEP_INTERVAL_SECS: u64 = 60;

/// A held lock: (resource, token, expiry) triple. The token fences release
/// so a stale holder can never revoke a newer lease.
#[derive(Debug, Clone)]
pub struct Lease {
    pub resource_id: String,
    pub lock_id: String,
    pub expires_at: String,
}

/// Best-effort exclusive leases over string-named resources.
///
/// Backed by a unique-keyed SQLite row per resource. Acquisition is
/// fail-closed: any store error reads as "somebody else holds it".
pub struct LockManager {
    db: Arc<Mutex<Connection>>,
    /// Leases held by this process, for proactive release and shutdown.
    held: Arc<DashMap<String, Lease>>,
}

impl LockManager {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            held: Arc::new(DashMap::new()),
        })
    }

    /// Try to take the lock for `resource_id` for `ttl_secs` seconds.
    ///
    /// On a collision with an expired row, the row is deleted and the
    /// insert retried once. Returns `None` when the resource is held or
    /// the store errored. On success a release timer is scheduled at
    /// `ttl − 10 s` so the lease never silently outlives its work.
    pub fn acquire(&self, resource_id: &str, ttl_secs: u64) -> Option<Lease> {
        let lock_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = (now + chrono::Duration::seconds(ttl_secs as i64)).to_rfc3339();
        let now_str = now.to_rfc3339();

        for attempt in 0..2 {
            let inserted = {
                let db = self.db.lock().unwrap();
                db.execute(
                    "INSERT OR IGNORE INTO locks (resource_id, lock_id, expires_at, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![resource_id, lock_id, expires_at, now_str],
                )
            };
            match inserted {
                Ok(1) => {
                    let lease = Lease {
                        resource_id: resource_id.to_string(),
                        lock_id: lock_id.clone(),
                        expires_at: expires_at.clone(),
                    };
                    self.held.insert(resource_id.to_string(), lease.clone());
                    self.schedule_release(&lease, ttl_secs);
                    debug!(resource_id, lock_id = %lease.lock_id, "lock acquired");
                    return Some(lease);
                }
                Ok(_) => {
                    // Collision. Steal only if the existing row has expired.
                    if attempt > 0 || !self.evict_if_expired(resource_id, &now_str) {
                        return None;
                    }
                }
                Err(e) => {
                    // Fail closed: a broken store must not hand out leases.
                    warn!(resource_id, error = %e, "lock acquire failed");
                    return None;
                }
            }
        }
        None
    }

    /// Delete the row for `resource_id` if its expiry has passed. Returns
    /// true when a row was evicted and the insert is worth retrying.
    fn evict_if_expired(&self, resource_id: &str, now_str: &str) -> bool {
        let db = self.db.lock().unwrap();
        match db.execute(
            "DELETE FROM locks WHERE resource_id = ?1 AND expires_at < ?2",
            rusqlite::params![resource_id, now_str],
        ) {
            Ok(n) => n > 0,
            Err(e) => {
                warn!(resource_id, error = %e, "expired-lock eviction failed");
                false
            }
        }
    }

    /// Release a held lease. Deletes only the row whose `lock_id` matches,
    /// so releasing after a newer acquire is a no-op. Errors are logged;
    /// the row expires on its own either way.
    pub fn release(&self, lease: &Lease) {
        self.held
            .remove_if(&lease.resource_id, |_, held| held.lock_id == lease.lock_id);
        release_row(&self.db, &lease.resource_id, &lease.lock_id);
    }

    /// Whether a live (unexpired) lock row exists for the resource.
    pub fn is_locked(&self, resource_id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM locks WHERE resource_id = ?1 AND expires_at >= ?2",
            rusqlite::params![resource_id, now],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Delete every expired row. Returns the number removed.
    pub fn sweep(&self) -> Result<usize> {
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let n = db.execute("DELETE FROM locks WHERE expires_at < ?1", [&now])?;
        Ok(n)
    }

    /// Release every lease this process holds. Called on shutdown.
    pub fn release_all(&self) {
        let leases: Vec<Lease> = self.held.iter().map(|e| e.value().clone()).collect();
        for lease in &leases {
            release_row(&self.db, &lease.resource_id, &lease.lock_id);
        }
        self.held.clear();
        if !leases.is_empty() {
            info!(count = leases.len(), "released held locks on shutdown");
        }
    }

    /// Sweeper loop: prunes expired rows every 60 s until shutdown.
    pub async fn run_sweeper(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.sweep() {
                        Ok(n) if n > 0 => debug!(count = n, "swept expired locks"),
                        Err(e) => warn!(error = %e, "lock sweep failed"),
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

    /// Schedule proactive release at `ttl − SAFETY_MARGIN`. The timer only
    /// fires a release while this exact lease is still held.
    fn schedule_release(&self, lease: &Lease, ttl_secs: u64) {
        let db = Arc::clone(&self.db);
        let held = Arc::clone(&self.held);
        let resource_id = lease.resource_id.clone();
        let lock_id = lease.lock_id.clone();
        let delay = ttl_secs.saturating_sub(SAFETY_MARGIN_SECS).max(1);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(delay)).await;
            let removed = held
                .remove_if(&resource_id, |_, l| l.lock_id == lock_id)
                .is_some();
            if removed {
                debug!(resource_id = %resource_id, "proactive release before expiry");
                release_row(&db, &resource_id, &lock_id);
            }
        });
    }
}

fn release_row(db: &Arc<Mutex<Connection>>, resource_id: &str, lock_id: &str) {
    let conn = db.lock().unwrap();
    if let Err(e) = conn.execute(
        "DELETE FROM locks WHERE resource_id = ?1 AND lock_id = ?2",
        rusqlite::params![resource_id, lock_id],
    ) {
        warn!(resource_id, error = %e, "lock release failed; lease will expire");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> LockManager {
        LockManager::new(Connection::open_in_memory().expect("open db")).expect("init")
    }

    #[tokio::test]
    async fn second_acquire_is_refused() {
        let locks = manager();
        let lease = locks.acquire("video-X", 600).expect("first acquire");
        assert!(locks.acquire("video-X", 600).is_none());
        assert!(locks.is_locked("video-X").unwrap());

        locks.release(&lease);
        assert!(locks.acquire("video-X", 600).is_some());
    }

    #[tokio::test]
    async fn stale_release_does_not_revoke_newer_lease() {
        let locks = manager();
        let stale = locks.acquire("channel-queue-1", 600).expect("acquire");
        locks.release(&stale);
        let fresh = locks.acquire("channel-queue-1", 600).expect("reacquire");

        // Releasing the old lease again must not touch the new row.
        locks.release(&stale);
        assert!(locks.is_locked("channel-queue-1").unwrap());

        locks.release(&fresh);
        assert!(!locks.is_locked("channel-queue-1").unwrap());
    }

    #[tokio::test]
    async fn expired_row_is_stolen_on_acquire() {
        let locks = manager();
        // Plant an already-expired row directly.
        {
            let db = locks.db.lock().unwrap();
            let past = (Utc::now() - chrono::Duration::seconds(30)).to_rfc3339();
            db.execute(
                "INSERT INTO locks (resource_id, lock_id, expires_at, created_at)
                 VALUES ('video-Y', 'dead', ?1, ?1)",
                [&past],
            )
            .unwrap();
        }
        let lease = locks.acquire("video-Y", 600).expect("steal expired");
        assert_ne!(lease.lock_id, "dead");
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_rows() {
        let locks = manager();
        let lease = locks.acquire("live", 600).expect("acquire");
        {
            let db = locks.db.lock().unwrap();
            let past = (Utc::now() - chrono::Duration::seconds(5)).to_rfc3339();
            db.execute(
                "INSERT INTO locks (resource_id, lock_id, expires_at, created_at)
                 VALUES ('dead', 'x', ?1, ?1)",
                [&past],
            )
            .unwrap();
        }
        assert_eq!(locks.sweep().unwrap(), 1);
        assert!(locks.is_locked(&lease.resource_id).unwrap());
    }

    #[tokio::test]
    async fn release_all_clears_held_leases() {
        let locks = manager();
        locks.acquire("a", 600).expect("a");
        locks.acquire("b", 600).expect("b");
        locks.release_all();
        assert!(!locks.is_locked("a").unwrap());
        assert!(!locks.is_locked("b").unwrap());
    }
}
