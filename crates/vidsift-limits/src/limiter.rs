use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rusqlite::Connection;
use tokio::sync::watch;
use tracing::{debug, warn};

use vidsift_core::types::{RateAction, UserClass};

use crate::db::init_db;
use crate::error::Result;

const HOUR_SECS: i64 = 3600;
const DAY_SECS: i64 = 86_400;
/// Memoized counts are trusted for this long.
const MEMO_TTL_SECS: i64 = 60;
/// Events older than this are pruned.
const RETENTION_SECS: i64 = 2 * DAY_SECS;
/// Cadence of the retention pruner.
const PRUNE_INTERVAL_SECS: u64 = 3600;

/// Caps for one (class, action) cell. A `None` cap disables that window.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub hourly: Option<u32>,
    pub daily: Option<u32>,
}

/// Configured caps per user class and action.
pub struct LimitTable {
    cells: HashMap<(UserClass, RateAction), Limits>,
}

impl Default for LimitTable {
    fn default() -> Self {
        use RateAction::*;
        use UserClass::*;
        let mut cells = HashMap::new();
        cells.insert((Anonymous, Chat), Limits { hourly: Some(3), daily: Some(10) });
        cells.insert((Anonymous, VideoUpload), Limits { hourly: Some(1), daily: Some(3) });
        cells.insert((Anonymous, ChannelProcess), Limits { hourly: Some(1), daily: Some(2) });
        cells.insert((User, Chat), Limits { hourly: Some(5), daily: Some(50) });
        cells.insert((User, VideoUpload), Limits { hourly: Some(5), daily: Some(20) });
        cells.insert((User, ChannelProcess), Limits { hourly: Some(3), daily: Some(10) });
        cells.insert((Premium, Chat), Limits { hourly: None, daily: None });
        cells.insert((Premium, VideoUpload), Limits { hourly: Some(20), daily: Some(100) });
        cells.insert((Premium, ChannelProcess), Limits { hourly: Some(10), daily: Some(50) });
        Self { cells }
    }
}

impl LimitTable {
    fn get(&self, class: UserClass, action: RateAction) -> Limits {
        self.cells
            .get(&(class, action))
            .copied()
            .unwrap_or(Limits { hourly: None, daily: None })
    }
}

/// Outcome of a limit check — the most restrictive of the active windows.
#[derive(Debug, Clone)]
pub struct LimitDecision {
    pub allowed: bool,
    /// `None` when no window is configured (unlimited).
    pub limit: Option<u32>,
    pub remaining: u32,
    /// "hour" or "day" — the window that produced this decision.
    pub window: &'static str,
    pub reset_at: DateTime<Utc>,
}

impl LimitDecision {
    fn unlimited() -> Self {
        Self {
            allowed: true,
            limit: None,
            remaining: 0,
            window: "",
            reset_at: Utc::now(),
        }
    }
}

struct Memo {
    hourly: u32,
    daily: u32,
    computed_at: DateTime<Utc>,
}

/// Sliding-window rate limiter over the append-only event log.
pub struct RateLimiter {
    db: Mutex<Connection>,
    table: LimitTable,
    /// (identifier, action) -> memoized window counts.
    memo: DashMap<(String, String), Memo>,
}

impl RateLimiter {
    pub fn new(conn: Connection, table: LimitTable) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            table,
            memo: DashMap::new(),
        })
    }

    /// Check whether `identifier` may perform `action`. Does not record.
    ///
    /// Store failures fail open — the decision reads as allowed with the
    /// full limit remaining.
    pub fn check(&self, identifier: &str, action: RateAction, class: UserClass) -> LimitDecision {
        let limits = self.table.get(class, action);
        if limits.hourly.is_none() && limits.daily.is_none() {
            return LimitDecision::unlimited();
        }

        let now = Utc::now();
        let (hourly_count, daily_count) = match self.window_counts(identifier, action, now) {
            Ok(counts) => counts,
            Err(e) => {
                warn!(identifier, error = %e, "rate check failed; failing open");
                return LimitDecision {
                    allowed: true,
                    limit: limits.hourly.or(limits.daily),
                    remaining: limits.hourly.or(limits.daily).unwrap_or(0),
                    window: if limits.hourly.is_some() { "hour" } else { "day" },
                    reset_at: now + chrono::Duration::seconds(HOUR_SECS),
                };
            }
        };

        let mut decision: Option<LimitDecision> = None;
        let windows = [
            (limits.hourly, hourly_count, "hour", HOUR_SECS),
            (limits.daily, daily_count, "day", DAY_SECS),
        ];
        for (cap, count, window, secs) in windows {
            let Some(limit) = cap else { continue };
            let remaining = limit.saturating_sub(count);
            let reset_at = self
                .earliest_event_after(identifier, action, now - chrono::Duration::seconds(secs))
                .map(|first| first + chrono::Duration::seconds(secs))
                .unwrap_or_else(|| now + chrono::Duration::seconds(secs));
            let candidate = LimitDecision {
                allowed: count < limit,
                limit: Some(limit),
                remaining,
                window,
                reset_at,
            };
            let more_restrictive = decision
                .as_ref()
                .is_none_or(|d| candidate.remaining < d.remaining);
            if more_restrictive {
                decision = Some(candidate);
            }
        }
        decision.unwrap_or_else(LimitDecision::unlimited)
    }

    /// Append a rate event and invalidate the memoized counts.
    pub fn record(&self, identifier: &str, action: RateAction) -> Result<()> {
        {
            let db = self.db.lock().unwrap();
            db.execute(
                "INSERT INTO rate_events (identifier, action, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![identifier, action.to_string(), Utc::now().to_rfc3339()],
            )?;
        }
        self.memo
            .remove(&(identifier.to_string(), action.to_string()));
        Ok(())
    }

    /// Delete events older than the 2-day retention horizon.
    pub fn prune(&self) -> Result<usize> {
        let cutoff = (Utc::now() - chrono::Duration::seconds(RETENTION_SECS)).to_rfc3339();
        let db = self.db.lock().unwrap();
        let n = db.execute("DELETE FROM rate_events WHERE created_at < ?1", [&cutoff])?;
        Ok(n)
    }

    /// Pruner loop: trims the event log hourly until shutdown.
    pub async fn run_pruner(
        self: std::sync::Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(Duration::from_secs(PRUNE_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.prune() {
                        Ok(n) if n > 0 => debug!(count = n, "pruned rate events"),
                        Err(e) => warn!(error = %e, "rate event prune failed"),
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

    /// Hourly and daily counts, via the memo tier when fresh.
    fn window_counts(
        &self,
        identifier: &str,
        action: RateAction,
        now: DateTime<Utc>,
    ) -> Result<(u32, u32)> {
        let memo_key = (identifier.to_string(), action.to_string());
        if let Some(memo) = self.memo.get(&memo_key) {
            let age = now.signed_duration_since(memo.computed_at).num_seconds();
            if age < MEMO_TTL_SECS {
                return Ok((memo.hourly, memo.daily));
            }
        }

        let hourly = self.count_since(identifier, action, now - chrono::Duration::seconds(HOUR_SECS))?;
        let daily = self.count_since(identifier, action, now - chrono::Duration::seconds(DAY_SECS))?;
        self.memo.insert(
            memo_key,
            Memo {
                hourly,
                daily,
                computed_at: now,
            },
        );
        Ok((hourly, daily))
    }

    fn count_since(
        &self,
        identifier: &str,
        action: RateAction,
        since: DateTime<Utc>,
    ) -> Result<u32> {
        let db = self.db.lock().unwrap();
        let count: u32 = db.query_row(
            "SELECT COUNT(*) FROM rate_events
             WHERE identifier = ?1 AND action = ?2 AND created_at >= ?3",
            rusqlite::params![identifier, action.to_string(), since.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn earliest_event_after(
        &self,
        identifier: &str,
        action: RateAction,
        since: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let db = self.db.lock().unwrap();
        let first: Option<String> = db
            .query_row(
                "SELECT MIN(created_at) FROM rate_events
                 WHERE identifier = ?1 AND action = ?2 AND created_at >= ?3",
                rusqlite::params![identifier, action.to_string(), since.to_rfc3339()],
                |row| row.get(0),
            )
            .ok()
            .flatten();
        first.and_then(|s| s.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(
            Connection::open_in_memory().expect("open db"),
            LimitTable::default(),
        )
        .expect("init")
    }

    #[test]
    fn remaining_decreases_to_zero_then_denies() {
        let rl = limiter();
        // user/chat: 5 per hour
        let mut last_remaining = u32::MAX;
        for _ in 0..5 {
            let d = rl.check("user:u1", RateAction::Chat, UserClass::User);
            assert!(d.allowed);
            assert!(d.remaining < last_remaining);
            last_remaining = d.remaining;
            rl.record("user:u1", RateAction::Chat).unwrap();
        }
        let sixth = rl.check("user:u1", RateAction::Chat, UserClass::User);
        assert!(!sixth.allowed);
        assert_eq!(sixth.remaining, 0);
        assert_eq!(sixth.window, "hour");
        assert!(sixth.reset_at <= Utc::now() + chrono::Duration::seconds(HOUR_SECS));
    }

    #[test]
    fn events_outside_window_do_not_count() {
        let rl = limiter();
        {
            let db = rl.db.lock().unwrap();
            let two_hours_ago = (Utc::now() - chrono::Duration::seconds(2 * HOUR_SECS)).to_rfc3339();
            for _ in 0..10 {
                db.execute(
                    "INSERT INTO rate_events (identifier, action, created_at)
                     VALUES ('user:u2', 'chat', ?1)",
                    [&two_hours_ago],
                )
                .unwrap();
            }
        }
        let d = rl.check("user:u2", RateAction::Chat, UserClass::User);
        assert!(d.allowed);
        assert_eq!(d.limit, Some(5));
        // Old events still count against the daily window.
        assert_eq!(d.remaining, 5.min(50u32.saturating_sub(10)));
    }

    #[test]
    fn daily_window_wins_when_more_restrictive() {
        let rl = limiter();
        {
            let db = rl.db.lock().unwrap();
            // 47 events spread earlier today, outside the hourly window.
            let three_hours_ago = (Utc::now() - chrono::Duration::seconds(3 * HOUR_SECS)).to_rfc3339();
            for _ in 0..47 {
                db.execute(
                    "INSERT INTO rate_events (identifier, action, created_at)
                     VALUES ('user:u3', 'chat', ?1)",
                    [&three_hours_ago],
                )
                .unwrap();
            }
        }
        let d = rl.check("user:u3", RateAction::Chat, UserClass::User);
        // hourly remaining = 5, daily remaining = 3 — daily is binding.
        assert_eq!(d.window, "day");
        assert_eq!(d.remaining, 3);
    }

    #[test]
    fn record_invalidates_memo() {
        let rl = limiter();
        let before = rl.check("user:u4", RateAction::Chat, UserClass::User);
        rl.record("user:u4", RateAction::Chat).unwrap();
        let after = rl.check("user:u4", RateAction::Chat, UserClass::User);
        assert_eq!(after.remaining, before.remaining - 1);
    }

    #[test]
    fn premium_chat_is_unlimited() {
        let rl = limiter();
        for _ in 0..100 {
            rl.record("user:p1", RateAction::Chat).unwrap();
        }
        let d = rl.check("user:p1", RateAction::Chat, UserClass::Premium);
        assert!(d.allowed);
        assert_eq!(d.limit, None);
    }

    #[test]
    fn prune_removes_old_events() {
        let rl = limiter();
        {
            let db = rl.db.lock().unwrap();
            let three_days_ago = (Utc::now() - chrono::Duration::seconds(3 * DAY_SECS)).to_rfc3339();
            db.execute(
                "INSERT INTO rate_events (identifier, action, created_at)
                 VALUES ('user:u5', 'chat', ?1)",
                [&three_days_ago],
            )
            .unwrap();
        }
        rl.record("user:u5", RateAction::Chat).unwrap();
        assert_eq!(rl.prune().unwrap(), 1);
    }
}
