//! `vidsift-limits` — sliding-window rate limiting.
//!
//! Counts are raw event counts over `[now − window, now]` from an
//! append-only `rate_events` table, with a 60 s memo tier in front to cut
//! store round trips. Store failures fail **open**: a broken store must not
//! block paying traffic — abuse protection is secondary to availability.

pub mod db;
pub mod error;
pub mod limiter;

pub use error::{LimitError, Result};
pub use limiter::{LimitDecision, LimitTable, RateLimiter};
