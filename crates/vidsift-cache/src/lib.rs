//! `vidsift-cache` — two-tier keyed cache with TTL.
//!
//! Reads probe the in-process LRU first, then the SQLite backing table;
//! store hits warm the memory tier. Writes populate both tiers. There is no
//! cross-instance consistency guarantee — entries converge via TTL.

pub mod db;
pub mod error;
pub mod store;

pub use error::{CacheError, Result};
pub use store::{cache_key, CacheStore, DEFAULT_TTL_SECS, SUMMARY_TTL_SECS};
