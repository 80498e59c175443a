//! `vidsift-locks` — best-effort distributed locks over the shared store.
//!
//! A lock is a unique row keyed on `resource_id` with a TTL. Acquisition is
//! an INSERT that either succeeds or collides; a collision with an expired
//! row deletes it and retries once. Locks are advisory: pipelines acquire
//! them before heavy work so that queue ticks on multiple instances never
//! double-execute, but nothing stops a caller that skips the manager.

pub mod db;
pub mod error;
pub mod manager;

pub use error::{LockError, Result};
pub use manager::{Lease, LockManager};
