//! `vidsift-queue` — durable ingest queue and background dispatcher.
//!
//! Channel ingest requests are persisted as queue rows; a multi-interval
//! tick engine scans for work and drives an injected [`QueueWorker`].
//! Ticks are idempotent and safe to run on multiple instances because the
//! pipelines acquire locks before doing anything heavy.

pub mod db;
pub mod dispatcher;
pub mod error;
pub mod queue;

pub use dispatcher::{Dispatcher, QueueWorker};
pub use error::{QueueError, Result};
pub use queue::{EnqueueOutcome, QueueCounts, QueueItem, QueueManager};
