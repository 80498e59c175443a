//! `vidsift-errors` — buffered error capture with context redaction.
//!
//! Components report failures here instead of logging and forgetting.
//! Events are buffered in memory, redacted, and flushed to the
//! `error_events` table on a 30 s tick, when the buffer fills, or at
//! shutdown. Known sensitive keys never reach the store.

pub mod db;
pub mod error;
pub mod sink;

pub use error::{Result, SinkError};
pub use sink::{ErrorSink, ErrorStats};
