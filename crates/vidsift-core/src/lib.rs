//! `vidsift-core` — configuration, error taxonomy, and shared domain types.
//!
//! Everything here is transport- and storage-agnostic: the config loader,
//! the service-wide error kinds the gateway maps onto HTTP responses, the
//! status enums shared by the catalog and the queue, and the keyword
//! tokenizer that the chunker and the retrieval engine must agree on.

pub mod config;
pub mod error;
pub mod keywords;
pub mod types;

pub use config::VidsiftConfig;
pub use error::{Result, VidsiftError};
