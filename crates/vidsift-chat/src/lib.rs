//! `vidsift-chat` — retrieval-augmented streaming chat.
//!
//! The orchestrator builds a grounded system prompt from retrieved chunks,
//! streams model tokens to a transport-agnostic [`sink::ChatSink`],
//! extracts timestamp citations from the finished answer, and persists the
//! conversation turn. Mid-stream client disconnects abandon the turn
//! without persisting anything.

pub mod citations;
pub mod db;
pub mod error;
pub mod orchestrator;
pub mod prompt;
pub mod sink;
pub mod store;
pub mod summary;

pub use error::{ChatError, Result};
pub use orchestrator::{ChatOrchestrator, ChatTarget};
pub use sink::{ChatSink, SseFrame};
pub use store::ChatStore;
pub use summary::{SummaryService, VideoSummary};
