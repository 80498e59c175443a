//! `vidsift-providers` — clients for every upstream the service talks to.
//!
//! One reqwest-backed client per provider: video metadata (YouTube Data
//! API), timed-text transcripts, embeddings and streaming chat completions
//! (OpenAI), and transactional email. All keys come from configuration;
//! none of these clients touch the store.

pub mod email;
pub mod embeddings;
pub mod error;
pub mod openai;
pub mod stream;
pub mod transcript;
pub mod youtube;

/// Cap on any single upstream call.
const HTTP_TIMEOUT_SECS: u64 = 60;

/// Shared client for request/response providers. Streaming responses use
/// [`streaming_http_client`] instead — a whole-request timeout would cut
/// long SSE bodies short.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .expect("reqwest client construction")
}

pub(crate) fn streaming_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .expect("reqwest client construction")
}

pub use email::EmailClient;
pub use embeddings::{EmbeddingClient, EMBEDDING_DIM};
pub use error::ProviderError;
pub use openai::{ChatTurn, LlmClient, Role};
pub use stream::StreamEvent;
pub use transcript::{TranscriptError, TranscriptFetcher, TranscriptSegment};
pub use youtube::{ChannelInfo, VideoInfo, YoutubeClient};
