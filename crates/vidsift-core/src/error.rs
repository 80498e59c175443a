use thiserror::Error;

/// Service-wide error taxonomy. Component crates carry their own error
/// enums; the gateway converts them into these kinds when building an
/// HTTP response.
#[derive(Debug, Error)]
pub enum VidsiftError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limit exceeded for {action}")]
    RateLimited {
        action: String,
        limit: u32,
        window: String,
        reset_at: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transcript provider error: {0}")]
    UpstreamTranscript(String),

    #[error("Metadata provider error: {0}")]
    UpstreamMetadata(String),

    #[error("Embedding provider error: {0}")]
    UpstreamEmbedding(String),

    #[error("LLM provider error: {0}")]
    UpstreamLlm(String),

    #[error("Email provider error: {0}")]
    UpstreamEmail(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VidsiftError {
    /// Short error code string included in response bodies and error-sink
    /// events.
    pub fn code(&self) -> &'static str {
        match self {
            VidsiftError::Config(_) => "CONFIG_ERROR",
            VidsiftError::Input(_) => "INVALID_INPUT",
            VidsiftError::Auth(_) => "AUTH_FAILED",
            VidsiftError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            VidsiftError::NotFound(_) => "NOT_FOUND",
            VidsiftError::UpstreamTranscript(_) => "TRANSCRIPT_ERROR",
            VidsiftError::UpstreamMetadata(_) => "METADATA_ERROR",
            VidsiftError::UpstreamEmbedding(_) => "EMBEDDING_ERROR",
            VidsiftError::UpstreamLlm(_) => "LLM_ERROR",
            VidsiftError::UpstreamEmail(_) => "EMAIL_ERROR",
            VidsiftError::Store(_) => "STORE_ERROR",
            VidsiftError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status the gateway responds with for this kind.
    pub fn http_status(&self) -> u16 {
        match self {
            VidsiftError::Input(_) => 400,
            VidsiftError::Auth(_) => 401,
            VidsiftError::NotFound(_) => 404,
            VidsiftError::RateLimited { .. } => 429,
            VidsiftError::UpstreamTranscript(_)
            | VidsiftError::UpstreamMetadata(_)
            | VidsiftError::UpstreamEmbedding(_)
            | VidsiftError::UpstreamLlm(_)
            | VidsiftError::UpstreamEmail(_) => 502,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, VidsiftError>;
