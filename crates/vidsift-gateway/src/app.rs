use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use rusqlite::Connection;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::warn;

use vidsift_cache::CacheStore;
use vidsift_chat::{ChatOrchestrator, ChatStore, SummaryService};
use vidsift_core::VidsiftConfig;
use vidsift_errors::ErrorSink;
use vidsift_ingest::{ChannelPipeline, TranscriptBlobs, VideoCatalog, VideoPipeline};
use vidsift_limits::{LimitTable, RateLimiter};
use vidsift_locks::LockManager;
use vidsift_providers::{
    EmailClient, EmbeddingClient, LlmClient, TranscriptFetcher, YoutubeClient,
};
use vidsift_queue::{Dispatcher, QueueManager};
use vidsift_search::RetrievalEngine;

use crate::worker::PipelineWorker;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: VidsiftConfig,
    pub locks: Arc<LockManager>,
    pub cache: Arc<CacheStore>,
    pub limits: Arc<RateLimiter>,
    pub errors: Arc<ErrorSink>,
    pub catalog: Arc<VideoCatalog>,
    pub queue: Arc<QueueManager>,
    pub dispatcher: Arc<Dispatcher>,
    pub chat: Arc<ChatOrchestrator>,
    pub summaries: Arc<SummaryService>,
}

impl AppState {
    /// Assemble every component explicitly. `open_db` hands each store
    /// manager its own connection to the shared SQLite file.
    pub fn build(
        config: VidsiftConfig,
        open_db: fn(&str) -> rusqlite::Result<Connection>,
    ) -> anyhow::Result<Self> {
        let db_path = config.store.database_path.clone();
        let open = |label: &str| -> anyhow::Result<Connection> {
            open_db(&db_path).map_err(|e| anyhow::anyhow!("open {label} store: {e}"))
        };

        let locks = Arc::new(LockManager::new(open("locks")?)?);
        let cache = Arc::new(CacheStore::new(open("cache")?)?);
        let limits = Arc::new(RateLimiter::new(open("limits")?, LimitTable::default())?);
        let errors = Arc::new(ErrorSink::new(open("errors")?)?);
        let catalog = Arc::new(VideoCatalog::new(open("catalog")?)?);
        let queue = Arc::new(QueueManager::new(open("queue")?)?);
        let chat_store = Arc::new(ChatStore::new(open("chat")?)?);
        let blobs = Arc::new(TranscriptBlobs::new(config.store.blob_root.clone()));

        let providers = &config.providers;
        let embeddings = Arc::new(EmbeddingClient::new(
            providers.openai_api_key.clone(),
            providers.openai_base_url.clone(),
        ));
        let llm = Arc::new(LlmClient::new(
            providers.openai_api_key.clone(),
            providers.openai_base_url.clone(),
        ));
        let youtube = Arc::new(YoutubeClient::new(
            providers.youtube_api_key.clone(),
            providers.youtube_base_url.clone(),
        ));
        let transcripts = Arc::new(TranscriptFetcher::new());
        let email = providers.email_api_key.clone().map(|key| {
            Arc::new(EmailClient::new(
                key,
                providers.email_base_url.clone(),
                providers.email_from.clone(),
            ))
        });
        if email.is_none() {
            warn!("EMAIL_API_KEY not set; completion notifications disabled");
        }

        let video_pipeline = Arc::new(VideoPipeline::new(
            Arc::clone(&catalog),
            Arc::clone(&blobs),
            Arc::clone(&locks),
            transcripts,
            Arc::clone(&embeddings),
            Arc::clone(&errors),
        ));
        let channel_pipeline = Arc::new(ChannelPipeline::new(
            Arc::clone(&catalog),
            Arc::clone(&queue),
            Arc::clone(&locks),
            Arc::clone(&youtube),
            Arc::clone(&video_pipeline),
            email,
            Arc::clone(&errors),
            config.ingest.max_videos_per_channel,
        ));

        let worker = Arc::new(PipelineWorker::new(
            channel_pipeline,
            video_pipeline,
            Arc::clone(&catalog),
            Arc::clone(&youtube),
        ));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&queue), worker));

        let search = Arc::new(RetrievalEngine::new(
            Arc::clone(&catalog),
            Arc::clone(&blobs),
            Arc::clone(&embeddings),
        ));
        let chat = Arc::new(ChatOrchestrator::new(
            chat_store,
            search,
            Arc::clone(&catalog),
            Arc::clone(&llm),
            Arc::clone(&cache),
            Arc::clone(&errors),
        ));
        let summaries = Arc::new(SummaryService::new(
            Arc::clone(&catalog),
            Arc::clone(&blobs),
            llm,
            Arc::clone(&cache),
        ));

        Ok(Self {
            config,
            locks,
            cache,
            limits,
            errors,
            catalog,
            queue,
            dispatcher,
            chat,
            summaries,
        })
    }
}

/// Start the background tickers. All of them stop when `shutdown` flips.
pub fn spawn_background(state: &Arc<AppState>, shutdown: watch::Receiver<bool>) {
    tokio::spawn(Arc::clone(&state.locks).run_sweeper(shutdown.clone()));
    tokio::spawn(Arc::clone(&state.cache).run_sweeper(shutdown.clone()));
    tokio::spawn(Arc::clone(&state.limits).run_pruner(shutdown.clone()));
    tokio::spawn(Arc::clone(&state.errors).run_flusher(shutdown.clone()));
    tokio::spawn(Arc::clone(&state.dispatcher).run(shutdown));
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/api/channels/process", post(crate::http::channels::process))
        .route("/api/channels/{id}/status", get(crate::http::channels::status))
        .route("/api/videos/process", post(crate::http::videos::process))
        .route("/api/videos/{id}/summary", get(crate::http::videos::summary))
        .route("/api/chat/stream", post(crate::http::chat::video_stream))
        .route(
            "/api/chat/channel/stream",
            post(crate::http::chat::channel_stream),
        )
        .route("/api/queue/status", get(crate::http::queue::status))
        .route("/api/queue/position/{qid}", get(crate::http::queue::position))
        .route("/api/queue/channel", post(crate::http::channels::process))
        .route("/api/queue/video", post(crate::http::videos::process))
        .route("/api/monitor/stats", get(crate::http::monitor::stats))
        .route("/api/cron/status", get(crate::http::monitor::cron_status))
        .route("/api/errors/stats", get(crate::http::monitor::error_stats))
        .with_state(Arc::clone(&state))
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins()
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    if !origins.is_empty() {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        );
    }
    router
}
