//! Axum HTTP server for the analysis API.
//!
//! All components are constructed explicitly at startup and injected through
//! [`AppState`]; tests build the same state with a scripted LLM client and
//! drive the router in-process.

pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::analysis::AnalysisService;
use crate::cache::ResultCache;
use crate::config::{PersistenceBackendKind, ServiceConfig};
use crate::error::ServiceResult;
use crate::jobs::{
    BatchDispatcher, FileBackend, JobStore, MemoryBackend, PersistenceBackend, SqliteBackend,
};
use crate::llm::LlmClient;
use crate::logging::log_info;
use crate::rate_limiter::RateLimiter;

/// Shared application state: every component the handlers touch.
pub struct AppState {
    pub config: ServiceConfig,
    pub analysis: Arc<AnalysisService>,
    pub dispatcher: Arc<BatchDispatcher>,
    pub store: Arc<JobStore>,
}

/// Wire the component graph from a validated configuration and an LLM
/// client. The cache and rate limiter are shared between the synchronous
/// path and the batch dispatcher.
///
/// # Errors
///
/// Returns [`crate::ServiceError::StorageUnavailable`] when the sqlite
/// backend cannot be opened.
pub fn build_state(config: ServiceConfig, llm: Arc<dyn LlmClient>) -> ServiceResult<Arc<AppState>> {
    let cache = Arc::new(ResultCache::new(
        config.enable_cache,
        Duration::from_secs(config.cache_ttl_seconds),
    ));
    let rate_limiter = Arc::new(RateLimiter::new(config.claude_requests_per_minute));

    let analysis = Arc::new(AnalysisService::new(
        llm,
        cache.clone(),
        rate_limiter,
        config.claude_model.clone(),
    ));

    let backend: Box<dyn PersistenceBackend> = match config.batch_persistence_backend {
        PersistenceBackendKind::Memory => Box::new(MemoryBackend),
        PersistenceBackendKind::File => {
            Box::new(FileBackend::new(config.batch_job_storage_path.clone()))
        }
        PersistenceBackendKind::Sqlite => Box::new(SqliteBackend::open(&config.batch_sqlite_path)?),
    };
    let store = Arc::new(JobStore::new(
        backend,
        config.batch_cost_per_1k_input_tokens,
        config.batch_cost_per_1k_output_tokens,
    ));

    let dispatcher = Arc::new(BatchDispatcher::new(
        analysis.clone(),
        cache,
        store.clone(),
        config.batch_max_concurrent_llm_calls,
        config.batch_record_retry_count,
    ));

    Ok(Arc::new(AppState {
        config,
        analysis,
        dispatcher,
        store,
    }))
}

/// Build the API router over the given state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root_handler))
        .route("/api/v1/analyze", post(handlers::analyze_handler))
        .route("/api/v1/batch/analyze", post(handlers::batch_analyze_handler))
        .route("/api/v1/batch/jobs", get(handlers::batch_list_jobs_handler))
        .route(
            "/api/v1/batch/{job_id}/status",
            get(handlers::batch_status_handler),
        )
        .route("/api/v1/health", get(handlers::health_handler))
        .route("/api/v1/ready", get(handlers::readiness_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind the configured address and serve until shutdown.
pub async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    log_info!(addr = %addr, "insight-service listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    log_info!("Shutdown signal received, draining");
}
