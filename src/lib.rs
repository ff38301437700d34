//! # insight-service
//!
//! AI-powered analysis service: accepts bundles of structured data and
//! free-text notes and returns summaries, categorized insights, prioritized
//! next actions, and analysis metadata produced by an LLM provider.
//!
//! ## Key Features
//!
//! - **Synchronous analysis**: one request, one `AnalyzeResponse`
//! - **Batch analysis**: up to 500 records per job with progress tracking
//!   and partial results while the batch runs
//! - **Provider protection**: sliding-window rate limiting plus a bounded
//!   concurrency dispatcher with per-record retry and failure isolation
//! - **Deduplication**: content-addressed result cache with TTL
//! - **Durability**: job state persisted to memory, file-per-job, or SQLite
//!   backends with identical observable semantics
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use insight_service::{build_state, serve, AnthropicClient, LlmClient, ServiceConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServiceConfig::from_env()?;
//! let llm: Arc<dyn LlmClient> = Arc::new(AnthropicClient::new(&config)?);
//! let state = build_state(config, llm)?;
//! serve(state).await
//! # }
//! ```

// Allow missing errors documentation - errors are self-documenting via type signatures
#![allow(clippy::missing_errors_doc)]

// =============================================================================
// Module declarations
// =============================================================================

// Public modules
pub mod analysis;
pub mod cache;
pub mod config;
pub mod error;
pub mod jobs;
pub mod llm;
pub mod prompt;
pub mod rate_limiter;
pub mod response_parser;
pub mod schemas;
pub mod server;

// Internal modules
pub(crate) mod logging;

#[cfg(test)]
pub mod tests;

// =============================================================================
// Public API re-exports
// =============================================================================

// Configuration
pub use config::{PersistenceBackendKind, ServiceConfig};

// Errors
pub use error::{ErrorCategory, ServiceError, ServiceResult};

// Request/response schemas
pub use schemas::{
    AnalyzeRequest, AnalyzeResponse, BatchAnalyzeRequest, BatchJobListItem, BatchJobListResponse,
    BatchJobResponse, BatchJobStatus, BatchRecordResult, BatchStatusResponse, Insight, Metadata,
    NextAction, Priority, StructuredData, BATCH_MAX_RECORDS,
};

// Core components
pub use analysis::AnalysisService;
pub use cache::ResultCache;
pub use jobs::{
    BatchDispatcher, FileBackend, JobStore, MemoryBackend, PersistenceBackend, SqliteBackend,
};
pub use rate_limiter::RateLimiter;

// LLM collaborator
pub use llm::{AnthropicClient, LlmClient, LlmReply, TokenUsage};

// Prompt and payload handling
pub use prompt::PromptBuilder;
pub use response_parser::ResponseParser;

// HTTP surface
pub use server::{build_state, router, serve, AppState};
