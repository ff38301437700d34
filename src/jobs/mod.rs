//! Batch job tracking and persistence.
//!
//! [`JobStore`] owns the in-memory job map (the only mutable state shared
//! across components) and delegates durability to a pluggable
//! [`PersistenceBackend`]. All public operations are safe under parallel
//! invocation; backend writes happen while the store lock is held so the
//! write order for a given job always matches its in-memory mutation order.

pub mod backend;
pub mod dispatcher;
pub mod file;
pub mod sqlite;

pub use backend::{MemoryBackend, PersistenceBackend};
pub use dispatcher::BatchDispatcher;
pub use file::FileBackend;
pub use sqlite::SqliteBackend;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::ServiceResult;
use crate::logging::{log_debug, log_warn};
use crate::schemas::{
    AnalyzeResponse, BatchJobListItem, BatchJobStatus, BatchRecordResult, BatchStatusResponse,
};

/// Full state of one batch job. This is also the persisted document shape
/// for the file backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub job_id: String,
    pub status: BatchJobStatus,
    pub total_records: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub total_tokens_used: u64,
    /// Per-record results in completion order.
    pub results: Vec<BatchRecordResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub failure_message: Option<String>,
}

impl JobState {
    fn new(total_records: usize) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4().to_string(),
            status: BatchJobStatus::Accepted,
            total_records,
            completed_count: 0,
            failed_count: 0,
            total_tokens_used: 0,
            results: Vec::new(),
            created_at: now,
            updated_at: now,
            failure_message: None,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            BatchJobStatus::Completed | BatchJobStatus::Failed
        )
    }

    /// Build the status view: progress percentage, optional cost estimate,
    /// partial results once at least one record has finished.
    fn status_response(
        &self,
        cost_per_1k_input_tokens: Option<f64>,
        cost_per_1k_output_tokens: Option<f64>,
    ) -> BatchStatusResponse {
        let done = self.completed_count + self.failed_count;
        let progress_percent = if self.total_records > 0 {
            round2(done as f64 / self.total_records as f64 * 100.0)
        } else {
            0.0
        };

        // The 50/50 input/output split is a documented approximation; the
        // provider's usage report carries the true split if precise
        // accounting is ever needed.
        let priced = cost_per_1k_input_tokens.is_some() || cost_per_1k_output_tokens.is_some();
        let estimated_cost = if priced && self.total_tokens_used > 0 {
            let half_tokens = self.total_tokens_used as f64 / 2.0;
            let mut cost = 0.0;
            if let Some(price) = cost_per_1k_input_tokens {
                cost += half_tokens / 1000.0 * price;
            }
            if let Some(price) = cost_per_1k_output_tokens {
                cost += half_tokens / 1000.0 * price;
            }
            Some(round6(cost))
        } else {
            None
        };

        BatchStatusResponse {
            job_id: self.job_id.clone(),
            status: self.status,
            total_records: self.total_records,
            completed_count: self.completed_count,
            failed_count: self.failed_count,
            progress_percent,
            total_tokens_used: self.total_tokens_used,
            estimated_cost,
            results: if self.results.is_empty() {
                None
            } else {
                Some(self.results.clone())
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Build the listing row for this job.
    pub(crate) fn list_item(&self) -> BatchJobListItem {
        BatchJobListItem {
            job_id: self.job_id.clone(),
            status: self.status.to_string(),
            total_records: self.total_records,
            completed_count: self.completed_count,
            failed_count: self.failed_count,
            total_tokens_used: self.total_tokens_used,
            created_at: Some(self.created_at.to_rfc3339()),
            updated_at: Some(self.updated_at.to_rfc3339()),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Store for batch job state with pluggable persistence.
///
/// Counters are monotonic non-decreasing and status transitions only move
/// along `accepted → processing → {completed, failed}`; terminal transitions
/// are idempotent. Readers that miss in memory hydrate from the backend
/// without clobbering state another caller just mutated.
pub struct JobStore {
    jobs: Mutex<HashMap<String, JobState>>,
    backend: Box<dyn PersistenceBackend>,
    cost_per_1k_input_tokens: Option<f64>,
    cost_per_1k_output_tokens: Option<f64>,
}

impl JobStore {
    /// Create a store over the given backend, with optional per-1K-token
    /// prices for the cost estimate.
    pub fn new(
        backend: Box<dyn PersistenceBackend>,
        cost_per_1k_input_tokens: Option<f64>,
        cost_per_1k_output_tokens: Option<f64>,
    ) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            backend,
            cost_per_1k_input_tokens,
            cost_per_1k_output_tokens,
        }
    }

    /// Create a new batch job and return its id.
    ///
    /// # Errors
    ///
    /// Propagates backend persistence failures so submission fails fast when
    /// storage is down; the in-memory entry remains either way.
    pub async fn create_job(&self, total_records: usize) -> ServiceResult<String> {
        let job = JobState::new(total_records);
        let job_id = job.job_id.clone();

        let mut jobs = self.jobs.lock().await;
        jobs.insert(job_id.clone(), job.clone());
        self.backend.persist(&job).await?;

        log_debug!(job_id = %job_id, total_records, "Batch job created");
        Ok(job_id)
    }

    /// Mark a job as processing. Returns `false` if the job is unknown.
    pub async fn set_processing(&self, job_id: &str) -> bool {
        self.update_job(job_id, |job| {
            if job.status == BatchJobStatus::Accepted {
                job.status = BatchJobStatus::Processing;
                true
            } else {
                false
            }
        })
        .await
    }

    /// Append a single record result and update the counters. `tokens_used`
    /// feeds cost attribution on success. Returns `false` if the job is
    /// unknown.
    pub async fn append_result(
        &self,
        job_id: &str,
        index: usize,
        success: bool,
        response: Option<AnalyzeResponse>,
        error: Option<String>,
        tokens_used: Option<u64>,
    ) -> bool {
        self.update_job(job_id, |job| {
            job.results.push(BatchRecordResult {
                index,
                success,
                response,
                error,
            });
            if success {
                job.completed_count += 1;
                job.total_tokens_used += tokens_used.unwrap_or(0);
            } else {
                job.failed_count += 1;
            }
            true
        })
        .await
    }

    /// Mark a job as completed. Idempotent; no-op once terminal. Returns
    /// `false` if the job is unknown.
    pub async fn set_job_completed(&self, job_id: &str) -> bool {
        self.update_job(job_id, |job| {
            if job.is_terminal() {
                false
            } else {
                job.status = BatchJobStatus::Completed;
                true
            }
        })
        .await
    }

    /// Mark a job as failed with an optional message. No-op once terminal.
    /// Returns `false` if the job is unknown.
    pub async fn set_job_failed(&self, job_id: &str, message: Option<String>) -> bool {
        self.update_job(job_id, |job| {
            if job.is_terminal() {
                false
            } else {
                job.status = BatchJobStatus::Failed;
                job.failure_message = message;
                true
            }
        })
        .await
    }

    /// Get the status view for a job, hydrating from the backend when the
    /// job is not in memory (e.g., after a restart).
    pub async fn get_status_response(&self, job_id: &str) -> Option<BatchStatusResponse> {
        let job = self.get_job(job_id).await?;
        Some(job.status_response(self.cost_per_1k_input_tokens, self.cost_per_1k_output_tokens))
    }

    /// List jobs for table display, most recent first, bounded by `limit`.
    pub async fn list_jobs(&self, limit: usize) -> Vec<BatchJobListItem> {
        match self.backend.list(limit).await {
            Ok(Some(rows)) => rows,
            Ok(None) => {
                // Memory backend: list from the in-memory map.
                let jobs = self.jobs.lock().await;
                let mut all: Vec<&JobState> = jobs.values().collect();
                all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                all.into_iter().take(limit).map(JobState::list_item).collect()
            }
            Err(error) => {
                log_warn!(error = %error, "Failed to list persisted jobs");
                Vec::new()
            }
        }
    }

    /// Verify the persistence backend can serve traffic.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ServiceError::StorageUnavailable`] when the backend
    /// is not writable.
    pub async fn readiness(&self) -> ServiceResult<()> {
        self.backend.probe().await
    }

    /// Fetch a job's full state, hydrating from the backend on a memory miss.
    pub async fn get_job(&self, job_id: &str) -> Option<JobState> {
        {
            let jobs = self.jobs.lock().await;
            if let Some(job) = jobs.get(job_id) {
                return Some(job.clone());
            }
        }

        // Hydrate outside the lock, then re-check: another caller may have
        // created or mutated the job meanwhile, and their state wins.
        let loaded = match self.backend.load(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => return None,
            Err(error) => {
                log_warn!(job_id = %job_id, error = %error, "Failed to hydrate job from backend");
                return None;
            }
        };

        let mut jobs = self.jobs.lock().await;
        Some(jobs.entry(job_id.to_string()).or_insert(loaded).clone())
    }

    /// Apply a mutation under the store lock and persist the new state.
    ///
    /// The mutator returns whether anything changed; unchanged jobs are not
    /// re-persisted and keep their `updated_at`. Persistence failures after
    /// creation are logged and swallowed; the in-memory state stays
    /// authoritative.
    async fn update_job(
        &self,
        job_id: &str,
        mutate: impl FnOnce(&mut JobState) -> bool,
    ) -> bool {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.get_mut(job_id) else {
            return false;
        };
        if mutate(job) {
            job.updated_at = Utc::now();
            let snapshot = job.clone();
            if let Err(error) = self.backend.persist(&snapshot).await {
                log_warn!(job_id = %job_id, error = %error, "Failed to persist job state");
            }
        }
        true
    }
}
