//! Batch dispatcher: fans records out under concurrency and rate limits.
//!
//! Records are processed independently; one record's failure never fails the
//! batch. Results are appended to the job in completion order, each carrying
//! its original index. The whole job only fails when an error escapes the
//! task harness itself (a panicked record task).

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::analysis::AnalysisService;
use crate::cache::ResultCache;
use crate::error::ServiceError;
use crate::jobs::JobStore;
use crate::logging::{log_error, log_info, log_warn};
use crate::schemas::AnalyzeRequest;

/// Error recorded for records that never produced notes to analyze.
const EMPTY_NOTES_ERROR: &str = "At least one note is required";

/// Fans out batch records through the analysis facade.
pub struct BatchDispatcher {
    analysis: Arc<AnalysisService>,
    cache: Arc<ResultCache>,
    store: Arc<JobStore>,
    max_concurrent_llm_calls: usize,
    record_retry_count: u32,
}

impl BatchDispatcher {
    /// Assemble a dispatcher over its injected collaborators.
    pub fn new(
        analysis: Arc<AnalysisService>,
        cache: Arc<ResultCache>,
        store: Arc<JobStore>,
        max_concurrent_llm_calls: usize,
        record_retry_count: u32,
    ) -> Self {
        Self {
            analysis,
            cache,
            store,
            max_concurrent_llm_calls: max_concurrent_llm_calls.max(1),
            record_retry_count,
        }
    }

    /// Process every record of an accepted batch, then mark the job
    /// terminal. Returns once all records have reached success or exhausted
    /// their retries.
    ///
    /// Invoked once per accepted batch, on a background task owned by the
    /// server.
    pub async fn run_batch(&self, job_id: String, records: Vec<AnalyzeRequest>) {
        self.store.set_processing(&job_id).await;

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_llm_calls));
        let max_attempts = 1 + self.record_retry_count;

        let mut tasks = JoinSet::new();
        for (index, record) in records.into_iter().enumerate() {
            tasks.spawn(process_record(
                self.analysis.clone(),
                self.cache.clone(),
                self.store.clone(),
                semaphore.clone(),
                max_attempts,
                job_id.clone(),
                index,
                record,
            ));
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(join_error) = joined {
                // A record task escaped its harness (panic). The job is no
                // longer trustworthy; abort the rest and mark it failed.
                log_error!(
                    job_id = %job_id,
                    error = %join_error,
                    "Batch job fatal error"
                );
                tasks.abort_all();
                while tasks.join_next().await.is_some() {}
                self.store
                    .set_job_failed(&job_id, Some(join_error.to_string()))
                    .await;
                return;
            }
        }

        self.store.set_job_completed(&job_id).await;
        log_info!(job_id = %job_id, "Batch job completed");
    }
}

/// Process a single record: cache probe, then up to `max_attempts` passes
/// through the analysis facade, each gated by the concurrency semaphore.
/// Failures stay confined to this record.
#[allow(clippy::too_many_arguments)]
async fn process_record(
    analysis: Arc<AnalysisService>,
    cache: Arc<ResultCache>,
    store: Arc<JobStore>,
    semaphore: Arc<Semaphore>,
    max_attempts: u32,
    job_id: String,
    index: usize,
    record: AnalyzeRequest,
) {
    let structured_data = record.data();
    let notes = &record.notes;

    // Notes were normalised at the boundary; only emptiness is checked here.
    if notes.is_empty() {
        store
            .append_result(
                &job_id,
                index,
                false,
                None,
                Some(EMPTY_NOTES_ERROR.to_string()),
                None,
            )
            .await;
        return;
    }

    if let Some(cached) = cache.get(structured_data, notes) {
        let tokens = cached.metadata.tokens_used.unwrap_or(0);
        store
            .append_result(&job_id, index, true, Some(cached), None, Some(tokens))
            .await;
        return;
    }

    let mut last_error: Option<ServiceError> = None;
    for attempt in 1..=max_attempts {
        // The permit bounds concurrent LLM work; the facade acquires the
        // rate-limiter slot after it. Dropping the permit on every exit path
        // keeps slots from leaking across retries.
        let Ok(permit) = semaphore.acquire().await else {
            break;
        };
        let outcome = analysis.analyze(structured_data, notes).await;
        drop(permit);

        match outcome {
            Ok(response) => {
                let tokens = response.metadata.tokens_used.unwrap_or(0);
                store
                    .append_result(&job_id, index, true, Some(response), None, Some(tokens))
                    .await;
                return;
            }
            Err(error) => {
                log_warn!(
                    job_id = %job_id,
                    record_index = index,
                    attempt,
                    max_attempts,
                    error = %error,
                    "Batch record attempt failed"
                );
                last_error = Some(error);
            }
        }
    }

    let message = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "Record processing was cancelled".to_string());
    store
        .append_result(&job_id, index, false, None, Some(message), None)
        .await;
}
