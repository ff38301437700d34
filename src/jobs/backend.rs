//! The persistence seam for batch jobs.
//!
//! Three interchangeable backends satisfy one contract; external observers
//! cannot tell them apart through the store's operations. The discriminator
//! lives in [`crate::config::PersistenceBackendKind`].

use async_trait::async_trait;

use crate::error::ServiceResult;
use crate::jobs::JobState;
use crate::schemas::BatchJobListItem;

/// Durability capability consumed by [`crate::jobs::JobStore`].
///
/// `persist` is called after every mutating store operation with the full
/// job state; per-job call ordering is guaranteed by the store.
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Write the job's full state to durable storage.
    async fn persist(&self, job: &JobState) -> ServiceResult<()>;

    /// Load a job by id, if the backend has it. `Ok(None)` means unknown.
    async fn load(&self, job_id: &str) -> ServiceResult<Option<JobState>>;

    /// List persisted jobs, most recent first, bounded by `limit`.
    ///
    /// Returns `Ok(None)` when the backend keeps no listing of its own and
    /// the store should list from memory.
    async fn list(&self, limit: usize) -> ServiceResult<Option<Vec<BatchJobListItem>>>;

    /// Verify the backend is writable (readiness probe).
    async fn probe(&self) -> ServiceResult<()>;
}

/// Process-local backend: no durability, state lost on restart.
#[derive(Debug, Default)]
pub struct MemoryBackend;

#[async_trait]
impl PersistenceBackend for MemoryBackend {
    async fn persist(&self, _job: &JobState) -> ServiceResult<()> {
        Ok(())
    }

    async fn load(&self, _job_id: &str) -> ServiceResult<Option<JobState>> {
        Ok(None)
    }

    async fn list(&self, _limit: usize) -> ServiceResult<Option<Vec<BatchJobListItem>>> {
        Ok(None)
    }

    async fn probe(&self) -> ServiceResult<()> {
        Ok(())
    }
}
