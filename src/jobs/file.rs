//! File-per-job persistence backend.
//!
//! Each job is one pretty-printed JSON document named `<job_id>.json` under
//! the configured directory. Every mutation rewrites the whole file through
//! a temp file + rename so readers never observe a torn document.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{ServiceError, ServiceResult};
use crate::jobs::{JobState, PersistenceBackend};
use crate::logging::log_warn;
use crate::schemas::BatchJobListItem;

/// Probe file name used by the readiness check.
const READY_PROBE: &str = ".ready_probe";

/// JSON-document-per-job backend.
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Create a backend rooted at `dir`. The directory is created lazily on
    /// first write.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn job_path(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{job_id}.json"))
    }

    fn io_err(context: &str, error: impl std::fmt::Display) -> ServiceError {
        ServiceError::storage_unavailable(format!("{context}: {error}"))
    }

    async fn read_job(path: &Path) -> Option<JobState> {
        let raw = tokio::fs::read_to_string(path).await.ok()?;
        match serde_json::from_str(&raw) {
            Ok(job) => Some(job),
            Err(error) => {
                log_warn!(path = %path.display(), error = %error, "Skipping unparseable job file");
                None
            }
        }
    }
}

#[async_trait]
impl PersistenceBackend for FileBackend {
    async fn persist(&self, job: &JobState) -> ServiceResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Self::io_err("Failed to create job storage directory", e))?;

        let payload = serde_json::to_vec_pretty(job)
            .map_err(|e| Self::io_err("Failed to serialize job", e))?;

        let final_path = self.job_path(&job.job_id);
        let tmp_path = self.dir.join(format!(".{}.json.tmp", job.job_id));

        tokio::fs::write(&tmp_path, payload)
            .await
            .map_err(|e| Self::io_err("Failed to write job file", e))?;
        tokio::fs::rename(&tmp_path, &final_path)
            .await
            .map_err(|e| Self::io_err("Failed to replace job file", e))?;

        Ok(())
    }

    async fn load(&self, job_id: &str) -> ServiceResult<Option<JobState>> {
        let path = self.job_path(job_id);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Self::read_job(&path).await)
    }

    async fn list(&self, limit: usize) -> ServiceResult<Option<Vec<BatchJobListItem>>> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Self::io_err("Failed to create job storage directory", e))?;

        // Collect candidate files with their modification times, newest first.
        let mut candidates: Vec<(std::time::SystemTime, PathBuf)> = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| Self::io_err("Failed to read job storage directory", e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Self::io_err("Failed to enumerate job storage directory", e))?
        {
            let path = entry.path();
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if hidden || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Ok(meta) = entry.metadata().await {
                if let Ok(modified) = meta.modified() {
                    candidates.push((modified, path));
                }
            }
        }
        candidates.sort_by(|a, b| b.0.cmp(&a.0));

        let mut rows = Vec::new();
        for (_, path) in candidates {
            if rows.len() >= limit {
                break;
            }
            if let Some(job) = Self::read_job(&path).await {
                rows.push(job.list_item());
            }
        }

        Ok(Some(rows))
    }

    async fn probe(&self) -> ServiceResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Self::io_err("Storage not ready", e))?;
        let probe = self.dir.join(READY_PROBE);
        tokio::fs::write(&probe, b"ok")
            .await
            .map_err(|e| Self::io_err("Storage not ready", e))?;
        tokio::fs::remove_file(&probe)
            .await
            .map_err(|e| Self::io_err("Storage not ready", e))?;
        Ok(())
    }
}
