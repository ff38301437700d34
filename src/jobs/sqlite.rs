//! SQLite persistence backend.
//!
//! Jobs land in two tables: `batch_jobs` keyed by `job_id` and
//! `batch_results` keyed by autoincrement with an index on `job_id`. Every
//! mutation upserts the job row and rewrites the job's result rows inside
//! one transaction, so readers always see a consistent result set.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{ServiceError, ServiceResult};
use crate::jobs::{JobState, PersistenceBackend};
use crate::logging::log_warn;
use crate::schemas::{AnalyzeResponse, BatchJobListItem, BatchJobStatus, BatchRecordResult};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS batch_jobs (
    job_id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    total_records INTEGER NOT NULL,
    completed_count INTEGER NOT NULL DEFAULT 0,
    failed_count INTEGER NOT NULL DEFAULT 0,
    total_tokens_used INTEGER NOT NULL DEFAULT 0,
    failure_message TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS batch_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL,
    record_index INTEGER NOT NULL,
    success INTEGER NOT NULL,
    response_json TEXT,
    error TEXT,
    FOREIGN KEY (job_id) REFERENCES batch_jobs(job_id)
);
CREATE INDEX IF NOT EXISTS idx_batch_results_job_id ON batch_results(job_id);
";

/// Single-file embedded SQL backend over one guarded connection.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::StorageUnavailable`] if the parent directory
    /// cannot be created or the database cannot be opened.
    pub fn open(path: &Path) -> ServiceResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ServiceError::storage_unavailable(format!(
                        "Failed to create database directory: {e}"
                    ))
                })?;
            }
        }
        let conn = Connection::open(path).map_err(sql_err)?;
        conn.execute_batch(SCHEMA).map_err(sql_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> ServiceResult<Self> {
        let conn = Connection::open_in_memory().map_err(sql_err)?;
        conn.execute_batch(SCHEMA).map_err(sql_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // On lock poisoning (a panic while holding the connection), keep
        // serving: the connection itself is still in a usable state.
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn sql_err(error: rusqlite::Error) -> ServiceError {
    ServiceError::storage_unavailable(format!("SQLite error: {error}"))
}

fn parse_datetime(raw: &str) -> ServiceResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ServiceError::storage_unavailable(format!("Invalid stored timestamp: {e}")))
}

#[async_trait]
impl PersistenceBackend for SqliteBackend {
    async fn persist(&self, job: &JobState) -> ServiceResult<()> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(sql_err)?;

        tx.execute(
            "INSERT OR REPLACE INTO batch_jobs
                 (job_id, status, total_records, completed_count, failed_count,
                  total_tokens_used, failure_message, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                job.job_id,
                job.status.as_str(),
                job.total_records as i64,
                job.completed_count as i64,
                job.failed_count as i64,
                job.total_tokens_used as i64,
                job.failure_message,
                job.created_at.to_rfc3339(),
                job.updated_at.to_rfc3339(),
            ],
        )
        .map_err(sql_err)?;

        tx.execute(
            "DELETE FROM batch_results WHERE job_id = ?1",
            params![job.job_id],
        )
        .map_err(sql_err)?;

        {
            let mut insert = tx
                .prepare(
                    "INSERT INTO batch_results (job_id, record_index, success, response_json, error)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(sql_err)?;
            for result in &job.results {
                let response_json = match &result.response {
                    Some(response) => Some(serde_json::to_string(response).map_err(|e| {
                        ServiceError::storage_unavailable(format!(
                            "Failed to serialize record result: {e}"
                        ))
                    })?),
                    None => None,
                };
                insert
                    .execute(params![
                        job.job_id,
                        result.index as i64,
                        i64::from(result.success),
                        response_json,
                        result.error,
                    ])
                    .map_err(sql_err)?;
            }
        }

        tx.commit().map_err(sql_err)
    }

    async fn load(&self, job_id: &str) -> ServiceResult<Option<JobState>> {
        let conn = self.lock();

        let row = conn
            .query_row(
                "SELECT status, total_records, completed_count, failed_count,
                        total_tokens_used, failure_message, created_at, updated_at
                 FROM batch_jobs WHERE job_id = ?1",
                params![job_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()
            .map_err(sql_err)?;

        let Some((status, total, completed, failed, tokens, failure_message, created, updated)) =
            row
        else {
            return Ok(None);
        };

        let mut select = conn
            .prepare(
                "SELECT record_index, success, response_json, error
                 FROM batch_results WHERE job_id = ?1 ORDER BY id",
            )
            .map_err(sql_err)?;
        let rows = select
            .query_map(params![job_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .map_err(sql_err)?;

        let mut results = Vec::new();
        for row in rows {
            let (index, success, response_json, error) = row.map_err(sql_err)?;
            let success = success != 0;
            let response = if success {
                response_json.and_then(|raw| {
                    serde_json::from_str::<AnalyzeResponse>(&raw)
                        .map_err(|e| {
                            log_warn!(
                                job_id = %job_id,
                                record_index = index,
                                error = %e,
                                "Skipping unparseable stored record response"
                            );
                        })
                        .ok()
                })
            } else {
                None
            };
            results.push(BatchRecordResult {
                index: index as usize,
                success,
                response,
                error,
            });
        }

        Ok(Some(JobState {
            job_id: job_id.to_string(),
            status: BatchJobStatus::parse_lenient(&status),
            total_records: total as usize,
            completed_count: completed as usize,
            failed_count: failed as usize,
            total_tokens_used: tokens as u64,
            results,
            created_at: parse_datetime(&created)?,
            updated_at: parse_datetime(&updated)?,
            failure_message,
        }))
    }

    async fn list(&self, limit: usize) -> ServiceResult<Option<Vec<BatchJobListItem>>> {
        let conn = self.lock();
        let mut select = conn
            .prepare(
                "SELECT job_id, status, total_records, completed_count, failed_count,
                        total_tokens_used, created_at, updated_at
                 FROM batch_jobs ORDER BY created_at DESC LIMIT ?1",
            )
            .map_err(sql_err)?;
        let rows = select
            .query_map(params![limit as i64], |row| {
                Ok(BatchJobListItem {
                    job_id: row.get(0)?,
                    status: row.get(1)?,
                    total_records: row.get::<_, i64>(2)? as usize,
                    completed_count: row.get::<_, i64>(3)? as usize,
                    failed_count: row.get::<_, i64>(4)? as usize,
                    total_tokens_used: row.get::<_, i64>(5)? as u64,
                    created_at: Some(row.get::<_, String>(6)?),
                    updated_at: Some(row.get::<_, String>(7)?),
                })
            })
            .map_err(sql_err)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row.map_err(sql_err)?);
        }
        Ok(Some(items))
    }

    async fn probe(&self) -> ServiceResult<()> {
        let conn = self.lock();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(sql_err)?;
        Ok(())
    }
}
