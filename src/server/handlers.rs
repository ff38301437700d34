//! API route handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::logging::log_info;
use crate::schemas::{
    AnalyzeRequest, AnalyzeResponse, BatchAnalyzeRequest, BatchJobListResponse, BatchJobResponse,
    BatchJobStatus, BatchStatusResponse, BATCH_MAX_RECORDS,
};
use crate::server::AppState;

/// Root endpoint with API information.
pub async fn root_handler() -> Json<Value> {
    Json(json!({
        "service": "Smart Summary & Insight Service",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "analyze": "/api/v1/analyze",
            "batch_analyze": "/api/v1/batch/analyze",
            "batch_status": "/api/v1/batch/{job_id}/status",
            "batch_jobs": "/api/v1/batch/jobs",
            "health": "/api/v1/health",
            "ready": "/api/v1/ready",
        }
    }))
}

/// Analyze structured data and free-text notes.
///
/// Returns a concise summary, extracted insights, suggested next actions,
/// and analysis metadata. Notes arrive already normalised (trimmed, empties
/// dropped); a request left with no notes is a 400.
pub async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, (StatusCode, String)> {
    if request.notes.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "At least one note is required".to_string(),
        ));
    }

    match state.analysis.analyze(request.data(), &request.notes).await {
        Ok(response) => Ok(Json(response)),
        Err(error) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("AI processing failed: {error}"),
        )),
    }
}

/// Submit a batch of up to 500 records for analysis.
///
/// Returns immediately with a `job_id`; processing happens on a background
/// task. Use `GET /api/v1/batch/{job_id}/status` to track progress and
/// retrieve (partial) results.
pub async fn batch_analyze_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchAnalyzeRequest>,
) -> Result<(StatusCode, Json<BatchJobResponse>), (StatusCode, String)> {
    let records = request.records;
    if records.is_empty() || records.len() > BATCH_MAX_RECORDS {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Batch must contain between 1 and {BATCH_MAX_RECORDS} records"),
        ));
    }

    let total_records = records.len();
    let job_id = state.store.create_job(total_records).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to create batch job: {e}"),
        )
    })?;

    let dispatcher = state.dispatcher.clone();
    let background_job_id = job_id.clone();
    tokio::spawn(async move { dispatcher.run_batch(background_job_id, records).await });

    log_info!(job_id = %job_id, total_records, "Batch job submitted");

    Ok((
        StatusCode::ACCEPTED,
        Json(BatchJobResponse {
            job_id,
            status: BatchJobStatus::Accepted,
            total_records,
            message: "Batch accepted. Use GET /api/v1/batch/{job_id}/status to track progress."
                .to_string(),
        }),
    ))
}

/// Get progress and (partial) results for a batch job.
pub async fn batch_status_handler(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<BatchStatusResponse>, (StatusCode, String)> {
    match state.store.get_status_response(&job_id).await {
        Some(status) => Ok(Json(status)),
        None => Err((StatusCode::NOT_FOUND, format!("Job not found: {job_id}"))),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub limit: Option<i64>,
}

/// List persisted batch jobs, most recent first. Out-of-range limits fall
/// back to 50.
pub async fn batch_list_jobs_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListJobsQuery>,
) -> Json<BatchJobListResponse> {
    let limit = match query.limit {
        Some(value) if (1..=200).contains(&value) => value as usize,
        _ => 50,
    };
    let jobs = state.store.list_jobs(limit).await;
    Json(BatchJobListResponse { jobs })
}

/// Health check endpoint (liveness).
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "Smart Summary & Insight Service",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness probe: 200 only when the persistence backend can serve traffic.
pub async fn readiness_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, String)> {
    match state.store.readiness().await {
        Ok(()) => Ok(Json(json!({ "status": "ready" }))),
        Err(error) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Storage not ready: {error}"),
        )),
    }
}
