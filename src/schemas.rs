//! Request and response types for the analysis API.
//!
//! Everything that crosses the HTTP boundary lives here: the analyze
//! request/response pair, the batch job DTOs, and the job status enum.
//! `notes` normalisation (trim, drop empties, accept a bare string or an
//! array) happens exactly once, in the deserializer; the rest of the crate
//! treats `notes` as already normalised.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Maximum records accepted per batch.
pub const BATCH_MAX_RECORDS: usize = 500;

// ============================================================================
// Analyze request
// ============================================================================

/// Structured JSON data input (wrapper object on the wire).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredData {
    /// Structured JSON data (e.g., customer info, events, metadata).
    pub data: Map<String, Value>,
}

/// Request body for the `/analyze` endpoint and each batch record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    /// Optional structured JSON data.
    #[serde(default)]
    pub structured_data: Option<StructuredData>,

    /// Free-text notes. Accepts a single string or an array of strings;
    /// values are trimmed and empties dropped during deserialization.
    #[serde(deserialize_with = "deserialize_notes")]
    pub notes: Vec<String>,
}

impl AnalyzeRequest {
    /// The inner structured data map, if any.
    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.structured_data.as_ref().map(|s| &s.data)
    }
}

/// Accept `"note"` or `["note", ...]`; trim every entry and drop empties.
fn deserialize_notes<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NotesInput {
        One(String),
        Many(Vec<String>),
    }

    let raw = match NotesInput::deserialize(deserializer)? {
        NotesInput::One(s) => vec![s],
        NotesInput::Many(v) => v,
    };
    Ok(normalize_notes(&raw))
}

/// Trim notes and drop the ones that end up empty.
pub fn normalize_notes(notes: &[String]) -> Vec<String> {
    notes
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// Analysis result
// ============================================================================

/// Priority level attached to insights and next actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Parse a priority string leniently; anything unrecognized (including
    /// `None`) becomes the default `medium`.
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value {
            Some("high") => Self::High,
            Some("low") => Self::Low,
            _ => Self::Medium,
        }
    }
}

/// A single extracted insight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    /// Brief title of the insight.
    pub title: String,
    /// Detailed description.
    pub description: String,
    /// Category or type of insight.
    pub category: Option<String>,
    /// Priority level (high/medium/low).
    #[serde(default)]
    pub priority: Priority,
}

/// A suggested follow-up action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextAction {
    /// Description of the action.
    pub action: String,
    /// Priority level (high/medium/low).
    #[serde(default)]
    pub priority: Priority,
    /// Why this action is suggested.
    pub rationale: Option<String>,
}

/// Metadata about one analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Confidence score in `[0.0, 1.0]`.
    pub confidence_score: f64,
    /// LLM model version used.
    pub model_version: String,
    /// Processing time in milliseconds, measured entry-to-return.
    pub processing_time_ms: f64,
    /// Total tokens reported by the provider, when available.
    pub tokens_used: Option<u64>,
    /// Analysis timestamp (UTC).
    pub timestamp: DateTime<Utc>,
}

/// Response body for the `/analyze` endpoint and per-record batch results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    /// AI-generated concise summary.
    pub summary: String,
    /// Extracted key points.
    pub insights: Vec<Insight>,
    /// Suggested follow-up actions.
    pub next_actions: Vec<NextAction>,
    /// Analysis metadata.
    pub metadata: Metadata,
}

// ============================================================================
// Batch job types
// ============================================================================

/// Status of a batch job.
///
/// Transitions only move forward: `accepted → processing → {completed, failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchJobStatus {
    Accepted,
    Processing,
    Completed,
    Failed,
}

impl BatchJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse a persisted status string; unknown values hydrate as
    /// `completed`, matching how stale rows from older layouts are treated.
    pub fn parse_lenient(value: &str) -> Self {
        match value {
            "accepted" => Self::Accepted,
            "processing" => Self::Processing,
            "failed" => Self::Failed,
            _ => Self::Completed,
        }
    }
}

impl std::fmt::Display for BatchJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body for `/batch/analyze`: up to [`BATCH_MAX_RECORDS`] records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAnalyzeRequest {
    /// Records to analyze (1 to 500).
    pub records: Vec<AnalyzeRequest>,
}

/// Response when a batch job is submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJobResponse {
    /// Unique job identifier for progress tracking.
    pub job_id: String,
    /// Current job status.
    pub status: BatchJobStatus,
    /// Number of records in the batch.
    pub total_records: usize,
    /// Human-readable message.
    pub message: String,
}

/// Result for a single record in a batch.
///
/// Exactly one of `response` (success) or `error` (failure) is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRecordResult {
    /// Zero-based index of the record in the submitted batch.
    pub index: usize,
    /// Whether this record was processed successfully.
    pub success: bool,
    /// Analysis response when `success` is true.
    pub response: Option<AnalyzeResponse>,
    /// Error message when `success` is false.
    pub error: Option<String>,
}

/// Response for batch job status polls (progress and partial results).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatusResponse {
    /// Job identifier.
    pub job_id: String,
    /// Current job status.
    pub status: BatchJobStatus,
    /// Total records in the batch.
    pub total_records: usize,
    /// Records processed successfully so far.
    pub completed_count: usize,
    /// Records that failed.
    pub failed_count: usize,
    /// Progress percentage (0-100, two decimal places).
    pub progress_percent: f64,
    /// Total tokens used for this batch, for cost attribution.
    pub total_tokens_used: u64,
    /// Estimated cost for this batch, when pricing is configured.
    pub estimated_cost: Option<f64>,
    /// Per-record results, present once at least one record has finished.
    /// Appended in completion order; sort on `index` to reconstruct
    /// submission order.
    pub results: Option<Vec<BatchRecordResult>>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// Last status update.
    pub updated_at: DateTime<Utc>,
}

/// Single row of the persisted-jobs listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJobListItem {
    /// Job identifier.
    pub job_id: String,
    /// Job status (accepted/processing/completed/failed).
    pub status: String,
    /// Total records in the batch.
    pub total_records: usize,
    /// Records completed successfully.
    pub completed_count: usize,
    /// Records that failed.
    pub failed_count: usize,
    /// Total tokens used for the batch.
    pub total_tokens_used: u64,
    /// Created timestamp (RFC 3339).
    pub created_at: Option<String>,
    /// Last updated timestamp (RFC 3339).
    pub updated_at: Option<String>,
}

/// Response for the persisted-jobs listing (most recent first).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJobListResponse {
    /// Batch jobs, most recent first.
    pub jobs: Vec<BatchJobListItem>,
}
