// Unit Tests for JobStore and its persistence backends
//
// UNIT UNDER TEST: JobStore over MemoryBackend / FileBackend / SqliteBackend
//
// TEST COVERAGE:
//   - Lifecycle, counters, and the progress formula
//   - Status lattice: forward-only transitions, idempotent terminals
//   - Backend equivalence: one mutation script, equal status views
//   - Hydration round-trip through a fresh store
//   - Cost estimation (50/50 split) and job listing

use serde_json::json;
use tempfile::TempDir;

use crate::jobs::{FileBackend, JobStore, MemoryBackend, SqliteBackend};
use crate::schemas::BatchJobStatus;
use crate::tests::helpers::sample_response;

fn memory_store() -> JobStore {
    JobStore::new(Box::new(MemoryBackend), None, None)
}

fn file_store(dir: &TempDir) -> JobStore {
    JobStore::new(
        Box::new(FileBackend::new(dir.path().to_path_buf())),
        None,
        None,
    )
}

fn sqlite_store(dir: &TempDir) -> JobStore {
    JobStore::new(
        Box::new(SqliteBackend::open(&dir.path().join("batch.db")).expect("open sqlite")),
        None,
        None,
    )
}

/// Run one fixed mutation script and return the job id.
async fn replay_script(store: &JobStore) -> String {
    let job_id = store.create_job(3).await.expect("create job");
    assert!(store.set_processing(&job_id).await);
    assert!(
        store
            .append_result(&job_id, 0, true, Some(sample_response(Some(100))), None, Some(100))
            .await
    );
    assert!(
        store
            .append_result(&job_id, 2, false, None, Some("model refused".to_string()), None)
            .await
    );
    assert!(
        store
            .append_result(&job_id, 1, true, Some(sample_response(Some(50))), None, Some(50))
            .await
    );
    assert!(store.set_job_completed(&job_id).await);
    job_id
}

#[tokio::test]
async fn lifecycle_updates_counts_and_progress() {
    let store = memory_store();
    let job_id = store.create_job(4).await.expect("create job");

    let view = store.get_status_response(&job_id).await.expect("view");
    assert_eq!(view.status, BatchJobStatus::Accepted);
    assert_eq!(view.progress_percent, 0.0);
    assert!(view.results.is_none(), "No results before any append");

    store.set_processing(&job_id).await;
    store
        .append_result(&job_id, 0, true, Some(sample_response(None)), None, Some(10))
        .await;

    let view = store.get_status_response(&job_id).await.expect("view");
    assert_eq!(view.status, BatchJobStatus::Processing);
    assert_eq!(view.completed_count, 1);
    assert_eq!(view.failed_count, 0);
    assert_eq!(view.progress_percent, 25.0);
    assert_eq!(view.results.as_ref().map(Vec::len), Some(1));

    store
        .append_result(&job_id, 1, false, None, Some("boom".to_string()), None)
        .await;
    let view = store.get_status_response(&job_id).await.expect("view");
    assert_eq!(view.failed_count, 1);
    assert_eq!(view.progress_percent, 50.0);
}

#[tokio::test]
async fn progress_rounds_to_two_decimals() {
    let store = memory_store();
    let job_id = store.create_job(3).await.expect("create job");
    store.set_processing(&job_id).await;
    store
        .append_result(&job_id, 0, true, Some(sample_response(None)), None, None)
        .await;

    let view = store.get_status_response(&job_id).await.expect("view");
    assert_eq!(view.progress_percent, 33.33);
}

#[tokio::test]
async fn zero_total_records_reports_zero_progress() {
    let store = memory_store();
    let job_id = store.create_job(0).await.expect("create job");
    let view = store.get_status_response(&job_id).await.expect("view");
    assert_eq!(view.progress_percent, 0.0);
}

#[tokio::test]
async fn status_transitions_are_forward_only() {
    let store = memory_store();
    let job_id = store.create_job(1).await.expect("create job");

    store.set_processing(&job_id).await;
    store.set_job_completed(&job_id).await;

    // Terminal state cannot be re-entered or changed.
    store.set_job_failed(&job_id, Some("too late".to_string())).await;
    store.set_processing(&job_id).await;

    let view = store.get_status_response(&job_id).await.expect("view");
    assert_eq!(view.status, BatchJobStatus::Completed);
}

#[tokio::test]
async fn set_job_completed_is_idempotent() {
    let store = memory_store();
    let job_id = store.create_job(1).await.expect("create job");
    store.set_processing(&job_id).await;

    store.set_job_completed(&job_id).await;
    let first = store.get_status_response(&job_id).await.expect("view");

    store.set_job_completed(&job_id).await;
    let second = store.get_status_response(&job_id).await.expect("view");

    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap(),
        "Second completion must leave the state unchanged"
    );
}

#[tokio::test]
async fn failed_jobs_record_the_failure_message() {
    let store = memory_store();
    let job_id = store.create_job(2).await.expect("create job");
    store.set_processing(&job_id).await;
    store
        .set_job_failed(&job_id, Some("dispatcher panicked".to_string()))
        .await;

    let job = store.get_job(&job_id).await.expect("job");
    assert_eq!(job.status, BatchJobStatus::Failed);
    assert_eq!(job.failure_message.as_deref(), Some("dispatcher panicked"));
}

#[tokio::test]
async fn unknown_jobs_return_absent_everywhere() {
    let store = memory_store();
    assert!(store.get_status_response("no-such-job").await.is_none());
    assert!(!store.set_processing("no-such-job").await);
    assert!(!store.set_job_completed("no-such-job").await);
    assert!(
        !store
            .append_result("no-such-job", 0, true, None, None, None)
            .await
    );
}

#[tokio::test]
async fn all_backends_produce_equal_status_views() {
    let file_dir = TempDir::new().expect("tempdir");

    let stores = [
        memory_store(),
        file_store(&file_dir),
        JobStore::new(
            Box::new(SqliteBackend::open_in_memory().expect("open sqlite")),
            None,
            None,
        ),
    ];

    let mut views = Vec::new();
    for store in &stores {
        let job_id = replay_script(store).await;
        views.push(store.get_status_response(&job_id).await.expect("view"));
    }

    for view in &views {
        assert_eq!(view.status, BatchJobStatus::Completed);
        assert_eq!(view.total_records, 3);
        assert_eq!(view.completed_count, 2);
        assert_eq!(view.failed_count, 1);
        assert_eq!(view.progress_percent, 100.0);
        assert_eq!(view.total_tokens_used, 150);
        let results = view.results.as_ref().expect("results present");
        assert_eq!(results.len(), 3);
        // Appends are in completion order and carry the original indices.
        assert_eq!(
            results.iter().map(|r| r.index).collect::<Vec<_>>(),
            vec![0, 2, 1]
        );
        assert!(results[0].success && results[0].response.is_some());
        assert!(!results[1].success);
        assert_eq!(results[1].error.as_deref(), Some("model refused"));
        assert!(results[1].response.is_none());
    }
}

#[tokio::test]
async fn concurrent_appends_keep_counters_consistent() {
    use std::sync::Arc;

    let store = Arc::new(memory_store());
    let job_id = store.create_job(20).await.expect("create job");
    store.set_processing(&job_id).await;

    let tasks = (0..20usize).map(|i| {
        let store = store.clone();
        let job_id = job_id.clone();
        async move {
            if i % 4 == 0 {
                store
                    .append_result(&job_id, i, false, None, Some("flaked".to_string()), None)
                    .await
            } else {
                store
                    .append_result(&job_id, i, true, Some(sample_response(Some(1))), None, Some(1))
                    .await
            }
        }
    });
    futures_util::future::join_all(tasks).await;

    let view = store.get_status_response(&job_id).await.expect("view");
    assert_eq!(view.completed_count, 15);
    assert_eq!(view.failed_count, 5);
    assert_eq!(view.total_tokens_used, 15);
    assert_eq!(view.progress_percent, 100.0);
    assert_eq!(view.results.as_ref().map(Vec::len), Some(20));
}

#[tokio::test]
async fn file_backend_round_trips_through_a_fresh_store() {
    let dir = TempDir::new().expect("tempdir");

    let store = file_store(&dir);
    let job_id = replay_script(&store).await;
    let original = store.get_status_response(&job_id).await.expect("view");

    // A brand-new store over the same directory hydrates the job from disk.
    let reopened = file_store(&dir);
    let hydrated = reopened
        .get_status_response(&job_id)
        .await
        .expect("hydrated view");

    assert_eq!(
        serde_json::to_value(&original).unwrap(),
        serde_json::to_value(&hydrated).unwrap()
    );
}

#[tokio::test]
async fn sqlite_backend_round_trips_through_a_fresh_store() {
    let dir = TempDir::new().expect("tempdir");

    let store = sqlite_store(&dir);
    let job_id = replay_script(&store).await;
    let original = store.get_status_response(&job_id).await.expect("view");

    let reopened = sqlite_store(&dir);
    let hydrated = reopened
        .get_status_response(&job_id)
        .await
        .expect("hydrated view");

    assert_eq!(
        serde_json::to_value(&original).unwrap(),
        serde_json::to_value(&hydrated).unwrap()
    );
}

#[tokio::test]
async fn cost_estimate_uses_the_documented_half_split() {
    let store = JobStore::new(Box::new(MemoryBackend), Some(0.8), Some(4.0));
    let job_id = store.create_job(1).await.expect("create job");
    store.set_processing(&job_id).await;
    store
        .append_result(&job_id, 0, true, Some(sample_response(Some(1000))), None, Some(1000))
        .await;

    let view = store.get_status_response(&job_id).await.expect("view");
    // (1000/2)/1000 * 0.8 + (1000/2)/1000 * 4.0 = 0.4 + 2.0
    assert_eq!(view.estimated_cost, Some(2.4));
}

#[tokio::test]
async fn cost_estimate_is_absent_without_pricing_or_tokens() {
    let unpriced = memory_store();
    let job_id = unpriced.create_job(1).await.expect("create job");
    unpriced
        .append_result(&job_id, 0, true, Some(sample_response(Some(1000))), None, Some(1000))
        .await;
    let view = unpriced.get_status_response(&job_id).await.expect("view");
    assert_eq!(view.estimated_cost, None);

    let priced = JobStore::new(Box::new(MemoryBackend), Some(0.8), None);
    let job_id = priced.create_job(1).await.expect("create job");
    let view = priced.get_status_response(&job_id).await.expect("view");
    assert_eq!(view.estimated_cost, None, "No tokens used yet");
}

#[tokio::test]
async fn list_jobs_is_most_recent_first_and_bounded() {
    let dir = TempDir::new().expect("tempdir");
    let store = sqlite_store(&dir);

    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(store.create_job(1).await.expect("create job"));
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let rows = store.list_jobs(2).await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].job_id, ids[2], "Newest job first");
    assert_eq!(rows[1].job_id, ids[1]);
}

#[tokio::test]
async fn memory_listing_comes_from_the_in_memory_map() {
    let store = memory_store();
    let first = store.create_job(1).await.expect("create job");
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = store.create_job(2).await.expect("create job");

    let rows = store.list_jobs(50).await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].job_id, second);
    assert_eq!(rows[1].job_id, first);
    assert_eq!(rows[0].status, "accepted");
}

#[tokio::test]
async fn unknown_persisted_status_hydrates_as_completed() {
    assert_eq!(
        BatchJobStatus::parse_lenient("archived"),
        BatchJobStatus::Completed
    );
    assert_eq!(
        BatchJobStatus::parse_lenient("processing"),
        BatchJobStatus::Processing
    );
}

#[tokio::test]
async fn readiness_reflects_backend_health() {
    let store = memory_store();
    assert!(store.readiness().await.is_ok());

    let dir = TempDir::new().expect("tempdir");
    let store = file_store(&dir);
    assert!(store.readiness().await.is_ok());

    // A storage path that collides with an existing file is not writable.
    let blocked = dir.path().join("blocked");
    std::fs::write(&blocked, b"not a directory").expect("write blocker");
    let store = JobStore::new(Box::new(FileBackend::new(blocked)), None, None);
    assert!(store.readiness().await.is_err());
}

#[tokio::test]
async fn file_payload_keeps_the_documented_keys() {
    let dir = TempDir::new().expect("tempdir");
    let store = file_store(&dir);
    let job_id = replay_script(&store).await;

    let raw = std::fs::read_to_string(dir.path().join(format!("{job_id}.json")))
        .expect("job document exists");
    let doc: serde_json::Value = serde_json::from_str(&raw).expect("valid JSON");

    for key in [
        "job_id",
        "status",
        "total_records",
        "completed_count",
        "failed_count",
        "total_tokens_used",
        "results",
        "created_at",
        "updated_at",
    ] {
        assert!(doc.get(key).is_some(), "missing key {key}");
    }
    assert_eq!(doc["status"], json!("completed"));
    assert_eq!(doc["results"].as_array().map(Vec::len), Some(3));
}
