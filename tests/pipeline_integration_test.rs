//! Integration tests for the FleetStream ingest pipeline
//!
//! These tests drive raw payloads through ingest, batching, and flushing
//! against a mock repository, and verify that offsets are only released
//! for commit after their batch has durably landed.

use std::sync::Arc;

use chrono::Utc;
use fleetstream::batch::FlushReason;
use fleetstream::config::BatchConfig;
use fleetstream::models::RawPosition;
use fleetstream::pipeline::{IngestOutcome, Pipeline, PipelineMetrics};
use fleetstream::state::VehicleStateTable;
use fleetstream::test_utils::MockPositionRepository;
use fleetstream::warehouse::{RetryConfig, WarehouseWriter};
use tokio::time::{advance, Duration};

/// Build a pipeline over a mock repository with fast retry backoff
fn test_pipeline(
    repository: Arc<MockPositionRepository>,
    max_retries: u32,
) -> (Pipeline, VehicleStateTable, Arc<PipelineMetrics>) {
    let writer = WarehouseWriter::with_retry_config(
        repository,
        RetryConfig::new(max_retries)
            .with_initial_backoff(10)
            .with_max_backoff(50),
    );
    let state = VehicleStateTable::new();
    let metrics = Arc::new(PipelineMetrics::new());
    let config = BatchConfig {
        max_batch_size: 10,
        max_batch_wait_ms: 5000,
    };
    let pipeline = Pipeline::new(writer, state.clone(), &config, metrics.clone());
    (pipeline, state, metrics)
}

/// Serialized wire payload for a vehicle, returning its event id
fn position_payload(vehicle_id: &str) -> (Vec<u8>, String) {
    let raw = RawPosition::new(
        vehicle_id.to_string(),
        Utc::now().timestamp(),
        37.7749,
        -122.4194,
    );
    let event_id = raw.event_id.clone();
    (serde_json::to_vec(&raw).unwrap(), event_id)
}

#[tokio::test(start_paused = true)]
async fn test_deadline_flush_commits_latest_state() {
    let repository = Arc::new(MockPositionRepository::new());
    let (mut pipeline, state, metrics) = test_pipeline(repository.clone(), 0);

    let mut last_event_id = String::new();
    for offset in 0..3 {
        let (payload, event_id) = position_payload("VEH-0001");
        last_event_id = event_id;
        let outcome = pipeline.ingest(Some(&payload), 0, offset).await;
        assert_eq!(outcome, IngestOutcome::Accepted);
    }

    // Three buffered records trigger neither the size nor the wait limit
    assert_eq!(pipeline.buffered(), 3);
    assert!(pipeline.flush_due().is_none());

    advance(Duration::from_millis(5001)).await;
    assert_eq!(pipeline.flush_due(), Some(FlushReason::Deadline));

    let committable = pipeline
        .flush(FlushReason::Deadline)
        .await
        .expect("flush should succeed")
        .expect("offsets should be released");

    // One batch of three rows, offsets released up to the last record
    assert_eq!(committable.get(0), Some(2));
    let batches = repository.recorded_batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 3);

    // The state table holds the latest event for the vehicle
    let current = state.get("VEH-0001").await.unwrap();
    assert_eq!(current.event_id.to_string(), last_event_id);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.records_accepted, 3);
    assert_eq!(snapshot.flushes_deadline, 1);
    assert_eq!(snapshot.rows_inserted, 3);
}

#[tokio::test]
async fn test_size_trigger_flushes_full_batch() {
    let repository = Arc::new(MockPositionRepository::new());
    let (mut pipeline, state, metrics) = test_pipeline(repository.clone(), 0);

    for offset in 0..10 {
        let (payload, _) = position_payload(&format!("VEH-{:04}", offset + 1));
        pipeline.ingest(Some(&payload), 0, offset).await;
    }

    assert_eq!(pipeline.flush_due(), Some(FlushReason::Size));

    let committable = pipeline
        .flush(FlushReason::Size)
        .await
        .unwrap()
        .expect("offsets should be released");
    assert_eq!(committable.get(0), Some(9));

    let batches = repository.recorded_batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 10);

    assert_eq!(state.len().await, 10);
    assert_eq!(metrics.snapshot().flushes_size, 1);
}

#[tokio::test]
async fn test_latest_state_overwrites_per_vehicle() {
    let repository = Arc::new(MockPositionRepository::new());
    let (mut pipeline, state, _metrics) = test_pipeline(repository.clone(), 0);

    let (first, _) = position_payload("VEH-0001");
    let (other, _) = position_payload("VEH-0002");
    let (second, second_id) = position_payload("VEH-0001");

    pipeline.ingest(Some(&first), 0, 0).await;
    pipeline.ingest(Some(&other), 0, 1).await;
    pipeline.ingest(Some(&second), 0, 2).await;

    // Two vehicles tracked, the later record wins for VEH-0001
    assert_eq!(state.len().await, 2);
    let current = state.get("VEH-0001").await.unwrap();
    assert_eq!(current.event_id.to_string(), second_id);

    // The batch is append-only: all three rows flush
    pipeline.flush(FlushReason::Drain).await.unwrap();
    assert_eq!(repository.recorded_batches()[0].len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_write_failure_retries_then_succeeds() {
    let repository = Arc::new(MockPositionRepository::new());
    let (mut pipeline, _state, metrics) = test_pipeline(repository.clone(), 3);

    repository.fail_next_operations(2, "connection reset");

    let (payload, _) = position_payload("VEH-0001");
    pipeline.ingest(Some(&payload), 0, 0).await;

    let committable = pipeline
        .flush(FlushReason::Drain)
        .await
        .expect("flush should succeed after retries")
        .expect("offsets should be released");

    assert_eq!(committable.get(0), Some(0));
    assert_eq!(repository.insert_attempts(), 3);
    assert_eq!(metrics.snapshot().batches_written, 1);
}

#[tokio::test]
async fn test_write_failure_holds_offsets_until_durable() {
    let repository = Arc::new(MockPositionRepository::new());
    let (mut pipeline, state, _metrics) = test_pipeline(repository.clone(), 0);

    repository.fail_next_operations(1, "connection reset");

    let (payload, _) = position_payload("VEH-0001");
    pipeline.ingest(Some(&payload), 0, 0).await;

    // First flush fails: nothing is committable and the batch is retained
    let result = pipeline.flush(FlushReason::Size).await;
    assert!(result.is_err());
    assert_eq!(pipeline.buffered(), 1);

    // The in-memory table was updated at ingest and stays queryable
    assert!(state.get("VEH-0001").await.is_some());

    // A later flush lands the same batch and releases the same offsets
    let committable = pipeline
        .flush(FlushReason::Deadline)
        .await
        .unwrap()
        .expect("offsets should be released after the durable write");
    assert_eq!(committable.get(0), Some(0));
    assert_eq!(repository.insert_attempts(), 2);
    assert_eq!(repository.all_positions().len(), 1);
}

#[tokio::test]
async fn test_replayed_duplicates_are_skipped_by_warehouse() {
    let repository = Arc::new(MockPositionRepository::new());
    let (mut pipeline, _state, metrics) = test_pipeline(repository.clone(), 0);

    // The same event arrives twice, as after a replay from an old commit
    let (payload, _) = position_payload("VEH-0001");
    pipeline.ingest(Some(&payload), 0, 0).await;
    pipeline.ingest(Some(&payload), 0, 1).await;

    let committable = pipeline
        .flush(FlushReason::Drain)
        .await
        .unwrap()
        .expect("offsets should be released");
    assert_eq!(committable.get(0), Some(1));

    // Only one row lands; the duplicate is dropped on event id
    assert_eq!(repository.all_positions().len(), 1);
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.rows_inserted, 1);
    assert_eq!(snapshot.duplicates_skipped, 1);
}

#[tokio::test]
async fn test_poison_record_releases_offset_without_write() {
    let repository = Arc::new(MockPositionRepository::new());
    let (mut pipeline, _state, metrics) = test_pipeline(repository.clone(), 0);

    let outcome = pipeline.ingest(Some(b"not valid json"), 0, 7).await;
    assert_eq!(outcome, IngestOutcome::Skipped);

    let outcome = pipeline.ingest(None, 0, 8).await;
    assert_eq!(outcome, IngestOutcome::Skipped);

    assert_eq!(pipeline.buffered(), 0);

    // Skipped offsets are still released so the partition advances
    let committable = pipeline
        .flush(FlushReason::Drain)
        .await
        .unwrap()
        .expect("skipped offsets should be released");
    assert_eq!(committable.get(0), Some(8));

    assert_eq!(repository.insert_attempts(), 0);
    assert_eq!(metrics.snapshot().records_skipped, 2);
}

#[tokio::test]
async fn test_flush_without_work_is_a_noop() {
    let repository = Arc::new(MockPositionRepository::new());
    let (mut pipeline, _state, _metrics) = test_pipeline(repository.clone(), 0);

    let committable = pipeline.flush(FlushReason::Deadline).await.unwrap();
    assert!(committable.is_none());
    assert_eq!(repository.insert_attempts(), 0);
}

#[tokio::test]
async fn test_drain_flushes_partial_batch() {
    let repository = Arc::new(MockPositionRepository::new());
    let (mut pipeline, _state, metrics) = test_pipeline(repository.clone(), 0);

    for offset in 0..4 {
        let (payload, _) = position_payload(&format!("VEH-{:04}", offset + 1));
        pipeline.ingest(Some(&payload), 0, offset).await;
    }
    assert!(pipeline.flush_due().is_none());

    // Shutdown flushes whatever is buffered regardless of the triggers
    let committable = pipeline
        .flush(FlushReason::Drain)
        .await
        .unwrap()
        .expect("offsets should be released");
    assert_eq!(committable.get(0), Some(3));
    assert_eq!(repository.recorded_batches()[0].len(), 4);
    assert_eq!(metrics.snapshot().flushes_drain, 1);
}

#[tokio::test]
async fn test_offsets_tracked_per_partition() {
    let repository = Arc::new(MockPositionRepository::new());
    let (mut pipeline, _state, _metrics) = test_pipeline(repository.clone(), 0);

    let (a, _) = position_payload("VEH-0001");
    let (b, _) = position_payload("VEH-0002");
    let (c, _) = position_payload("VEH-0003");

    pipeline.ingest(Some(&a), 0, 41).await;
    pipeline.ingest(Some(&b), 2, 7).await;
    pipeline.ingest(Some(&c), 0, 42).await;

    let committable = pipeline
        .flush(FlushReason::Drain)
        .await
        .unwrap()
        .expect("offsets should be released");

    assert_eq!(committable.len(), 2);
    assert_eq!(committable.get(0), Some(42));
    assert_eq!(committable.get(2), Some(7));
}
