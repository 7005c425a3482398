//! Core processing pipeline for FleetStream
//!
//! Owns the path from raw Kafka record to committed offset: decode and
//! validate the payload, update the in-memory latest-position table, buffer
//! the event for the next micro-batch, and flush batches to the warehouse.
//! Offsets become eligible for commit only after the batch that covers them
//! has been durably written. A record that cannot be decoded is skipped and
//! logged, but its offset still advances with the next successful flush.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;

use crate::batch::{BatchAggregator, FlushReason};
use crate::config::BatchConfig;
use crate::error::Result;
use crate::models::{PositionEvent, RawPosition};
use crate::state::VehicleStateTable;
use crate::warehouse::WarehouseWriter;

/// Highest observed offset per partition since the last successful flush
///
/// These are the offsets that become safe to commit once the covering batch
/// has landed in the warehouse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingOffsets {
    offsets: HashMap<i32, i64>,
}

impl PendingOffsets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a processed offset, keeping the highest per partition
    pub fn observe(&mut self, partition: i32, offset: i64) {
        self.offsets
            .entry(partition)
            .and_modify(|existing| *existing = (*existing).max(offset))
            .or_insert(offset);
    }

    /// Highest observed offset for a partition
    pub fn get(&self, partition: i32) -> Option<i64> {
        self.offsets.get(&partition).copied()
    }

    /// Whether any offset has been observed
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Number of partitions with observed offsets
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Iterate over (partition, highest offset) pairs
    pub fn iter(&self) -> impl Iterator<Item = (i32, i64)> + '_ {
        self.offsets.iter().map(|(&partition, &offset)| (partition, offset))
    }

    /// Take the accumulated offsets, leaving this tracker empty
    pub fn take(&mut self) -> PendingOffsets {
        PendingOffsets {
            offsets: std::mem::take(&mut self.offsets),
        }
    }
}

/// Outcome of ingesting a single raw record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Record decoded and buffered for the next batch
    Accepted,
    /// Record skipped, offset still tracked for commit
    Skipped,
}

/// Counters exposed through the operations API
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub records_ingested: AtomicU64,
    pub records_accepted: AtomicU64,
    pub records_skipped: AtomicU64,
    pub batches_written: AtomicU64,
    pub rows_inserted: AtomicU64,
    pub duplicates_skipped: AtomicU64,
    pub flushes_size: AtomicU64,
    pub flushes_deadline: AtomicU64,
    pub flushes_drain: AtomicU64,
    pub offset_commits: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_flush(&self, reason: FlushReason) {
        let counter = match reason {
            FlushReason::Size => &self.flushes_size,
            FlushReason::Deadline => &self.flushes_deadline,
            FlushReason::Drain => &self.flushes_drain,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_ingested: self.records_ingested.load(Ordering::Relaxed),
            records_accepted: self.records_accepted.load(Ordering::Relaxed),
            records_skipped: self.records_skipped.load(Ordering::Relaxed),
            batches_written: self.batches_written.load(Ordering::Relaxed),
            rows_inserted: self.rows_inserted.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            flushes_size: self.flushes_size.load(Ordering::Relaxed),
            flushes_deadline: self.flushes_deadline.load(Ordering::Relaxed),
            flushes_drain: self.flushes_drain.load(Ordering::Relaxed),
            offset_commits: self.offset_commits.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the pipeline counters
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub records_ingested: u64,
    pub records_accepted: u64,
    pub records_skipped: u64,
    pub batches_written: u64,
    pub rows_inserted: u64,
    pub duplicates_skipped: u64,
    pub flushes_size: u64,
    pub flushes_deadline: u64,
    pub flushes_drain: u64,
    pub offset_commits: u64,
}

/// Decode a raw record payload into a validated position event
fn decode_position(payload: &[u8], partition: i32, offset: i64) -> Result<PositionEvent> {
    let raw: RawPosition = serde_json::from_slice(payload)?;
    let event = PositionEvent::try_from(raw)?;
    Ok(event.with_source(partition, offset))
}

/// The record-to-warehouse processing pipeline
pub struct Pipeline {
    aggregator: BatchAggregator,
    writer: WarehouseWriter,
    state: VehicleStateTable,
    pending: PendingOffsets,
    metrics: Arc<PipelineMetrics>,
}

impl Pipeline {
    pub fn new(
        writer: WarehouseWriter,
        state: VehicleStateTable,
        config: &BatchConfig,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            aggregator: BatchAggregator::new(config),
            writer,
            state,
            pending: PendingOffsets::new(),
            metrics,
        }
    }

    /// Ingest one raw record from the stream
    ///
    /// A payload that fails to decode or validate is logged and skipped.
    /// Either way the record's offset is tracked, so a poison record cannot
    /// wedge the partition.
    pub async fn ingest(
        &mut self,
        payload: Option<&[u8]>,
        partition: i32,
        offset: i64,
    ) -> IngestOutcome {
        self.metrics.records_ingested.fetch_add(1, Ordering::Relaxed);
        self.pending.observe(partition, offset);

        let payload = match payload {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => {
                tracing::warn!(partition, offset, "Skipping record with empty payload");
                self.metrics.records_skipped.fetch_add(1, Ordering::Relaxed);
                return IngestOutcome::Skipped;
            },
        };

        match decode_position(payload, partition, offset) {
            Ok(event) => {
                self.state.apply(event.clone()).await;
                self.aggregator.push(event);
                self.metrics.records_accepted.fetch_add(1, Ordering::Relaxed);
                IngestOutcome::Accepted
            },
            Err(e) => {
                tracing::warn!(
                    partition,
                    offset,
                    error = %e,
                    "Skipping record that failed to decode"
                );
                self.metrics.records_skipped.fetch_add(1, Ordering::Relaxed);
                IngestOutcome::Skipped
            },
        }
    }

    /// Check whether the buffer is due for a flush
    pub fn flush_due(&self) -> Option<FlushReason> {
        self.aggregator.flush_reason()
    }

    /// Instant at which the wait trigger fires for the current buffer
    pub fn next_deadline(&self) -> Option<Instant> {
        self.aggregator.next_deadline()
    }

    /// Number of buffered events awaiting a flush
    pub fn buffered(&self) -> usize {
        self.aggregator.len()
    }

    /// Flush buffered events to the warehouse
    ///
    /// On success, returns the offsets that are now safe to commit. If the
    /// write ultimately fails the buffered events are restored and no offsets
    /// are released, so nothing gets committed ahead of a durable write.
    /// Returns `Ok(None)` when there is neither buffered work nor a pending
    /// offset.
    pub async fn flush(&mut self, reason: FlushReason) -> Result<Option<PendingOffsets>> {
        if self.aggregator.is_empty() && self.pending.is_empty() {
            return Ok(None);
        }

        let events = self.aggregator.drain();
        if !events.is_empty() {
            match self.writer.write_batch(&events, reason).await {
                Ok(rows_inserted) => {
                    self.metrics.batches_written.fetch_add(1, Ordering::Relaxed);
                    self.metrics.rows_inserted.fetch_add(rows_inserted, Ordering::Relaxed);
                    self.metrics.duplicates_skipped.fetch_add(
                        (events.len() as u64).saturating_sub(rows_inserted),
                        Ordering::Relaxed,
                    );
                    self.metrics.record_flush(reason);
                },
                Err(e) => {
                    // Put the batch back so a later flush covers the same
                    // offsets; nothing is committed for an unwritten batch
                    for event in events {
                        self.aggregator.push(event);
                    }
                    return Err(e);
                },
            }
        }

        let pending = self.pending.take();
        if pending.is_empty() {
            Ok(None)
        } else {
            Ok(Some(pending))
        }
    }

    /// Metrics handle shared with the operations API
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }
}
