//! Batch writer for the FleetStream warehouse
//!
//! Lands a micro-batch in the warehouse as a single insert, with each attempt
//! bounded by a write timeout. Transient failures (timeouts included) are
//! retried with exponential backoff, with the whole batch as the retry unit.
//! Once the attempt budget is spent, or on a non-retryable error, the failure
//! is surfaced to the caller so offsets stay uncommitted.

use std::sync::Arc;
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};

use crate::batch::FlushReason;
use crate::config::WarehouseConfig;
use crate::error::{Error, Result};
use crate::logging::Timer;
use crate::models::PositionEvent;
use crate::warehouse::position_repo::PositionRepository;
use crate::warehouse::repository::{RepositoryError, RetryConfig};

/// Ceiling on a single insert attempt, so a hung connection cannot stall
/// the pipeline indefinitely
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Writer that lands batches through the position repository
pub struct WarehouseWriter {
    repository: Arc<dyn PositionRepository>,
    retry: RetryConfig,
    write_timeout: Duration,
}

impl WarehouseWriter {
    /// Create a writer with default retry settings
    pub fn new(repository: Arc<dyn PositionRepository>) -> Self {
        Self::with_retry_config(repository, RetryConfig::default())
    }

    /// Create a writer with custom retry settings
    pub fn with_retry_config(repository: Arc<dyn PositionRepository>, retry: RetryConfig) -> Self {
        Self {
            repository,
            retry,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Set the per-attempt write timeout
    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Create a writer from warehouse configuration
    pub fn from_config(repository: Arc<dyn PositionRepository>, config: &WarehouseConfig) -> Self {
        Self::with_retry_config(
            repository,
            RetryConfig::new(config.write_max_retries)
                .with_initial_backoff(config.retry_base_ms)
                .with_max_backoff(config.retry_max_ms),
        )
        .with_write_timeout(config.write_timeout())
    }

    /// Write a batch to the warehouse
    ///
    /// Returns the number of rows actually inserted. Duplicate event IDs from
    /// re-delivered records are skipped by the warehouse and reduce the count
    /// without failing the batch.
    pub async fn write_batch(&self, events: &[PositionEvent], reason: FlushReason) -> Result<u64> {
        if events.is_empty() {
            return Ok(0);
        }

        let timer = Timer::start("warehouse_batch_write");
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(self.retry.initial_backoff_ms),
            max_interval: Duration::from_millis(self.retry.max_backoff_ms),
            multiplier: self.retry.multiplier,
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut attempt: u32 = 0;
        let rows_inserted = loop {
            let result =
                match tokio::time::timeout(self.write_timeout, self.repository.insert_batch(events))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(RepositoryError::Connection(format!(
                        "batch insert exceeded the {}s write timeout",
                        self.write_timeout.as_secs()
                    ))),
                };
            match result {
                Ok(rows) => break rows,
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = backoff
                        .next_backoff()
                        .unwrap_or(Duration::from_millis(self.retry.max_backoff_ms));
                    tracing::warn!(
                        attempt = attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        batch_size = events.len(),
                        error = %e,
                        "Batch write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                },
                Err(e) => {
                    tracing::error!(
                        batch_size = events.len(),
                        attempts = attempt + 1,
                        error = %e,
                        "Batch write failed permanently"
                    );
                    return Err(Error::from(e));
                },
            }
        };

        let duration = timer.stop();
        let duplicates_skipped = (events.len() as u64).saturating_sub(rows_inserted);
        tracing::info!(
            batch_size = events.len(),
            rows_inserted = rows_inserted,
            duplicates_skipped = duplicates_skipped,
            reason = %reason,
            duration_ms = duration.as_millis() as u64,
            "Batch written to warehouse"
        );

        Ok(rows_inserted)
    }
}
