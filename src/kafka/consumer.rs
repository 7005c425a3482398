//! Kafka position consumer with manual offset management

use super::{KafkaConfig, KafkaIntegrationError};
use crate::batch::FlushReason;
use crate::error::Result;
use crate::pipeline::{PendingOffsets, Pipeline, PipelineMetrics};
use crate::shutdown::ShutdownSignal;
use crate::warehouse::PositionRepository;
use futures::stream::StreamExt;
use futures::FutureExt;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::topic_partition_list::TopicPartitionList;
use rdkafka::Offset;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// Consumer that feeds position records into the processing pipeline
///
/// Offsets are committed strictly after the batch covering them has been
/// written to the warehouse. Auto-commit is disabled in the client config,
/// so a crash between write and commit replays records instead of losing
/// them.
pub struct PositionConsumer {
    /// Kafka consumer instance
    consumer: StreamConsumer,

    /// Decode, state and batching pipeline
    pipeline: Pipeline,

    /// Configuration
    config: KafkaConfig,

    /// Drain notification from the shutdown coordinator
    signal: ShutdownSignal,
}

impl PositionConsumer {
    /// Create a new position consumer subscribed to the configured topic
    pub fn new(config: KafkaConfig, pipeline: Pipeline, signal: ShutdownSignal) -> Result<Self> {
        let consumer: StreamConsumer = config
            .build_consumer_config()
            .create()
            .map_err(KafkaIntegrationError::Connection)?;

        consumer
            .subscribe(&[&config.topic])
            .map_err(|e| KafkaIntegrationError::Subscribe {
                topic: config.topic.clone(),
                source: e,
            })?;

        Ok(Self {
            consumer,
            pipeline,
            config,
            signal,
        })
    }

    /// Log broker watermarks and the warehouse's highest stored offsets
    ///
    /// Shows an operator the replay window before consumption starts.
    /// Failures here are logged and ignored; consumption proceeds regardless.
    pub async fn log_replay_window(&self, repository: &dyn PositionRepository) {
        let topic = &self.config.topic;
        let timeout = Duration::from_secs(5);

        let metadata = match self.consumer.fetch_metadata(Some(topic), timeout) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Could not fetch metadata for topic '{}': {}", topic, e);
                return;
            },
        };

        let partitions: Vec<i32> = metadata
            .topics()
            .iter()
            .filter(|t| t.name() == topic)
            .flat_map(|t| t.partitions().iter().map(|p| p.id()))
            .collect();

        for partition in partitions {
            let stored = match repository.get_latest_offset(partition).await {
                Ok(stored) => stored,
                Err(e) => {
                    warn!(partition, "Could not read stored offset: {}", e);
                    None
                },
            };

            match self.consumer.fetch_watermarks(topic, partition, timeout) {
                Ok((low, high)) => {
                    info!(partition, low, high, stored = ?stored, "Partition replay window");
                },
                Err(e) => {
                    warn!(partition, "Could not fetch watermarks: {}", e);
                },
            }
        }
    }

    /// Consume until a drain is requested, then flush and commit what is left
    ///
    /// Returns an error when a batch cannot be written within the retry
    /// budget or an offset commit fails. In both cases no offset past the
    /// failed batch has been committed, so a restart resumes from the last
    /// durable position.
    pub async fn run(self) -> Result<()> {
        let Self {
            consumer,
            mut pipeline,
            config,
            mut signal,
        } = self;

        info!(
            topic = %config.topic,
            group = %config.consumer_group,
            "Starting position consumer"
        );

        let metrics = pipeline.metrics();

        // Create stream from consumer
        let stream = consumer.stream();
        tokio::pin!(stream);

        loop {
            // Wake for the batch deadline if it lands before the poll ceiling
            let poll_ceiling = Instant::now() + config.poll_wait();
            let wake_at = match pipeline.next_deadline() {
                Some(deadline) => deadline.min(poll_ceiling),
                None => poll_ceiling,
            };

            tokio::select! {
                message = stream.next() => {
                    match message {
                        Some(Ok(msg)) => {
                            Self::ingest_message(&mut pipeline, &msg).await;

                            // Pull whatever the client has already fetched
                            // before re-checking the flush triggers
                            let mut taken = 1;
                            while taken < config.max_records_per_poll
                                && pipeline.flush_due().is_none()
                            {
                                match stream.next().now_or_never() {
                                    Some(Some(Ok(msg))) => {
                                        Self::ingest_message(&mut pipeline, &msg).await;
                                        taken += 1;
                                    },
                                    Some(Some(Err(e))) => {
                                        error!("Kafka consumer error: {}", e);
                                        break;
                                    },
                                    Some(None) | None => break,
                                }
                            }
                        },
                        Some(Err(e)) => {
                            error!("Kafka consumer error: {}", e);
                            sleep(Duration::from_millis(500)).await;
                        },
                        None => {
                            // No message available - keep polling
                        },
                    }
                },
                _ = sleep_until(wake_at) => {},
                _ = signal.draining() => break,
            }

            if let Some(reason) = pipeline.flush_due() {
                if let Some(committable) = pipeline.flush(reason).await? {
                    Self::commit(&consumer, &config.topic, &committable, &metrics)?;
                }
            }
        }

        // Final flush and commit before shutdown
        info!(
            buffered = pipeline.buffered(),
            "Drain requested, flushing buffered events"
        );
        if let Some(committable) = pipeline.flush(FlushReason::Drain).await? {
            Self::commit(&consumer, &config.topic, &committable, &metrics)?;
        }

        info!("Position consumer stopped");
        Ok(())
    }

    /// Hand a single record to the pipeline
    async fn ingest_message(pipeline: &mut Pipeline, message: &BorrowedMessage<'_>) {
        let partition = message.partition();
        let offset = message.offset();

        pipeline.ingest(message.payload(), partition, offset).await;
        debug!(partition, offset, "Ingested record");
    }

    /// Commit offsets for a durably written batch
    fn commit(
        consumer: &StreamConsumer,
        topic: &str,
        committable: &PendingOffsets,
        metrics: &PipelineMetrics,
    ) -> Result<()> {
        let list = commit_list(topic, committable)?;

        consumer
            .commit(&list, rdkafka::consumer::CommitMode::Sync)
            .map_err(KafkaIntegrationError::OffsetCommit)?;

        metrics.offset_commits.fetch_add(1, Ordering::Relaxed);
        debug!(partitions = committable.len(), "Committed offsets");
        Ok(())
    }
}

/// Build the commit list from released offsets
///
/// Kafka commits point at the next record to read, so each observed offset
/// is committed as offset + 1.
fn commit_list(topic: &str, committable: &PendingOffsets) -> Result<TopicPartitionList> {
    let mut list = TopicPartitionList::new();

    for (partition, offset) in committable.iter() {
        list.add_partition_offset(topic, partition, Offset::Offset(offset + 1))
            .map_err(KafkaIntegrationError::OffsetCommit)?;
    }

    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatchConfig;
    use crate::shutdown::ShutdownCoordinator;
    use crate::state::VehicleStateTable;
    use crate::test_utils::MockPositionRepository;
    use crate::warehouse::WarehouseWriter;
    use std::sync::Arc;

    fn test_pipeline() -> Pipeline {
        let repo = MockPositionRepository::new();
        let writer = WarehouseWriter::new(Arc::new(repo));
        Pipeline::new(
            writer,
            VehicleStateTable::new(),
            &BatchConfig::default(),
            Arc::new(PipelineMetrics::new()),
        )
    }

    #[tokio::test]
    async fn test_consumer_creation() {
        let config = KafkaConfig::default();
        let coordinator = ShutdownCoordinator::new();

        let result = PositionConsumer::new(config, test_pipeline(), coordinator.subscribe());
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_run_stops_on_drain() {
        let config = KafkaConfig::default();
        let coordinator = ShutdownCoordinator::new();
        let consumer =
            PositionConsumer::new(config, test_pipeline(), coordinator.subscribe()).unwrap();

        // With the drain already requested the loop must exit on its first
        // cycle without ever reaching a broker
        coordinator.begin_drain();

        let result = tokio::time::timeout(Duration::from_secs(5), consumer.run()).await;
        assert!(result.expect("run did not stop on drain").is_ok());
    }

    #[test]
    fn test_commit_list_points_past_observed_offset() {
        let mut pending = PendingOffsets::new();
        pending.observe(0, 41);
        pending.observe(2, 7);

        let list = commit_list("vehicle_positions", &pending).unwrap();

        assert_eq!(list.count(), 2);
        let elem = list.find_partition("vehicle_positions", 0).unwrap();
        assert_eq!(elem.offset(), Offset::Offset(42));
        let elem = list.find_partition("vehicle_positions", 2).unwrap();
        assert_eq!(elem.offset(), Offset::Offset(8));
    }
}
