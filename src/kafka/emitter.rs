//! Kafka producer for vehicle position records

use super::{KafkaConfig, KafkaIntegrationError};
use crate::error::Result;
use crate::models::RawPosition;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Producer that publishes position records keyed by vehicle id
///
/// Records for one vehicle land on one partition, so the consumer observes
/// each vehicle's positions in emit order.
#[derive(Clone)]
pub struct PositionEmitter {
    /// Kafka producer instance
    producer: FutureProducer,

    /// Destination topic
    topic: String,

    /// Timeout for a single send
    send_timeout: Duration,

    /// Bound on the producer flush at shutdown
    flush_timeout: Duration,

    /// Retries per record before giving up
    max_retries: u32,

    /// Delay between send retries
    retry_backoff: Duration,

    /// Records acknowledged by the broker
    emitted: Arc<AtomicU64>,

    /// Records dropped after the retry budget ran out
    failed: Arc<AtomicU64>,
}

impl PositionEmitter {
    /// Create a new position emitter
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = config
            .build_producer_config()
            .create()
            .map_err(KafkaIntegrationError::Connection)?;

        Ok(Self {
            producer,
            topic: config.topic.clone(),
            send_timeout: Duration::from_secs(30),
            flush_timeout: config.flush_timeout(),
            max_retries: config.emit_max_retries,
            retry_backoff: config.retry_backoff(),
            emitted: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Publish one position record, retrying transient send failures
    pub async fn emit(&self, position: &RawPosition) -> Result<()> {
        let payload = serde_json::to_string(position)?;

        let mut attempt = 0;
        loop {
            let record = FutureRecord::to(&self.topic)
                .payload(&payload)
                .key(&position.vehicle_id);

            match self.producer.send(record, self.send_timeout).await {
                Ok(delivery) => {
                    self.emitted.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        vehicle_id = %position.vehicle_id,
                        partition = delivery.0,
                        offset = delivery.1,
                        "Emitted position record"
                    );
                    return Ok(());
                },
                Err((kafka_error, _)) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        vehicle_id = %position.vehicle_id,
                        attempt,
                        "Retrying position send after error: {}",
                        kafka_error
                    );
                    sleep(self.retry_backoff).await;
                },
                Err((kafka_error, _)) => {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    error!(
                        vehicle_id = %position.vehicle_id,
                        "Dropping position record after {} attempts: {}",
                        attempt + 1,
                        kafka_error
                    );
                    return Err(KafkaIntegrationError::Emit(kafka_error).into());
                },
            }
        }
    }

    /// Records acknowledged so far
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Records dropped so far
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Flush in-flight records before shutdown
    pub fn close(&self) -> Result<()> {
        info!(
            emitted = self.emitted(),
            failed = self.failed(),
            "Flushing position producer"
        );
        self.producer
            .flush(self.flush_timeout)
            .map_err(KafkaIntegrationError::Connection)?;
        Ok(())
    }
}
