//! Kafka configuration module

use envconfig::Envconfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Kafka configuration settings shared by the consumer and the emitter
#[derive(Debug, Clone, Deserialize, Serialize, Envconfig)]
pub struct KafkaConfig {
    /// Kafka broker addresses (comma-separated)
    #[serde(default = "default_brokers")]
    #[envconfig(from = "KAFKA_BROKERS", default = "localhost:9092")]
    pub brokers: String,

    /// Consumer group ID
    #[serde(default = "default_consumer_group")]
    #[envconfig(from = "KAFKA_CONSUMER_GROUP", default = "vehicle-tracking-consumer-group")]
    pub consumer_group: String,

    /// Topic carrying position records
    #[serde(default = "default_topic")]
    #[envconfig(from = "KAFKA_TOPIC", default = "vehicle_positions")]
    pub topic: String,

    /// Starting offset policy when the group has no committed offset
    /// (earliest, latest)
    #[serde(default = "default_auto_offset_reset")]
    #[envconfig(from = "KAFKA_AUTO_OFFSET_RESET", default = "earliest")]
    pub auto_offset_reset: String,

    /// Session timeout in milliseconds
    #[serde(default = "default_session_timeout")]
    #[envconfig(from = "KAFKA_SESSION_TIMEOUT_MS", default = "30000")]
    pub session_timeout_ms: u32,

    /// Maximum poll interval in milliseconds
    #[serde(default = "default_max_poll_interval")]
    #[envconfig(from = "KAFKA_MAX_POLL_INTERVAL_MS", default = "300000")]
    pub max_poll_interval_ms: u32,

    /// Minimum bytes the broker accumulates before answering a fetch
    #[serde(default = "default_fetch_min_bytes")]
    #[envconfig(from = "KAFKA_FETCH_MIN_BYTES", default = "1")]
    pub fetch_min_bytes: i32,

    /// Longest the broker may hold a fetch waiting for fetch_min_bytes
    #[serde(default = "default_fetch_max_wait_ms")]
    #[envconfig(from = "KAFKA_FETCH_MAX_WAIT_MS", default = "500")]
    pub fetch_max_wait_ms: i32,

    /// Consumer-side wait ceiling per poll cycle in milliseconds
    #[serde(default = "default_poll_wait_ms")]
    #[envconfig(from = "KAFKA_POLL_WAIT_MS", default = "1000")]
    pub poll_wait_ms: u64,

    /// Cap on records ingested per poll cycle before flush triggers are
    /// re-evaluated
    #[serde(default = "default_max_records_per_poll")]
    #[envconfig(from = "KAFKA_MAX_RECORDS_PER_POLL", default = "500")]
    pub max_records_per_poll: usize,

    /// Client id reported by the position producer
    #[serde(default = "default_producer_client_id")]
    #[envconfig(from = "KAFKA_PRODUCER_CLIENT_ID", default = "vehicle-position-producer")]
    pub producer_client_id: String,

    /// Maximum emitter retries for a single record
    #[serde(default = "default_emit_max_retries")]
    #[envconfig(from = "KAFKA_EMIT_MAX_RETRIES", default = "5")]
    pub emit_max_retries: u32,

    /// Emitter retry backoff duration in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    #[envconfig(from = "KAFKA_RETRY_BACKOFF_MS", default = "1000")]
    pub retry_backoff_ms: u64,

    /// Enable idempotent producer
    #[serde(default = "default_idempotent_producer")]
    #[envconfig(from = "KAFKA_IDEMPOTENT_PRODUCER", default = "true")]
    pub idempotent_producer: bool,

    /// Compression type for produced records
    #[serde(default = "default_compression_type")]
    #[envconfig(from = "KAFKA_COMPRESSION_TYPE", default = "snappy")]
    pub compression_type: String,

    /// Bound on the producer flush at shutdown, in seconds
    #[serde(default = "default_flush_timeout_secs")]
    #[envconfig(from = "KAFKA_FLUSH_TIMEOUT_SECS", default = "30")]
    pub flush_timeout_secs: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            consumer_group: default_consumer_group(),
            topic: default_topic(),
            auto_offset_reset: default_auto_offset_reset(),
            session_timeout_ms: default_session_timeout(),
            max_poll_interval_ms: default_max_poll_interval(),
            fetch_min_bytes: default_fetch_min_bytes(),
            fetch_max_wait_ms: default_fetch_max_wait_ms(),
            poll_wait_ms: default_poll_wait_ms(),
            max_records_per_poll: default_max_records_per_poll(),
            producer_client_id: default_producer_client_id(),
            emit_max_retries: default_emit_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            idempotent_producer: default_idempotent_producer(),
            compression_type: default_compression_type(),
            flush_timeout_secs: default_flush_timeout_secs(),
        }
    }
}

impl KafkaConfig {
    /// Create a new KafkaConfig from environment variables
    pub fn from_env() -> Result<Self, envconfig::Error> {
        <Self as envconfig::Envconfig>::init_from_env()
    }

    /// Get session timeout as Duration
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms as u64)
    }

    /// Get per-cycle poll wait ceiling as Duration
    pub fn poll_wait(&self) -> Duration {
        Duration::from_millis(self.poll_wait_ms)
    }

    /// Get emitter retry backoff as Duration
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Get producer flush bound as Duration
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout_secs)
    }

    /// Build rdkafka consumer configuration
    ///
    /// Auto-commit stays off regardless of environment: offsets are committed
    /// by the pipeline after a batch is durably written, never by the client
    /// on a timer.
    pub fn build_consumer_config(&self) -> rdkafka::ClientConfig {
        let mut config = rdkafka::ClientConfig::new();

        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.consumer_group)
            .set("enable.auto.commit", "false")
            .set("session.timeout.ms", self.session_timeout_ms.to_string())
            .set(
                "max.poll.interval.ms",
                self.max_poll_interval_ms.to_string(),
            )
            .set("fetch.min.bytes", self.fetch_min_bytes.to_string())
            .set("fetch.wait.max.ms", self.fetch_max_wait_ms.to_string())
            .set("enable.partition.eof", "false")
            .set("auto.offset.reset", &self.auto_offset_reset);

        config
    }

    /// Build rdkafka producer configuration for the position emitter
    ///
    /// Records are acknowledged by all in-sync replicas before a send counts
    /// as delivered.
    pub fn build_producer_config(&self) -> rdkafka::ClientConfig {
        let mut config = rdkafka::ClientConfig::new();

        config
            .set("bootstrap.servers", &self.brokers)
            .set("client.id", &self.producer_client_id)
            .set("message.timeout.ms", "30000")
            .set("compression.type", &self.compression_type)
            .set("acks", "all");

        if self.idempotent_producer {
            config
                .set("enable.idempotence", "true")
                .set("retries", "10")
                .set("max.in.flight.requests.per.connection", "5");
        } else {
            config.set("retries", self.emit_max_retries.to_string());
        }

        config
    }
}

// Default value functions
fn default_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_consumer_group() -> String {
    "vehicle-tracking-consumer-group".to_string()
}

fn default_topic() -> String {
    "vehicle_positions".to_string()
}

fn default_auto_offset_reset() -> String {
    "earliest".to_string()
}

fn default_session_timeout() -> u32 {
    30000 // 30 seconds
}

fn default_max_poll_interval() -> u32 {
    300000 // 5 minutes
}

fn default_fetch_min_bytes() -> i32 {
    1
}

fn default_fetch_max_wait_ms() -> i32 {
    500
}

fn default_poll_wait_ms() -> u64 {
    1000
}

fn default_max_records_per_poll() -> usize {
    500
}

fn default_producer_client_id() -> String {
    "vehicle-position-producer".to_string()
}

fn default_emit_max_retries() -> u32 {
    5
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_idempotent_producer() -> bool {
    true
}

fn default_compression_type() -> String {
    "snappy".to_string()
}

fn default_flush_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KafkaConfig::default();
        assert_eq!(config.brokers, "localhost:9092");
        assert_eq!(config.consumer_group, "vehicle-tracking-consumer-group");
        assert_eq!(config.topic, "vehicle_positions");
        assert_eq!(config.auto_offset_reset, "earliest");
        assert_eq!(config.fetch_min_bytes, 1);
        assert_eq!(config.fetch_max_wait_ms, 500);
    }

    #[test]
    fn test_duration_conversions() {
        let config = KafkaConfig::default();
        assert_eq!(config.session_timeout(), Duration::from_secs(30));
        assert_eq!(config.poll_wait(), Duration::from_secs(1));
        assert_eq!(config.retry_backoff(), Duration::from_secs(1));
        assert_eq!(config.flush_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_consumer_config_build() {
        let config = KafkaConfig::default();
        let _consumer_config = config.build_consumer_config();

        // Just verify that the config can be built without errors
        // The actual configuration values are tested through the defaults
        assert_eq!(config.consumer_group, "vehicle-tracking-consumer-group");
    }

    #[test]
    fn test_producer_config_build() {
        let config = KafkaConfig::default();
        let _producer_config = config.build_producer_config();

        assert!(config.idempotent_producer);
        assert_eq!(config.producer_client_id, "vehicle-position-producer");
    }
}
