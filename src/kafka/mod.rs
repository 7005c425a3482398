//! Kafka integration module for position streaming
//!
//! This module provides:
//! - Position consumer with manual offset management
//! - Position producer used by the fleet simulator
//! - Graceful shutdown with a final flush and offset commit

mod config;
mod consumer;
mod emitter;

pub use config::KafkaConfig;
pub use consumer::PositionConsumer;
pub use emitter::PositionEmitter;

use rdkafka::error::KafkaError;
use thiserror::Error;

/// Kafka-specific error types
#[derive(Debug, Error)]
pub enum KafkaIntegrationError {
    #[error("Kafka connection error: {0}")]
    Connection(#[from] KafkaError),

    #[error("Failed to subscribe to topic '{topic}': {source}")]
    Subscribe { topic: String, source: KafkaError },

    #[error("Offset commit failed: {0}")]
    OffsetCommit(KafkaError),

    #[error("Position send failed: {0}")]
    Emit(KafkaError),
}

impl From<KafkaIntegrationError> for crate::error::Error {
    fn from(e: KafkaIntegrationError) -> Self {
        crate::error::Error::Kafka(e.to_string())
    }
}
