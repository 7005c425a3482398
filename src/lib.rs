//! FleetStream Library
//!
//! FleetStream moves vehicle position updates through Kafka into a
//! PostgreSQL warehouse. A fleet simulator publishes positions, the
//! consumer validates and micro-batches them while maintaining an
//! in-memory latest-position table, and the batch writer lands each
//! batch before its offsets are committed. An HTTP API exposes health
//! probes, the live fleet snapshot, and pipeline statistics.

pub mod api;
pub mod batch;
pub mod config;
pub mod error;
pub mod kafka;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod shutdown;
pub mod simulator;
pub mod state;
pub mod test_utils;
pub mod warehouse;

// Re-export commonly used types at the crate root
pub use config::Config;
pub use error::{Error, Result};

// Re-export model types
pub use models::{PositionEvent, RawPosition, ValidationError, ValidationErrorKind};

// Re-export API server functions
pub use api::server::{create_router, create_server};

// Re-export health check types
pub use api::{
    BuildInfo, ComponentHealth, HealthResponse, HealthState, HealthStatus, ReadyResponse,
};
