//! Operations API for FleetStream
//!
//! Exposes liveness and readiness probes, the in-memory fleet snapshot,
//! pipeline statistics, and Prometheus-style metrics over HTTP.

pub mod fleet;
pub mod health;
pub mod server;

pub use fleet::{fleet_snapshot, fleet_vehicle};
pub use health::{build_info, health_check, health_monitor, ready_check, HealthState};
pub use server::{create_router, create_server};

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::PositionEvent;
use crate::pipeline::{MetricsSnapshot, PipelineMetrics};
use crate::shutdown::ShutdownSignal;
use crate::state::VehicleStateTable;
use crate::warehouse::{DbPool, PositionRepository, WarehouseStats};

/// Shared state handed to every API handler
#[derive(Clone)]
pub struct AppState {
    /// Component health table maintained by the background monitor
    pub health: HealthState,
    /// Latest known position per vehicle
    pub fleet: VehicleStateTable,
    /// Pipeline counters
    pub metrics: Arc<PipelineMetrics>,
    /// Warehouse repository used for readiness pings
    pub repository: Arc<dyn PositionRepository>,
    /// Warehouse pool, reported under `/stats`
    pub pool: DbPool,
    /// Lifecycle stage observer
    pub signal: ShutdownSignal,
    /// Process start time, for uptime reporting
    pub started_at: DateTime<Utc>,
}

/// Health status of the service or one of its components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// Map the status to an HTTP status code
    pub fn to_status_code(&self) -> StatusCode {
        match self {
            HealthStatus::Healthy => StatusCode::OK,
            HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Health state of a single component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check: DateTime<Utc>,
}

/// Response body for the liveness probe
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub stage: String,
    pub uptime_secs: i64,
    pub timestamp: DateTime<Utc>,
}

/// Response body for the readiness probe
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub status: HealthStatus,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: DateTime<Utc>,
}

/// Response body for the fleet snapshot
#[derive(Debug, Serialize, Deserialize)]
pub struct FleetResponse {
    pub count: usize,
    pub vehicles: Vec<PositionEvent>,
}

/// Response body for pipeline statistics
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stage: String,
    pub fleet_vehicles: usize,
    pub pipeline: MetricsSnapshot,
    pub warehouse: WarehouseStats,
    pub timestamp: DateTime<Utc>,
}

/// Build metadata baked in at compile time
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub profile: &'static str,
}

pub const BUILD_INFO: BuildInfo = BuildInfo {
    name: env!("CARGO_PKG_NAME"),
    version: env!("CARGO_PKG_VERSION"),
    profile: if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    },
};
