//! Health and readiness endpoints for FleetStream
//!
//! Liveness reports plain aliveness. Readiness merges the component table
//! maintained by the background monitor with the live pipeline stage, so
//! orchestrators stop routing traffic as soon as a drain begins.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{
    AppState, ComponentHealth, HealthResponse, HealthStatus, ReadyResponse, BUILD_INFO,
};
use crate::shutdown::Stage;
use crate::warehouse::pool::PoolMetrics;

/// Interval between background component checks
const MONITOR_INTERVAL: Duration = Duration::from_secs(30);

/// Tracks the latest check result for each monitored component
#[derive(Clone, Default)]
pub struct HealthState {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest check result for a component
    pub async fn update_component(
        &self,
        name: &str,
        status: HealthStatus,
        message: Option<String>,
    ) {
        let mut components = self.components.write().await;
        components.insert(
            name.to_string(),
            ComponentHealth {
                status,
                message,
                last_check: Utc::now(),
            },
        );
    }

    /// Snapshot of all recorded component checks
    pub async fn components(&self) -> HashMap<String, ComponentHealth> {
        self.components.read().await.clone()
    }

    /// Overall status across all recorded components
    pub async fn overall(&self) -> HealthStatus {
        overall_status(&*self.components.read().await)
    }
}

/// The worst status wins: any unhealthy component marks the service
/// unhealthy, any degraded one marks it degraded.
fn overall_status(checks: &HashMap<String, ComponentHealth>) -> HealthStatus {
    if checks.values().any(|c| c.status == HealthStatus::Unhealthy) {
        HealthStatus::Unhealthy
    } else if checks.values().any(|c| c.status == HealthStatus::Degraded) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

/// Component health derived from the pipeline lifecycle stage
fn pipeline_health(stage: Stage) -> ComponentHealth {
    let (status, message) = match stage {
        Stage::Running => (HealthStatus::Healthy, None),
        Stage::Draining => (
            HealthStatus::Unhealthy,
            Some("pipeline is draining".to_string()),
        ),
        Stage::Stopped => (
            HealthStatus::Unhealthy,
            Some("pipeline has stopped".to_string()),
        ),
    };

    ComponentHealth {
        status,
        message,
        last_check: Utc::now(),
    }
}

/// Liveness probe handler
///
/// Returns 200 whenever the process is up, regardless of component health.
pub async fn health_check(State(state): State<AppState>) -> Response {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        version: BUILD_INFO.version.to_string(),
        stage: state.signal.stage().to_string(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        timestamp: Utc::now(),
    };

    (StatusCode::OK, Json(response)).into_response()
}

/// Readiness probe handler
///
/// Returns 503 when any component is unhealthy or the pipeline is no
/// longer running.
pub async fn ready_check(State(state): State<AppState>) -> Response {
    let mut checks = state.health.components().await;
    checks.insert(
        "pipeline".to_string(),
        pipeline_health(state.signal.stage()),
    );

    let status = overall_status(&checks);
    let response = ReadyResponse {
        status,
        checks,
        timestamp: Utc::now(),
    };

    (status.to_status_code(), Json(response)).into_response()
}

/// Build information handler
pub async fn build_info() -> Response {
    (StatusCode::OK, Json(BUILD_INFO)).into_response()
}

/// Background task that refreshes component health until shutdown
pub async fn health_monitor(state: AppState) {
    let mut signal = state.signal.clone();
    let mut interval = tokio::time::interval(MONITOR_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {},
            _ = signal.draining() => break,
        }

        match state.repository.health_check().await {
            Ok(()) => {
                state
                    .health
                    .update_component("warehouse", HealthStatus::Healthy, None)
                    .await;
            },
            Err(e) => {
                warn!(error = %e, "Warehouse health check failed");
                state
                    .health
                    .update_component("warehouse", HealthStatus::Unhealthy, Some(e.to_string()))
                    .await;
            },
        }

        let pool = PoolMetrics::from_pool(&state.pool);
        let pool_status = if pool.is_healthy() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        state
            .health
            .update_component(
                "warehouse_pool",
                pool_status,
                Some(format!("{:.0}% utilization", pool.utilization())),
            )
            .await;

        debug!("Component health refreshed");
    }
}
