//! FleetStream pipeline service
//!
//! Consumes vehicle positions from Kafka, keeps the in-memory fleet
//! table current, lands micro-batches in the PostgreSQL warehouse, and
//! serves the operations API. Offsets are committed only after their
//! batch has been written.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use fleetstream::api::{self, AppState, HealthState};
use fleetstream::config::Config;
use fleetstream::error::{Error, Result};
use fleetstream::kafka::PositionConsumer;
use fleetstream::logging;
use fleetstream::pipeline::{Pipeline, PipelineMetrics};
use fleetstream::shutdown::{wait_for_signal, ShutdownCoordinator};
use fleetstream::state::VehicleStateTable;
use fleetstream::warehouse::{self, create_pool, PgPositionRepository, WarehouseWriter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from environment
    let config = Arc::new(Config::from_env()?);
    config.validate()?;

    // Initialize logging/tracing
    logging::init_tracing(&config.server.log_level, &config.server.environment)?;

    // Log configuration (with sensitive data masked)
    config.log_config();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting FleetStream pipeline"
    );

    // Warehouse connection and schema
    let pool = create_pool(&config.warehouse).await?;
    if config.warehouse.run_migrations {
        warehouse::run_migrations(&pool)
            .await
            .map_err(|e| Error::warehouse(format!("Migration failed: {}", e)))?;
        info!("Warehouse migrations applied");
    }
    let repository = Arc::new(PgPositionRepository::new(pool.clone()));
    let writer = WarehouseWriter::from_config(repository.clone(), &config.warehouse);

    // Pipeline state shared with the API
    let fleet = VehicleStateTable::new();
    let metrics = Arc::new(PipelineMetrics::new());
    let pipeline = Pipeline::new(writer, fleet.clone(), &config.batch, metrics.clone());

    // First SIGINT/SIGTERM begins the drain
    let coordinator = ShutdownCoordinator::new();
    let drain_handle = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            coordinator.begin_drain();
        })
    };

    let consumer = PositionConsumer::new(config.kafka.clone(), pipeline, coordinator.subscribe())?;
    consumer.log_replay_window(repository.as_ref()).await;

    // Operations API and background health monitor
    let app_state = AppState {
        health: HealthState::new(),
        fleet,
        metrics,
        repository,
        pool,
        signal: coordinator.subscribe(),
        started_at: Utc::now(),
    };
    let monitor_handle = tokio::spawn(api::health_monitor(app_state.clone()));
    let server_handle = {
        let config = config.clone();
        let app_state = app_state.clone();
        tokio::spawn(async move { api::create_server(config, app_state).await })
    };

    // Run the consume loop on the main task until drained or failed
    let result = consumer.run().await;

    // Wake the API and monitor if the loop exited on its own
    coordinator.begin_drain();

    if let Err(e) = monitor_handle.await {
        warn!(error = %e, "Health monitor task failed");
    }
    match server_handle.await {
        Ok(Ok(())) => {},
        Ok(Err(e)) => error!(error = %e, "HTTP server exited with error"),
        Err(e) => warn!(error = %e, "HTTP server task failed"),
    }
    drain_handle.abort();

    coordinator.mark_stopped();

    match &result {
        Ok(()) => info!("FleetStream shutdown complete"),
        Err(e) => error!(error = %e, "FleetStream terminated with error"),
    }
    result
}
