//! FleetStream fleet simulator
//!
//! Publishes simulated vehicle positions to Kafka until interrupted,
//! then flushes in-flight deliveries and exits.

use std::sync::Arc;

use tracing::{error, info};

use fleetstream::config::Config;
use fleetstream::error::Result;
use fleetstream::kafka::PositionEmitter;
use fleetstream::logging;
use fleetstream::shutdown::{wait_for_signal, ShutdownCoordinator};
use fleetstream::simulator::FleetSimulator;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(Config::from_env()?);
    config.validate()?;

    logging::init_tracing(&config.server.log_level, &config.server.environment)?;
    config.log_config();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        fleet_size = config.simulator.fleet_size,
        "Starting FleetStream simulator"
    );

    // First SIGINT/SIGTERM begins the drain
    let coordinator = ShutdownCoordinator::new();
    {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            coordinator.begin_drain();
        });
    }

    let emitter = PositionEmitter::new(&config.kafka)?;
    let simulator = FleetSimulator::new(config.simulator.clone(), emitter, coordinator.subscribe());

    let result = simulator.run().await;
    coordinator.mark_stopped();

    match &result {
        Ok(()) => info!("Simulator shutdown complete"),
        Err(e) => error!(error = %e, "Simulator terminated with error"),
    }
    result
}
