//! Simulated vehicle fleet publishing position records
//!
//! One tokio task per vehicle. Each task owns its vehicle's state, advances
//! it by a bounded random step every tick, and publishes the resulting
//! position through the shared producer. Tasks stop when a drain is
//! requested, after which the producer is flushed once before exit.

use crate::config::SimulatorConfig;
use crate::error::Result;
use crate::kafka::PositionEmitter;
use crate::models::{RawPosition, VehicleStatus, VehicleType};
use crate::shutdown::ShutdownSignal;
use chrono::Utc;
use rand::Rng;
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// State of one simulated vehicle
struct Vehicle {
    vehicle_id: String,
    vehicle_type: VehicleType,
    latitude: f64,
    longitude: f64,
    speed: f64,
}

impl Vehicle {
    /// Spawn a vehicle at a random point inside the configured area
    fn spawn(index: usize, config: &SimulatorConfig) -> Self {
        let mut rng = rand::thread_rng();
        let types = VehicleType::all();

        Self {
            vehicle_id: format!("VEH-{:04}", index),
            vehicle_type: types[rng.gen_range(0..types.len())],
            latitude: rng.gen_range(config.lat_min..=config.lat_max),
            longitude: rng.gen_range(config.lon_min..=config.lon_max),
            speed: rng.gen_range(0.0..=config.speed_limit_mph),
        }
    }

    /// Advance one tick and build the resulting position report
    ///
    /// Movement is a bounded random walk clamped to the configured area.
    /// Speed is re-drawn occasionally instead of every tick.
    fn step(&mut self, config: &SimulatorConfig) -> RawPosition {
        let mut rng = rand::thread_rng();

        self.latitude = (self.latitude
            + rng.gen_range(-config.step_degrees..=config.step_degrees))
        .clamp(config.lat_min, config.lat_max);
        self.longitude = (self.longitude
            + rng.gen_range(-config.step_degrees..=config.step_degrees))
        .clamp(config.lon_min, config.lon_max);

        if rng.gen::<f64>() < config.speed_change_probability {
            self.speed = rng.gen_range(0.0..=config.speed_limit_mph);
        }

        RawPosition {
            event_id: Uuid::new_v4().to_string(),
            vehicle_id: self.vehicle_id.clone(),
            vehicle_type: self.vehicle_type.as_str().to_string(),
            status: VehicleStatus::Active.as_str().to_string(),
            timestamp: Utc::now().timestamp(),
            latitude: self.latitude,
            longitude: self.longitude,
            speed: Some(self.speed),
        }
    }
}

/// The simulated fleet
pub struct FleetSimulator {
    config: SimulatorConfig,
    emitter: PositionEmitter,
    signal: ShutdownSignal,
}

impl FleetSimulator {
    /// Create a new fleet simulator
    pub fn new(config: SimulatorConfig, emitter: PositionEmitter, signal: ShutdownSignal) -> Self {
        Self {
            config,
            emitter,
            signal,
        }
    }

    /// Drive the fleet until a drain is requested, then flush the producer
    pub async fn run(self) -> Result<()> {
        info!(
            fleet_size = self.config.fleet_size,
            tick_secs = self.config.tick_interval_secs,
            "Starting fleet simulator"
        );

        let mut handles = Vec::with_capacity(self.config.fleet_size);
        for index in 1..=self.config.fleet_size {
            let vehicle = Vehicle::spawn(index, &self.config);
            handles.push(tokio::spawn(drive_vehicle(
                vehicle,
                self.config.clone(),
                self.emitter.clone(),
                self.signal.clone(),
            )));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Vehicle task ended abnormally: {}", e);
            }
        }

        self.emitter.close()?;
        info!("Fleet simulator stopped");
        Ok(())
    }
}

/// Tick loop for a single vehicle
async fn drive_vehicle(
    mut vehicle: Vehicle,
    config: SimulatorConfig,
    emitter: PositionEmitter,
    mut signal: ShutdownSignal,
) {
    let mut ticker = interval(config.tick_interval());

    loop {
        tokio::select! {
            _ = ticker.tick() => {},
            _ = signal.draining() => break,
        }

        let position = vehicle.step(&config);
        // A lost update is logged and counted; the vehicle keeps driving
        if let Err(e) = emitter.emit(&position).await {
            warn!(vehicle_id = %vehicle.vehicle_id, "Position update lost: {}", e);
        }
    }

    debug!(vehicle_id = %vehicle.vehicle_id, "Vehicle task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_inside_configured_area() {
        let config = SimulatorConfig::default();

        for index in 1..=50 {
            let vehicle = Vehicle::spawn(index, &config);
            assert!(vehicle.latitude >= config.lat_min && vehicle.latitude <= config.lat_max);
            assert!(vehicle.longitude >= config.lon_min && vehicle.longitude <= config.lon_max);
            assert!(vehicle.speed >= 0.0 && vehicle.speed <= config.speed_limit_mph);
        }
    }

    #[test]
    fn test_vehicle_id_format() {
        let config = SimulatorConfig::default();
        assert_eq!(Vehicle::spawn(1, &config).vehicle_id, "VEH-0001");
        assert_eq!(Vehicle::spawn(42, &config).vehicle_id, "VEH-0042");
    }

    #[test]
    fn test_step_stays_inside_area() {
        let config = SimulatorConfig {
            lat_min: 37.700,
            lat_max: 37.701,
            lon_min: -122.401,
            lon_max: -122.400,
            step_degrees: 0.01,
            ..SimulatorConfig::default()
        };

        let mut vehicle = Vehicle::spawn(1, &config);
        for _ in 0..100 {
            vehicle.step(&config);
            assert!(vehicle.latitude >= config.lat_min && vehicle.latitude <= config.lat_max);
            assert!(vehicle.longitude >= config.lon_min && vehicle.longitude <= config.lon_max);
        }
    }

    #[test]
    fn test_step_builds_valid_payload() {
        let config = SimulatorConfig::default();
        let mut vehicle = Vehicle::spawn(1, &config);

        let position = vehicle.step(&config);

        assert!(position.validate_fields().is_ok());
        assert_eq!(position.vehicle_id, "VEH-0001");
        assert_eq!(position.status, "active");
        assert!(position.speed.is_some());
    }

    #[test]
    fn test_step_moves_by_bounded_amount() {
        let config = SimulatorConfig::default();
        let mut vehicle = Vehicle::spawn(1, &config);

        let before = (vehicle.latitude, vehicle.longitude);
        let position = vehicle.step(&config);

        assert!((position.latitude - before.0).abs() <= config.step_degrees);
        assert!((position.longitude - before.1).abs() <= config.step_degrees);
    }
}
