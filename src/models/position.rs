//! Position event models for fleetstream
//!
//! This module defines the core position structures used throughout the
//! pipeline, including raw payloads from Kafka and typed events for the
//! state table and warehouse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use uuid::Uuid;
use validator::Validate;

use super::error::{ValidationError, ValidationErrorKind, ValidationErrors};
use super::validation::{
    validate_event_id, validate_event_id_field, validate_latitude, validate_longitude,
    validate_speed, validate_status, validate_timestamp_field, validate_vehicle_id,
    validate_vehicle_id_field, validate_vehicle_type,
};

/// Vehicle categories reported by the fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleType {
    #[serde(rename = "sedan")]
    Sedan,
    #[serde(rename = "suv")]
    Suv,
    #[serde(rename = "truck")]
    Truck,
    #[serde(rename = "van")]
    Van,
}

impl VehicleType {
    /// Parse vehicle type from string
    pub fn from_str(s: &str) -> Result<Self, ValidationError> {
        match s.to_lowercase().as_str() {
            "sedan" => Ok(VehicleType::Sedan),
            "suv" => Ok(VehicleType::Suv),
            "truck" => Ok(VehicleType::Truck),
            "van" => Ok(VehicleType::Van),
            _ => Err(ValidationError::with_context(
                ValidationErrorKind::InvalidVehicleType,
                "vehicle_type",
                format!("Unknown vehicle type: {}", s),
            )),
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::Sedan => "sedan",
            VehicleType::Suv => "suv",
            VehicleType::Truck => "truck",
            VehicleType::Van => "van",
        }
    }

    /// All known vehicle types, used by the simulator to pick one at random
    pub fn all() -> [VehicleType; 4] {
        [
            VehicleType::Sedan,
            VehicleType::Suv,
            VehicleType::Truck,
            VehicleType::Van,
        ]
    }
}

impl std::fmt::Display for VehicleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operational status of a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleStatus {
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "maintenance")]
    Maintenance,
}

impl VehicleStatus {
    /// Parse vehicle status from string
    pub fn from_str(s: &str) -> Result<Self, ValidationError> {
        match s.to_lowercase().as_str() {
            "active" => Ok(VehicleStatus::Active),
            "idle" => Ok(VehicleStatus::Idle),
            "maintenance" => Ok(VehicleStatus::Maintenance),
            _ => Err(ValidationError::with_context(
                ValidationErrorKind::InvalidStatus,
                "status",
                format!("Unknown vehicle status: {}", s),
            )),
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Active => "active",
            VehicleStatus::Idle => "idle",
            VehicleStatus::Maintenance => "maintenance",
        }
    }
}

impl std::fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw position payload as received from Kafka
///
/// This structure mirrors the wire JSON exactly, before any parsing or
/// validation. The record key on the topic is `vehicle_id`.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RawPosition {
    /// Unique event identifier
    #[validate(custom(function = "validate_event_id"))]
    pub event_id: String,

    /// Vehicle identifier, also the partition key
    #[validate(custom(function = "validate_vehicle_id"))]
    pub vehicle_id: String,

    /// Vehicle category (sedan, suv, truck, van)
    #[validate(custom(function = "validate_vehicle_type"))]
    pub vehicle_type: String,

    /// Operational status (active, idle, maintenance)
    #[validate(custom(function = "validate_status"))]
    pub status: String,

    /// When the position was observed (unix seconds)
    #[validate(range(min = 0))]
    pub timestamp: i64,

    /// Latitude in degrees
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    /// Longitude in degrees
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,

    /// Optional speed in miles per hour
    #[validate(range(min = 0.0))]
    pub speed: Option<f64>,
}

impl RawPosition {
    /// Create a new raw position (mainly for testing)
    pub fn new(vehicle_id: String, timestamp: i64, latitude: f64, longitude: f64) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            vehicle_id,
            vehicle_type: "sedan".to_string(),
            status: "active".to_string(),
            timestamp,
            latitude,
            longitude,
            speed: None,
        }
    }

    /// Validate all fields without using the validator crate
    pub fn validate_fields(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_event_id_field(&self.event_id, "event_id") {
            errors.add(e);
        }

        if let Err(e) = validate_vehicle_id_field(&self.vehicle_id, "vehicle_id") {
            errors.add(e);
        }

        if let Err(e) = VehicleType::from_str(&self.vehicle_type) {
            errors.add(e);
        }

        if let Err(e) = VehicleStatus::from_str(&self.status) {
            errors.add(e);
        }

        if let Err(e) = validate_timestamp_field(self.timestamp, "timestamp") {
            errors.add(e);
        }

        if let Err(e) = validate_latitude(self.latitude, "latitude") {
            errors.add(e);
        }

        if let Err(e) = validate_longitude(self.longitude, "longitude") {
            errors.add(e);
        }

        if let Err(e) = validate_speed(self.speed, "speed") {
            errors.add(e);
        }

        errors.into_result(())
    }
}

/// Validated position event carried through the pipeline
///
/// This structure is what the state table holds and the warehouse stores:
/// parsed types plus the source partition/offset the record came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionEvent {
    /// Unique event identifier
    pub event_id: Uuid,

    /// Vehicle identifier, also the partition key
    pub vehicle_id: String,

    /// Vehicle category
    pub vehicle_type: VehicleType,

    /// Operational status
    pub status: VehicleStatus,

    /// When the position was observed
    pub recorded_at: DateTime<Utc>,

    /// Latitude in degrees
    pub latitude: f64,

    /// Longitude in degrees
    pub longitude: f64,

    /// Optional speed in miles per hour
    pub speed_mph: Option<f64>,

    /// Kafka partition this event came from
    pub partition: i32,

    /// Kafka offset for this event
    pub offset: i64,

    /// When this event was decoded by the consumer
    pub received_at: DateTime<Utc>,
}

impl PositionEvent {
    /// Set the Kafka source position
    pub fn with_source(mut self, partition: i32, offset: i64) -> Self {
        self.partition = partition;
        self.offset = offset;
        self
    }

    /// Check whether the vehicle was moving when observed
    pub fn is_moving(&self) -> bool {
        self.speed_mph.map(|s| s > 0.0).unwrap_or(false)
    }

    /// Coordinates as a (latitude, longitude) pair
    pub fn coordinates(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

/// Transform a raw payload into a validated position event
impl TryFrom<RawPosition> for PositionEvent {
    type Error = ValidationError;

    fn try_from(raw: RawPosition) -> Result<Self, Self::Error> {
        // Validate all fields first
        raw.validate_fields().map_err(|e| {
            ValidationError::with_context(
                ValidationErrorKind::Custom(e.to_string()),
                "position",
                "Multiple validation errors occurred",
            )
        })?;

        // Parse and transform fields
        let event_id = validate_event_id_field(&raw.event_id, "event_id")?;
        validate_vehicle_id_field(&raw.vehicle_id, "vehicle_id")?;
        let vehicle_type = VehicleType::from_str(&raw.vehicle_type)?;
        let status = VehicleStatus::from_str(&raw.status)?;
        let recorded_at = validate_timestamp_field(raw.timestamp, "timestamp")?;
        let latitude = validate_latitude(raw.latitude, "latitude")?;
        let longitude = validate_longitude(raw.longitude, "longitude")?;
        let speed_mph = validate_speed(raw.speed, "speed")?;

        Ok(PositionEvent {
            event_id,
            vehicle_id: raw.vehicle_id,
            vehicle_type,
            status,
            recorded_at,
            latitude,
            longitude,
            speed_mph,
            partition: 0, // Set when processing from Kafka
            offset: 0,    // Set when processing from Kafka
            received_at: Utc::now(),
        })
    }
}

/// Builder for creating test positions
#[cfg(test)]
pub struct PositionBuilder {
    event_id: String,
    vehicle_id: String,
    vehicle_type: String,
    status: String,
    timestamp: i64,
    latitude: f64,
    longitude: f64,
    speed: Option<f64>,
}

#[cfg(test)]
impl PositionBuilder {
    pub fn new() -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            vehicle_id: "VEH-0001".to_string(),
            vehicle_type: "sedan".to_string(),
            status: "active".to_string(),
            timestamp: Utc::now().timestamp(),
            latitude: 37.7749,
            longitude: -122.4194,
            speed: None,
        }
    }

    pub fn vehicle_id(mut self, vehicle_id: &str) -> Self {
        self.vehicle_id = vehicle_id.to_string();
        self
    }

    pub fn vehicle_type(mut self, vehicle_type: &str) -> Self {
        self.vehicle_type = vehicle_type.to_string();
        self
    }

    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self
    }

    pub fn speed(mut self, speed: impl Into<Option<f64>>) -> Self {
        self.speed = speed.into();
        self
    }

    pub fn build(self) -> RawPosition {
        RawPosition {
            event_id: self.event_id,
            vehicle_id: self.vehicle_id,
            vehicle_type: self.vehicle_type,
            status: self.status,
            timestamp: self.timestamp,
            latitude: self.latitude,
            longitude: self.longitude,
            speed: self.speed,
        }
    }

    pub fn build_event(self) -> PositionEvent {
        PositionEvent::try_from(self.build()).unwrap()
    }
}
