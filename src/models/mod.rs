//! Data models for fleetstream
//!
//! This module contains all the domain models used throughout the pipeline,
//! including position payload structures, validation logic, and the raw to
//! typed transformation.

pub mod error;
pub mod position;
pub mod validation;

// Re-export commonly used types
pub use error::{ValidationError, ValidationErrorKind};
pub use position::{PositionEvent, RawPosition, VehicleStatus, VehicleType};
#[cfg(test)]
pub use position::PositionBuilder;
pub use validation::{validate_status, validate_vehicle_id, validate_vehicle_type};
