//! Custom validation functions for fleetstream models
//!
//! This module provides reusable validation functions for position payload
//! fields: identifiers, unix timestamps, coordinates, and speeds.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::ValidationError;

use super::error::{ValidationError as ModelValidationError, ValidationErrorKind};

/// Maximum accepted length for a vehicle identifier
pub const MAX_VEHICLE_ID_LEN: usize = 64;

/// Validate event id format for the validator crate
pub fn validate_event_id(event_id: &str) -> Result<(), ValidationError> {
    if Uuid::parse_str(event_id).is_ok() {
        Ok(())
    } else {
        Err(ValidationError::new("Invalid event id format"))
    }
}

/// Validate event id returning the parsed UUID
pub fn validate_event_id_field(
    event_id: &str,
    field_name: &str,
) -> Result<Uuid, ModelValidationError> {
    Uuid::parse_str(event_id).map_err(|e| {
        ModelValidationError::with_context(
            ValidationErrorKind::InvalidEventId,
            field_name,
            format!("Failed to parse UUID: {}", e),
        )
    })
}

/// Validate vehicle id for the validator crate
pub fn validate_vehicle_id(vehicle_id: &str) -> Result<(), ValidationError> {
    if vehicle_id.trim().is_empty() || vehicle_id.len() > MAX_VEHICLE_ID_LEN {
        Err(ValidationError::new("Invalid vehicle id"))
    } else {
        Ok(())
    }
}

/// Validate vehicle id returning our custom error type
///
/// Vehicle ids are opaque tokens: the only constraints are non-empty and a
/// length bound, since the id doubles as the partition key.
pub fn validate_vehicle_id_field(
    vehicle_id: &str,
    field_name: &str,
) -> Result<(), ModelValidationError> {
    validate_required(vehicle_id, field_name).map_err(|e| {
        ModelValidationError::new(ValidationErrorKind::InvalidVehicleId, e.field)
    })?;
    validate_string_length(vehicle_id, field_name, None, Some(MAX_VEHICLE_ID_LEN))?;
    Ok(())
}

/// Validate vehicle type for the validator crate
pub fn validate_vehicle_type(vehicle_type: &str) -> Result<(), ValidationError> {
    match vehicle_type.to_lowercase().as_str() {
        "sedan" | "suv" | "truck" | "van" => Ok(()),
        _ => Err(ValidationError::new(
            "Invalid vehicle type. Expected: sedan, suv, truck, or van",
        )),
    }
}

/// Validate vehicle status for the validator crate
pub fn validate_status(status: &str) -> Result<(), ValidationError> {
    match status.to_lowercase().as_str() {
        "active" | "idle" | "maintenance" => Ok(()),
        _ => Err(ValidationError::new(
            "Invalid vehicle status. Expected: active, idle, or maintenance",
        )),
    }
}

/// Validate a unix-seconds timestamp returning the parsed DateTime
pub fn validate_timestamp_field(
    timestamp: i64,
    field_name: &str,
) -> Result<DateTime<Utc>, ModelValidationError> {
    if timestamp < 0 {
        return Err(ModelValidationError::with_context(
            ValidationErrorKind::InvalidTimestamp,
            field_name,
            format!("Timestamp must be non-negative, got: {}", timestamp),
        ));
    }

    DateTime::from_timestamp(timestamp, 0).ok_or_else(|| {
        ModelValidationError::with_context(
            ValidationErrorKind::InvalidTimestamp,
            field_name,
            format!("Timestamp out of representable range: {}", timestamp),
        )
    })
}

/// Validate a latitude is finite and within [-90, 90]
pub fn validate_latitude(latitude: f64, field_name: &str) -> Result<f64, ModelValidationError> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(ModelValidationError::with_context(
            ValidationErrorKind::LatitudeOutOfRange { value: latitude },
            field_name,
            format!("Got: {}", latitude),
        ));
    }
    Ok(latitude)
}

/// Validate a longitude is finite and within [-180, 180]
pub fn validate_longitude(longitude: f64, field_name: &str) -> Result<f64, ModelValidationError> {
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(ModelValidationError::with_context(
            ValidationErrorKind::LongitudeOutOfRange { value: longitude },
            field_name,
            format!("Got: {}", longitude),
        ));
    }
    Ok(longitude)
}

/// Validate that an optional speed is finite and non-negative
pub fn validate_speed(
    speed: Option<f64>,
    field_name: &str,
) -> Result<Option<f64>, ModelValidationError> {
    match speed {
        Some(value) if !value.is_finite() || value < 0.0 => {
            Err(ModelValidationError::with_context(
                ValidationErrorKind::InvalidSpeed,
                field_name,
                format!("Got: {}", value),
            ))
        },
        _ => Ok(speed),
    }
}

/// Validate string length constraints
pub fn validate_string_length(
    value: &str,
    field_name: &str,
    min: Option<usize>,
    max: Option<usize>,
) -> Result<(), ModelValidationError> {
    let len = value.len();

    if let Some(min_len) = min {
        if len < min_len {
            return Err(ModelValidationError::with_context(
                ValidationErrorKind::Custom(format!("Value shorter than minimum {}", min_len)),
                field_name,
                format!("Value length {} is less than minimum {}", len, min_len),
            ));
        }
    }

    if let Some(max_len) = max {
        if len > max_len {
            return Err(ModelValidationError::with_context(
                ValidationErrorKind::TooLong { max: max_len },
                field_name,
                format!("Value length {} exceeds maximum {}", len, max_len),
            ));
        }
    }

    Ok(())
}

/// Validate a required field is not empty
pub fn validate_required(value: &str, field_name: &str) -> Result<(), ModelValidationError> {
    if value.trim().is_empty() {
        Err(ModelValidationError::new(
            ValidationErrorKind::RequiredField,
            field_name,
        ))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_event_id_valid() {
        let valid_uuid = "550e8400-e29b-41d4-a716-446655440000";
        assert!(validate_event_id(valid_uuid).is_ok());
        assert!(validate_event_id_field(valid_uuid, "test").is_ok());
    }

    #[test]
    fn test_validate_event_id_invalid() {
        let invalid_ids = vec![
            "not-a-uuid",
            "550e8400-e29b-41d4-a716",
            "550e8400-e29b-41d4-a716-446655440000-extra",
            "",
        ];

        for id in invalid_ids {
            assert!(validate_event_id(id).is_err());
            assert!(validate_event_id_field(id, "test").is_err());
        }
    }

    #[test]
    fn test_validate_vehicle_id() {
        assert!(validate_vehicle_id_field("VEH-0001", "vehicle_id").is_ok());
        assert!(validate_vehicle_id_field("bus_42", "vehicle_id").is_ok());

        assert!(validate_vehicle_id_field("", "vehicle_id").is_err());
        assert!(validate_vehicle_id_field("   ", "vehicle_id").is_err());
        assert!(validate_vehicle_id_field(&"x".repeat(65), "vehicle_id").is_err());
    }

    #[test]
    fn test_validate_vehicle_type() {
        assert!(validate_vehicle_type("sedan").is_ok());
        assert!(validate_vehicle_type("suv").is_ok());
        assert!(validate_vehicle_type("truck").is_ok());
        assert!(validate_vehicle_type("van").is_ok());
        assert!(validate_vehicle_type("SEDAN").is_ok()); // Case insensitive
        assert!(validate_vehicle_type("Truck").is_ok());

        assert!(validate_vehicle_type("bicycle").is_err());
        assert!(validate_vehicle_type("").is_err());
    }

    #[test]
    fn test_validate_status() {
        assert!(validate_status("active").is_ok());
        assert!(validate_status("idle").is_ok());
        assert!(validate_status("maintenance").is_ok());
        assert!(validate_status("ACTIVE").is_ok());

        assert!(validate_status("retired").is_err());
        assert!(validate_status("").is_err());
    }

    #[test]
    fn test_validate_timestamp() {
        let parsed = validate_timestamp_field(1736868000, "timestamp").unwrap();
        assert_eq!(parsed.timestamp(), 1736868000);

        assert!(validate_timestamp_field(0, "timestamp").is_ok());
        assert!(validate_timestamp_field(-1, "timestamp").is_err());
        assert!(validate_timestamp_field(i64::MAX, "timestamp").is_err());
    }

    #[test]
    fn test_validate_latitude() {
        assert_eq!(validate_latitude(37.7749, "lat").unwrap(), 37.7749);
        assert_eq!(validate_latitude(-90.0, "lat").unwrap(), -90.0);
        assert_eq!(validate_latitude(90.0, "lat").unwrap(), 90.0);

        assert!(validate_latitude(90.0001, "lat").is_err());
        assert!(validate_latitude(-91.0, "lat").is_err());
        assert!(validate_latitude(f64::NAN, "lat").is_err());
        assert!(validate_latitude(f64::INFINITY, "lat").is_err());
    }

    #[test]
    fn test_validate_longitude() {
        assert_eq!(validate_longitude(-122.4194, "lng").unwrap(), -122.4194);
        assert_eq!(validate_longitude(-180.0, "lng").unwrap(), -180.0);
        assert_eq!(validate_longitude(180.0, "lng").unwrap(), 180.0);

        assert!(validate_longitude(180.5, "lng").is_err());
        assert!(validate_longitude(-200.0, "lng").is_err());
        assert!(validate_longitude(f64::NAN, "lng").is_err());
    }

    #[test]
    fn test_validate_speed() {
        assert_eq!(validate_speed(Some(42.5), "speed").unwrap(), Some(42.5));
        assert_eq!(validate_speed(Some(0.0), "speed").unwrap(), Some(0.0));
        assert_eq!(validate_speed(None, "speed").unwrap(), None);

        assert!(validate_speed(Some(-1.0), "speed").is_err());
        assert!(validate_speed(Some(f64::NAN), "speed").is_err());
        assert!(validate_speed(Some(f64::NEG_INFINITY), "speed").is_err());
    }

    #[test]
    fn test_validate_string_length() {
        assert!(validate_string_length("hello", "test", Some(1), Some(10)).is_ok());
        assert!(validate_string_length("hello", "test", Some(5), Some(5)).is_ok());

        assert!(validate_string_length("hi", "test", Some(3), None).is_err());
        assert!(validate_string_length("hello world", "test", None, Some(5)).is_err());
    }

    #[test]
    fn test_validate_required() {
        assert!(validate_required("value", "test").is_ok());
        assert!(validate_required(" value ", "test").is_ok());

        assert!(validate_required("", "test").is_err());
        assert!(validate_required("   ", "test").is_err());
    }
}
