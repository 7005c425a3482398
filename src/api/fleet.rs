//! Fleet snapshot endpoints
//!
//! Serves the in-memory latest-position table: the whole fleet at once,
//! or a single vehicle by id.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use super::{AppState, FleetResponse};
use crate::error::{Error, Result};
use crate::models::PositionEvent;

/// Returns the latest known position for every vehicle
pub async fn fleet_snapshot(State(state): State<AppState>) -> Response {
    let vehicles = state.fleet.snapshot().await;
    let response = FleetResponse {
        count: vehicles.len(),
        vehicles,
    };

    (StatusCode::OK, Json(response)).into_response()
}

/// Returns the latest known position for a single vehicle
pub async fn fleet_vehicle(
    State(state): State<AppState>,
    Path(vehicle_id): Path<String>,
) -> Result<Json<PositionEvent>> {
    match state.fleet.get(&vehicle_id).await {
        Some(position) => Ok(Json(position)),
        None => Err(Error::NotFound(format!(
            "no position recorded for vehicle '{}'",
            vehicle_id
        ))),
    }
}
