//! In-memory latest-position table
//!
//! Tracks the most recent accepted position per vehicle. An incoming event
//! replaces the stored one wholesale in arrival order. Nothing is merged
//! field by field, so replayed records simply converge to the same state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::models::PositionEvent;

/// Shared latest-state table, keyed by vehicle ID
#[derive(Clone)]
pub struct VehicleStateTable {
    positions: Arc<RwLock<HashMap<String, PositionEvent>>>,
}

impl VehicleStateTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            positions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record an event as the latest position for its vehicle
    ///
    /// The stored event is replaced as a whole, including optional fields
    /// that may be absent on the newer event.
    pub async fn apply(&self, event: PositionEvent) {
        let mut positions = self.positions.write().await;
        positions.insert(event.vehicle_id.clone(), event);
    }

    /// Get the latest position for a single vehicle
    pub async fn get(&self, vehicle_id: &str) -> Option<PositionEvent> {
        let positions = self.positions.read().await;
        positions.get(vehicle_id).cloned()
    }

    /// Snapshot of all tracked vehicles, ordered by vehicle ID
    pub async fn snapshot(&self) -> Vec<PositionEvent> {
        let positions = self.positions.read().await;
        let mut all: Vec<PositionEvent> = positions.values().cloned().collect();
        all.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id));
        all
    }

    /// Number of vehicles currently tracked
    pub async fn len(&self) -> usize {
        let positions = self.positions.read().await;
        positions.len()
    }

    /// Whether any vehicle has reported yet
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for VehicleStateTable {
    fn default() -> Self {
        Self::new()
    }
}
