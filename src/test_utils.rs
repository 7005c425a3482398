//! Test utilities for FleetStream
//!
//! This module provides mock implementations and utilities for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::models::{PositionEvent, VehicleStatus, VehicleType};
use crate::warehouse::position_repo::{PositionRepository, VehicleUpdateStats};
use crate::warehouse::repository::{
    BatchRepository, Repository, RepositoryError, RepositoryResult,
};

/// Mock implementation of PositionRepository for testing
///
/// Stores positions in memory with the same duplicate handling as the real
/// warehouse: a batch insert skips event IDs that are already stored. Failures
/// can be injected to exercise retry behavior.
#[derive(Debug, Clone)]
pub struct MockPositionRepository {
    positions: Arc<Mutex<Vec<PositionEvent>>>,
    batches: Arc<Mutex<Vec<Vec<PositionEvent>>>>,
    insert_attempts: Arc<Mutex<u32>>,
    failures_remaining: Arc<Mutex<u32>>,
    fail_retryable: Arc<Mutex<bool>>,
    error_message: Arc<Mutex<Option<String>>>,
    insert_delay: Arc<Mutex<Option<Duration>>>,
}

impl Default for MockPositionRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPositionRepository {
    /// Create a new mock repository
    pub fn new() -> Self {
        Self {
            positions: Arc::new(Mutex::new(Vec::new())),
            batches: Arc::new(Mutex::new(Vec::new())),
            insert_attempts: Arc::new(Mutex::new(0)),
            failures_remaining: Arc::new(Mutex::new(0)),
            fail_retryable: Arc::new(Mutex::new(true)),
            error_message: Arc::new(Mutex::new(None)),
            insert_delay: Arc::new(Mutex::new(None)),
        }
    }

    /// Configure the next insert to stall for `delay` before completing
    pub fn delay_next_insert(&self, delay: Duration) {
        *self.insert_delay.lock().unwrap() = Some(delay);
    }

    /// Configure the mock to fail the next `count` operations with a
    /// retryable error
    pub fn fail_next_operations(&self, count: u32, error_message: &str) {
        *self.failures_remaining.lock().unwrap() = count;
        *self.fail_retryable.lock().unwrap() = true;
        *self.error_message.lock().unwrap() = Some(error_message.to_string());
    }

    /// Configure the mock to fail the next operation with an error that must
    /// not be retried
    pub fn fail_next_operation_permanently(&self, error_message: &str) {
        *self.failures_remaining.lock().unwrap() = 1;
        *self.fail_retryable.lock().unwrap() = false;
        *self.error_message.lock().unwrap() = Some(error_message.to_string());
    }

    /// Get all stored positions
    pub fn all_positions(&self) -> Vec<PositionEvent> {
        self.positions.lock().unwrap().clone()
    }

    /// Get every batch that was successfully inserted, in insertion order
    pub fn recorded_batches(&self) -> Vec<Vec<PositionEvent>> {
        self.batches.lock().unwrap().clone()
    }

    /// Number of insert_batch calls, including failed attempts
    pub fn insert_attempts(&self) -> u32 {
        *self.insert_attempts.lock().unwrap()
    }

    /// Clear all stored positions and recorded batches
    pub fn clear(&self) {
        self.positions.lock().unwrap().clear();
        self.batches.lock().unwrap().clear();
        *self.insert_attempts.lock().unwrap() = 0;
    }

    /// Add a position directly, bypassing batch accounting
    pub fn add_position(&self, event: PositionEvent) {
        self.positions.lock().unwrap().push(event);
    }

    fn check_failure(&self) -> RepositoryResult<()> {
        let mut remaining = self.failures_remaining.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            let msg = self
                .error_message
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| "Mock failure".to_string());
            let err = if *self.fail_retryable.lock().unwrap() {
                RepositoryError::Connection(msg)
            } else {
                RepositoryError::Serialization(msg)
            };
            return Err(err);
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for MockPositionRepository {
    type Entity = PositionEvent;
    type Id = Uuid;

    async fn find_by_id(&self, id: Self::Id) -> RepositoryResult<Option<Self::Entity>> {
        self.check_failure()?;
        let positions = self.positions.lock().unwrap();
        Ok(positions.iter().find(|p| p.event_id == id).cloned())
    }

    async fn exists(&self, id: Self::Id) -> RepositoryResult<bool> {
        self.check_failure()?;
        let positions = self.positions.lock().unwrap();
        Ok(positions.iter().any(|p| p.event_id == id))
    }

    async fn count(&self) -> RepositoryResult<i64> {
        self.check_failure()?;
        let positions = self.positions.lock().unwrap();
        Ok(positions.len() as i64)
    }

    async fn health_check(&self) -> RepositoryResult<()> {
        self.check_failure()?;
        Ok(())
    }
}

#[async_trait]
impl BatchRepository for MockPositionRepository {
    async fn insert_batch(&self, entities: &[PositionEvent]) -> RepositoryResult<u64> {
        *self.insert_attempts.lock().unwrap() += 1;
        let delay = self.insert_delay.lock().unwrap().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_failure()?;

        let mut positions = self.positions.lock().unwrap();
        let mut inserted = 0u64;
        for entity in entities {
            if !positions.iter().any(|p| p.event_id == entity.event_id) {
                positions.push(entity.clone());
                inserted += 1;
            }
        }
        self.batches.lock().unwrap().push(entities.to_vec());
        Ok(inserted)
    }
}

#[async_trait]
impl PositionRepository for MockPositionRepository {
    async fn latest_positions(&self) -> RepositoryResult<Vec<PositionEvent>> {
        self.check_failure()?;
        let positions = self.positions.lock().unwrap();
        let mut latest: HashMap<String, PositionEvent> = HashMap::new();
        for position in positions.iter() {
            match latest.get(&position.vehicle_id) {
                Some(existing)
                    if (existing.recorded_at, existing.offset)
                        >= (position.recorded_at, position.offset) => {},
                _ => {
                    latest.insert(position.vehicle_id.clone(), position.clone());
                },
            }
        }
        let mut all: Vec<PositionEvent> = latest.into_values().collect();
        all.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id));
        Ok(all)
    }

    async fn latest_for_vehicle(
        &self,
        vehicle_id: &str,
    ) -> RepositoryResult<Option<PositionEvent>> {
        self.check_failure()?;
        let positions = self.positions.lock().unwrap();
        Ok(positions
            .iter()
            .filter(|p| p.vehicle_id == vehicle_id)
            .max_by_key(|p| (p.recorded_at, p.offset))
            .cloned())
    }

    async fn count_distinct_vehicles(&self) -> RepositoryResult<i64> {
        self.check_failure()?;
        let positions = self.positions.lock().unwrap();
        let vehicles: HashSet<&str> = positions.iter().map(|p| p.vehicle_id.as_str()).collect();
        Ok(vehicles.len() as i64)
    }

    async fn count_by_vehicle_type(&self, vehicle_type: VehicleType) -> RepositoryResult<i64> {
        self.check_failure()?;
        let positions = self.positions.lock().unwrap();
        Ok(positions.iter().filter(|p| p.vehicle_type == vehicle_type).count() as i64)
    }

    async fn get_latest_offset(&self, partition: i32) -> RepositoryResult<Option<i64>> {
        self.check_failure()?;
        let positions = self.positions.lock().unwrap();
        Ok(positions
            .iter()
            .filter(|p| p.partition == partition)
            .map(|p| p.offset)
            .max())
    }

    async fn update_stats(
        &self,
        since: DateTime<Utc>,
    ) -> RepositoryResult<Vec<VehicleUpdateStats>> {
        self.check_failure()?;
        let positions = self.positions.lock().unwrap();
        let mut stats: HashMap<String, VehicleUpdateStats> = HashMap::new();
        for position in positions.iter().filter(|p| p.recorded_at > since) {
            match stats.get_mut(&position.vehicle_id) {
                Some(entry) => {
                    entry.update_count += 1;
                    entry.first_update = entry.first_update.min(position.recorded_at);
                    entry.last_update = entry.last_update.max(position.recorded_at);
                },
                None => {
                    stats.insert(
                        position.vehicle_id.clone(),
                        VehicleUpdateStats {
                            vehicle_id: position.vehicle_id.clone(),
                            update_count: 1,
                            first_update: position.recorded_at,
                            last_update: position.recorded_at,
                        },
                    );
                },
            }
        }
        let mut all: Vec<VehicleUpdateStats> = stats.into_values().collect();
        all.sort_by(|a, b| {
            b.update_count
                .cmp(&a.update_count)
                .then_with(|| a.vehicle_id.cmp(&b.vehicle_id))
        });
        Ok(all)
    }
}

/// Create a test PositionEvent with default values
pub fn create_test_position() -> PositionEvent {
    PositionEvent {
        event_id: Uuid::new_v4(),
        vehicle_id: "VEH-0001".to_string(),
        vehicle_type: VehicleType::Sedan,
        status: VehicleStatus::Active,
        recorded_at: Utc::now(),
        latitude: 37.7749,
        longitude: -122.4194,
        speed_mph: Some(30.0),
        partition: 0,
        offset: 0,
        received_at: Utc::now(),
    }
}

/// Create a test PositionEvent for a given vehicle and location
pub fn create_test_position_at(vehicle_id: &str, latitude: f64, longitude: f64) -> PositionEvent {
    let mut event = create_test_position();
    event.vehicle_id = vehicle_id.to_string();
    event.latitude = latitude;
    event.longitude = longitude;
    event
}

/// Create multiple test positions, one per distinct vehicle
pub fn create_test_positions(count: usize) -> Vec<PositionEvent> {
    (0..count)
        .map(|i| {
            let mut event = create_test_position();
            event.vehicle_id = format!("VEH-{:04}", i + 1);
            event.offset = i as i64;
            event
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_repository() {
        let repo = MockPositionRepository::new();
        let positions = create_test_positions(3);

        // Test insert_batch
        let inserted = repo.insert_batch(&positions).await.unwrap();
        assert_eq!(inserted, 3);

        // Test find_by_id
        let found = repo.find_by_id(positions[0].event_id).await.unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().event_id, positions[0].event_id);

        // Test exists
        assert!(repo.exists(positions[1].event_id).await.unwrap());

        // Test count
        assert_eq!(repo.count().await.unwrap(), 3);
        assert_eq!(repo.count_distinct_vehicles().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_mock_repository_skips_duplicates() {
        let repo = MockPositionRepository::new();
        let position = create_test_position();

        let first = repo.insert_batch(std::slice::from_ref(&position)).await.unwrap();
        let second = repo.insert_batch(std::slice::from_ref(&position)).await.unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 0);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mock_repository_failure_injection() {
        let repo = MockPositionRepository::new();
        let positions = create_test_positions(2);

        repo.fail_next_operations(2, "Connection refused");

        assert!(repo.insert_batch(&positions).await.is_err());
        assert!(repo.insert_batch(&positions).await.is_err());

        // Succeeds after the injected failures are spent
        assert!(repo.insert_batch(&positions).await.is_ok());
        assert_eq!(repo.insert_attempts(), 3);
    }

    #[tokio::test]
    async fn test_mock_latest_positions() {
        let repo = MockPositionRepository::new();

        let mut older = create_test_position_at("VEH-0001", 10.0, 20.0);
        older.offset = 0;
        let mut newer = create_test_position_at("VEH-0001", 10.1, 20.1);
        newer.recorded_at = older.recorded_at + chrono::Duration::seconds(5);
        newer.offset = 1;

        repo.insert_batch(&[older, newer]).await.unwrap();

        let latest = repo.latest_positions().await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].coordinates(), (10.1, 20.1));

        let single = repo.latest_for_vehicle("VEH-0001").await.unwrap().unwrap();
        assert_eq!(single.offset, 1);
    }

    #[tokio::test]
    async fn test_mock_update_stats() {
        let repo = MockPositionRepository::new();
        let mut positions = create_test_positions(2);

        let mut repeat = create_test_position();
        repeat.recorded_at = positions[0].recorded_at + chrono::Duration::seconds(5);
        repeat.offset = 10;
        positions.push(repeat);

        repo.insert_batch(&positions).await.unwrap();

        let since = Utc::now() - chrono::Duration::hours(1);
        let stats = repo.update_stats(since).await.unwrap();

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].vehicle_id, "VEH-0001");
        assert_eq!(stats[0].update_count, 2);
        assert!(stats[0].last_update > stats[0].first_update);
        assert_eq!(stats[1].update_count, 1);
    }

    #[tokio::test]
    async fn test_mock_latest_offset() {
        let repo = MockPositionRepository::new();
        let mut positions = create_test_positions(3);
        positions[2].partition = 1;

        repo.insert_batch(&positions).await.unwrap();

        assert_eq!(repo.get_latest_offset(0).await.unwrap(), Some(1));
        assert_eq!(repo.get_latest_offset(1).await.unwrap(), Some(2));
        assert_eq!(repo.get_latest_offset(2).await.unwrap(), None);
    }
}
