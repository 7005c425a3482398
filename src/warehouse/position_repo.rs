//! Position repository implementation for FleetStream
//!
//! PostgreSQL-backed storage for accepted position events. Batches are landed
//! with a single multi-row INSERT, and re-delivered events are skipped through
//! the unique event ID instead of failing the batch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::{
    models::{PositionEvent, VehicleStatus, VehicleType},
    warehouse::{
        repository::{BatchRepository, Repository, RepositoryError, RepositoryResult},
        DbPool,
    },
};

/// Per-vehicle update statistics over a recent window
#[derive(Debug, Clone)]
pub struct VehicleUpdateStats {
    pub vehicle_id: String,
    pub update_count: i64,
    pub first_update: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

/// Position repository trait
///
/// The seam between the pipeline and the warehouse. The pipeline only depends
/// on this trait, so tests can swap in an in-memory implementation.
#[async_trait]
pub trait PositionRepository:
    Repository<Entity = PositionEvent, Id = Uuid> + BatchRepository
{
    /// Latest stored position per vehicle, ordered by vehicle ID
    async fn latest_positions(&self) -> RepositoryResult<Vec<PositionEvent>>;

    /// Latest stored position for a single vehicle
    async fn latest_for_vehicle(&self, vehicle_id: &str) -> RepositoryResult<Option<PositionEvent>>;

    /// Number of distinct vehicles that have reported
    async fn count_distinct_vehicles(&self) -> RepositoryResult<i64>;

    /// Number of stored positions for a vehicle type
    async fn count_by_vehicle_type(&self, vehicle_type: VehicleType) -> RepositoryResult<i64>;

    /// Highest stored source offset for a partition
    async fn get_latest_offset(&self, partition: i32) -> RepositoryResult<Option<i64>>;

    /// Update counts with first/last update time per vehicle recorded after
    /// the cutoff, most active vehicle first
    async fn update_stats(
        &self,
        since: DateTime<Utc>,
    ) -> RepositoryResult<Vec<VehicleUpdateStats>>;
}

/// PostgreSQL implementation of PositionRepository
pub struct PgPositionRepository {
    pool: DbPool,
}

impl PgPositionRepository {
    /// Create a new PostgreSQL position repository
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Convert a database row to PositionEvent
    fn row_to_position(row: &sqlx::postgres::PgRow) -> RepositoryResult<PositionEvent> {
        let vehicle_type_str: String = row.try_get("vehicle_type")?;
        let vehicle_type = VehicleType::from_str(&vehicle_type_str)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

        let status_str: String = row.try_get("status")?;
        let status = VehicleStatus::from_str(&status_str)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

        Ok(PositionEvent {
            event_id: row.try_get("event_id")?,
            vehicle_id: row.try_get("vehicle_id")?,
            vehicle_type,
            status,
            recorded_at: row.try_get("recorded_at")?,
            latitude: row.try_get("latitude")?,
            longitude: row.try_get("longitude")?,
            speed_mph: row.try_get("speed_mph")?,
            partition: row.try_get("src_partition")?,
            offset: row.try_get("src_offset")?,
            received_at: row.try_get("received_at")?,
        })
    }
}

#[async_trait]
impl Repository for PgPositionRepository {
    type Entity = PositionEvent;
    type Id = Uuid;

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<PositionEvent>> {
        let result = sqlx::query(
            r#"
            SELECT event_id, vehicle_id, vehicle_type, status, recorded_at,
                   latitude, longitude, speed_mph, src_partition, src_offset, received_at
            FROM vehicle_positions
            WHERE event_id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match result {
            Some(row) => Ok(Some(Self::row_to_position(&row)?)),
            None => Ok(None),
        }
    }

    async fn exists(&self, id: Uuid) -> RepositoryResult<bool> {
        let result = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM vehicle_positions WHERE event_id = $1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(result)
    }

    async fn count(&self) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM vehicle_positions")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn health_check(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| RepositoryError::Connection(format!("Health check failed: {}", e)))
    }
}

#[async_trait]
impl BatchRepository for PgPositionRepository {
    async fn insert_batch(&self, entities: &[PositionEvent]) -> RepositoryResult<u64> {
        if entities.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO vehicle_positions (
                event_id, vehicle_id, vehicle_type, status, recorded_at,
                latitude, longitude, speed_mph, src_partition, src_offset, received_at
            ) ",
        );

        builder.push_values(entities, |mut b, event| {
            b.push_bind(event.event_id)
                .push_bind(&event.vehicle_id)
                .push_bind(event.vehicle_type.as_str())
                .push_bind(event.status.as_str())
                .push_bind(event.recorded_at)
                .push_bind(event.latitude)
                .push_bind(event.longitude)
                .push_bind(event.speed_mph)
                .push_bind(event.partition)
                .push_bind(event.offset)
                .push_bind(event.received_at);
        });

        // Re-delivered events are skipped, not rewritten
        builder.push(" ON CONFLICT (event_id) DO NOTHING");

        let result = builder.build().execute(&self.pool).await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PositionRepository for PgPositionRepository {
    async fn latest_positions(&self) -> RepositoryResult<Vec<PositionEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (vehicle_id)
                   event_id, vehicle_id, vehicle_type, status, recorded_at,
                   latitude, longitude, speed_mph, src_partition, src_offset, received_at
            FROM vehicle_positions
            ORDER BY vehicle_id, recorded_at DESC, src_offset DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_position).collect()
    }

    async fn latest_for_vehicle(
        &self,
        vehicle_id: &str,
    ) -> RepositoryResult<Option<PositionEvent>> {
        let result = sqlx::query(
            r#"
            SELECT event_id, vehicle_id, vehicle_type, status, recorded_at,
                   latitude, longitude, speed_mph, src_partition, src_offset, received_at
            FROM vehicle_positions
            WHERE vehicle_id = $1
            ORDER BY recorded_at DESC, src_offset DESC
            LIMIT 1
            "#,
        )
        .bind(vehicle_id)
        .fetch_optional(&self.pool)
        .await?;

        match result {
            Some(row) => Ok(Some(Self::row_to_position(&row)?)),
            None => Ok(None),
        }
    }

    async fn count_distinct_vehicles(&self) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(DISTINCT vehicle_id) FROM vehicle_positions",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn count_by_vehicle_type(&self, vehicle_type: VehicleType) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM vehicle_positions WHERE vehicle_type = $1",
        )
        .bind(vehicle_type.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn get_latest_offset(&self, partition: i32) -> RepositoryResult<Option<i64>> {
        let offset = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MAX(src_offset) FROM vehicle_positions WHERE src_partition = $1",
        )
        .bind(partition)
        .fetch_one(&self.pool)
        .await?;

        Ok(offset)
    }

    async fn update_stats(
        &self,
        since: DateTime<Utc>,
    ) -> RepositoryResult<Vec<VehicleUpdateStats>> {
        let rows = sqlx::query(
            r#"
            SELECT vehicle_id,
                   COUNT(*) AS update_count,
                   MIN(recorded_at) AS first_update,
                   MAX(recorded_at) AS last_update
            FROM vehicle_positions
            WHERE recorded_at > $1
            GROUP BY vehicle_id
            ORDER BY update_count DESC, vehicle_id
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(VehicleUpdateStats {
                    vehicle_id: row.try_get("vehicle_id")?,
                    update_count: row.try_get("update_count")?,
                    first_update: row.try_get("first_update")?,
                    last_update: row.try_get("last_update")?,
                })
            })
            .collect()
    }
}
