//! Warehouse module for FleetStream
//!
//! This module provides warehouse connectivity, connection pooling, the
//! position repository, and the batch writer that lands micro-batches.

pub mod pool;
pub mod position_repo;
pub mod repository;
pub mod writer;

// Re-export commonly used types
pub use pool::{create_pool, DbPool};
pub use position_repo::{PgPositionRepository, PositionRepository, VehicleUpdateStats};
pub use repository::{BatchRepository, Repository, RepositoryError, RepositoryResult, RetryConfig};
pub use writer::WarehouseWriter;

use sqlx::migrate::Migrator;

/// Warehouse migrator for running schema migrations
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Run warehouse migrations
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}

/// Check warehouse connectivity
pub async fn check_connection(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map(|_| ())
}

/// Get warehouse pool statistics
pub async fn get_stats(pool: &DbPool) -> WarehouseStats {
    WarehouseStats {
        pool_size: pool.size(),
        idle_connections: pool.num_idle(),
        max_connections: pool.options().get_max_connections(),
    }
}

/// Warehouse pool statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct WarehouseStats {
    /// Current pool size
    pub pool_size: u32,
    /// Number of idle connections
    pub idle_connections: usize,
    /// Maximum connections allowed
    pub max_connections: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warehouse_stats() {
        let stats = WarehouseStats {
            pool_size: 10,
            idle_connections: 5,
            max_connections: 20,
        };

        assert_eq!(stats.pool_size, 10);
        assert_eq!(stats.idle_connections, 5);
        assert_eq!(stats.max_connections, 20);
    }
}
