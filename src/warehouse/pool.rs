//! Warehouse connection pool management for FleetStream
//!
//! This module provides connection pooling using SQLx with configuration
//! options for connection limits, timeouts, and retry behavior.

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::ConnectOptions;
use std::str::FromStr;
use std::time::Duration;

use crate::config::WarehouseConfig;
use crate::error::{Error, Result};

/// Type alias for the warehouse connection pool
pub type DbPool = PgPool;

/// Create a new warehouse connection pool
///
/// # Arguments
/// * `config` - Warehouse configuration
///
/// # Returns
/// A configured connection pool ready for use
pub async fn create_pool(config: &WarehouseConfig) -> Result<DbPool> {
    // Parse connection options from URL
    let connect_options = PgConnectOptions::from_str(&config.url)
        .map_err(|e| Error::config(format!("Invalid warehouse URL: {}", e)))?
        // Set application name for monitoring
        .application_name("fleetstream")
        // Enable statement logging in debug mode
        .log_statements(tracing::log::LevelFilter::Debug)
        .statement_cache_capacity(100);

    // Configure pool options
    let pool = PgPoolOptions::new()
        // Connection pool size
        .max_connections(config.pool_max_size)
        .min_connections(config.pool_min_idle)
        // Timeouts
        .acquire_timeout(config.pool_timeout())
        .idle_timeout(Some(config.idle_timeout()))
        // Test connections before use
        .test_before_acquire(true)
        // Connection lifecycle
        .max_lifetime(Some(Duration::from_secs(3600))) // 1 hour
        // Build pool with options
        .connect_with(connect_options)
        .await
        .map_err(|e| Error::warehouse(format!("Failed to create connection pool: {}", e)))?;

    // Verify connectivity
    sqlx::query("SELECT 1")
        .fetch_one(&pool)
        .await
        .map_err(|e| Error::warehouse(format!("Failed to verify warehouse connection: {}", e)))?;

    tracing::info!(
        max_connections = config.pool_max_size,
        min_idle = config.pool_min_idle,
        "Warehouse connection pool created"
    );

    Ok(pool)
}

/// Pool health check
///
/// Verifies that the pool can acquire a connection and execute a simple query.
pub async fn health_check(pool: &DbPool) -> Result<()> {
    let start = std::time::Instant::now();

    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| Error::warehouse(format!("Health check failed: {}", e)))?;

    let elapsed = start.elapsed();

    if elapsed > Duration::from_secs(1) {
        tracing::warn!(
            elapsed_ms = elapsed.as_millis(),
            "Warehouse health check slow"
        );
    }

    Ok(())
}

/// Get pool metrics for monitoring
pub struct PoolMetrics {
    /// Current pool size
    pub size: u32,
    /// Number of idle connections
    pub idle: usize,
    /// Maximum pool size
    pub max_size: u32,
    /// Number of connections being acquired
    pub acquiring: u32,
}

impl PoolMetrics {
    /// Create metrics from a pool
    pub fn from_pool(pool: &DbPool) -> Self {
        Self {
            size: pool.size(),
            idle: pool.num_idle(),
            max_size: pool.options().get_max_connections(),
            acquiring: pool.size() - pool.num_idle() as u32,
        }
    }

    /// Check if pool is healthy
    pub fn is_healthy(&self) -> bool {
        // Pool is healthy if we have some idle connections
        // or we're not at max capacity
        self.idle > 0 || self.size < self.max_size
    }

    /// Get pool utilization as a percentage
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            return 0.0;
        }
        ((self.size - self.idle as u32) as f64 / self.max_size as f64) * 100.0
    }
}
