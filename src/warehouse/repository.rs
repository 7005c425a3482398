//! Repository abstractions for the FleetStream warehouse
//!
//! This module defines the repository traits and associated error types
//! for warehouse operations with proper error handling and retry support.

use async_trait::async_trait;

use std::fmt::Debug;
use thiserror::Error;

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Repository error types
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Warehouse connection error
    #[error("Warehouse connection error: {0}")]
    Connection(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic warehouse error
    #[error("Warehouse error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RepositoryError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            RepositoryError::Connection(_) => true,
            RepositoryError::Database(e) => {
                // Check SQLx error for retryable conditions
                matches!(
                    e,
                    sqlx::Error::PoolTimedOut
                        | sqlx::Error::PoolClosed
                        | sqlx::Error::Io(_)
                        | sqlx::Error::Tls(_)
                )
            },
            _ => false,
        }
    }
}

/// Convert repository errors to application errors
impl From<RepositoryError> for crate::error::Error {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Database(sqlx::Error::RowNotFound) => {
                crate::error::Error::NotFound("Row not found".to_string())
            },
            _ => crate::error::Error::warehouse(err.to_string()),
        }
    }
}

/// Base repository trait
#[async_trait]
pub trait Repository: Send + Sync {
    /// The entity type this repository manages
    type Entity: Send + Sync;

    /// The ID type for the entity
    type Id: Send + Sync + Debug;

    /// Find an entity by ID
    async fn find_by_id(&self, id: Self::Id) -> RepositoryResult<Option<Self::Entity>>;

    /// Check if an entity exists
    async fn exists(&self, id: Self::Id) -> RepositoryResult<bool>;

    /// Count total entities
    async fn count(&self) -> RepositoryResult<i64>;

    /// Health check for the repository
    async fn health_check(&self) -> RepositoryResult<()>;
}

/// Repository with batch insert capability
#[async_trait]
pub trait BatchRepository: Repository {
    /// Insert multiple entities in a single statement
    ///
    /// Returns the number of rows actually inserted, which may be lower than
    /// the batch size when duplicates were skipped.
    async fn insert_batch(&self, entities: &[Self::Entity]) -> RepositoryResult<u64>;
}

/// Retry configuration for batch writes
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial backoff duration in milliseconds
    pub initial_backoff_ms: u64,
    /// Maximum backoff duration in milliseconds
    pub max_backoff_ms: u64,
    /// Backoff multiplier
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 10000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Set the initial backoff
    pub fn with_initial_backoff(mut self, ms: u64) -> Self {
        self.initial_backoff_ms = ms;
        self
    }

    /// Set the maximum backoff
    pub fn with_max_backoff(mut self, ms: u64) -> Self {
        self.max_backoff_ms = ms;
        self
    }

    /// Set the backoff multiplier
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }
}
