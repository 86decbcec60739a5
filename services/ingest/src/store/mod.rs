//! Persistence seam for batches, facts, row errors and audit events.
//!
//! [`PgStore`] is the production backend. [`MemoryStore`] backs tests and
//! the CLI dry-run.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::audit::AuditEvent;
use crate::mapping::BatchAccumulator;
use crate::model::{BatchStatus, RowError, UploadBatch};
use async_trait::async_trait;
use uuid::Uuid;

/// Default and maximum page sizes for batch listings.
pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 500;

/// Clamp a caller-supplied listing limit into `1..=MAX_LIST_LIMIT`.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("unknown batch {0}")]
    UnknownBatch(Uuid),

    #[error("batch {id} is already {status}")]
    BatchFinished { id: Uuid, status: BatchStatus },

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait IngestStore: Send + Sync {
    /// Persist a new batch in `Processing`.
    async fn create_batch(&self, batch: &UploadBatch) -> Result<(), StoreError>;

    /// Write everything the batch produced and mark it `Processed`, atomically.
    /// On error nothing from `acc` is visible and the batch is still `Processing`.
    /// A batch that is already terminal is refused with [`StoreError::BatchFinished`].
    async fn commit_batch(&self, acc: &BatchAccumulator) -> Result<UploadBatch, StoreError>;

    /// Mark the batch `Failed` with zero counts and one batch-level error.
    /// Only a `Processing` batch can fail.
    async fn fail_batch(&self, batch_id: Uuid, message: &str) -> Result<UploadBatch, StoreError>;

    /// Newest first.
    async fn list_batches(&self, limit: i64) -> Result<Vec<UploadBatch>, StoreError>;

    async fn get_batch(&self, batch_id: Uuid) -> Result<Option<UploadBatch>, StoreError>;

    /// Batch-level errors first, then by row number and creation time.
    async fn batch_errors(&self, batch_id: Uuid) -> Result<Vec<RowError>, StoreError>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), 50);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(-3)), 1);
        assert_eq!(clamp_limit(Some(20)), 20);
        assert_eq!(clamp_limit(Some(10_000)), 500);
    }
}
