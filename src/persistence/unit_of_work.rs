use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::error::{StoreError, StoreResult};
use super::repositories::{
    OwnerRepository, PropertyImageRepository, PropertyRepository, PropertyTraceRepository,
};

// ============================================================================
// Unit of Work - Transaction Boundary
// ============================================================================
//
// States: Idle --begin--> Open --commit|rollback--> Idle
//
// - No nested transactions: begin while Open fails.
// - commit/rollback while Idle fail with a TransactionError.
// - commit always returns to Idle, whether it succeeds or not.
// - rollback ignores cancellation so an open transaction can always be closed.
// - save_changes may run any number of times inside one transaction.
//
// All repositories of one UnitOfWork share its session, so their writes join
// the same transaction. A UnitOfWork belongs to one request and is never
// shared between concurrent calls.
//
// ============================================================================

#[async_trait]
pub trait UnitOfWork: Send + Sync {
    fn properties(&self) -> &dyn PropertyRepository;

    fn owners(&self) -> &dyn OwnerRepository;

    fn property_images(&self) -> &dyn PropertyImageRepository;

    fn property_traces(&self) -> &dyn PropertyTraceRepository;

    /// Flush staged writes; returns how many were written
    async fn save_changes(&self, cancel: &CancellationToken) -> StoreResult<usize>;

    async fn begin_transaction(&self, cancel: &CancellationToken) -> StoreResult<()>;

    async fn commit_transaction(&self, cancel: &CancellationToken) -> StoreResult<()>;

    async fn rollback_transaction(&self, cancel: &CancellationToken) -> StoreResult<()>;
}

/// Creates one request-scoped UnitOfWork per call
pub trait UnitOfWorkFactory: Send + Sync {
    fn create(&self) -> Box<dyn UnitOfWork>;
}

/// Fail fast once the caller has given up
pub fn ensure_active(cancel: &CancellationToken) -> StoreResult<()> {
    if cancel.is_cancelled() {
        return Err(StoreError::Cancelled);
    }
    Ok(())
}
