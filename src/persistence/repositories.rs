use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::{Owner, Property, PropertyDetails, PropertyFilters, PropertyImage, PropertyTrace};

use super::error::StoreResult;

// ============================================================================
// Repository Contracts
// ============================================================================
//
// Narrow persistence access. Writes are staged on the owning UnitOfWork and
// reach the store on `save_changes`; reads see what the session has flushed.
//
// ============================================================================

#[async_trait]
pub trait PropertyRepository: Send + Sync {
    /// Filtered, name-ordered page of live properties with owner name and enabled images
    async fn get_with_filters(
        &self,
        filters: &PropertyFilters,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<PropertyDetails>>;

    /// Stage a new property
    async fn create(&self, property: Property, cancel: &CancellationToken) -> StoreResult<Property>;

    /// Fails with `StoreError::NotFound` for unknown or soft-deleted ids
    async fn get_by_id(&self, id: Uuid, cancel: &CancellationToken) -> StoreResult<Property>;

    /// Stage an update of every mutable column
    async fn update(&self, property: &Property, cancel: &CancellationToken) -> StoreResult<()>;

    async fn exists(&self, id: Uuid, cancel: &CancellationToken) -> StoreResult<bool>;

    /// True if a live property other than `exclude_id` already uses `code`
    async fn code_internal_exists(
        &self,
        code: &str,
        exclude_id: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait OwnerRepository: Send + Sync {
    async fn exists(&self, id: Uuid, cancel: &CancellationToken) -> StoreResult<bool>;

    async fn get_by_id(&self, id: Uuid, cancel: &CancellationToken) -> StoreResult<Owner>;

    async fn create(&self, owner: Owner, cancel: &CancellationToken) -> StoreResult<Owner>;
}

#[async_trait]
pub trait PropertyImageRepository: Send + Sync {
    async fn create(&self, image: PropertyImage, cancel: &CancellationToken) -> StoreResult<PropertyImage>;
}

/// Append-only: traces are never updated or deleted
#[async_trait]
pub trait PropertyTraceRepository: Send + Sync {
    async fn create(&self, trace: PropertyTrace, cancel: &CancellationToken) -> StoreResult<PropertyTrace>;

    /// Price history of one property, oldest first
    async fn list_for_property(
        &self,
        property_id: Uuid,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<PropertyTrace>>;
}
