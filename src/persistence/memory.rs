use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::{Owner, Property, PropertyDetails, PropertyFilters, PropertyImage, PropertyTrace};

use super::change_set::PendingChange;
use super::error::{StoreError, StoreResult, TransactionError};
use super::repositories::{
    OwnerRepository, PropertyImageRepository, PropertyRepository, PropertyTraceRepository,
};
use super::unit_of_work::{ensure_active, UnitOfWork, UnitOfWorkFactory};

// ============================================================================
// In-Memory Store
// ============================================================================
//
// Process-local backend with the same constraints as the SQL schema:
// - internal code unique among live properties
// - a property must reference an existing owner (owners are restrict-on-delete)
// - images and traces must reference an existing property
//
// Writes of an open transaction live in a private log and are applied to the
// shared tables in one step at commit.
//
// ============================================================================

#[derive(Debug, Clone, Default)]
struct Tables {
    owners: HashMap<Uuid, Owner>,
    properties: HashMap<Uuid, Property>,
    images: HashMap<Uuid, PropertyImage>,
    traces: Vec<PropertyTrace>,
}

impl Tables {
    fn apply(&mut self, change: PendingChange) -> StoreResult<()> {
        match change {
            PendingChange::InsertOwner(owner) => {
                if self.owners.contains_key(&owner.id) {
                    return Err(StoreError::Constraint(format!("owner {} already exists", owner.id)));
                }
                self.owners.insert(owner.id, owner);
            }
            PendingChange::InsertProperty(property) => {
                if self.properties.contains_key(&property.id) {
                    return Err(StoreError::Constraint(format!(
                        "property {} already exists",
                        property.id
                    )));
                }
                self.check_property(&property)?;
                self.properties.insert(property.id, property);
            }
            PendingChange::UpdateProperty(property) => {
                if self.live_property(property.id).is_none() {
                    return Err(StoreError::not_found("Property", property.id));
                }
                self.check_property(&property)?;
                self.properties.insert(property.id, property);
            }
            PendingChange::InsertImage(image) => {
                if self.live_property(image.property_id).is_none() {
                    return Err(StoreError::Constraint(format!(
                        "image references unknown property {}",
                        image.property_id
                    )));
                }
                self.images.insert(image.id, image);
            }
            PendingChange::InsertTrace(trace) => {
                if !self.properties.contains_key(&trace.property_id) {
                    return Err(StoreError::Constraint(format!(
                        "trace references unknown property {}",
                        trace.property_id
                    )));
                }
                self.traces.push(trace);
            }
        }
        Ok(())
    }

    fn apply_all(&mut self, changes: Vec<PendingChange>) -> StoreResult<()> {
        for change in changes {
            self.apply(change)?;
        }
        Ok(())
    }

    fn check_property(&self, property: &Property) -> StoreResult<()> {
        if !self.owners.contains_key(&property.owner_id) {
            return Err(StoreError::Constraint(format!(
                "property references unknown owner {}",
                property.owner_id
            )));
        }
        let duplicate = !property.is_deleted
            && self.properties.values().any(|other| {
                other.id != property.id
                    && !other.is_deleted
                    && other.code_internal == property.code_internal
            });
        if duplicate {
            return Err(StoreError::DuplicateCode(property.code_internal.clone()));
        }
        Ok(())
    }

    fn live_property(&self, id: Uuid) -> Option<&Property> {
        self.properties.get(&id).filter(|p| !p.is_deleted)
    }

    fn details(&self, filters: &PropertyFilters) -> Vec<PropertyDetails> {
        let mut matching: Vec<&Property> = self
            .properties
            .values()
            .filter(|p| !p.is_deleted && filters.matches(p))
            .collect();
        matching.sort_by_cached_key(|p| (p.name.to_lowercase(), p.id));

        matching
            .into_iter()
            .skip(filters.offset() as usize)
            .take(filters.limit() as usize)
            .map(|property| {
                let mut images: Vec<PropertyImage> = self
                    .images
                    .values()
                    .filter(|image| image.property_id == property.id && image.is_visible())
                    .cloned()
                    .collect();
                images.sort_by_key(|image| image.created_at);

                PropertyDetails {
                    property: property.clone(),
                    owner_name: self.owners.get(&property.owner_id).map(|o| o.name.clone()),
                    images,
                }
            })
            .collect()
    }
}

/// Shared process-local tables
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Apply a batch atomically: either every change lands or none does
    async fn apply_atomically(&self, changes: Vec<PendingChange>) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let mut next = tables.clone();
        next.apply_all(changes)?;
        *tables = next;
        Ok(())
    }

    /// Committed tables overlaid with an open transaction's flushed writes.
    /// Fails when a write committed by another session now conflicts with the log.
    async fn view(&self, transaction_log: &[PendingChange]) -> StoreResult<Tables> {
        let mut view = self.tables.read().await.clone();
        view.apply_all(transaction_log.to_vec())?;
        Ok(view)
    }

    pub async fn property_count(&self) -> usize {
        self.tables.read().await.properties.len()
    }

    pub async fn trace_count(&self) -> usize {
        self.tables.read().await.traces.len()
    }
}

pub struct InMemoryUnitOfWorkFactory {
    store: Arc<InMemoryStore>,
}

impl InMemoryUnitOfWorkFactory {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }
}

impl UnitOfWorkFactory for InMemoryUnitOfWorkFactory {
    fn create(&self) -> Box<dyn UnitOfWork> {
        Box::new(InMemoryUnitOfWork::new(self.store.clone()))
    }
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Default)]
struct SessionState {
    pending: Vec<PendingChange>,
    /// Flushed writes of the open transaction; None while Idle
    transaction: Option<Vec<PendingChange>>,
}

struct MemorySession {
    store: Arc<InMemoryStore>,
    state: Mutex<SessionState>,
}

impl MemorySession {
    async fn stage(&self, change: PendingChange) {
        self.state.lock().await.pending.push(change);
    }

    async fn snapshot(&self) -> StoreResult<Tables> {
        let state = self.state.lock().await;
        match &state.transaction {
            Some(log) => self.store.view(log).await,
            None => self.store.view(&[]).await,
        }
    }
}

// ============================================================================
// Unit of Work
// ============================================================================

pub struct InMemoryUnitOfWork {
    session: Arc<MemorySession>,
    properties: OnceLock<MemoryPropertyRepository>,
    owners: OnceLock<MemoryOwnerRepository>,
    images: OnceLock<MemoryPropertyImageRepository>,
    traces: OnceLock<MemoryPropertyTraceRepository>,
}

impl InMemoryUnitOfWork {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self {
            session: Arc::new(MemorySession {
                store,
                state: Mutex::new(SessionState::default()),
            }),
            properties: OnceLock::new(),
            owners: OnceLock::new(),
            images: OnceLock::new(),
            traces: OnceLock::new(),
        }
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    fn properties(&self) -> &dyn PropertyRepository {
        self.properties.get_or_init(|| MemoryPropertyRepository {
            session: self.session.clone(),
        })
    }

    fn owners(&self) -> &dyn OwnerRepository {
        self.owners.get_or_init(|| MemoryOwnerRepository {
            session: self.session.clone(),
        })
    }

    fn property_images(&self) -> &dyn PropertyImageRepository {
        self.images.get_or_init(|| MemoryPropertyImageRepository {
            session: self.session.clone(),
        })
    }

    fn property_traces(&self) -> &dyn PropertyTraceRepository {
        self.traces.get_or_init(|| MemoryPropertyTraceRepository {
            session: self.session.clone(),
        })
    }

    async fn save_changes(&self, cancel: &CancellationToken) -> StoreResult<usize> {
        ensure_active(cancel)?;
        let mut state = self.session.state.lock().await;
        let changes = std::mem::take(&mut state.pending);
        let count = changes.len();

        match state.transaction.as_mut() {
            Some(log) => {
                // constraints are checked at flush time, as a database would
                let mut view = self.session.store.view(log).await?;
                view.apply_all(changes.clone())?;
                log.extend(changes);
            }
            None => self.session.store.apply_atomically(changes).await?,
        }

        tracing::debug!(flushed = count, "Saved pending changes");
        Ok(count)
    }

    async fn begin_transaction(&self, cancel: &CancellationToken) -> StoreResult<()> {
        ensure_active(cancel)?;
        let mut state = self.session.state.lock().await;
        if state.transaction.is_some() {
            return Err(TransactionError::AlreadyOpen.into());
        }
        state.transaction = Some(Vec::new());
        Ok(())
    }

    async fn commit_transaction(&self, cancel: &CancellationToken) -> StoreResult<()> {
        let log = self
            .session
            .state
            .lock()
            .await
            .transaction
            .take()
            .ok_or(TransactionError::NotOpen("commit"))?;

        // the transaction is closed either way; a cancelled commit discards it
        ensure_active(cancel)?;
        let count = log.len();
        self.session.store.apply_atomically(log).await?;

        tracing::debug!(changes = count, "Committed transaction");
        Ok(())
    }

    async fn rollback_transaction(&self, _cancel: &CancellationToken) -> StoreResult<()> {
        let mut state = self.session.state.lock().await;
        let log = state
            .transaction
            .take()
            .ok_or(TransactionError::NotOpen("rollback"))?;
        state.pending.clear();

        tracing::debug!(discarded = log.len(), "Rolled back transaction");
        Ok(())
    }
}

// ============================================================================
// Repositories
// ============================================================================

struct MemoryPropertyRepository {
    session: Arc<MemorySession>,
}

#[async_trait]
impl PropertyRepository for MemoryPropertyRepository {
    async fn get_with_filters(
        &self,
        filters: &PropertyFilters,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<PropertyDetails>> {
        ensure_active(cancel)?;
        Ok(self.session.snapshot().await?.details(filters))
    }

    async fn create(&self, property: Property, cancel: &CancellationToken) -> StoreResult<Property> {
        ensure_active(cancel)?;
        self.session
            .stage(PendingChange::InsertProperty(property.clone()))
            .await;
        Ok(property)
    }

    async fn get_by_id(&self, id: Uuid, cancel: &CancellationToken) -> StoreResult<Property> {
        ensure_active(cancel)?;
        self.session
            .snapshot()
            .await?
            .live_property(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Property", id))
    }

    async fn update(&self, property: &Property, cancel: &CancellationToken) -> StoreResult<()> {
        ensure_active(cancel)?;
        self.session
            .stage(PendingChange::UpdateProperty(property.clone()))
            .await;
        Ok(())
    }

    async fn exists(&self, id: Uuid, cancel: &CancellationToken) -> StoreResult<bool> {
        ensure_active(cancel)?;
        Ok(self.session.snapshot().await?.live_property(id).is_some())
    }

    async fn code_internal_exists(
        &self,
        code: &str,
        exclude_id: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> StoreResult<bool> {
        ensure_active(cancel)?;
        let view = self.session.snapshot().await?;
        Ok(view.properties.values().any(|p| {
            !p.is_deleted && p.code_internal == code && Some(p.id) != exclude_id
        }))
    }
}

struct MemoryOwnerRepository {
    session: Arc<MemorySession>,
}

#[async_trait]
impl OwnerRepository for MemoryOwnerRepository {
    async fn exists(&self, id: Uuid, cancel: &CancellationToken) -> StoreResult<bool> {
        ensure_active(cancel)?;
        Ok(self.session.snapshot().await?.owners.contains_key(&id))
    }

    async fn get_by_id(&self, id: Uuid, cancel: &CancellationToken) -> StoreResult<Owner> {
        ensure_active(cancel)?;
        self.session
            .snapshot()
            .await?
            .owners
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Owner", id))
    }

    async fn create(&self, owner: Owner, cancel: &CancellationToken) -> StoreResult<Owner> {
        ensure_active(cancel)?;
        self.session.stage(PendingChange::InsertOwner(owner.clone())).await;
        Ok(owner)
    }
}

struct MemoryPropertyImageRepository {
    session: Arc<MemorySession>,
}

#[async_trait]
impl PropertyImageRepository for MemoryPropertyImageRepository {
    async fn create(&self, image: PropertyImage, cancel: &CancellationToken) -> StoreResult<PropertyImage> {
        ensure_active(cancel)?;
        self.session.stage(PendingChange::InsertImage(image.clone())).await;
        Ok(image)
    }
}

struct MemoryPropertyTraceRepository {
    session: Arc<MemorySession>,
}

#[async_trait]
impl PropertyTraceRepository for MemoryPropertyTraceRepository {
    async fn create(&self, trace: PropertyTrace, cancel: &CancellationToken) -> StoreResult<PropertyTrace> {
        ensure_active(cancel)?;
        self.session.stage(PendingChange::InsertTrace(trace.clone())).await;
        Ok(trace)
    }

    async fn list_for_property(
        &self,
        property_id: Uuid,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<PropertyTrace>> {
        ensure_active(cancel)?;
        let mut traces: Vec<PropertyTrace> = self
            .session
            .snapshot()
            .await?
            .traces
            .into_iter()
            .filter(|trace| trace.property_id == property_id)
            .collect();
        traces.sort_by_key(|trace| trace.event_date);
        Ok(traces)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
