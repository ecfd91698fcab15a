// ============================================================================
// Persistence Layer
// ============================================================================
//
// Repository contracts, the UnitOfWork transaction boundary and two backends:
// a process-local store and PostgreSQL.
//
// ============================================================================

pub mod change_set;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod repositories;
pub mod unit_of_work;

pub use change_set::PendingChange;
pub use error::{StoreError, StoreResult, TransactionError};
pub use memory::{InMemoryStore, InMemoryUnitOfWork, InMemoryUnitOfWorkFactory};
pub use postgres::{connect_with_retry, PgUnitOfWork, PgUnitOfWorkFactory};
pub use repositories::{
    OwnerRepository, PropertyImageRepository, PropertyRepository, PropertyTraceRepository,
};
pub use unit_of_work::{ensure_active, UnitOfWork, UnitOfWorkFactory};
