use uuid::Uuid;

use crate::utils::IsTransient;

// ============================================================================
// Persistence Errors
// ============================================================================

pub type StoreResult<T> = Result<T, StoreError>;

/// Out-of-sequence Begin/Commit/Rollback
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    #[error("A transaction is already open")]
    AlreadyOpen,

    #[error("No active transaction to {0}")]
    NotOpen(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} with ID {id} was not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Internal code '{0}' already exists")]
    DuplicateCode(String),

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Error {context}: {source}")]
    Database {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("Error applying migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    /// Map a driver error, recognising constraint violations by SQLSTATE
    pub fn database(context: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| {
            if let sqlx::Error::Database(db) = &source {
                // unique_violation, foreign_key_violation
                if matches!(db.code().as_deref(), Some("23505") | Some("23503")) {
                    return Self::Constraint(db.message().to_string());
                }
            }
            Self::Database { context, source }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Database { source, .. } => matches!(
                source,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_)
            ),
            _ => false,
        }
    }
}
