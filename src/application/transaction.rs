use tokio_util::sync::CancellationToken;

use crate::outcome::Outcome;
use crate::persistence::{StoreError, StoreResult, UnitOfWork};

// ============================================================================
// Transaction Completion
// ============================================================================
//
// Every transactional handler ends here once begin has succeeded:
// - work succeeded: commit (the only path that reaches commit)
// - work failed: roll back exactly once and report the work's error
//
// A failed rollback is logged; the caller still sees the original error.
//
// ============================================================================

pub async fn complete<T>(
    uow: &dyn UnitOfWork,
    work: StoreResult<T>,
    message: &str,
    cancel: &CancellationToken,
) -> Outcome<T> {
    match work {
        Ok(value) => match uow.commit_transaction(cancel).await {
            Ok(()) => Outcome::success(value).with_message(message),
            Err(error) => {
                tracing::error!(error = %error, "Commit failed");
                error.into()
            }
        },
        Err(error) => {
            abort(uow, &error, cancel).await;
            error.into()
        }
    }
}

async fn abort(uow: &dyn UnitOfWork, cause: &StoreError, cancel: &CancellationToken) {
    tracing::warn!(error = %cause, "Rolling back transaction");
    if let Err(rollback) = uow.rollback_transaction(cancel).await {
        tracing::error!(error = %rollback, cause = %cause, "Rollback failed");
    }
}
