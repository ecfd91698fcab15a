use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::outcome::Outcome;

/// A command or query routed through the dispatcher.
/// The response type is fixed by the request type.
pub trait Request: Send + Sync + 'static {
    type Response: Send + 'static;

    /// Short name used in logs and metric labels
    fn name() -> &'static str;
}

/// Exactly one handler serves each request type
#[async_trait]
pub trait RequestHandler<R: Request>: Send + Sync {
    /// Violations that stop the request before `handle`; empty means valid.
    /// Runs in the dispatch pipeline, not inside `handle`.
    async fn validate(&self, _request: &R, _cancel: &CancellationToken) -> Vec<String> {
        Vec::new()
    }

    async fn handle(&self, request: R, cancel: &CancellationToken) -> Outcome<R::Response>;
}
