use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::metrics::Metrics;
use crate::outcome::Outcome;
use crate::persistence::StoreError;

use super::request::{Request, RequestHandler};

// ============================================================================
// Dispatcher - Typed Request Routing
// ============================================================================
//
// Handlers are stored by the TypeId of their request type. Each entry holds an
// `Arc<dyn RequestHandler<R>>`, so the downcast on the way out always yields
// a handler whose response type matches the request.
//
// Pipeline for `send`:
// 1. look up the handler (missing handler is a DispatchError, not an Outcome)
// 2. refuse work that was cancelled before dispatch
// 3. validate; violations return "Validation failed" without calling handle
// 4. handle, record metrics, return the Outcome unchanged
//
// ============================================================================

pub const VALIDATION_FAILED_MESSAGE: &str = "Validation failed";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("No handler registered for request {0}")]
    MissingHandler(&'static str),

    #[error("More than one handler registered for request {0}")]
    DuplicateHandler(&'static str),
}

struct Registration {
    name: &'static str,
    handler: Box<dyn Any + Send + Sync>,
}

#[derive(Default)]
pub struct DispatcherBuilder {
    handlers: HashMap<TypeId, Registration>,
    duplicates: Vec<&'static str>,
    expected: Vec<(TypeId, &'static str)>,
    metrics: Option<Arc<Metrics>>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register the handler for request type `R`
    pub fn register<R, H>(mut self, handler: Arc<H>) -> Self
    where
        R: Request,
        H: RequestHandler<R> + 'static,
    {
        let handler: Arc<dyn RequestHandler<R>> = handler;
        let registration = Registration {
            name: R::name(),
            handler: Box::new(handler),
        };
        if self.handlers.insert(TypeId::of::<R>(), registration).is_some() {
            self.duplicates.push(R::name());
        }
        self
    }

    /// Require a handler for `R` to be registered by the time `build` runs
    pub fn expect<R: Request>(mut self) -> Self {
        self.expected.push((TypeId::of::<R>(), R::name()));
        self
    }

    pub fn build(self) -> Result<Dispatcher, DispatchError> {
        if let Some(name) = self.duplicates.first() {
            return Err(DispatchError::DuplicateHandler(*name));
        }
        if let Some((_, name)) = self
            .expected
            .iter()
            .find(|(type_id, _)| !self.handlers.contains_key(type_id))
        {
            return Err(DispatchError::MissingHandler(*name));
        }

        if let Some(metrics) = &self.metrics {
            metrics.set_registered_handlers(self.handlers.len());
        }
        tracing::debug!(
            handlers = ?self.handlers.values().map(|r| r.name).collect::<Vec<_>>(),
            "Dispatcher built"
        );

        Ok(Dispatcher {
            handlers: self.handlers,
            metrics: self.metrics,
        })
    }
}

pub struct Dispatcher {
    handlers: HashMap<TypeId, Registration>,
    metrics: Option<Arc<Metrics>>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    fn handler<R: Request>(&self) -> Result<Arc<dyn RequestHandler<R>>, DispatchError> {
        self.handlers
            .get(&TypeId::of::<R>())
            .and_then(|registration| {
                registration
                    .handler
                    .downcast_ref::<Arc<dyn RequestHandler<R>>>()
            })
            .cloned()
            .ok_or(DispatchError::MissingHandler(R::name()))
    }

    /// Route a request to its handler and return the handler's outcome
    pub async fn send<R: Request>(
        &self,
        request: R,
        cancel: &CancellationToken,
    ) -> Result<Outcome<R::Response>, DispatchError> {
        let handler = self.handler::<R>()?;
        let name = R::name();

        if cancel.is_cancelled() {
            tracing::debug!(request = name, "Request cancelled before dispatch");
            return Ok(StoreError::Cancelled.into());
        }

        let violations = handler.validate(&request, cancel).await;
        if !violations.is_empty() {
            tracing::debug!(request = name, violations = ?violations, "Request rejected by validation");
            if let Some(metrics) = &self.metrics {
                metrics.record_rejection(name);
            }
            return Ok(Outcome::failures(violations).with_message(VALIDATION_FAILED_MESSAGE));
        }

        let started = Instant::now();
        let outcome = handler.handle(request, cancel).await;
        let elapsed = started.elapsed();

        if let Some(metrics) = &self.metrics {
            metrics.record_dispatch(name, elapsed.as_secs_f64(), outcome.is_success());
        }
        tracing::debug!(
            request = name,
            success = outcome.is_success(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Request handled"
        );

        Ok(outcome)
    }
}
