// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for request dispatch
// ============================================================================
//
// Recorded by the dispatcher for every request:
// - requests by type and outcome (success, failure, rejected)
// - validation rejections
// - handler duration
// - number of registered handlers
//
// Scraped on the configured path (default /metrics)
// ============================================================================

pub const OUTCOME_SUCCESS: &str = "success";
pub const OUTCOME_FAILURE: &str = "failure";
pub const OUTCOME_REJECTED: &str = "rejected";

pub struct Metrics {
    registry: Registry,

    pub dispatch_requests: IntCounterVec,
    pub dispatch_validation_rejections: IntCounterVec,
    pub dispatch_duration: HistogramVec,
    pub registered_handlers: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let dispatch_requests = IntCounterVec::new(
            Opts::new("dispatch_requests_total", "Total requests dispatched"),
            &["request", "outcome"],
        )?;
        registry.register(Box::new(dispatch_requests.clone()))?;

        let dispatch_validation_rejections = IntCounterVec::new(
            Opts::new(
                "dispatch_validation_rejections_total",
                "Requests rejected by validation before reaching a handler",
            ),
            &["request"],
        )?;
        registry.register(Box::new(dispatch_validation_rejections.clone()))?;

        let dispatch_duration = HistogramVec::new(
            HistogramOpts::new("dispatch_duration_seconds", "Request handling duration")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["request"],
        )?;
        registry.register(Box::new(dispatch_duration.clone()))?;

        let registered_handlers = IntGauge::new(
            "dispatch_registered_handlers",
            "Request handlers registered with the dispatcher",
        )?;
        registry.register(Box::new(registered_handlers.clone()))?;

        Ok(Self {
            registry,
            dispatch_requests,
            dispatch_validation_rejections,
            dispatch_duration,
            registered_handlers,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a request that reached its handler
    pub fn record_dispatch(&self, request: &str, duration_secs: f64, success: bool) {
        let outcome = if success { OUTCOME_SUCCESS } else { OUTCOME_FAILURE };
        self.dispatch_requests.with_label_values(&[request, outcome]).inc();
        self.dispatch_duration.with_label_values(&[request]).observe(duration_secs);
    }

    /// Record a request stopped by its validator
    pub fn record_rejection(&self, request: &str) {
        self.dispatch_requests
            .with_label_values(&[request, OUTCOME_REJECTED])
            .inc();
        self.dispatch_validation_rejections
            .with_label_values(&[request])
            .inc();
    }

    pub fn set_registered_handlers(&self, count: usize) {
        self.registered_handlers.set(count as i64);
    }
}
