use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::dispatch::{Request, RequestHandler};
use crate::outcome::Outcome;
use crate::persistence::UnitOfWorkFactory;

use super::validation::Violations;

/// Price history of one property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetPropertyTraces {
    pub property_id: Uuid,
}

impl Request for GetPropertyTraces {
    type Response = Vec<TraceEntry>;

    fn name() -> &'static str {
        "GetPropertyTraces"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub trace_id: Uuid,
    pub event_date: DateTime<Utc>,
    pub name: String,
    pub value: Decimal,
    pub tax: Decimal,
}

pub struct GetPropertyTracesHandler {
    units: Arc<dyn UnitOfWorkFactory>,
}

impl GetPropertyTracesHandler {
    pub fn new(units: Arc<dyn UnitOfWorkFactory>) -> Self {
        Self { units }
    }
}

#[async_trait]
impl RequestHandler<GetPropertyTraces> for GetPropertyTracesHandler {
    async fn validate(&self, request: &GetPropertyTraces, cancel: &CancellationToken) -> Vec<String> {
        let mut violations = Violations::new();
        if violations.check(!request.property_id.is_nil(), "Property ID is required") {
            let uow = self.units.create();
            violations.check_lookup(
                uow.properties().exists(request.property_id, cancel).await,
                "Property does not exist",
            );
        }
        violations.into_vec()
    }

    async fn handle(&self, request: GetPropertyTraces, cancel: &CancellationToken) -> Outcome<Vec<TraceEntry>> {
        let uow = self.units.create();
        match uow.property_traces().list_for_property(request.property_id, cancel).await {
            Ok(traces) => Outcome::success(
                traces
                    .into_iter()
                    .map(|trace| TraceEntry {
                        trace_id: trace.id,
                        event_date: trace.event_date,
                        name: trace.name,
                        value: trace.value,
                        tax: trace.tax,
                    })
                    .collect(),
            )
            .with_message("Property traces retrieved successfully"),
            Err(error) => error.into(),
        }
    }
}
