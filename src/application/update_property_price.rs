use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::dispatch::{Request, RequestHandler};
use crate::domain::trace::PRICE_CHANGE_LABEL;
use crate::domain::PropertyTrace;
use crate::outcome::Outcome;
use crate::persistence::{StoreResult, UnitOfWork, UnitOfWorkFactory};

use super::transaction;
use super::validation::Violations;

// ============================================================================
// Update Property Price
// ============================================================================
//
// Price change and its trace are written in one transaction:
// begin -> load -> reprice -> update -> trace -> save -> commit
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePropertyPrice {
    pub property_id: Uuid,
    pub new_price: Decimal,
}

impl Request for UpdatePropertyPrice {
    type Response = UpdatePropertyPriceResponse;

    fn name() -> &'static str {
        "UpdatePropertyPrice"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePropertyPriceResponse {
    pub property_id: Uuid,
    pub old_price: Decimal,
    pub new_price: Decimal,
    pub updated_at: DateTime<Utc>,
}

pub struct UpdatePropertyPriceHandler {
    units: Arc<dyn UnitOfWorkFactory>,
}

impl UpdatePropertyPriceHandler {
    pub fn new(units: Arc<dyn UnitOfWorkFactory>) -> Self {
        Self { units }
    }

    async fn reprice(
        &self,
        uow: &dyn UnitOfWork,
        request: &UpdatePropertyPrice,
        cancel: &CancellationToken,
    ) -> StoreResult<UpdatePropertyPriceResponse> {
        let mut property = uow.properties().get_by_id(request.property_id, cancel).await?;

        let now = Utc::now();
        let old_price = property.reprice(request.new_price, now);
        uow.properties().update(&property, cancel).await?;

        let trace = PropertyTrace::price_change(property.id, PRICE_CHANGE_LABEL, request.new_price, now);
        uow.property_traces().create(trace, cancel).await?;

        uow.save_changes(cancel).await?;

        tracing::info!(
            property_id = %property.id,
            old_price = %old_price,
            new_price = %request.new_price,
            "Property price updated"
        );

        Ok(UpdatePropertyPriceResponse {
            property_id: property.id,
            old_price,
            new_price: request.new_price,
            updated_at: now,
        })
    }
}

#[async_trait]
impl RequestHandler<UpdatePropertyPrice> for UpdatePropertyPriceHandler {
    async fn validate(&self, request: &UpdatePropertyPrice, cancel: &CancellationToken) -> Vec<String> {
        let uow = self.units.create();
        let mut violations = Violations::new();

        if violations.check(!request.property_id.is_nil(), "Property ID is required") {
            violations.check_lookup(
                uow.properties().exists(request.property_id, cancel).await,
                "Property does not exist",
            );
        }
        violations.price(request.new_price, "New price");

        violations.into_vec()
    }

    async fn handle(
        &self,
        request: UpdatePropertyPrice,
        cancel: &CancellationToken,
    ) -> Outcome<UpdatePropertyPriceResponse> {
        let uow = self.units.create();

        if let Err(error) = uow.begin_transaction(cancel).await {
            tracing::error!(error = %error, "Could not begin transaction");
            return error.into();
        }

        let work = self.reprice(uow.as_ref(), &request, cancel).await;
        transaction::complete(uow.as_ref(), work, "Property price updated successfully", cancel).await
    }
}
