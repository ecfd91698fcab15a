use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::dispatch::{Request, RequestHandler};
use crate::domain::Property;
use crate::outcome::Outcome;
use crate::persistence::UnitOfWorkFactory;

use super::validation::{Violations, ADDRESS_MAX_LEN, CODE_MAX_LEN, NAME_MAX_LEN};
use super::UNKNOWN_OWNER;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateProperty {
    pub name: String,
    pub address: String,
    pub price: Decimal,
    pub code_internal: String,
    pub year: i32,
    pub owner_id: Uuid,
}

impl Request for CreateProperty {
    type Response = CreatePropertyResponse;

    fn name() -> &'static str {
        "CreateProperty"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePropertyResponse {
    pub property_id: Uuid,
    pub name: String,
    pub code_internal: String,
    pub price: Decimal,
    pub owner_name: String,
    pub created_at: DateTime<Utc>,
}

/// Single write, no explicit transaction
pub struct CreatePropertyHandler {
    units: Arc<dyn UnitOfWorkFactory>,
}

impl CreatePropertyHandler {
    pub fn new(units: Arc<dyn UnitOfWorkFactory>) -> Self {
        Self { units }
    }
}

#[async_trait]
impl RequestHandler<CreateProperty> for CreatePropertyHandler {
    async fn validate(&self, request: &CreateProperty, cancel: &CancellationToken) -> Vec<String> {
        let uow = self.units.create();
        let mut violations = Violations::new();

        violations.text(&request.name, "Property name", NAME_MAX_LEN);
        violations.text(&request.address, "Property address", ADDRESS_MAX_LEN);
        violations.price(request.price, "Property price");
        if violations.text(&request.code_internal, "Internal code", CODE_MAX_LEN) {
            let taken = uow
                .properties()
                .code_internal_exists(&request.code_internal, None, cancel)
                .await;
            violations.check_lookup(taken.map(|exists| !exists), "Internal code already exists");
        }
        violations.construction_year(request.year);
        if violations.check(!request.owner_id.is_nil(), "Owner ID is required") {
            violations.check_lookup(
                uow.owners().exists(request.owner_id, cancel).await,
                "Owner does not exist",
            );
        }

        violations.into_vec()
    }

    async fn handle(&self, request: CreateProperty, cancel: &CancellationToken) -> Outcome<CreatePropertyResponse> {
        let uow = self.units.create();
        let property = Property::new(
            request.name,
            request.address,
            request.price,
            request.code_internal,
            request.year,
            request.owner_id,
        );

        let created = match uow.properties().create(property, cancel).await {
            Ok(created) => created,
            Err(error) => return error.into(),
        };
        if let Err(error) = uow.save_changes(cancel).await {
            tracing::warn!(error = %error, code = %created.code_internal, "Property was not saved");
            return error.into();
        }

        let owner_name = uow
            .owners()
            .get_by_id(created.owner_id, cancel)
            .await
            .map(|owner| owner.name)
            .unwrap_or_else(|_| UNKNOWN_OWNER.to_string());

        tracing::info!(property_id = %created.id, code = %created.code_internal, "Property created");

        Outcome::success(CreatePropertyResponse {
            property_id: created.id,
            name: created.name,
            code_internal: created.code_internal,
            price: created.price,
            owner_name,
            created_at: created.created_at,
        })
        .with_message("Property created successfully")
    }
}
