use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::dispatch::{Request, RequestHandler};
use crate::domain::trace::UPDATE_PRICE_CHANGE_LABEL;
use crate::domain::PropertyTrace;
use crate::outcome::Outcome;
use crate::persistence::{StoreResult, UnitOfWork, UnitOfWorkFactory};

use super::transaction;
use super::validation::{Violations, ADDRESS_MAX_LEN, CODE_MAX_LEN, NAME_MAX_LEN};
use super::UNKNOWN_OWNER;

// ============================================================================
// Update Property
// ============================================================================
//
// Replaces every editable field in one transaction. A trace is written only
// when the price actually changed.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateProperty {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub price: Decimal,
    pub code_internal: String,
    pub year: i32,
    pub owner_id: Uuid,
}

impl Request for UpdateProperty {
    type Response = UpdatePropertyResponse;

    fn name() -> &'static str {
        "UpdateProperty"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePropertyResponse {
    pub property_id: Uuid,
    pub name: String,
    pub address: String,
    pub price: Decimal,
    pub code_internal: String,
    pub year: i32,
    pub owner_name: String,
    pub updated_at: DateTime<Utc>,
    pub price_changed: bool,
}

pub struct UpdatePropertyHandler {
    units: Arc<dyn UnitOfWorkFactory>,
}

impl UpdatePropertyHandler {
    pub fn new(units: Arc<dyn UnitOfWorkFactory>) -> Self {
        Self { units }
    }

    async fn apply(
        &self,
        uow: &dyn UnitOfWork,
        request: UpdateProperty,
        cancel: &CancellationToken,
    ) -> StoreResult<UpdatePropertyResponse> {
        let mut property = uow.properties().get_by_id(request.id, cancel).await?;
        let old_price = property.price;
        let now = Utc::now();

        property.name = request.name;
        property.address = request.address;
        property.price = request.price;
        property.code_internal = request.code_internal;
        property.year = request.year;
        property.owner_id = request.owner_id;
        property.updated_at = Some(now);

        uow.properties().update(&property, cancel).await?;

        let price_changed = old_price != property.price;
        if price_changed {
            let trace = PropertyTrace::price_change(property.id, UPDATE_PRICE_CHANGE_LABEL, property.price, now);
            uow.property_traces().create(trace, cancel).await?;
        }

        uow.save_changes(cancel).await?;

        // display only; a failed lookup must not undo the update
        let owner_name = match uow.owners().get_by_id(property.owner_id, cancel).await {
            Ok(owner) => owner.name,
            Err(error) => {
                tracing::warn!(owner_id = %property.owner_id, error = %error, "Owner name unavailable");
                UNKNOWN_OWNER.to_string()
            }
        };

        tracing::info!(
            property_id = %property.id,
            price_changed,
            "Property updated"
        );

        Ok(UpdatePropertyResponse {
            property_id: property.id,
            name: property.name,
            address: property.address,
            price: property.price,
            code_internal: property.code_internal,
            year: property.year,
            owner_name,
            updated_at: now,
            price_changed,
        })
    }
}

#[async_trait]
impl RequestHandler<UpdateProperty> for UpdatePropertyHandler {
    async fn validate(&self, request: &UpdateProperty, cancel: &CancellationToken) -> Vec<String> {
        let uow = self.units.create();
        let mut violations = Violations::new();

        if violations.check(!request.id.is_nil(), "Property ID is required") {
            violations.check_lookup(
                uow.properties().exists(request.id, cancel).await,
                "Property does not exist",
            );
        }
        violations.text(&request.name, "Property name", NAME_MAX_LEN);
        violations.text(&request.address, "Property address", ADDRESS_MAX_LEN);
        violations.price(request.price, "Property price");
        if violations.text(&request.code_internal, "Internal code", CODE_MAX_LEN) {
            let taken = uow
                .properties()
                .code_internal_exists(&request.code_internal, Some(request.id), cancel)
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

    async fn handle(&self, request: UpdateProperty, cancel: &CancellationToken) -> Outcome<UpdatePropertyResponse> {
        let uow = self.units.create();

        if let Err(error) = uow.begin_transaction(cancel).await {
            tracing::error!(error = %error, "Could not begin transaction");
            return error.into();
        }

        let work = self.apply(uow.as_ref(), request, cancel).await;
        transaction::complete(uow.as_ref(), work, "Property updated successfully", cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{self, traces, Call, Script, ScriptedUnitOfWork, Step};
    use crate::domain::Property;

    fn scripted(property: &Property, owner: crate::domain::Owner) -> ScriptedUnitOfWork {
        ScriptedUnitOfWork::new(Script {
            property: Some(property.clone()),
            owner: Some(owner),
            property_exists: true,
            owner_exists: true,
            ..Default::default()
        })
    }

    fn request_for(property: &Property, price: Decimal) -> UpdateProperty {
        UpdateProperty {
            id: property.id,
            name: "Renovated Apartment".to_string(),
            address: property.address.clone(),
            price,
            code_internal: property.code_internal.clone(),
            year: property.year,
            owner_id: property.owner_id,
        }
    }

    #[tokio::test]
    async fn test_unchanged_price_writes_no_trace() {
        let owner = test_support::owner();
        let property = test_support::property(&owner, 750_000);
        let uow = scripted(&property, owner);
        let handler = UpdatePropertyHandler::new(uow.factory());

        let outcome = handler
            .handle(request_for(&property, property.price), &CancellationToken::new())
            .await;

        let response = outcome.value().unwrap();
        assert!(!response.price_changed);
        assert_eq!(response.name, "Renovated Apartment");
        assert_eq!(response.owner_name, "John Smith");
        assert!(traces(&uow.calls()).is_empty());
        assert_eq!(uow.count(|c| matches!(c, Call::Commit)), 1);
    }

    #[tokio::test]
    async fn test_changed_price_writes_one_trace() {
        let owner = test_support::owner();
        let property = test_support::property(&owner, 750_000);
        let uow = scripted(&property, owner);
        let handler = UpdatePropertyHandler::new(uow.factory());

        let outcome = handler
            .handle(request_for(&property, Decimal::from(800_000)), &CancellationToken::new())
            .await;

        assert_eq!(outcome.message(), "Property updated successfully");
        assert!(outcome.value().unwrap().price_changed);

        let written = traces(&uow.calls());
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].name, "Property Update - Price Change");
        assert_eq!(written[0].value, Decimal::from(800_000));
        assert_eq!(written[0].tax, Decimal::from(80_000));

        let updated: Vec<Property> = uow
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::UpdateProperty(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].name, "Renovated Apartment");
        assert!(updated[0].updated_at.is_some());
    }

    #[tokio::test]
    async fn test_update_failure_returns_message_and_rolls_back_once() {
        let owner = test_support::owner();
        let property = test_support::property(&owner, 750_000);
        let uow = ScriptedUnitOfWork::new(
            Script {
                property: Some(property.clone()),
                ..Default::default()
            }
            .failing(Step::UpdateProperty, "Database error"),
        );
        let handler = UpdatePropertyHandler::new(uow.factory());

        let outcome = handler
            .handle(request_for(&property, Decimal::from(1)), &CancellationToken::new())
            .await;

        assert_eq!(outcome.error(), Some(ScriptedUnitOfWork::error_for("Database error")));
        assert_eq!(uow.count(|c| matches!(c, Call::Rollback)), 1);
        assert_eq!(uow.count(|c| matches!(c, Call::Commit)), 0);
        assert_eq!(uow.count(|c| matches!(c, Call::Save)), 0);
    }

    #[tokio::test]
    async fn test_owner_lookup_error_keeps_the_update() {
        let owner = test_support::owner();
        let property = test_support::property(&owner, 750_000);
        let uow = ScriptedUnitOfWork::new(
            Script {
                property: Some(property.clone()),
                owner: Some(owner),
                ..Default::default()
            }
            .failing(Step::GetOwner, "read timeout"),
        );
        let handler = UpdatePropertyHandler::new(uow.factory());

        let outcome = handler
            .handle(request_for(&property, Decimal::from(999)), &CancellationToken::new())
            .await;

        let response = outcome.into_value().unwrap();
        assert_eq!(response.owner_name, "Unknown");
        assert!(response.price_changed);
        assert_eq!(traces(&uow.calls()).len(), 1);
        assert_eq!(uow.count(|c| matches!(c, Call::Commit)), 1);
        assert_eq!(uow.count(|c| matches!(c, Call::Rollback)), 0);
    }

    #[tokio::test]
    async fn test_load_error_rolls_back_without_writes() {
        let owner = test_support::owner();
        let property = test_support::property(&owner, 750_000);
        let uow = ScriptedUnitOfWork::new(
            Script {
                property: Some(property.clone()),
                ..Default::default()
            }
            .failing(Step::GetProperty, "connection reset"),
        );
        let handler = UpdatePropertyHandler::new(uow.factory());

        let outcome = handler
            .handle(request_for(&property, Decimal::from(800_000)), &CancellationToken::new())
            .await;

        assert_eq!(outcome.error(), Some(ScriptedUnitOfWork::error_for("connection reset")));
        assert_eq!(uow.count(|c| matches!(c, Call::UpdateProperty(_))), 0);
        assert_eq!(uow.count(|c| matches!(c, Call::Rollback)), 1);
        assert_eq!(uow.count(|c| matches!(c, Call::Commit)), 0);
    }

    #[tokio::test]
    async fn test_missing_property_rolls_back() {
        let owner = test_support::owner();
        let property = test_support::property(&owner, 750_000);
        let uow = ScriptedUnitOfWork::new(Script::default());
        let handler = UpdatePropertyHandler::new(uow.factory());

        let outcome = handler
            .handle(request_for(&property, Decimal::from(800_000)), &CancellationToken::new())
            .await;

        assert_eq!(
            outcome.error(),
            Some(format!("Property with ID {} was not found", property.id))
        );
        assert_eq!(uow.count(|c| matches!(c, Call::UpdateProperty(_))), 0);
        assert_eq!(uow.count(|c| matches!(c, Call::Rollback)), 1);
        assert_eq!(uow.count(|c| matches!(c, Call::Commit)), 0);
    }

    #[tokio::test]
    async fn test_trace_failure_never_commits() {
        let owner = test_support::owner();
        let property = test_support::property(&owner, 750_000);
        let uow = ScriptedUnitOfWork::new(
            Script {
                property: Some(property.clone()),
                ..Default::default()
            }
            .failing(Step::CreateTrace, "trace rejected"),
        );
        let handler = UpdatePropertyHandler::new(uow.factory());

        let outcome = handler
            .handle(request_for(&property, Decimal::from(800_000)), &CancellationToken::new())
            .await;

        assert_eq!(outcome.error(), Some(ScriptedUnitOfWork::error_for("trace rejected")));
        assert_eq!(uow.count(|c| matches!(c, Call::Save)), 0);
        assert_eq!(uow.count(|c| matches!(c, Call::Rollback)), 1);
        assert_eq!(uow.count(|c| matches!(c, Call::Commit)), 0);
    }

    #[tokio::test]
    async fn test_save_failure_rolls_back() {
        let owner = test_support::owner();
        let property = test_support::property(&owner, 750_000);
        let uow = ScriptedUnitOfWork::new(
            Script {
                property: Some(property.clone()),
                ..Default::default()
            }
            .failing(Step::Save, "constraint"),
        );
        let handler = UpdatePropertyHandler::new(uow.factory());

        let outcome = handler
            .handle(request_for(&property, property.price), &CancellationToken::new())
            .await;

        assert!(outcome.is_failure());
        assert_eq!(uow.count(|c| matches!(c, Call::Rollback)), 1);
        assert_eq!(uow.count(|c| matches!(c, Call::Commit)), 0);
    }

    #[tokio::test]
    async fn test_cancellation_between_steps_rolls_back() {
        let owner = test_support::owner();
        let property = test_support::property(&owner, 750_000);
        let uow = scripted(&property, owner);
        let handler = UpdatePropertyHandler::new(uow.factory());
        let cancel = CancellationToken::new();

        // begin succeeds, the first read sees the cancellation
        let begin_then_cancel = async {
            let outcome = handler.handle(request_for(&property, Decimal::from(2)), &cancel);
            cancel.cancel();
            outcome.await
        };
        let outcome = begin_then_cancel.await;

        assert_eq!(outcome.error().as_deref(), Some("Operation was cancelled"));
        assert_eq!(uow.count(|c| matches!(c, Call::Rollback)), 1);
        assert_eq!(uow.count(|c| matches!(c, Call::Commit)), 0);
    }

    #[tokio::test]
    async fn test_validation_reports_each_rule() {
        let uow = ScriptedUnitOfWork::new(Script {
            property_exists: true,
            owner_exists: false,
            code_exists: true,
            ..Default::default()
        });
        let handler = UpdatePropertyHandler::new(uow.factory());
        let request = UpdateProperty {
            id: Uuid::new_v4(),
            name: String::new(),
            address: "a".repeat(501),
            price: Decimal::from(100),
            code_internal: "MIA001".to_string(),
            year: 1750,
            owner_id: Uuid::new_v4(),
        };

        let violations = handler.validate(&request, &CancellationToken::new()).await;

        assert_eq!(
            violations,
            vec![
                "Property name is required",
                "Property address cannot exceed 500 characters",
                "Internal code already exists",
                "Year must be greater than 1800",
                "Owner does not exist",
            ]
        );
        assert_eq!(
            uow.count(|c| matches!(c, Call::CodeExists(_, Some(id)) if *id == request.id)),
            1
        );
    }
}
