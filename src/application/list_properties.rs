use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::dispatch::{Request, RequestHandler};
use crate::domain::filters::{DEFAULT_PAGE_NUMBER, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::domain::{PropertyDetails, PropertyFilters};
use crate::outcome::Outcome;
use crate::persistence::UnitOfWorkFactory;
use crate::storage::BlobStorage;

use super::validation::{current_year, Violations, ADDRESS_MAX_LEN, EARLIEST_YEAR_EXCLUSIVE, NAME_MAX_LEN};
use super::UNKNOWN_OWNER;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListPropertiesWithFilters {
    pub name: Option<String>,
    pub address: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub min_year: Option<i32>,
    pub max_year: Option<i32>,
    pub owner_id: Option<Uuid>,
    pub page_number: u32,
    pub page_size: u32,
}

impl Default for ListPropertiesWithFilters {
    fn default() -> Self {
        Self {
            name: None,
            address: None,
            min_price: None,
            max_price: None,
            min_year: None,
            max_year: None,
            owner_id: None,
            page_number: DEFAULT_PAGE_NUMBER,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl From<ListPropertiesWithFilters> for PropertyFilters {
    fn from(query: ListPropertiesWithFilters) -> Self {
        PropertyFilters {
            name: query.name,
            address: query.address,
            min_price: query.min_price,
            max_price: query.max_price,
            min_year: query.min_year,
            max_year: query.max_year,
            owner_id: query.owner_id,
            page_number: query.page_number,
            page_size: query.page_size,
        }
    }
}

impl Request for ListPropertiesWithFilters {
    type Response = Vec<PropertySummary>;

    fn name() -> &'static str {
        "ListPropertiesWithFilters"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySummary {
    pub property_id: Uuid,
    pub name: String,
    pub address: String,
    pub price: Decimal,
    pub code_internal: String,
    pub year: i32,
    pub owner_name: String,
    pub image_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
}

pub struct ListPropertiesHandler {
    units: Arc<dyn UnitOfWorkFactory>,
    storage: Arc<dyn BlobStorage>,
}

impl ListPropertiesHandler {
    pub fn new(units: Arc<dyn UnitOfWorkFactory>, storage: Arc<dyn BlobStorage>) -> Self {
        Self { units, storage }
    }

    /// Images whose URL cannot be resolved are left out
    async fn summarize(&self, details: PropertyDetails, cancel: &CancellationToken) -> PropertySummary {
        let mut image_urls = Vec::with_capacity(details.images.len());
        for image in details.images.iter().filter(|image| image.is_visible()) {
            match self.storage.image_url(&image.file, cancel).await {
                Ok(url) => image_urls.push(url),
                Err(error) => {
                    tracing::debug!(image_id = %image.id, error = %error, "Skipping image without URL");
                }
            }
        }

        let property = details.property;
        PropertySummary {
            property_id: property.id,
            name: property.name,
            address: property.address,
            price: property.price,
            code_internal: property.code_internal,
            year: property.year,
            owner_name: details.owner_name.unwrap_or_else(|| UNKNOWN_OWNER.to_string()),
            image_urls,
            created_at: property.created_at,
        }
    }
}

#[async_trait]
impl RequestHandler<ListPropertiesWithFilters> for ListPropertiesHandler {
    async fn validate(&self, query: &ListPropertiesWithFilters, _cancel: &CancellationToken) -> Vec<String> {
        let mut violations = Violations::new();

        violations.check(query.page_number > 0, "Page number must be greater than 0");
        if violations.check(query.page_size > 0, "Page size must be greater than 0") {
            violations.check(
                query.page_size <= MAX_PAGE_SIZE,
                format!("Page size cannot exceed {}", MAX_PAGE_SIZE),
            );
        }

        if let Some(min) = query.min_price {
            violations.check(
                min >= Decimal::ZERO,
                "Minimum price must be greater than or equal to 0",
            );
        }
        if let Some(max) = query.max_price {
            violations.check(
                max >= Decimal::ZERO,
                "Maximum price must be greater than or equal to 0",
            );
        }
        if let (Some(min), Some(max)) = (query.min_price, query.max_price) {
            violations.check(
                max >= min,
                "Maximum price must be greater than or equal to minimum price",
            );
        }

        if let Some(min) = query.min_year {
            violations.check(
                min > EARLIEST_YEAR_EXCLUSIVE,
                format!("Minimum year must be greater than {}", EARLIEST_YEAR_EXCLUSIVE),
            );
        }
        if let Some(max) = query.max_year {
            violations.check(max <= current_year(), "Maximum year cannot be in the future");
        }
        if let (Some(min), Some(max)) = (query.min_year, query.max_year) {
            violations.check(
                max >= min,
                "Maximum year must be greater than or equal to minimum year",
            );
        }

        if let Some(owner_id) = query.owner_id {
            violations.check(!owner_id.is_nil(), "Owner ID is required");
        }
        if let Some(name) = &query.name {
            violations.check(
                name.chars().count() <= NAME_MAX_LEN,
                format!("Name filter cannot exceed {} characters", NAME_MAX_LEN),
            );
        }
        if let Some(address) = &query.address {
            violations.check(
                address.chars().count() <= ADDRESS_MAX_LEN,
                format!("Address filter cannot exceed {} characters", ADDRESS_MAX_LEN),
            );
        }

        violations.into_vec()
    }

    async fn handle(
        &self,
        query: ListPropertiesWithFilters,
        cancel: &CancellationToken,
    ) -> Outcome<Vec<PropertySummary>> {
        let uow = self.units.create();
        let filters = PropertyFilters::from(query);

        let page = match uow.properties().get_with_filters(&filters, cancel).await {
            Ok(page) => page,
            Err(error) => return error.into(),
        };

        let mut summaries = Vec::with_capacity(page.len());
        for details in page {
            summaries.push(self.summarize(details, cancel).await);
        }

        tracing::debug!(
            page = filters.page_number,
            page_size = filters.page_size,
            returned = summaries.len(),
            "Listed properties"
        );

        Outcome::success(summaries).with_message("Properties retrieved successfully")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{self, Call, Script, ScriptedUnitOfWork, Step};
    use crate::domain::PropertyImage;
    use crate::storage::InMemoryBlobStorage;

    async fn storage_with(names: &[&str]) -> Arc<InMemoryBlobStorage> {
        let storage = Arc::new(InMemoryBlobStorage::new("http://cdn.local"));
        for name in names {
            storage
                .upload_image(vec![1], name, "image/png", &CancellationToken::new())
                .await
                .unwrap();
        }
        storage
    }

    #[tokio::test]
    async fn test_unresolvable_images_are_skipped() {
        let owner = test_support::owner();
        let property = test_support::property(&owner, 750_000);
        let mut disabled = PropertyImage::new(property.id, "hidden.png");
        disabled.enabled = false;
        let listing = vec![PropertyDetails {
            images: vec![
                PropertyImage::new(property.id, "a.png"),
                PropertyImage::new(property.id, "gone.png"),
                disabled,
            ],
            property,
            owner_name: None,
        }];
        let uow = ScriptedUnitOfWork::new(Script {
            listing,
            ..Default::default()
        });
        let storage = storage_with(&["a.png", "hidden.png"]).await;
        let handler = ListPropertiesHandler::new(uow.factory(), storage);

        let outcome = handler
            .handle(ListPropertiesWithFilters::default(), &CancellationToken::new())
            .await;

        assert_eq!(outcome.message(), "Properties retrieved successfully");
        let summaries = outcome.into_value().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].image_urls, vec!["http://cdn.local/a.png"]);
        assert_eq!(summaries[0].owner_name, "Unknown");
    }

    #[tokio::test]
    async fn test_filters_are_passed_through() {
        let uow = ScriptedUnitOfWork::new(Script::default());
        let handler = ListPropertiesHandler::new(uow.factory(), storage_with(&[]).await);
        let query = ListPropertiesWithFilters {
            min_price: Some(Decimal::from(100_000)),
            max_price: Some(Decimal::from(100_000)),
            page_number: 2,
            page_size: 5,
            ..Default::default()
        };

        handler.handle(query.clone(), &CancellationToken::new()).await;

        assert_eq!(uow.calls(), vec![Call::ListProperties(PropertyFilters::from(query))]);
    }

    #[tokio::test]
    async fn test_repository_failure_is_returned() {
        let uow = ScriptedUnitOfWork::new(Script::default().failing(Step::ListProperties, "timeout"));
        let handler = ListPropertiesHandler::new(uow.factory(), storage_with(&[]).await);

        let outcome = handler
            .handle(ListPropertiesWithFilters::default(), &CancellationToken::new())
            .await;

        assert_eq!(outcome.error(), Some(ScriptedUnitOfWork::error_for("timeout")));
    }

    #[tokio::test]
    async fn test_zero_page_values_rejected() {
        let uow = ScriptedUnitOfWork::new(Script::default());
        let handler = ListPropertiesHandler::new(uow.factory(), storage_with(&[]).await);
        let query = ListPropertiesWithFilters {
            page_number: 0,
            page_size: 0,
            ..Default::default()
        };

        let violations = handler.validate(&query, &CancellationToken::new()).await;

        assert_eq!(
            violations,
            vec![
                "Page number must be greater than 0",
                "Page size must be greater than 0",
            ]
        );
        assert!(uow.calls().is_empty());
    }

    #[tokio::test]
    async fn test_range_rules() {
        let uow = ScriptedUnitOfWork::new(Script::default());
        let handler = ListPropertiesHandler::new(uow.factory(), storage_with(&[]).await);
        let query = ListPropertiesWithFilters {
            min_price: Some(Decimal::from(500)),
            max_price: Some(Decimal::from(100)),
            min_year: Some(1700),
            max_year: Some(current_year() + 1),
            page_size: 101,
            ..Default::default()
        };

        let violations = handler.validate(&query, &CancellationToken::new()).await;

        assert_eq!(
            violations,
            vec![
                "Page size cannot exceed 100",
                "Maximum price must be greater than or equal to minimum price",
                "Minimum year must be greater than 1800",
                "Maximum year cannot be in the future",
            ]
        );
    }
}
