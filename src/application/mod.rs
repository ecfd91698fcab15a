use std::sync::Arc;

use crate::dispatch::{DispatchError, Dispatcher};
use crate::metrics::Metrics;
use crate::persistence::UnitOfWorkFactory;
use crate::storage::BlobStorage;

// ============================================================================
// Application Layer - Use Cases
// ============================================================================
//
// One request type and one handler per use case:
// - CreateProperty, AddPropertyImage, ListPropertiesWithFilters and
//   GetPropertyTraces work without an explicit transaction
// - UpdateProperty and UpdatePropertyPrice run begin/commit/rollback
//
// ============================================================================

pub mod add_property_image;
pub mod create_property;
pub mod list_properties;
pub mod property_traces;
pub mod transaction;
pub mod update_property;
pub mod update_property_price;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

pub use add_property_image::{AddPropertyImage, AddPropertyImageHandler, AddPropertyImageResponse};
pub use create_property::{CreateProperty, CreatePropertyHandler, CreatePropertyResponse};
pub use list_properties::{ListPropertiesHandler, ListPropertiesWithFilters, PropertySummary};
pub use property_traces::{GetPropertyTraces, GetPropertyTracesHandler, TraceEntry};
pub use update_property::{UpdateProperty, UpdatePropertyHandler, UpdatePropertyResponse};
pub use update_property_price::{
    UpdatePropertyPrice, UpdatePropertyPriceHandler, UpdatePropertyPriceResponse,
};

/// Owner name shown when the owner cannot be loaded
pub const UNKNOWN_OWNER: &str = "Unknown";

/// Build a dispatcher with every use case registered.
/// Fails at startup if any use case is left without a handler.
pub fn register_handlers(
    units: Arc<dyn UnitOfWorkFactory>,
    storage: Arc<dyn BlobStorage>,
    metrics: Option<Arc<Metrics>>,
) -> Result<Dispatcher, DispatchError> {
    let mut builder = Dispatcher::builder();
    if let Some(metrics) = metrics {
        builder = builder.with_metrics(metrics);
    }

    builder
        .register::<CreateProperty, _>(Arc::new(CreatePropertyHandler::new(units.clone())))
        .register::<UpdateProperty, _>(Arc::new(UpdatePropertyHandler::new(units.clone())))
        .register::<UpdatePropertyPrice, _>(Arc::new(UpdatePropertyPriceHandler::new(units.clone())))
        .register::<AddPropertyImage, _>(Arc::new(AddPropertyImageHandler::new(
            units.clone(),
            storage.clone(),
        )))
        .register::<ListPropertiesWithFilters, _>(Arc::new(ListPropertiesHandler::new(
            units.clone(),
            storage,
        )))
        .register::<GetPropertyTraces, _>(Arc::new(GetPropertyTracesHandler::new(units)))
        .expect::<CreateProperty>()
        .expect::<UpdateProperty>()
        .expect::<UpdatePropertyPrice>()
        .expect::<AddPropertyImage>()
        .expect::<ListPropertiesWithFilters>()
        .expect::<GetPropertyTraces>()
        .build()
}
