use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::image::PropertyImage;

// ============================================================================
// Property Entity
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    // Identity
    pub id: Uuid,

    // Listing data
    pub name: String,
    pub address: String,
    pub price: Decimal,
    /// Unique among non-deleted properties; enforced by the store
    pub code_internal: String,
    pub year: i32,
    pub owner_id: Uuid,

    // Lifecycle
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Property {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        price: Decimal,
        code_internal: impl Into<String>,
        year: i32,
        owner_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            address: address.into(),
            price,
            code_internal: code_internal.into(),
            year,
            owner_id,
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Set a new price and stamp the update time. Returns the previous price.
    pub fn reprice(&mut self, new_price: Decimal, at: DateTime<Utc>) -> Decimal {
        let old_price = self.price;
        self.price = new_price;
        self.updated_at = Some(at);
        old_price
    }
}

/// Property joined with what a listing shows about it
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDetails {
    pub property: Property,
    pub owner_name: Option<String>,
    /// Enabled images only
    pub images: Vec<PropertyImage>,
}
