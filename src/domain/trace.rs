use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money::tax_for;

// ============================================================================
// Property Trace - Append-Only Price History
// ============================================================================
//
// One trace per price-affecting mutation. Traces are created, never updated
// or deleted.
//
// ============================================================================

pub const PRICE_CHANGE_LABEL: &str = "Price Change";
pub const UPDATE_PRICE_CHANGE_LABEL: &str = "Property Update - Price Change";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyTrace {
    /// Time-ordered (v7), so traces sort by creation
    pub id: Uuid,
    pub property_id: Uuid,
    pub event_date: DateTime<Utc>,
    pub name: String,
    pub value: Decimal,
    pub tax: Decimal,
    pub created_at: DateTime<Utc>,
}

impl PropertyTrace {
    /// Trace for a price change; tax is 10% of the new value
    pub fn price_change(
        property_id: Uuid,
        label: &str,
        new_price: Decimal,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            property_id,
            event_date: at,
            name: label.to_string(),
            value: new_price,
            tax: tax_for(new_price),
            created_at: Utc::now(),
        }
    }
}
