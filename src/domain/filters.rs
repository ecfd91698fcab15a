use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::property::Property;

// ============================================================================
// Property Filter Criteria
// ============================================================================

pub const DEFAULT_PAGE_NUMBER: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Listing criteria. A `None` (or blank text) field places no constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyFilters {
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

impl Default for PropertyFilters {
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

impl PropertyFilters {
    /// Rows skipped before the requested page
    pub fn offset(&self) -> u64 {
        u64::from(self.page_number.saturating_sub(1)) * u64::from(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }

    pub fn name_term(&self) -> Option<&str> {
        non_blank(self.name.as_deref())
    }

    pub fn address_term(&self) -> Option<&str> {
        non_blank(self.address.as_deref())
    }

    /// Evaluate every present predicate against one property
    pub fn matches(&self, property: &Property) -> bool {
        if let Some(term) = self.name_term() {
            if !contains_ignore_case(&property.name, term) {
                return false;
            }
        }
        if let Some(term) = self.address_term() {
            if !contains_ignore_case(&property.address, term) {
                return false;
            }
        }
        if self.min_price.is_some_and(|min| property.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| property.price > max) {
            return false;
        }
        if self.min_year.is_some_and(|min| property.year < min) {
            return false;
        }
        if self.max_year.is_some_and(|max| property.year > max) {
            return false;
        }
        if self.owner_id.is_some_and(|owner| property.owner_id != owner) {
            return false;
        }
        true
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn property(name: &str, price: i64, year: i32) -> Property {
        Property::new(name, "1 Ocean Drive, Miami", Decimal::from(price), name, year, Uuid::new_v4())
    }

    #[test]
    fn test_pagination_window() {
        let filters = PropertyFilters {
            page_number: 3,
            page_size: 20,
            ..Default::default()
        };

        assert_eq!(filters.offset(), 40);
        assert_eq!(filters.limit(), 20);
        assert_eq!(PropertyFilters::default().offset(), 0);
    }

    #[test]
    fn test_absent_predicates_match_everything() {
        let filters = PropertyFilters {
            name: Some("   ".to_string()),
            ..Default::default()
        };

        assert!(filters.matches(&property("Beach House", 1, 1990)));
    }

    #[test]
    fn test_exact_price_range() {
        let filters = PropertyFilters {
            min_price: Some(Decimal::from(100_000)),
            max_price: Some(Decimal::from(100_000)),
            ..Default::default()
        };

        assert!(filters.matches(&property("A", 100_000, 2000)));
        assert!(!filters.matches(&property("B", 100_001, 2000)));
        assert!(!filters.matches(&property("C", 99_999, 2000)));
    }

    #[test]
    fn test_name_and_year_predicates() {
        let filters = PropertyFilters {
            name: Some("villa".to_string()),
            min_year: Some(2000),
            max_year: Some(2010),
            ..Default::default()
        };

        assert!(filters.matches(&property("Sunset Villa", 1, 2005)));
        assert!(!filters.matches(&property("Sunset Villa", 1, 2015)));
        assert!(!filters.matches(&property("Loft", 1, 2005)));
    }
}
