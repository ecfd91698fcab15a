use chrono::{Datelike, Utc};
use rust_decimal::Decimal;

use crate::domain::money::{has_money_scale, max_price};
use crate::persistence::StoreResult;

// ============================================================================
// Request Validation
// ============================================================================
//
// Validators collect every violated rule so the caller sees all problems at
// once. A rule backed by a lookup fails when the lookup itself fails.
//
// ============================================================================

/// Years up to and including this one are rejected
pub const EARLIEST_YEAR_EXCLUSIVE: i32 = 1800;

pub const NAME_MAX_LEN: usize = 200;
pub const ADDRESS_MAX_LEN: usize = 500;
pub const CODE_MAX_LEN: usize = 50;
pub const FILE_NAME_MAX_LEN: usize = 255;

pub fn current_year() -> i32 {
    Utc::now().year()
}

#[derive(Debug, Default)]
pub struct Violations(Vec<String>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` unless `ok`; returns `ok`
    pub fn check(&mut self, ok: bool, message: impl Into<String>) -> bool {
        if !ok {
            self.0.push(message.into());
        }
        ok
    }

    /// Rule backed by a lookup; a failed lookup counts as a violation
    pub fn check_lookup(&mut self, lookup: StoreResult<bool>, message: impl Into<String>) -> bool {
        match lookup {
            Ok(ok) => self.check(ok, message),
            Err(error) => {
                tracing::debug!(error = %error, "Validation lookup failed");
                self.check(false, message)
            }
        }
    }

    /// Required text with a length cap
    pub fn text(&mut self, value: &str, label: &str, max_len: usize) -> bool {
        self.check(!value.trim().is_empty(), format!("{} is required", label))
            && self.check(
                value.chars().count() <= max_len,
                format!("{} cannot exceed {} characters", label, max_len),
            )
    }

    /// Positive price with cents precision, capped at the largest storable price
    pub fn price(&mut self, price: Decimal, label: &str) -> bool {
        self.check(price > Decimal::ZERO, format!("{} must be greater than 0", label))
            && self.check(
                price <= max_price(),
                format!("{} cannot exceed 999,999,999.99", label),
            )
            && self.check(
                has_money_scale(price),
                format!("{} cannot have more than 2 decimal places", label),
            )
    }

    pub fn construction_year(&mut self, year: i32) -> bool {
        self.check(
            year > EARLIEST_YEAR_EXCLUSIVE,
            format!("Year must be greater than {}", EARLIEST_YEAR_EXCLUSIVE),
        ) && self.check(year <= current_year(), "Year cannot be in the future")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}
