use rust_decimal::{Decimal, RoundingStrategy};

// ============================================================================
// Money Helpers
// ============================================================================
//
// Prices are fixed-point decimals with two implied fraction digits.
//
// ============================================================================

/// Fraction digits stored for every monetary value
pub const MONEY_SCALE: u32 = 2;

/// Largest accepted property price (999,999,999.99)
pub fn max_price() -> Decimal {
    Decimal::new(99_999_999_999, MONEY_SCALE)
}

/// Tax rate applied to price-change traces (10%)
pub fn tax_rate() -> Decimal {
    Decimal::new(10, 2)
}

/// Tax owed on a traced value, rounded to cents
pub fn tax_for(value: Decimal) -> Decimal {
    (value * tax_rate()).round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// True when the amount needs no more than two fraction digits
pub fn has_money_scale(amount: Decimal) -> bool {
    amount.normalize().scale() <= MONEY_SCALE
}
