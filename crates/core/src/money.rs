//! Monetary rounding and comparison helpers.
//!
//! All amounts in the engine are `rust_decimal::Decimal`; floating point is
//! never used for money. Rounding is two fraction digits, half away from zero
//! (French invoicing convention).

use rust_decimal::{Decimal, RoundingStrategy};

/// Tolerance for monetary comparisons (0.01).
pub const MONEY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Round a monetary amount to 2 fraction digits, half away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Whether an amount is zero within [`MONEY_TOLERANCE`].
pub fn approx_zero(value: Decimal) -> bool {
    value.abs() <= MONEY_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn round2_is_half_up() {
        assert_eq!(round2(dec!(1.005)), dec!(1.01));
        assert_eq!(round2(dec!(1.004)), dec!(1.00));
        assert_eq!(round2(dec!(-1.005)), dec!(-1.01));
    }

    #[test]
    fn approx_zero_tolerates_one_cent() {
        assert!(approx_zero(dec!(0.01)));
        assert!(approx_zero(dec!(-0.01)));
        assert!(!approx_zero(dec!(0.02)));
    }
}
