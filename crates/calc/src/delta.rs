//! Old/new/delta figures for correction lines.
//!
//! Amendment and credit-note lines do not store absolute amounts: when a line
//! references a source line on the prior document, its stored
//! `total_excl_tax` is the **adjustment** against that source line.
//! Downstream totals aggregation relies on this (summing deltas yields the
//! document's net correction), so the delta, not the new absolute value,
//! must be what gets persisted.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Whether the correction belongs to an amendment or a credit note.
///
/// Credit notes are credits by definition: their deltas and new values are
/// forced non-positive whatever the caller supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionPolarity {
    Amendment,
    CreditNote,
}

/// Current figures of the line being corrected.
///
/// `quantity`/`unit_price` are `None` when the line was pre-populated from an
/// external total; the ledger then derives the correction from the stored
/// `total_excl_tax` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrectionInput {
    pub quantity: Option<i64>,
    pub unit_price: Option<Decimal>,
    /// Previously captured old value, zero if never captured.
    pub old_value: Decimal,
    /// Previously stored line total, used when quantity/price are absent.
    pub total_excl_tax: Decimal,
}

/// Result of applying the delta rules to a correction line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionFigures {
    /// Source line's total at capture time; 0 for pure additions.
    pub old_value: Decimal,
    /// The corrected absolute value (`old_value + delta`).
    pub new_value: Decimal,
    /// `new_value - old_value`, always recomputed last.
    pub delta: Decimal,
    /// What the line persists: the delta when a source is set, the absolute
    /// total otherwise (which equals the delta, since old is then 0).
    pub total_excl_tax: Decimal,
}

/// Apply the correction rules to a line, optionally against a source line.
///
/// Idempotent under re-invocation: an `old_value` already captured (non-zero)
/// is never overwritten, so re-processing a persisted line reproduces the
/// same figures instead of compounding them.
pub fn apply_delta(
    input: &CorrectionInput,
    source_total: Option<Decimal>,
    polarity: CorrectionPolarity,
) -> CorrectionFigures {
    let force_credit = polarity == CorrectionPolarity::CreditNote;

    let (old_value, total) = match (source_total, input.quantity, input.unit_price) {
        (Some(source), Some(quantity), Some(unit_price)) => {
            let old = if input.old_value.is_zero() {
                source
            } else {
                input.old_value
            };
            let mut raw = Decimal::from(quantity) * unit_price;
            if force_credit {
                raw = -raw.abs();
            }
            (old, raw)
        }
        (None, Some(quantity), Some(unit_price)) => {
            let mut total = Decimal::from(quantity) * unit_price;
            if force_credit && total.is_sign_positive() {
                total = -total;
            }
            (Decimal::ZERO, total)
        }
        // Line pre-populated from an external total.
        (source, _, _) => {
            let old = if input.old_value.is_zero() {
                source.unwrap_or(Decimal::ZERO)
            } else {
                input.old_value
            };
            let mut total = input.total_excl_tax;
            if force_credit {
                total = -total.abs();
            }
            (old, total)
        }
    };

    let new_value = old_value + total;
    CorrectionFigures {
        old_value,
        new_value,
        delta: new_value - old_value,
        total_excl_tax: total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn input(quantity: i64, unit_price: Decimal) -> CorrectionInput {
        CorrectionInput {
            quantity: Some(quantity),
            unit_price: Some(unit_price),
            old_value: Decimal::ZERO,
            total_excl_tax: Decimal::ZERO,
        }
    }

    #[test]
    fn sourced_line_stores_the_delta() {
        let figures = apply_delta(
            &input(1, dec!(-200.00)),
            Some(dec!(1000.00)),
            CorrectionPolarity::Amendment,
        );
        assert_eq!(figures.old_value, dec!(1000.00));
        assert_eq!(figures.delta, dec!(-200.00));
        assert_eq!(figures.new_value, dec!(800.00));
        assert_eq!(figures.total_excl_tax, dec!(-200.00));
    }

    #[test]
    fn pure_addition_has_zero_old_value() {
        let figures = apply_delta(&input(3, dec!(150.00)), None, CorrectionPolarity::Amendment);
        assert_eq!(figures.old_value, dec!(0));
        assert_eq!(figures.new_value, dec!(450.00));
        assert_eq!(figures.total_excl_tax, dec!(450.00));
        assert_eq!(figures.delta, dec!(450.00));
    }

    #[test]
    fn credit_note_forces_positive_input_negative() {
        let figures = apply_delta(&input(1, dec!(50.00)), None, CorrectionPolarity::CreditNote);
        assert_eq!(figures.new_value, dec!(-50.00));
        assert_eq!(figures.total_excl_tax, dec!(-50.00));
    }

    #[test]
    fn credit_note_with_source_forces_delta_negative() {
        let figures = apply_delta(
            &input(2, dec!(75.00)),
            Some(dec!(500.00)),
            CorrectionPolarity::CreditNote,
        );
        assert_eq!(figures.old_value, dec!(500.00));
        assert_eq!(figures.delta, dec!(-150.00));
        assert_eq!(figures.new_value, dec!(350.00));
    }

    #[test]
    fn captured_old_value_is_never_overwritten() {
        let first = apply_delta(
            &input(1, dec!(-200.00)),
            Some(dec!(1000.00)),
            CorrectionPolarity::Amendment,
        );

        // The source line was recomputed in the meantime; re-invocation must
        // keep the originally captured old value.
        let again = apply_delta(
            &CorrectionInput {
                quantity: Some(1),
                unit_price: Some(dec!(-200.00)),
                old_value: first.old_value,
                total_excl_tax: first.total_excl_tax,
            },
            Some(dec!(1234.00)),
            CorrectionPolarity::Amendment,
        );
        assert_eq!(again, first);
    }

    #[test]
    fn external_total_line_derives_from_stored_amount() {
        let figures = apply_delta(
            &CorrectionInput {
                quantity: None,
                unit_price: None,
                old_value: Decimal::ZERO,
                total_excl_tax: dec!(-120.00),
            },
            Some(dec!(400.00)),
            CorrectionPolarity::Amendment,
        );
        assert_eq!(figures.old_value, dec!(400.00));
        assert_eq!(figures.new_value, dec!(280.00));
        assert_eq!(figures.delta, dec!(-120.00));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: delta always equals new - old, and credit-note deltas
        /// are never positive.
        #[test]
        fn delta_identity_and_polarity(
            quantity in -100i64..100i64,
            price_cents in -100_000i64..100_000i64,
            source_cents in proptest::option::of(0i64..1_000_000i64),
        ) {
            let source = source_cents.map(|c| Decimal::new(c, 2));
            for polarity in [CorrectionPolarity::Amendment, CorrectionPolarity::CreditNote] {
                let figures = apply_delta(
                    &input(quantity, Decimal::new(price_cents, 2)),
                    source,
                    polarity,
                );
                prop_assert_eq!(figures.delta, figures.new_value - figures.old_value);
                if polarity == CorrectionPolarity::CreditNote {
                    prop_assert!(figures.delta <= Decimal::ZERO);
                }
            }
        }
    }
}
