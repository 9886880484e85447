//! Document totals from line items.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use devisio_core::round2;

/// What the calculator needs to know about a line.
///
/// `total_excl_tax` is the line's stored amount: quantity × unit price for
/// ordinary lines, the signed **delta** for correction lines. The calculator
/// deliberately reads the stored amount rather than recomputing it, so that
/// amendment and credit-note totals aggregate deltas.
pub trait TaxableLine {
    fn total_excl_tax(&self) -> Decimal;

    /// Per-line VAT rate, if the line carries its own.
    ///
    /// `None` falls back to the document rate; `Some(0)` means a genuine
    /// zero-rated line. The two are not equivalent.
    fn vat_rate(&self) -> Option<Decimal>;
}

/// Computed totals of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub excl_tax: Decimal,
    pub tax: Decimal,
    pub incl_tax: Decimal,
}

impl DocumentTotals {
    pub fn zero() -> Self {
        Self {
            excl_tax: Decimal::ZERO,
            tax: Decimal::ZERO,
            incl_tax: Decimal::ZERO,
        }
    }
}

/// Compute `(excl, tax, incl)` for a set of lines.
///
/// Tax is rounded and summed **per line** rather than applied once to the
/// grand total; when rates differ across lines a blended-rate shortcut would
/// drift by a cent. With `per_line_vat` false, every line is taxed at
/// `document_rate` regardless of its own rate.
///
/// Negative amounts (delta lines, credits) flow through the arithmetic; this
/// function never fails.
pub fn compute_totals<L: TaxableLine>(
    lines: &[L],
    document_rate: Decimal,
    per_line_vat: bool,
) -> DocumentTotals {
    let mut excl = Decimal::ZERO;
    let mut tax = Decimal::ZERO;

    for line in lines {
        let line_excl = line.total_excl_tax();
        excl += line_excl;

        let rate = if per_line_vat {
            line.vat_rate().unwrap_or(document_rate)
        } else {
            document_rate
        };
        tax += round2(line_excl * rate / Decimal::ONE_HUNDRED);
    }

    let excl = round2(excl);
    let tax = round2(tax);
    DocumentTotals {
        excl_tax: excl,
        tax,
        incl_tax: excl + tax,
    }
}
