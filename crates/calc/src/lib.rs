//! `devisio-calc`: pure financial calculation.
//!
//! Two leaf modules with no side effects and no persistence:
//!
//! - [`totals`]: line items + VAT mode → document totals;
//! - [`delta`]: old/new/delta figures for correction lines on amendments and
//!   credit notes.

pub mod delta;
pub mod totals;

pub use delta::{CorrectionFigures, CorrectionInput, CorrectionPolarity, apply_delta};
pub use totals::{DocumentTotals, TaxableLine, compute_totals};
