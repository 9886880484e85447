//! `devisio-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! typed identifiers, the engine error model, monetary rounding helpers and the
//! shared immutability-guard machinery used by every document type.

pub mod error;
pub mod guard;
pub mod id;
pub mod money;

pub use error::{DocumentKind, EngineError, EngineResult};
pub use guard::{GuardedDocument, guard_write};
pub use id::{
    AmendmentId, AmendmentLineId, ClientId, CreditNoteId, CreditNoteLineId, DepositId, InvoiceId,
    InvoiceLineId, PaymentId, QuoteId, QuoteLineId,
};
pub use money::{MONEY_TOLERANCE, approx_zero, round2};
