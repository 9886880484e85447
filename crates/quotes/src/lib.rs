//! `devisio-quotes`: quotes (devis) and their amendments (avenants).
//!
//! Both document types carry their own status lifecycle, field whitelist and
//! transition table, wired into the shared guard via
//! [`devisio_core::GuardedDocument`].

pub mod amendment;
pub mod quote;

pub use amendment::{Amendment, AmendmentField, AmendmentLine, AmendmentStatus};
pub use quote::{Quote, QuoteField, QuoteLine, QuoteStatus, Recurrence, RecurrenceInterval};
