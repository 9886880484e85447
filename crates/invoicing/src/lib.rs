//! `devisio-invoicing`: invoices (factures), credit notes (avoirs),
//! deposits (acomptes) and payments.
//!
//! Invoices and credit notes are guarded documents: once emitted they are
//! legally immutable outside their field whitelists. Deposits and payments
//! are plain status-carrying records reported back by external collaborators.

pub mod credit_note;
pub mod deposit;
pub mod invoice;
pub mod payment;

pub use credit_note::{CreditNote, CreditNoteField, CreditNoteLine, CreditNoteStatus};
pub use deposit::{Deposit, DepositStatus};
pub use invoice::{DeliveryChannel, Invoice, InvoiceField, InvoiceLine, InvoiceStatus, PdpStatus};
pub use payment::{Payment, PaymentStatus};
