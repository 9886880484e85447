//! `devisio-engine`: numbering, persistence boundary and the
//! cross-document orchestrator.
//!
//! The service layer calls the engine explicitly (`engine.sign_quote(...)`);
//! there are no persistence-lifecycle listeners. Each operation runs guard →
//! state machine → calculator → side effects → notification publish in a
//! fixed order against the store.

pub mod engine;
pub mod numbering;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use engine::{BillingEngine, SignAmendmentOutcome, SignQuoteOutcome};
pub use store::{DocumentStore, InMemoryStore, snapshot};
