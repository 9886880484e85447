//! The cross-document orchestrator.
//!
//! One `BillingEngine` operation = one logical transaction: read the
//! persisted document, build the proposed copy, run the guard, write, then
//! fire side effects and publish notifications. Side effects that follow an
//! already-committed signature are never rolled back (the signature is
//! legally authoritative), so their failures are logged and surfaced in the
//! operation outcome for manual remediation.

mod amendments;
mod credit_notes;
mod invoices;
mod quotes;
mod sweeps;

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use devisio_core::{ClientId, DocumentKind, EngineError, EngineResult};
use devisio_events::{BillingEvent, BillingEventKind, NotificationSink};
use devisio_invoicing::{Deposit, Invoice};
use devisio_parties::Client;
use devisio_quotes::Quote;

use crate::store::DocumentStore;

/// Bounded retries around max+1 number assignment. A conflict means another
/// writer took the sequence first; a fresh read resolves it.
const NUMBERING_ATTEMPTS: u32 = 3;

/// Result of signing a quote: the committed signature plus whatever the
/// orchestrator managed to spawn.
#[derive(Debug, Clone)]
pub struct SignQuoteOutcome {
    pub quote: Quote,
    pub deposit: Option<Deposit>,
    pub invoice: Option<Invoice>,
    /// Side-effect error after the committed signature, if any.
    pub side_effect_failure: Option<String>,
}

/// Result of signing an amendment: the committed signature plus the billing
/// document its net amount called for.
#[derive(Debug, Clone)]
pub struct SignAmendmentOutcome {
    pub amendment: devisio_quotes::Amendment,
    pub invoice: Option<Invoice>,
    pub credit_note: Option<devisio_invoicing::CreditNote>,
    pub side_effect_failure: Option<String>,
}

/// The billing engine: numbering, guards, state machines and cross-document
/// side effects behind one explicit call surface.
pub struct BillingEngine<S: DocumentStore> {
    store: S,
    sink: Arc<dyn NotificationSink>,
}

impl<S: DocumentStore> BillingEngine<S> {
    pub fn new(store: S, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, sink }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn create_client(&self, name: impl Into<String>) -> EngineResult<Client> {
        let client = Client::new(name, Utc::now())?;
        self.store.put_client(client.clone())?;
        Ok(client)
    }

    pub fn client(&self, id: ClientId) -> EngineResult<Client> {
        self.store.client(id)
    }

    /// Fire-and-forget notification; delivery failure never fails the
    /// operation that triggered it.
    pub(crate) fn publish(
        &self,
        document: DocumentKind,
        document_id: impl Into<Uuid>,
        number: Option<String>,
        kind: BillingEventKind,
    ) {
        let event = BillingEvent::new(document, document_id, number, kind, Utc::now());
        if self.sink.publish(event).is_err() {
            tracing::warn!(event = kind.as_str(), "notification sink dropped an event");
        }
    }

    /// Run `attempt` up to [`NUMBERING_ATTEMPTS`] times, retrying only on
    /// `NumberingConflict`; any other error propagates immediately.
    pub(crate) fn with_numbering_retry<T>(
        &self,
        mut attempt: impl FnMut() -> EngineResult<T>,
    ) -> EngineResult<T> {
        let mut conflict = None;
        for _ in 0..NUMBERING_ATTEMPTS {
            match attempt() {
                Err(EngineError::NumberingConflict { number }) => {
                    tracing::warn!(%number, "number taken by a concurrent writer, retrying");
                    conflict = Some(EngineError::NumberingConflict { number });
                }
                other => return other,
            }
        }
        Err(conflict.unwrap_or_else(|| EngineError::store("numbering retry without attempt")))
    }
}
