//! Persistence boundary.
//!
//! Documents live in an arena addressed by id; cross-document relations are
//! explicit lookups, never live object graphs. Relational semantics the
//! engine relies on (number uniqueness per scope, quote ↔ invoice 1:1) are
//! enforced by the store at put time, inside the same logical write as the
//! mutation they protect.

pub mod in_memory;
pub mod snapshot;

pub use in_memory::{Arena, InMemoryStore};

use devisio_core::{
    AmendmentId, ClientId, CreditNoteId, DepositId, EngineResult, InvoiceId, PaymentId, QuoteId,
};
use devisio_invoicing::{CreditNote, Deposit, Invoice, Payment};
use devisio_parties::Client;
use devisio_quotes::{Amendment, Quote};

/// Typed get/put/list access to the document arena.
///
/// `put_*` either inserts or replaces the whole document; there is no partial
/// update. A put that would duplicate a document number in its scope fails
/// with `NumberingConflict`: the caller retries with a fresh sequence read.
pub trait DocumentStore: Send + Sync {
    fn put_client(&self, client: Client) -> EngineResult<()>;
    fn client(&self, id: ClientId) -> EngineResult<Client>;

    fn put_quote(&self, quote: Quote) -> EngineResult<()>;
    fn quote(&self, id: QuoteId) -> EngineResult<Quote>;
    fn quotes(&self) -> EngineResult<Vec<Quote>>;

    fn put_amendment(&self, amendment: Amendment) -> EngineResult<()>;
    fn amendment(&self, id: AmendmentId) -> EngineResult<Amendment>;
    fn amendments_for_quote(&self, quote_id: QuoteId) -> EngineResult<Vec<Amendment>>;

    fn put_invoice(&self, invoice: Invoice) -> EngineResult<()>;
    fn invoice(&self, id: InvoiceId) -> EngineResult<Invoice>;
    fn invoices(&self) -> EngineResult<Vec<Invoice>>;
    /// The invoice billed from a quote, if any (at most one).
    fn invoice_for_quote(&self, quote_id: QuoteId) -> EngineResult<Option<Invoice>>;
    /// The complementary invoice spawned by an amendment, if any.
    fn invoice_for_amendment(&self, amendment_id: AmendmentId) -> EngineResult<Option<Invoice>>;

    fn put_credit_note(&self, credit_note: CreditNote) -> EngineResult<()>;
    fn credit_note(&self, id: CreditNoteId) -> EngineResult<CreditNote>;
    fn credit_notes(&self) -> EngineResult<Vec<CreditNote>>;
    fn credit_notes_for_invoice(&self, invoice_id: InvoiceId) -> EngineResult<Vec<CreditNote>>;
    /// The credit note spawned by an amendment, if any.
    fn credit_note_for_amendment(
        &self,
        amendment_id: AmendmentId,
    ) -> EngineResult<Option<CreditNote>>;

    fn put_deposit(&self, deposit: Deposit) -> EngineResult<()>;
    fn deposit(&self, id: DepositId) -> EngineResult<Deposit>;
    fn deposits_for_quote(&self, quote_id: QuoteId) -> EngineResult<Vec<Deposit>>;

    fn put_payment(&self, payment: Payment) -> EngineResult<()>;
    fn payment(&self, id: PaymentId) -> EngineResult<Payment>;
    fn payments_for_invoice(&self, invoice_id: InvoiceId) -> EngineResult<Vec<Payment>>;
}
