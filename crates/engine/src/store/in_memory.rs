//! In-memory document arena.
//!
//! Intended for tests, the CLI snapshot workflow and development. The
//! `RwLock` serializes writers, so the max+1 numbering scheme cannot race
//! here; alternate store implementations must provide equivalent
//! serialization (a unique constraint plus retry, or a locked sequence row).

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use devisio_core::{
    AmendmentId, ClientId, CreditNoteId, DepositId, EngineError, EngineResult, InvoiceId,
    PaymentId, QuoteId,
};
use devisio_invoicing::{CreditNote, Deposit, Invoice, Payment};
use devisio_parties::Client;
use devisio_quotes::{Amendment, Quote};

use super::DocumentStore;

/// The whole document graph, serializable as one JSON snapshot.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Arena {
    pub clients: BTreeMap<ClientId, Client>,
    pub quotes: BTreeMap<QuoteId, Quote>,
    pub amendments: BTreeMap<AmendmentId, Amendment>,
    pub invoices: BTreeMap<InvoiceId, Invoice>,
    pub credit_notes: BTreeMap<CreditNoteId, CreditNote>,
    pub deposits: BTreeMap<DepositId, Deposit>,
    pub payments: BTreeMap<PaymentId, Payment>,
}

/// In-memory [`DocumentStore`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    arena: RwLock<Arena>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_arena(arena: Arena) -> Self {
        Self {
            arena: RwLock::new(arena),
        }
    }

    /// Clone the current arena (snapshot for serialization).
    pub fn arena(&self) -> EngineResult<Arena> {
        Ok(self.read()?.clone())
    }

    fn read(&self) -> EngineResult<std::sync::RwLockReadGuard<'_, Arena>> {
        self.arena
            .read()
            .map_err(|_| EngineError::store("arena lock poisoned"))
    }

    fn write(&self) -> EngineResult<std::sync::RwLockWriteGuard<'_, Arena>> {
        self.arena
            .write()
            .map_err(|_| EngineError::store("arena lock poisoned"))
    }
}

/// Number uniqueness within one document family.
fn check_number_unique<'a, I, K>(
    existing: I,
    id: K,
    number: Option<&str>,
) -> EngineResult<()>
where
    I: Iterator<Item = (&'a K, Option<&'a str>)>,
    K: PartialEq + 'a,
{
    let Some(number) = number else {
        return Ok(());
    };
    for (other_id, other_number) in existing {
        if *other_id != id && other_number == Some(number) {
            return Err(EngineError::numbering_conflict(number));
        }
    }
    Ok(())
}

impl DocumentStore for InMemoryStore {
    fn put_client(&self, client: Client) -> EngineResult<()> {
        self.write()?.clients.insert(client.id, client);
        Ok(())
    }

    fn client(&self, id: ClientId) -> EngineResult<Client> {
        self.read()?
            .clients
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("client {id}")))
    }

    fn put_quote(&self, quote: Quote) -> EngineResult<()> {
        let mut arena = self.write()?;
        check_number_unique(
            arena
                .quotes
                .iter()
                .map(|(id, q)| (id, q.number.as_deref())),
            quote.id,
            quote.number.as_deref(),
        )?;
        arena.quotes.insert(quote.id, quote);
        Ok(())
    }

    fn quote(&self, id: QuoteId) -> EngineResult<Quote> {
        self.read()?
            .quotes
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("quote {id}")))
    }

    fn quotes(&self) -> EngineResult<Vec<Quote>> {
        Ok(self.read()?.quotes.values().cloned().collect())
    }

    fn put_amendment(&self, amendment: Amendment) -> EngineResult<()> {
        let mut arena = self.write()?;
        // Amendment numbers derive from the parent quote's and are unique
        // within that quote only: riders of quotes numbered per month can
        // legitimately share a `{year}-{seq}-A{n}` suffix.
        check_number_unique(
            arena
                .amendments
                .iter()
                .filter(|(_, a)| a.quote_id == amendment.quote_id)
                .map(|(id, a)| (id, a.number.as_deref())),
            amendment.id,
            amendment.number.as_deref(),
        )?;
        arena.amendments.insert(amendment.id, amendment);
        Ok(())
    }

    fn amendment(&self, id: AmendmentId) -> EngineResult<Amendment> {
        self.read()?
            .amendments
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("amendment {id}")))
    }

    fn amendments_for_quote(&self, quote_id: QuoteId) -> EngineResult<Vec<Amendment>> {
        Ok(self
            .read()?
            .amendments
            .values()
            .filter(|a| a.quote_id == quote_id)
            .cloned()
            .collect())
    }

    fn put_invoice(&self, invoice: Invoice) -> EngineResult<()> {
        let mut arena = self.write()?;
        check_number_unique(
            arena
                .invoices
                .iter()
                .map(|(id, i)| (id, i.number.as_deref())),
            invoice.id,
            invoice.number.as_deref(),
        )?;
        // A quote is billed by at most one invoice.
        if let Some(quote_id) = invoice.quote_id {
            let already_billed = arena
                .invoices
                .values()
                .any(|other| other.id != invoice.id && other.quote_id == Some(quote_id));
            if already_billed {
                return Err(EngineError::validation(format!(
                    "quote {quote_id} is already billed by another invoice"
                )));
            }
        }
        arena.invoices.insert(invoice.id, invoice);
        Ok(())
    }

    fn invoice(&self, id: InvoiceId) -> EngineResult<Invoice> {
        self.read()?
            .invoices
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("invoice {id}")))
    }

    fn invoices(&self) -> EngineResult<Vec<Invoice>> {
        Ok(self.read()?.invoices.values().cloned().collect())
    }

    fn invoice_for_quote(&self, quote_id: QuoteId) -> EngineResult<Option<Invoice>> {
        Ok(self
            .read()?
            .invoices
            .values()
            .find(|i| i.quote_id == Some(quote_id))
            .cloned())
    }

    fn invoice_for_amendment(&self, amendment_id: AmendmentId) -> EngineResult<Option<Invoice>> {
        Ok(self
            .read()?
            .invoices
            .values()
            .find(|i| i.amendment_id == Some(amendment_id))
            .cloned())
    }

    fn put_credit_note(&self, credit_note: CreditNote) -> EngineResult<()> {
        let mut arena = self.write()?;
        check_number_unique(
            arena
                .credit_notes
                .iter()
                .map(|(id, c)| (id, c.number.as_deref())),
            credit_note.id,
            credit_note.number.as_deref(),
        )?;
        arena.credit_notes.insert(credit_note.id, credit_note);
        Ok(())
    }

    fn credit_note(&self, id: CreditNoteId) -> EngineResult<CreditNote> {
        self.read()?
            .credit_notes
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("credit note {id}")))
    }

    fn credit_notes(&self) -> EngineResult<Vec<CreditNote>> {
        Ok(self.read()?.credit_notes.values().cloned().collect())
    }

    fn credit_notes_for_invoice(&self, invoice_id: InvoiceId) -> EngineResult<Vec<CreditNote>> {
        Ok(self
            .read()?
            .credit_notes
            .values()
            .filter(|c| c.invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    fn credit_note_for_amendment(
        &self,
        amendment_id: AmendmentId,
    ) -> EngineResult<Option<CreditNote>> {
        Ok(self
            .read()?
            .credit_notes
            .values()
            .find(|c| c.amendment_id == Some(amendment_id))
            .cloned())
    }

    fn put_deposit(&self, deposit: Deposit) -> EngineResult<()> {
        self.write()?.deposits.insert(deposit.id, deposit);
        Ok(())
    }

    fn deposit(&self, id: DepositId) -> EngineResult<Deposit> {
        self.read()?
            .deposits
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("deposit {id}")))
    }

    fn deposits_for_quote(&self, quote_id: QuoteId) -> EngineResult<Vec<Deposit>> {
        Ok(self
            .read()?
            .deposits
            .values()
            .filter(|d| d.quote_id == quote_id)
            .cloned()
            .collect())
    }

    fn put_payment(&self, payment: Payment) -> EngineResult<()> {
        self.write()?.payments.insert(payment.id, payment);
        Ok(())
    }

    fn payment(&self, id: PaymentId) -> EngineResult<Payment> {
        self.read()?
            .payments
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("payment {id}")))
    }

    fn payments_for_invoice(&self, invoice_id: InvoiceId) -> EngineResult<Vec<Payment>> {
        Ok(self
            .read()?
            .payments
            .values()
            .filter(|p| p.invoice_id == invoice_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn quote_numbered(number: &str) -> Quote {
        let mut quote = Quote::new(
            ClientId::new(),
            dec!(20),
            false,
            Decimal::ZERO,
            NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
            Utc::now(),
        )
        .unwrap();
        quote.number = Some(number.to_string());
        quote
    }

    #[test]
    fn duplicate_numbers_conflict_at_put() {
        let store = InMemoryStore::new();
        store.put_quote(quote_numbered("DEV-2026-08-001")).unwrap();

        let err = store.put_quote(quote_numbered("DEV-2026-08-001")).unwrap_err();
        assert!(matches!(err, EngineError::NumberingConflict { .. }));
    }

    #[test]
    fn replacing_a_document_with_its_own_number_is_fine() {
        let store = InMemoryStore::new();
        let quote = quote_numbered("DEV-2026-08-001");
        store.put_quote(quote.clone()).unwrap();
        store.put_quote(quote).unwrap();
    }

    fn amendment_numbered(quote_id: QuoteId, number: &str) -> Amendment {
        let mut amendment =
            Amendment::new(quote_id, "Révision", dec!(20), false, Utc::now()).unwrap();
        amendment.number = Some(number.to_string());
        amendment
    }

    #[test]
    fn amendment_numbers_are_scoped_to_their_quote() {
        let store = InMemoryStore::new();
        let july_quote = QuoteId::new();
        let august_quote = QuoteId::new();

        // Quote sequences restart each month, so riders of two quotes can
        // share the same derived suffix. Only a clash within one quote is
        // a conflict.
        store
            .put_amendment(amendment_numbered(july_quote, "2026-003-A1"))
            .unwrap();
        store
            .put_amendment(amendment_numbered(august_quote, "2026-003-A1"))
            .unwrap();

        let err = store
            .put_amendment(amendment_numbered(july_quote, "2026-003-A1"))
            .unwrap_err();
        assert!(matches!(err, EngineError::NumberingConflict { .. }));
    }

    #[test]
    fn a_quote_is_billed_at_most_once() {
        let store = InMemoryStore::new();
        let quote_id = QuoteId::new();
        let client_id = ClientId::new();
        let due = NaiveDate::from_ymd_opt(2026, 9, 30).unwrap();

        let first = Invoice::new(client_id, Some(quote_id), dec!(20), false, due, Utc::now());
        store.put_invoice(first).unwrap();

        let second = Invoice::new(client_id, Some(quote_id), dec!(20), false, due, Utc::now());
        assert!(store.put_invoice(second).is_err());
    }
}
