//! Quote operations: lifecycle, line mutations, billing side effects.

use chrono::{Datelike, Days, NaiveDate, Utc};
use rust_decimal::Decimal;

use devisio_calc::DocumentTotals;
use devisio_core::{
    ClientId, DepositId, DocumentKind, EngineError, EngineResult, GuardedDocument, QuoteId,
    QuoteLineId, guard_write, round2,
};
use devisio_events::BillingEventKind;
use devisio_invoicing::{Deposit, DepositStatus, Invoice, InvoiceLine};
use devisio_quotes::{AmendmentStatus, Quote, QuoteLine, QuoteStatus, Recurrence};

use super::{BillingEngine, SignQuoteOutcome};
use crate::numbering;
use crate::store::DocumentStore;

/// Default payment window for invoices billed from a quote.
pub(crate) const PAYMENT_WINDOW_DAYS: u64 = 30;

impl<S: DocumentStore> BillingEngine<S> {
    /// Create a draft quote and assign its `DEV-` number immediately.
    pub fn create_quote(
        &self,
        client_id: ClientId,
        vat_rate: Decimal,
        per_line_vat: bool,
        deposit_percent: Decimal,
        valid_until: NaiveDate,
    ) -> EngineResult<Quote> {
        self.store().client(client_id)?;
        let mut quote = Quote::new(
            client_id,
            vat_rate,
            per_line_vat,
            deposit_percent,
            valid_until,
            Utc::now(),
        )?;

        let today = Utc::now().date_naive();
        let prefix = numbering::quote_prefix(today.year(), today.month());
        self.with_numbering_retry(|| {
            let existing = self.store().quotes()?;
            let seq = numbering::next_seq(
                existing.iter().filter_map(|q| q.number.as_deref()),
                &prefix,
            );
            quote.number = Some(numbering::format_number(&prefix, seq));
            self.store().put_quote(quote.clone())
        })?;

        tracing::info!(quote = %quote.id, number = ?quote.number, "quote created");
        Ok(quote)
    }

    /// Load a quote, lapsing it into `Expired` first if its validity date has
    /// passed (lazy counterpart of the periodic sweep).
    pub fn get_quote(&self, quote_id: QuoteId, today: NaiveDate) -> EngineResult<Quote> {
        let quote = self.store().quote(quote_id)?;
        if quote.is_expired(today) {
            return self.expire_quote(&quote);
        }
        Ok(quote)
    }

    pub fn add_quote_line(
        &self,
        quote_id: QuoteId,
        description: impl Into<String>,
        quantity: i64,
        unit_price: Decimal,
        vat_rate: Option<Decimal>,
        recurrence: Option<Recurrence>,
    ) -> EngineResult<Quote> {
        let persisted = self.store().quote(quote_id)?;
        Self::ensure_quote_lines_mutable(&persisted)?;

        let mut line = QuoteLine::new(description, quantity, unit_price, vat_rate)?;
        line.recurrence = recurrence;

        let mut proposed = persisted.clone();
        proposed.lines.push(line);
        proposed.recompute_totals();
        proposed.modified_at = Utc::now();
        self.write_quote(&persisted, proposed)
    }

    pub fn update_quote_line(
        &self,
        quote_id: QuoteId,
        line_id: QuoteLineId,
        description: impl Into<String>,
        quantity: i64,
        unit_price: Decimal,
        vat_rate: Option<Decimal>,
    ) -> EngineResult<Quote> {
        let persisted = self.store().quote(quote_id)?;
        Self::ensure_quote_lines_mutable(&persisted)?;
        if quantity <= 0 {
            return Err(EngineError::validation("quote line quantity must be positive"));
        }

        let mut proposed = persisted.clone();
        let line = proposed
            .lines
            .iter_mut()
            .find(|l| l.id == line_id)
            .ok_or_else(|| EngineError::not_found(format!("quote line {line_id}")))?;
        line.description = description.into();
        line.quantity = quantity;
        line.unit_price = unit_price;
        line.vat_rate = vat_rate;
        line.recompute_total();

        proposed.recompute_totals();
        proposed.modified_at = Utc::now();
        self.write_quote(&persisted, proposed)
    }

    pub fn remove_quote_line(&self, quote_id: QuoteId, line_id: QuoteLineId) -> EngineResult<Quote> {
        let persisted = self.store().quote(quote_id)?;
        Self::ensure_quote_lines_mutable(&persisted)?;

        let mut proposed = persisted.clone();
        let before = proposed.lines.len();
        proposed.lines.retain(|l| l.id != line_id);
        if proposed.lines.len() == before {
            return Err(EngineError::not_found(format!("quote line {line_id}")));
        }
        proposed.recompute_totals();
        proposed.modified_at = Utc::now();
        self.write_quote(&persisted, proposed)
    }

    /// Guarded write of caller-edited quote fields (notes, validity, VAT
    /// mode...). Totals are re-derived so the identity invariant holds.
    pub fn update_quote(&self, mut proposed: Quote) -> EngineResult<Quote> {
        let persisted = self.store().quote(proposed.id)?;
        proposed.recompute_totals();
        proposed.modified_at = Utc::now();
        self.write_quote(&persisted, proposed)
    }

    pub fn send_quote(&self, quote_id: QuoteId) -> EngineResult<Quote> {
        let quote = self.transition_quote(quote_id, QuoteStatus::Sent, |_| {})?;
        self.publish(
            DocumentKind::Quote,
            quote.id,
            quote.number.clone(),
            BillingEventKind::QuoteSent,
        );
        Ok(quote)
    }

    /// Commit the client's signature, then spawn the deposit or the invoice.
    ///
    /// The signature is legally authoritative: a failure while spawning the
    /// downstream document does not roll it back, it is logged and reported
    /// in the outcome instead.
    pub fn sign_quote(
        &self,
        quote_id: QuoteId,
        signature: impl Into<String>,
    ) -> EngineResult<SignQuoteOutcome> {
        let persisted = self.store().quote(quote_id)?;
        persisted.validate_can_be_signed()?;

        let signature = signature.into();
        let quote = self.transition_quote(quote_id, QuoteStatus::Signed, |q| {
            q.signed_at = Some(Utc::now());
            q.client_signature = Some(signature);
        })?;
        tracing::info!(quote = %quote.id, number = ?quote.number, "quote signed");
        self.publish(
            DocumentKind::Quote,
            quote.id,
            quote.number.clone(),
            BillingEventKind::QuoteSigned,
        );

        let mut outcome = SignQuoteOutcome {
            quote: quote.clone(),
            deposit: None,
            invoice: None,
            side_effect_failure: None,
        };
        match self.quote_signed_side_effects(&quote) {
            Ok((deposit, invoice)) => {
                outcome.deposit = deposit;
                outcome.invoice = invoice;
            }
            Err(e) => {
                tracing::error!(quote = %quote.id, error = %e, "post-signature side effect failed");
                outcome.side_effect_failure = Some(e.to_string());
            }
        }
        Ok(outcome)
    }

    pub fn refuse_quote(&self, quote_id: QuoteId) -> EngineResult<Quote> {
        let quote = self.transition_quote(quote_id, QuoteStatus::Refused, |_| {})?;
        self.publish(
            DocumentKind::Quote,
            quote.id,
            quote.number.clone(),
            BillingEventKind::QuoteRefused,
        );
        Ok(quote)
    }

    pub fn cancel_quote(&self, quote_id: QuoteId) -> EngineResult<Quote> {
        let quote = self.transition_quote(quote_id, QuoteStatus::Cancelled, |_| {})?;
        self.publish(
            DocumentKind::Quote,
            quote.id,
            quote.number.clone(),
            BillingEventKind::QuoteCancelled,
        );
        Ok(quote)
    }

    /// Bill a signed quote whose deposit path deferred invoicing.
    ///
    /// Idempotent: re-invocation returns the already-existing invoice.
    pub fn bill_quote(&self, quote_id: QuoteId) -> EngineResult<Invoice> {
        let quote = self.store().quote(quote_id)?;
        if quote.status != QuoteStatus::Signed {
            return Err(EngineError::validation("only a signed quote can be billed"));
        }
        self.invoice_from_quote(&quote)
    }

    pub fn mark_deposit_paid(&self, deposit_id: DepositId) -> EngineResult<Deposit> {
        let mut deposit = self.store().deposit(deposit_id)?;
        if deposit.status != DepositStatus::Paid {
            deposit.status = DepositStatus::Paid;
            deposit.paid_at = Some(Utc::now());
            self.store().put_deposit(deposit.clone())?;
            self.publish(
                DocumentKind::Deposit,
                deposit.id,
                None,
                BillingEventKind::DepositPaid,
            );
        }
        Ok(deposit)
    }

    /// The quote's displayed "corrected total": base totals plus every
    /// signed amendment. Derived on read, never persisted.
    pub fn quote_corrected_total(&self, quote_id: QuoteId) -> EngineResult<DocumentTotals> {
        let quote = self.store().quote(quote_id)?;
        let mut excl = quote.amount_excl_tax;
        let mut tax = quote.amount_of_tax;
        for amendment in self.store().amendments_for_quote(quote_id)? {
            if amendment.status == AmendmentStatus::Signed {
                excl += amendment.amount_excl_tax;
                tax += amendment.amount_of_tax;
            }
        }
        Ok(DocumentTotals {
            excl_tax: excl,
            tax,
            incl_tax: excl + tax,
        })
    }

    fn quote_signed_side_effects(
        &self,
        quote: &Quote,
    ) -> EngineResult<(Option<Deposit>, Option<Invoice>)> {
        if quote.deposit_percent > Decimal::ZERO {
            let deposit = Deposit::for_quote(
                quote.id,
                quote.amount_incl_tax,
                quote.deposit_percent,
                Utc::now(),
            );
            self.store().put_deposit(deposit.clone())?;
            tracing::info!(quote = %quote.id, amount = %deposit.amount, "deposit requested");
            self.publish(
                DocumentKind::Deposit,
                deposit.id,
                None,
                BillingEventKind::DepositRequested,
            );
            Ok((Some(deposit), None))
        } else {
            let invoice = self.invoice_from_quote(quote)?;
            Ok((None, Some(invoice)))
        }
    }

    /// Create and issue the invoice for a signed quote: lines are copied
    /// (fresh ids, same content, never re-linking the quote's line objects)
    /// and paid deposits are deducted. No-op if the quote is already billed.
    pub(crate) fn invoice_from_quote(&self, quote: &Quote) -> EngineResult<Invoice> {
        if let Some(existing) = self.store().invoice_for_quote(quote.id)? {
            return Ok(existing);
        }

        let now = Utc::now();
        let due_date = now.date_naive() + Days::new(PAYMENT_WINDOW_DAYS);
        let mut invoice = Invoice::new(
            quote.client_id,
            Some(quote.id),
            quote.vat_rate,
            quote.per_line_vat,
            due_date,
            now,
        );
        invoice.payment_terms = Some(format!("Paiement à {PAYMENT_WINDOW_DAYS} jours"));
        invoice.lines = quote
            .lines
            .iter()
            .map(|l| InvoiceLine::new(l.description.clone(), l.quantity, l.unit_price, l.vat_rate))
            .collect();
        invoice.recompute_totals();

        let mut paid_deposits: Vec<Deposit> = self
            .store()
            .deposits_for_quote(quote.id)?
            .into_iter()
            .filter(|d| d.status == DepositStatus::Paid && d.invoice_id.is_none())
            .collect();
        invoice.deposit_paid = round2(paid_deposits.iter().map(|d| d.amount).sum::<Decimal>());

        self.store().put_invoice(invoice.clone())?;
        let invoice = self.issue_invoice(invoice.id)?;

        for deposit in &mut paid_deposits {
            deposit.invoice_id = Some(invoice.id);
            self.store().put_deposit(deposit.clone())?;
        }
        Ok(invoice)
    }

    pub(crate) fn expire_quote(&self, quote: &Quote) -> EngineResult<Quote> {
        let expired = self.transition_quote(quote.id, QuoteStatus::Expired, |_| {})?;
        tracing::info!(quote = %expired.id, number = ?expired.number, "quote expired");
        self.publish(
            DocumentKind::Quote,
            expired.id,
            expired.number.clone(),
            BillingEventKind::QuoteExpired,
        );
        Ok(expired)
    }

    pub(crate) fn transition_quote(
        &self,
        quote_id: QuoteId,
        to: QuoteStatus,
        prepare: impl FnOnce(&mut Quote),
    ) -> EngineResult<Quote> {
        let persisted = self.store().quote(quote_id)?;
        let mut proposed = persisted.clone();
        proposed.status = to;
        proposed.modified_at = Utc::now();
        prepare(&mut proposed);
        self.write_quote(&persisted, proposed)
    }

    pub(crate) fn write_quote(&self, persisted: &Quote, proposed: Quote) -> EngineResult<Quote> {
        guard_write(persisted, &proposed)?;
        self.store().put_quote(proposed.clone())?;
        Ok(proposed)
    }

    /// Line-level lock check, independent of the field-diff guard.
    fn ensure_quote_lines_mutable(quote: &Quote) -> EngineResult<()> {
        if quote.is_locked() {
            return Err(EngineError::immutable(
                DocumentKind::Quote,
                quote.number.as_deref(),
                vec!["lines".to_string()],
            ));
        }
        Ok(())
    }
}
