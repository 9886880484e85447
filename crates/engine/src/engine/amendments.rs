//! Amendment operations: lifecycle, delta lines, billing polarity.

use chrono::{Days, Utc};
use rust_decimal::Decimal;

use devisio_calc::{CorrectionPolarity, apply_delta};
use devisio_core::{
    AmendmentId, DocumentKind, EngineError, EngineResult, GuardedDocument, QuoteLineId,
    guard_write,
};
use devisio_events::BillingEventKind;
use devisio_invoicing::{CreditNote, CreditNoteLine, Invoice, InvoiceLine};
use devisio_quotes::{Amendment, AmendmentLine, AmendmentStatus, Quote, QuoteStatus};

use super::quotes::PAYMENT_WINDOW_DAYS;
use super::{BillingEngine, SignAmendmentOutcome};
use crate::numbering;
use crate::store::DocumentStore;

impl<S: DocumentStore> BillingEngine<S> {
    /// Create a draft amendment against a signed quote.
    ///
    /// The number derives from the parent's (`{quoteYear}-{quoteSeq}-A{n}`);
    /// if the parent is somehow unnumbered, assignment is deferred and
    /// retried at signature time.
    pub fn create_amendment(
        &self,
        quote_id: devisio_core::QuoteId,
        motive: impl Into<String>,
    ) -> EngineResult<Amendment> {
        let quote = self.store().quote(quote_id)?;
        if quote.status != QuoteStatus::Signed {
            return Err(EngineError::validation(
                "an amendment can only correct a signed quote",
            ));
        }

        let mut amendment =
            Amendment::new(quote_id, motive, quote.vat_rate, quote.per_line_vat, Utc::now())?;
        self.with_numbering_retry(|| {
            amendment.number = self.derive_amendment_number(&quote)?;
            self.store().put_amendment(amendment.clone())
        })?;

        tracing::info!(amendment = %amendment.id, number = ?amendment.number, "amendment created");
        Ok(amendment)
    }

    pub fn amendment(&self, amendment_id: AmendmentId) -> EngineResult<Amendment> {
        self.store().amendment(amendment_id)
    }

    /// Add a correction line. With `source_line` set, the line's stored total
    /// is the delta against that line on the parent quote.
    pub fn add_amendment_line(
        &self,
        amendment_id: AmendmentId,
        description: impl Into<String>,
        quantity: i64,
        unit_price: Decimal,
        vat_rate: Option<Decimal>,
        source_line: Option<QuoteLineId>,
    ) -> EngineResult<Amendment> {
        let persisted = self.store().amendment(amendment_id)?;
        Self::ensure_amendment_lines_mutable(&persisted)?;

        let source_total = match source_line {
            Some(line_id) => {
                let quote = self.store().quote(persisted.quote_id)?;
                let line = quote.line(line_id).ok_or_else(|| {
                    EngineError::not_found(format!("quote line {line_id} on parent quote"))
                })?;
                Some(line.total_excl_tax)
            }
            None => None,
        };

        let mut line = AmendmentLine::new(description, quantity, unit_price, vat_rate, source_line);
        line.apply_figures(apply_delta(
            &line.correction_input(),
            source_total,
            CorrectionPolarity::Amendment,
        ));

        let mut proposed = persisted.clone();
        proposed.lines.push(line);
        proposed.recompute_totals();
        proposed.modified_at = Utc::now();
        self.write_amendment(&persisted, proposed)
    }

    /// Guarded write of caller-edited amendment fields.
    pub fn update_amendment(&self, mut proposed: Amendment) -> EngineResult<Amendment> {
        let persisted = self.store().amendment(proposed.id)?;
        proposed.recompute_totals();
        proposed.modified_at = Utc::now();
        self.write_amendment(&persisted, proposed)
    }

    pub fn send_amendment(&self, amendment_id: AmendmentId) -> EngineResult<Amendment> {
        let amendment = self.transition_amendment(amendment_id, AmendmentStatus::Sent, |_| {})?;
        self.publish(
            DocumentKind::Amendment,
            amendment.id,
            amendment.number.clone(),
            BillingEventKind::AmendmentSent,
        );
        Ok(amendment)
    }

    pub fn cancel_amendment(&self, amendment_id: AmendmentId) -> EngineResult<Amendment> {
        let amendment =
            self.transition_amendment(amendment_id, AmendmentStatus::Cancelled, |_| {})?;
        self.publish(
            DocumentKind::Amendment,
            amendment.id,
            amendment.number.clone(),
            BillingEventKind::AmendmentCancelled,
        );
        Ok(amendment)
    }

    /// Commit the client's signature on the rider, then bill its net amount:
    /// positive corrections spawn a complementary invoice, negative ones a
    /// credit note against the parent quote's invoice.
    ///
    /// Billing is idempotent (re-processing an already-billed amendment
    /// returns the existing document) and a billing failure never rolls the
    /// committed signature back.
    pub fn sign_amendment(
        &self,
        amendment_id: AmendmentId,
        signature: impl Into<String>,
    ) -> EngineResult<SignAmendmentOutcome> {
        let persisted = self.store().amendment(amendment_id)?;
        persisted.validate_can_be_signed()?;

        // Deferred numbering: the parent may have been numbered since.
        let number = match &persisted.number {
            Some(number) => Some(number.clone()),
            None => {
                let quote = self.store().quote(persisted.quote_id)?;
                self.derive_amendment_number(&quote)?
            }
        };

        let signature = signature.into();
        let amendment = self.with_numbering_retry(|| {
            let mut proposed = persisted.clone();
            proposed.status = AmendmentStatus::Signed;
            proposed.signed_at = Some(Utc::now());
            proposed.client_signature = Some(signature.clone());
            proposed.number = number.clone();
            proposed.modified_at = Utc::now();
            self.write_amendment(&persisted, proposed)
        })?;
        tracing::info!(amendment = %amendment.id, number = ?amendment.number, "amendment signed");
        self.publish(
            DocumentKind::Amendment,
            amendment.id,
            amendment.number.clone(),
            BillingEventKind::AmendmentSigned,
        );

        let mut outcome = SignAmendmentOutcome {
            amendment: amendment.clone(),
            invoice: None,
            credit_note: None,
            side_effect_failure: None,
        };
        match self.bill_amendment(&amendment) {
            Ok((invoice, credit_note)) => {
                outcome.invoice = invoice;
                outcome.credit_note = credit_note;
            }
            Err(e) => {
                tracing::error!(amendment = %amendment.id, error = %e, "amendment billing failed");
                outcome.side_effect_failure = Some(e.to_string());
            }
        }
        Ok(outcome)
    }

    /// Write-back from the PDF collaborator; whitelisted on a signed rider.
    pub fn attach_amendment_pdf(
        &self,
        amendment_id: AmendmentId,
        filename: impl Into<String>,
        hash: impl Into<String>,
    ) -> EngineResult<Amendment> {
        let persisted = self.store().amendment(amendment_id)?;
        let mut proposed = persisted.clone();
        proposed.pdf_filename = Some(filename.into());
        proposed.pdf_hash = Some(hash.into());
        proposed.modified_at = Utc::now();
        self.write_amendment(&persisted, proposed)
    }

    fn bill_amendment(
        &self,
        amendment: &Amendment,
    ) -> EngineResult<(Option<Invoice>, Option<CreditNote>)> {
        if amendment.amount_excl_tax > Decimal::ZERO {
            let invoice = self.complementary_invoice(amendment)?;
            Ok((Some(invoice), None))
        } else if amendment.amount_excl_tax < Decimal::ZERO {
            let note = self.amendment_credit_note(amendment)?;
            Ok((None, Some(note)))
        } else {
            Ok((None, None))
        }
    }

    /// Positive net correction: bill the difference as a new invoice.
    fn complementary_invoice(&self, amendment: &Amendment) -> EngineResult<Invoice> {
        if let Some(existing) = self.store().invoice_for_amendment(amendment.id)? {
            return Ok(existing);
        }

        let quote = self.store().quote(amendment.quote_id)?;
        let now = Utc::now();
        let mut invoice = Invoice::new(
            quote.client_id,
            None,
            amendment.vat_rate,
            amendment.per_line_vat,
            now.date_naive() + Days::new(PAYMENT_WINDOW_DAYS),
            now,
        );
        invoice.amendment_id = Some(amendment.id);
        // Sourced lines carry their delta as the amount to bill; pure
        // additions keep their quantity/price breakdown.
        invoice.lines = amendment
            .lines
            .iter()
            .map(|l| {
                if l.source_line.is_some() {
                    InvoiceLine::new(l.description.clone(), 1, l.delta, l.vat_rate)
                } else {
                    InvoiceLine::new(l.description.clone(), l.quantity, l.unit_price, l.vat_rate)
                }
            })
            .collect();
        invoice.recompute_totals();

        self.store().put_invoice(invoice.clone())?;
        self.issue_invoice(invoice.id)
    }

    /// Negative net correction: credit the parent quote's invoice.
    fn amendment_credit_note(&self, amendment: &Amendment) -> EngineResult<CreditNote> {
        if let Some(existing) = self.store().credit_note_for_amendment(amendment.id)? {
            return Ok(existing);
        }

        let invoice = self
            .store()
            .invoice_for_quote(amendment.quote_id)?
            .ok_or_else(|| {
                EngineError::not_found("parent quote has no invoice to credit".to_string())
            })?;

        let label = match &amendment.number {
            Some(number) => format!("Avenant {number}: {}", amendment.motive),
            None => format!("Avenant: {}", amendment.motive),
        };
        // One aggregate credit line for the rider's net amount; the rider
        // itself keeps the per-line breakdown.
        let mut note = CreditNote::new(
            invoice.id,
            amendment.motive.clone(),
            amendment.vat_rate,
            false,
            Utc::now(),
        )?;
        note.amendment_id = Some(amendment.id);
        let mut line = CreditNoteLine::new(label, 1, amendment.amount_excl_tax, None, None);
        line.apply_figures(apply_delta(
            &line.correction_input(),
            None,
            CorrectionPolarity::CreditNote,
        ));
        note.lines.push(line);
        note.recompute_totals();

        self.store().put_credit_note(note.clone())?;
        self.issue_credit_note(note.id)
    }

    fn derive_amendment_number(&self, quote: &Quote) -> EngineResult<Option<String>> {
        let Some(quote_number) = quote.number.as_deref() else {
            return Ok(None);
        };
        // Count numbered riders only: a deferred rider being numbered late
        // is already stored and must not count itself.
        let prior = self
            .store()
            .amendments_for_quote(quote.id)?
            .iter()
            .filter(|a| a.number.is_some())
            .count();
        Ok(numbering::amendment_number(quote_number, prior))
    }

    pub(crate) fn transition_amendment(
        &self,
        amendment_id: AmendmentId,
        to: AmendmentStatus,
        prepare: impl FnOnce(&mut Amendment),
    ) -> EngineResult<Amendment> {
        let persisted = self.store().amendment(amendment_id)?;
        let mut proposed = persisted.clone();
        proposed.status = to;
        proposed.modified_at = Utc::now();
        prepare(&mut proposed);
        self.write_amendment(&persisted, proposed)
    }

    pub(crate) fn write_amendment(
        &self,
        persisted: &Amendment,
        proposed: Amendment,
    ) -> EngineResult<Amendment> {
        guard_write(persisted, &proposed)?;
        self.store().put_amendment(proposed.clone())?;
        Ok(proposed)
    }

    /// Line-level lock check, independent of the field-diff guard.
    fn ensure_amendment_lines_mutable(amendment: &Amendment) -> EngineResult<()> {
        if amendment.is_locked() {
            return Err(EngineError::immutable(
                DocumentKind::Amendment,
                amendment.number.as_deref(),
                vec!["lines".to_string()],
            ));
        }
        Ok(())
    }
}
