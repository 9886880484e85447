//! Credit note operations: lifecycle, delta lines, offset cancellation.

use chrono::{Datelike, Utc};
use rust_decimal::Decimal;

use devisio_core::{
    CreditNoteId, DocumentKind, EngineError, EngineResult, GuardedDocument, InvoiceId,
    InvoiceLineId, approx_zero, guard_write,
};
use devisio_events::BillingEventKind;
use devisio_invoicing::{CreditNote, CreditNoteLine, CreditNoteStatus, InvoiceStatus};

use devisio_calc::{CorrectionPolarity, apply_delta};

use super::BillingEngine;
use crate::numbering;
use crate::store::DocumentStore;

impl<S: DocumentStore> BillingEngine<S> {
    /// Open a draft credit note against an emitted invoice.
    pub fn create_credit_note(
        &self,
        invoice_id: InvoiceId,
        reason: impl Into<String>,
    ) -> EngineResult<CreditNote> {
        let invoice = self.store().invoice(invoice_id)?;
        if !invoice.status.is_emitted() {
            return Err(EngineError::validation(
                "a credit note can only correct an emitted invoice",
            ));
        }

        let note = CreditNote::new(
            invoice.id,
            reason,
            invoice.vat_rate,
            invoice.per_line_vat,
            Utc::now(),
        )?;
        self.store().put_credit_note(note.clone())?;
        Ok(note)
    }

    pub fn credit_note(&self, credit_note_id: CreditNoteId) -> EngineResult<CreditNote> {
        self.store().credit_note(credit_note_id)
    }

    /// Add a correction line, optionally against a line of the corrected
    /// invoice. Deltas and new values are forced non-positive.
    pub fn add_credit_note_line(
        &self,
        credit_note_id: CreditNoteId,
        description: impl Into<String>,
        quantity: i64,
        unit_price: Decimal,
        vat_rate: Option<Decimal>,
        source_line: Option<InvoiceLineId>,
    ) -> EngineResult<CreditNote> {
        let persisted = self.store().credit_note(credit_note_id)?;
        Self::ensure_credit_note_lines_mutable(&persisted)?;

        let source_total = match source_line {
            Some(line_id) => {
                let invoice = self.store().invoice(persisted.invoice_id)?;
                let line = invoice.line(line_id).ok_or_else(|| {
                    EngineError::not_found(format!("invoice line {line_id} on corrected invoice"))
                })?;
                Some(line.total_excl_tax)
            }
            None => None,
        };

        let mut line = CreditNoteLine::new(description, quantity, unit_price, vat_rate, source_line);
        line.apply_figures(apply_delta(
            &line.correction_input(),
            source_total,
            CorrectionPolarity::CreditNote,
        ));

        let mut proposed = persisted.clone();
        proposed.lines.push(line);
        proposed.recompute_totals();
        proposed.modified_at = Utc::now();
        self.write_credit_note(&persisted, proposed)
    }

    /// Issue the credit note: assign its `AV-` number, lock it, then check
    /// whether the corrected invoice is now fully offset and must be
    /// cancelled. The offset check runs in the same logical mutation.
    pub fn issue_credit_note(&self, credit_note_id: CreditNoteId) -> EngineResult<CreditNote> {
        let persisted = self.store().credit_note(credit_note_id)?;
        persisted.validate_can_be_issued()?;

        let prefix = numbering::credit_note_prefix(Utc::now().year());
        let note = self.with_numbering_retry(|| {
            let existing = self.store().credit_notes()?;
            let seq = numbering::next_seq(
                existing.iter().filter_map(|c| c.number.as_deref()),
                &prefix,
            );

            let mut proposed = persisted.clone();
            proposed.number = Some(numbering::format_number(&prefix, seq));
            proposed.status = CreditNoteStatus::Issued;
            proposed.issued_at = Some(Utc::now());
            proposed.modified_at = Utc::now();
            self.write_credit_note(&persisted, proposed)
        })?;

        tracing::info!(credit_note = %note.id, number = ?note.number, "credit note issued");
        self.publish(
            DocumentKind::CreditNote,
            note.id,
            note.number.clone(),
            BillingEventKind::CreditNoteIssued,
        );

        self.cancel_invoice_if_offset(note.invoice_id)?;
        Ok(note)
    }

    pub fn send_credit_note(&self, credit_note_id: CreditNoteId) -> EngineResult<CreditNote> {
        let note = self.transition_credit_note(credit_note_id, CreditNoteStatus::Sent)?;
        self.publish(
            DocumentKind::CreditNote,
            note.id,
            note.number.clone(),
            BillingEventKind::CreditNoteSent,
        );
        Ok(note)
    }

    pub fn refund_credit_note(&self, credit_note_id: CreditNoteId) -> EngineResult<CreditNote> {
        let note = self.transition_credit_note(credit_note_id, CreditNoteStatus::Refunded)?;
        self.publish(
            DocumentKind::CreditNote,
            note.id,
            note.number.clone(),
            BillingEventKind::CreditNoteRefunded,
        );
        Ok(note)
    }

    /// When the issued credit notes of an invoice offset its full value
    /// (within one cent), the invoice is cancelled. Its number is kept;
    /// the gapless sequence never reuses it.
    fn cancel_invoice_if_offset(&self, invoice_id: InvoiceId) -> EngineResult<()> {
        let invoice = self.store().invoice(invoice_id)?;
        if invoice.status == InvoiceStatus::Cancelled {
            return Ok(());
        }

        let credited: Decimal = self
            .store()
            .credit_notes_for_invoice(invoice_id)?
            .iter()
            .filter(|c| c.status.is_emitted())
            .map(|c| c.amount_incl_tax)
            .sum();

        if approx_zero(invoice.amount_incl_tax + credited) {
            let mut proposed = invoice.clone();
            proposed.status = InvoiceStatus::Cancelled;
            proposed.modified_at = Utc::now();
            let cancelled = self.write_invoice(&invoice, proposed)?;
            tracing::info!(invoice = %cancelled.id, number = ?cancelled.number, "invoice fully offset, cancelled");
            self.publish(
                DocumentKind::Invoice,
                cancelled.id,
                cancelled.number.clone(),
                BillingEventKind::InvoiceCancelled,
            );
        }
        Ok(())
    }

    fn transition_credit_note(
        &self,
        credit_note_id: CreditNoteId,
        to: CreditNoteStatus,
    ) -> EngineResult<CreditNote> {
        let persisted = self.store().credit_note(credit_note_id)?;
        let mut proposed = persisted.clone();
        proposed.status = to;
        proposed.modified_at = Utc::now();
        self.write_credit_note(&persisted, proposed)
    }

    fn write_credit_note(
        &self,
        persisted: &CreditNote,
        proposed: CreditNote,
    ) -> EngineResult<CreditNote> {
        guard_write(persisted, &proposed)?;
        self.store().put_credit_note(proposed.clone())?;
        Ok(proposed)
    }

    /// Line-level lock check, independent of the field-diff guard.
    fn ensure_credit_note_lines_mutable(note: &CreditNote) -> EngineResult<()> {
        if note.is_locked() {
            return Err(EngineError::immutable(
                DocumentKind::CreditNote,
                note.number.as_deref(),
                vec!["lines".to_string()],
            ));
        }
        Ok(())
    }
}
