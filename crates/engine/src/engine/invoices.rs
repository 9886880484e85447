//! Invoice operations: lifecycle, line mutations, payments, PDP/PDF
//! write-backs.

use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;

use devisio_calc::DocumentTotals;
use devisio_core::{
    ClientId, DocumentKind, EngineError, EngineResult, GuardedDocument, InvoiceId, InvoiceLineId,
    MONEY_TOLERANCE, PaymentId, QuoteId, guard_write,
};
use devisio_events::BillingEventKind;
use devisio_invoicing::{
    DeliveryChannel, Invoice, InvoiceLine, InvoiceStatus, Payment, PaymentStatus, PdpStatus,
};

use super::BillingEngine;
use crate::numbering;
use crate::store::DocumentStore;

impl<S: DocumentStore> BillingEngine<S> {
    /// Create a draft invoice, directly or against an existing quote.
    ///
    /// The `FACT-` number is not assigned here: the gapless yearly sequence
    /// is consumed at issue time only, so abandoned drafts leave no hole.
    pub fn create_invoice(
        &self,
        client_id: ClientId,
        quote_id: Option<QuoteId>,
        vat_rate: Decimal,
        per_line_vat: bool,
        due_date: NaiveDate,
    ) -> EngineResult<Invoice> {
        self.store().client(client_id)?;
        if let Some(quote_id) = quote_id {
            self.store().quote(quote_id)?;
        }
        let invoice = Invoice::new(client_id, quote_id, vat_rate, per_line_vat, due_date, Utc::now());
        self.store().put_invoice(invoice.clone())?;
        Ok(invoice)
    }

    pub fn invoice(&self, invoice_id: InvoiceId) -> EngineResult<Invoice> {
        self.store().invoice(invoice_id)
    }

    pub fn add_invoice_line(
        &self,
        invoice_id: InvoiceId,
        description: impl Into<String>,
        quantity: i64,
        unit_price: Decimal,
        vat_rate: Option<Decimal>,
    ) -> EngineResult<Invoice> {
        let persisted = self.store().invoice(invoice_id)?;
        Self::ensure_invoice_lines_mutable(&persisted)?;
        if quantity <= 0 {
            return Err(EngineError::validation("invoice line quantity must be positive"));
        }

        let mut proposed = persisted.clone();
        proposed
            .lines
            .push(InvoiceLine::new(description, quantity, unit_price, vat_rate));
        proposed.recompute_totals();
        proposed.modified_at = Utc::now();
        self.write_invoice(&persisted, proposed)
    }

    pub fn update_invoice_line(
        &self,
        invoice_id: InvoiceId,
        line_id: InvoiceLineId,
        description: impl Into<String>,
        quantity: i64,
        unit_price: Decimal,
        vat_rate: Option<Decimal>,
    ) -> EngineResult<Invoice> {
        let persisted = self.store().invoice(invoice_id)?;
        Self::ensure_invoice_lines_mutable(&persisted)?;
        if quantity <= 0 {
            return Err(EngineError::validation("invoice line quantity must be positive"));
        }

        let mut proposed = persisted.clone();
        let line = proposed
            .lines
            .iter_mut()
            .find(|l| l.id == line_id)
            .ok_or_else(|| EngineError::not_found(format!("invoice line {line_id}")))?;
        line.description = description.into();
        line.quantity = quantity;
        line.unit_price = unit_price;
        line.vat_rate = vat_rate;
        line.recompute_total();

        proposed.recompute_totals();
        proposed.modified_at = Utc::now();
        self.write_invoice(&persisted, proposed)
    }

    pub fn remove_invoice_line(
        &self,
        invoice_id: InvoiceId,
        line_id: InvoiceLineId,
    ) -> EngineResult<Invoice> {
        let persisted = self.store().invoice(invoice_id)?;
        Self::ensure_invoice_lines_mutable(&persisted)?;

        let mut proposed = persisted.clone();
        let before = proposed.lines.len();
        proposed.lines.retain(|l| l.id != line_id);
        if proposed.lines.len() == before {
            return Err(EngineError::not_found(format!("invoice line {line_id}")));
        }
        proposed.recompute_totals();
        proposed.modified_at = Utc::now();
        self.write_invoice(&persisted, proposed)
    }

    /// Guarded write of caller-edited invoice fields.
    pub fn update_invoice(&self, mut proposed: Invoice) -> EngineResult<Invoice> {
        let persisted = self.store().invoice(proposed.id)?;
        proposed.recompute_totals();
        proposed.modified_at = Utc::now();
        self.write_invoice(&persisted, proposed)
    }

    /// Issue a draft invoice: assign the next gapless `FACT-` number for the
    /// year and lock the document.
    pub fn issue_invoice(&self, invoice_id: InvoiceId) -> EngineResult<Invoice> {
        let persisted = self.store().invoice(invoice_id)?;
        persisted.validate_can_be_issued()?;

        let prefix = numbering::invoice_prefix(Utc::now().year());
        let invoice = self.with_numbering_retry(|| {
            let existing = self.store().invoices()?;
            let seq = numbering::next_seq(
                existing.iter().filter_map(|i| i.number.as_deref()),
                &prefix,
            );

            let mut proposed = persisted.clone();
            proposed.number = Some(numbering::format_number(&prefix, seq));
            proposed.status = InvoiceStatus::Issued;
            proposed.issued_at = Some(Utc::now());
            proposed.modified_at = Utc::now();
            self.write_invoice(&persisted, proposed)
        })?;

        tracing::info!(invoice = %invoice.id, number = ?invoice.number, "invoice issued");
        self.publish(
            DocumentKind::Invoice,
            invoice.id,
            invoice.number.clone(),
            BillingEventKind::InvoiceIssued,
        );
        Ok(invoice)
    }

    /// Record a dispatch to the client. A first send transitions
    /// `Issued -> Sent`; re-sends only bump the delivery tracking.
    pub fn send_invoice(
        &self,
        invoice_id: InvoiceId,
        channel: DeliveryChannel,
    ) -> EngineResult<Invoice> {
        let persisted = self.store().invoice(invoice_id)?;
        let mut proposed = persisted.clone();
        if persisted.status != InvoiceStatus::Sent {
            proposed.status = InvoiceStatus::Sent;
            proposed.sent_at = Some(Utc::now());
        }
        proposed.sent_count += 1;
        proposed.delivery_channel = Some(channel);
        proposed.modified_at = Utc::now();
        let invoice = self.write_invoice(&persisted, proposed)?;

        self.publish(
            DocumentKind::Invoice,
            invoice.id,
            invoice.number.clone(),
            BillingEventKind::InvoiceSent,
        );
        Ok(invoice)
    }

    pub fn mark_invoice_paid(&self, invoice_id: InvoiceId) -> EngineResult<Invoice> {
        let persisted = self.store().invoice(invoice_id)?;
        let mut proposed = persisted.clone();
        proposed.status = InvoiceStatus::Paid;
        proposed.paid_at = Some(Utc::now());
        proposed.modified_at = Utc::now();
        let invoice = self.write_invoice(&persisted, proposed)?;

        tracing::info!(invoice = %invoice.id, number = ?invoice.number, "invoice paid");
        self.publish(
            DocumentKind::Invoice,
            invoice.id,
            invoice.number.clone(),
            BillingEventKind::InvoicePaid,
        );
        Ok(invoice)
    }

    /// Entry point for the payment collaborator: record a received payment
    /// and mark the invoice paid once cumulative receipts cover the
    /// outstanding amount (within one cent).
    pub fn mark_paid_by_external_payment(
        &self,
        invoice_id: InvoiceId,
        amount: Decimal,
    ) -> EngineResult<(Payment, Invoice)> {
        let invoice = self.store().invoice(invoice_id)?;
        if !invoice.status.is_emitted() || invoice.status == InvoiceStatus::Cancelled {
            return Err(EngineError::validation(
                "payments can only target an emitted, uncancelled invoice",
            ));
        }

        let payment = Payment::received(invoice_id, amount, Utc::now());
        self.store().put_payment(payment.clone())?;

        let received: Decimal = self
            .store()
            .payments_for_invoice(invoice_id)?
            .iter()
            .filter(|p| p.status == PaymentStatus::Received)
            .map(|p| p.amount)
            .sum();

        let invoice = if invoice.status != InvoiceStatus::Paid
            && received + MONEY_TOLERANCE >= invoice.outstanding_amount()
        {
            self.mark_invoice_paid(invoice_id)?
        } else {
            invoice
        };
        Ok((payment, invoice))
    }

    /// Entry point for the payment collaborator: a payment bounced.
    pub fn handle_payment_failure(
        &self,
        payment_id: PaymentId,
        reason: impl Into<String>,
    ) -> EngineResult<Payment> {
        let mut payment = self.store().payment(payment_id)?;
        payment.status = PaymentStatus::Failed;
        payment.failure_reason = Some(reason.into());
        self.store().put_payment(payment.clone())?;

        tracing::warn!(payment = %payment.id, invoice = %payment.invoice_id, "payment failed");
        self.publish(
            DocumentKind::Payment,
            payment.id,
            None,
            BillingEventKind::PaymentFailed,
        );
        Ok(payment)
    }

    /// Write-back from the electronic-transmission (PDP) collaborator.
    /// All four PDP fields are whitelisted on a locked invoice.
    pub fn record_pdp_transmission(
        &self,
        invoice_id: InvoiceId,
        status: PdpStatus,
        provider: impl Into<String>,
        response: Option<String>,
    ) -> EngineResult<Invoice> {
        let persisted = self.store().invoice(invoice_id)?;
        if !persisted.status.is_emitted() {
            return Err(EngineError::validation(
                "only an emitted invoice can be transmitted",
            ));
        }

        let mut proposed = persisted.clone();
        proposed.pdp_status = Some(status);
        proposed.pdp_provider = Some(provider.into());
        proposed.pdp_transmission_date = Some(Utc::now());
        proposed.pdp_response = response;
        proposed.modified_at = Utc::now();
        self.write_invoice(&persisted, proposed)
    }

    /// Write-back from the PDF collaborator. Both fields are whitelisted.
    pub fn attach_invoice_pdf(
        &self,
        invoice_id: InvoiceId,
        filename: impl Into<String>,
        hash: impl Into<String>,
    ) -> EngineResult<Invoice> {
        let persisted = self.store().invoice(invoice_id)?;
        let mut proposed = persisted.clone();
        proposed.pdf_filename = Some(filename.into());
        proposed.pdf_hash = Some(hash.into());
        proposed.modified_at = Utc::now();
        self.write_invoice(&persisted, proposed)
    }

    /// The invoice's displayed "corrected total": base totals plus every
    /// issued credit note. Derived on read, never persisted.
    pub fn invoice_corrected_total(&self, invoice_id: InvoiceId) -> EngineResult<DocumentTotals> {
        let invoice = self.store().invoice(invoice_id)?;
        let mut excl = invoice.amount_excl_tax;
        let mut tax = invoice.amount_of_tax;
        for note in self.store().credit_notes_for_invoice(invoice_id)? {
            if note.status.is_emitted() {
                excl += note.amount_excl_tax;
                tax += note.amount_of_tax;
            }
        }
        Ok(DocumentTotals {
            excl_tax: excl,
            tax,
            incl_tax: excl + tax,
        })
    }

    pub(crate) fn write_invoice(
        &self,
        persisted: &Invoice,
        proposed: Invoice,
    ) -> EngineResult<Invoice> {
        guard_write(persisted, &proposed)?;
        self.store().put_invoice(proposed.clone())?;
        Ok(proposed)
    }

    /// Line-level lock check, independent of the field-diff guard.
    fn ensure_invoice_lines_mutable(invoice: &Invoice) -> EngineResult<()> {
        if invoice.is_locked() {
            return Err(EngineError::immutable(
                DocumentKind::Invoice,
                invoice.number.as_deref(),
                vec!["lines".to_string()],
            ));
        }
        Ok(())
    }
}
