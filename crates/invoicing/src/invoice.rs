use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use devisio_calc::{TaxableLine, compute_totals};
use devisio_core::{
    AmendmentId, ClientId, DocumentKind, EngineError, EngineResult, GuardedDocument, InvoiceId,
    InvoiceLineId, QuoteId,
};

/// Invoice status lifecycle.
///
/// An invoice is locked from `Issued` onwards; `Cancelled` is only reachable
/// through fully-offsetting credit notes, never by editing the invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Issued,
    Sent,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn is_emitted(self) -> bool {
        !matches!(self, InvoiceStatus::Draft)
    }
}

impl core::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Issued => "issued",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Electronic-transmission status reported back by the PDP collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdpStatus {
    Pending,
    Transmitted,
    Accepted,
    Rejected,
}

/// How the invoice was delivered to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryChannel {
    Email,
    Post,
    Pdp,
}

/// A line on an invoice. Always holds absolute values, never deltas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub id: InvoiceLineId,
    pub description: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub vat_rate: Option<Decimal>,
    pub total_excl_tax: Decimal,
}

impl InvoiceLine {
    pub fn new(
        description: impl Into<String>,
        quantity: i64,
        unit_price: Decimal,
        vat_rate: Option<Decimal>,
    ) -> Self {
        Self {
            id: InvoiceLineId::new(),
            description: description.into(),
            quantity,
            unit_price,
            vat_rate,
            total_excl_tax: Decimal::from(quantity) * unit_price,
        }
    }

    pub fn recompute_total(&mut self) {
        self.total_excl_tax = Decimal::from(self.quantity) * self.unit_price;
    }
}

impl TaxableLine for InvoiceLine {
    fn total_excl_tax(&self) -> Decimal {
        self.total_excl_tax
    }

    fn vat_rate(&self) -> Option<Decimal> {
        self.vat_rate
    }
}

/// Mutable fields of an invoice, for guard diffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceField {
    Number,
    Quote,
    Client,
    Status,
    DueDate,
    VatRate,
    PerLineVat,
    DepositPaid,
    PaymentTerms,
    LatePenaltyRate,
    PdpStatus,
    PdpProvider,
    PdpTransmissionDate,
    PdpResponse,
    PdfFilename,
    PdfHash,
    SentCount,
    DeliveryChannel,
    IssuedAt,
    SentAt,
    PaidAt,
    Lines,
    Totals,
    ModifiedAt,
}

impl core::fmt::Display for InvoiceField {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            InvoiceField::Number => "number",
            InvoiceField::Quote => "quote",
            InvoiceField::Client => "client",
            InvoiceField::Status => "status",
            InvoiceField::DueDate => "due_date",
            InvoiceField::VatRate => "vat_rate",
            InvoiceField::PerLineVat => "per_line_vat",
            InvoiceField::DepositPaid => "deposit_paid",
            InvoiceField::PaymentTerms => "payment_terms",
            InvoiceField::LatePenaltyRate => "late_penalty_rate",
            InvoiceField::PdpStatus => "pdp_status",
            InvoiceField::PdpProvider => "pdp_provider",
            InvoiceField::PdpTransmissionDate => "pdp_transmission_date",
            InvoiceField::PdpResponse => "pdp_response",
            InvoiceField::PdfFilename => "pdf_filename",
            InvoiceField::PdfHash => "pdf_hash",
            InvoiceField::SentCount => "sent_count",
            InvoiceField::DeliveryChannel => "delivery_channel",
            InvoiceField::IssuedAt => "issued_at",
            InvoiceField::SentAt => "sent_at",
            InvoiceField::PaidAt => "paid_at",
            InvoiceField::Lines => "lines",
            InvoiceField::Totals => "totals",
            InvoiceField::ModifiedAt => "modified_at",
        };
        f.write_str(label)
    }
}

/// An invoice (facture): a binding payment demand, immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    /// `FACT-{year}-{seq}`, assigned when the invoice is issued. The sequence
    /// is gapless per year; cancellation changes status, never the number.
    pub number: Option<String>,
    /// Originating quote, if the invoice was billed from one.
    pub quote_id: Option<QuoteId>,
    /// Originating amendment, for complementary invoices.
    pub amendment_id: Option<AmendmentId>,
    pub client_id: ClientId,
    pub status: InvoiceStatus,
    pub due_date: NaiveDate,
    pub vat_rate: Decimal,
    pub per_line_vat: bool,
    pub amount_excl_tax: Decimal,
    pub amount_of_tax: Decimal,
    pub amount_incl_tax: Decimal,
    /// Deposit amount already collected on the originating quote, deducted
    /// from what payments must cover.
    pub deposit_paid: Decimal,
    pub payment_terms: Option<String>,
    pub late_penalty_rate: Option<Decimal>,
    pub pdp_status: Option<PdpStatus>,
    pub pdp_provider: Option<String>,
    pub pdp_transmission_date: Option<DateTime<Utc>>,
    pub pdp_response: Option<String>,
    pub pdf_filename: Option<String>,
    pub pdf_hash: Option<String>,
    pub sent_count: u32,
    pub delivery_channel: Option<DeliveryChannel>,
    pub issued_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub lines: Vec<InvoiceLine>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Invoice {
    pub fn new(
        client_id: ClientId,
        quote_id: Option<QuoteId>,
        vat_rate: Decimal,
        per_line_vat: bool,
        due_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: InvoiceId::new(),
            number: None,
            quote_id,
            amendment_id: None,
            client_id,
            status: InvoiceStatus::Draft,
            due_date,
            vat_rate,
            per_line_vat,
            amount_excl_tax: Decimal::ZERO,
            amount_of_tax: Decimal::ZERO,
            amount_incl_tax: Decimal::ZERO,
            deposit_paid: Decimal::ZERO,
            payment_terms: None,
            late_penalty_rate: None,
            pdp_status: None,
            pdp_provider: None,
            pdp_transmission_date: None,
            pdp_response: None,
            pdf_filename: None,
            pdf_hash: None,
            sent_count: 0,
            delivery_channel: None,
            issued_at: None,
            sent_at: None,
            paid_at: None,
            lines: Vec::new(),
            created_at: now,
            modified_at: now,
        }
    }

    pub fn recompute_totals(&mut self) {
        let totals = compute_totals(&self.lines, self.vat_rate, self.per_line_vat);
        self.amount_excl_tax = totals.excl_tax;
        self.amount_of_tax = totals.tax;
        self.amount_incl_tax = totals.incl_tax;
    }

    pub fn line(&self, line_id: InvoiceLineId) -> Option<&InvoiceLine> {
        self.lines.iter().find(|l| l.id == line_id)
    }

    /// What payments still have to cover, net of the deposit already paid.
    pub fn outstanding_amount(&self) -> Decimal {
        self.amount_incl_tax - self.deposit_paid
    }

    /// Precondition for the `Draft -> Issued` transition.
    pub fn validate_can_be_issued(&self) -> EngineResult<()> {
        if self.lines.is_empty() {
            return Err(EngineError::validation("invoice has no lines"));
        }
        Ok(())
    }
}

impl GuardedDocument for Invoice {
    type Status = InvoiceStatus;
    type Field = InvoiceField;

    fn kind() -> DocumentKind {
        DocumentKind::Invoice
    }

    fn number(&self) -> Option<&str> {
        self.number.as_deref()
    }

    fn status(&self) -> InvoiceStatus {
        self.status
    }

    fn is_locked(&self) -> bool {
        self.status.is_emitted()
    }

    fn whitelist() -> &'static [InvoiceField] {
        &[
            InvoiceField::Status,
            InvoiceField::PaidAt,
            InvoiceField::SentAt,
            InvoiceField::ModifiedAt,
            InvoiceField::PdpStatus,
            InvoiceField::PdpProvider,
            InvoiceField::PdpTransmissionDate,
            InvoiceField::PdpResponse,
            InvoiceField::PdfFilename,
            InvoiceField::PdfHash,
            InvoiceField::SentCount,
            InvoiceField::DeliveryChannel,
        ]
    }

    fn changed_fields(persisted: &Self, proposed: &Self) -> Vec<InvoiceField> {
        let mut changed = Vec::new();
        if persisted.number != proposed.number {
            changed.push(InvoiceField::Number);
        }
        if persisted.quote_id != proposed.quote_id
            || persisted.amendment_id != proposed.amendment_id
        {
            changed.push(InvoiceField::Quote);
        }
        if persisted.client_id != proposed.client_id {
            changed.push(InvoiceField::Client);
        }
        if persisted.status != proposed.status {
            changed.push(InvoiceField::Status);
        }
        if persisted.due_date != proposed.due_date {
            changed.push(InvoiceField::DueDate);
        }
        if persisted.vat_rate != proposed.vat_rate {
            changed.push(InvoiceField::VatRate);
        }
        if persisted.per_line_vat != proposed.per_line_vat {
            changed.push(InvoiceField::PerLineVat);
        }
        if persisted.deposit_paid != proposed.deposit_paid {
            changed.push(InvoiceField::DepositPaid);
        }
        if persisted.payment_terms != proposed.payment_terms {
            changed.push(InvoiceField::PaymentTerms);
        }
        if persisted.late_penalty_rate != proposed.late_penalty_rate {
            changed.push(InvoiceField::LatePenaltyRate);
        }
        if persisted.pdp_status != proposed.pdp_status {
            changed.push(InvoiceField::PdpStatus);
        }
        if persisted.pdp_provider != proposed.pdp_provider {
            changed.push(InvoiceField::PdpProvider);
        }
        if persisted.pdp_transmission_date != proposed.pdp_transmission_date {
            changed.push(InvoiceField::PdpTransmissionDate);
        }
        if persisted.pdp_response != proposed.pdp_response {
            changed.push(InvoiceField::PdpResponse);
        }
        if persisted.pdf_filename != proposed.pdf_filename {
            changed.push(InvoiceField::PdfFilename);
        }
        if persisted.pdf_hash != proposed.pdf_hash {
            changed.push(InvoiceField::PdfHash);
        }
        if persisted.sent_count != proposed.sent_count {
            changed.push(InvoiceField::SentCount);
        }
        if persisted.delivery_channel != proposed.delivery_channel {
            changed.push(InvoiceField::DeliveryChannel);
        }
        if persisted.issued_at != proposed.issued_at {
            changed.push(InvoiceField::IssuedAt);
        }
        if persisted.sent_at != proposed.sent_at {
            changed.push(InvoiceField::SentAt);
        }
        if persisted.paid_at != proposed.paid_at {
            changed.push(InvoiceField::PaidAt);
        }
        if persisted.lines != proposed.lines {
            changed.push(InvoiceField::Lines);
        }
        if persisted.amount_excl_tax != proposed.amount_excl_tax
            || persisted.amount_of_tax != proposed.amount_of_tax
            || persisted.amount_incl_tax != proposed.amount_incl_tax
        {
            changed.push(InvoiceField::Totals);
        }
        if persisted.modified_at != proposed.modified_at {
            changed.push(InvoiceField::ModifiedAt);
        }
        changed
    }

    fn transition_allowed(from: InvoiceStatus, to: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (from, to),
            (Draft, Issued)
                | (Issued, Sent)
                | (Issued, Paid)
                | (Issued, Cancelled)
                | (Sent, Paid)
                | (Sent, Cancelled)
                | (Paid, Cancelled)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devisio_core::guard_write;
    use rust_decimal_macros::dec;

    fn issued_invoice() -> Invoice {
        let mut invoice = Invoice::new(
            ClientId::new(),
            None,
            dec!(20),
            false,
            NaiveDate::from_ymd_opt(2026, 9, 30).unwrap(),
            Utc::now(),
        );
        invoice.lines.push(InvoiceLine::new("Forfait", 1, dec!(200.00), None));
        invoice.recompute_totals();
        invoice.number = Some("FACT-2026-001".into());
        invoice.status = InvoiceStatus::Issued;
        invoice.issued_at = Some(Utc::now());
        invoice
    }

    #[test]
    fn paid_cannot_go_back_to_sent() {
        assert!(!Invoice::transition_allowed(
            InvoiceStatus::Paid,
            InvoiceStatus::Sent
        ));
        assert!(Invoice::transition_allowed(
            InvoiceStatus::Draft,
            InvoiceStatus::Issued
        ));
    }

    #[test]
    fn issued_invoice_rejects_line_edits() {
        let issued = issued_invoice();
        let mut proposed = issued.clone();
        proposed.lines[0].unit_price = dec!(150.00);
        proposed.lines[0].recompute_total();
        proposed.recompute_totals();

        let err = guard_write(&issued, &proposed).unwrap_err();
        assert!(matches!(err, EngineError::ImmutableDocument { .. }));
    }

    #[test]
    fn issued_invoice_accepts_pdp_writeback() {
        let issued = issued_invoice();
        let mut proposed = issued.clone();
        proposed.pdp_status = Some(PdpStatus::Transmitted);
        proposed.pdp_provider = Some("chorus-pro".into());
        proposed.pdp_transmission_date = Some(Utc::now());
        proposed.pdp_response = Some("OK".into());
        proposed.modified_at = Utc::now();
        assert!(guard_write(&issued, &proposed).is_ok());
    }

    #[test]
    fn illegal_transition_beats_whitelist() {
        // Status alone is whitelisted, but Paid -> Sent is not in the table.
        let mut paid = issued_invoice();
        paid.status = InvoiceStatus::Paid;

        let mut proposed = paid.clone();
        proposed.status = InvoiceStatus::Sent;
        assert!(matches!(
            guard_write(&paid, &proposed),
            Err(EngineError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn outstanding_nets_out_the_deposit() {
        let mut invoice = issued_invoice();
        invoice.deposit_paid = dec!(72.00);
        assert_eq!(invoice.outstanding_amount(), dec!(168.00));
    }
}
