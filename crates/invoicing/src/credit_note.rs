use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use devisio_calc::{CorrectionFigures, CorrectionInput, TaxableLine, compute_totals};
use devisio_core::{
    AmendmentId, CreditNoteId, CreditNoteLineId, DocumentKind, EngineError, EngineResult,
    GuardedDocument, InvoiceId, InvoiceLineId,
};

/// Credit note status lifecycle. Locked from `Issued` onwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditNoteStatus {
    Draft,
    Issued,
    Sent,
    Refunded,
}

impl CreditNoteStatus {
    pub fn is_emitted(self) -> bool {
        !matches!(self, CreditNoteStatus::Draft)
    }
}

impl core::fmt::Display for CreditNoteStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            CreditNoteStatus::Draft => "draft",
            CreditNoteStatus::Issued => "issued",
            CreditNoteStatus::Sent => "sent",
            CreditNoteStatus::Refunded => "refunded",
        };
        f.write_str(label)
    }
}

/// A correction line on a credit note.
///
/// Same delta semantics as an amendment line, but the source is a line on
/// the corrected invoice, and the resulting delta/new value are forced
/// non-positive: a credit note only ever credits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditNoteLine {
    pub id: CreditNoteLineId,
    pub description: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub source_line: Option<InvoiceLineId>,
    pub old_value: Decimal,
    pub new_value: Decimal,
    pub delta: Decimal,
    pub vat_rate: Option<Decimal>,
    pub total_excl_tax: Decimal,
}

impl CreditNoteLine {
    pub fn new(
        description: impl Into<String>,
        quantity: i64,
        unit_price: Decimal,
        vat_rate: Option<Decimal>,
        source_line: Option<InvoiceLineId>,
    ) -> Self {
        Self {
            id: CreditNoteLineId::new(),
            description: description.into(),
            quantity,
            unit_price,
            source_line,
            old_value: Decimal::ZERO,
            new_value: Decimal::ZERO,
            delta: Decimal::ZERO,
            vat_rate,
            total_excl_tax: Decimal::ZERO,
        }
    }

    pub fn correction_input(&self) -> CorrectionInput {
        CorrectionInput {
            quantity: Some(self.quantity),
            unit_price: Some(self.unit_price),
            old_value: self.old_value,
            total_excl_tax: self.total_excl_tax,
        }
    }

    pub fn apply_figures(&mut self, figures: CorrectionFigures) {
        self.old_value = figures.old_value;
        self.new_value = figures.new_value;
        self.delta = figures.delta;
        self.total_excl_tax = figures.total_excl_tax;
    }
}

impl TaxableLine for CreditNoteLine {
    fn total_excl_tax(&self) -> Decimal {
        self.total_excl_tax
    }

    fn vat_rate(&self) -> Option<Decimal> {
        self.vat_rate
    }
}

/// Mutable fields of a credit note, for guard diffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditNoteField {
    Number,
    Invoice,
    Status,
    Reason,
    Amendment,
    VatRate,
    PerLineVat,
    IssuedAt,
    Lines,
    Totals,
    ModifiedAt,
}

impl core::fmt::Display for CreditNoteField {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            CreditNoteField::Number => "number",
            CreditNoteField::Invoice => "invoice",
            CreditNoteField::Status => "status",
            CreditNoteField::Reason => "reason",
            CreditNoteField::Amendment => "amendment",
            CreditNoteField::VatRate => "vat_rate",
            CreditNoteField::PerLineVat => "per_line_vat",
            CreditNoteField::IssuedAt => "issued_at",
            CreditNoteField::Lines => "lines",
            CreditNoteField::Totals => "totals",
            CreditNoteField::ModifiedAt => "modified_at",
        };
        f.write_str(label)
    }
}

/// A credit note (avoir): a negative correction against an emitted invoice.
///
/// Amounts are stored negative; when the issued credit notes of an invoice
/// offset its full value, the invoice is cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditNote {
    pub id: CreditNoteId,
    /// `AV-{year}-{seq}`, assigned when the credit note is issued.
    pub number: Option<String>,
    pub invoice_id: InvoiceId,
    pub status: CreditNoteStatus,
    /// Why the invoice is being corrected. Mandatory.
    pub reason: String,
    /// Amendment whose signature caused this credit note, if any.
    pub amendment_id: Option<AmendmentId>,
    pub vat_rate: Decimal,
    pub per_line_vat: bool,
    pub amount_excl_tax: Decimal,
    pub amount_of_tax: Decimal,
    pub amount_incl_tax: Decimal,
    pub issued_at: Option<DateTime<Utc>>,
    pub lines: Vec<CreditNoteLine>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl CreditNote {
    pub fn new(
        invoice_id: InvoiceId,
        reason: impl Into<String>,
        vat_rate: Decimal,
        per_line_vat: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<Self> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(EngineError::validation("credit note reason must not be empty"));
        }
        Ok(Self {
            id: CreditNoteId::new(),
            number: None,
            invoice_id,
            status: CreditNoteStatus::Draft,
            reason,
            amendment_id: None,
            vat_rate,
            per_line_vat,
            amount_excl_tax: Decimal::ZERO,
            amount_of_tax: Decimal::ZERO,
            amount_incl_tax: Decimal::ZERO,
            issued_at: None,
            lines: Vec::new(),
            created_at: now,
            modified_at: now,
        })
    }

    /// Recompute totals from the lines. Lines are non-positive, so the
    /// resulting amounts are too.
    pub fn recompute_totals(&mut self) {
        let totals = compute_totals(&self.lines, self.vat_rate, self.per_line_vat);
        self.amount_excl_tax = totals.excl_tax;
        self.amount_of_tax = totals.tax;
        self.amount_incl_tax = totals.incl_tax;
    }

    pub fn validate_can_be_issued(&self) -> EngineResult<()> {
        if self.lines.is_empty() {
            return Err(EngineError::validation("credit note has no lines"));
        }
        Ok(())
    }
}

impl GuardedDocument for CreditNote {
    type Status = CreditNoteStatus;
    type Field = CreditNoteField;

    fn kind() -> DocumentKind {
        DocumentKind::CreditNote
    }

    fn number(&self) -> Option<&str> {
        self.number.as_deref()
    }

    fn status(&self) -> CreditNoteStatus {
        self.status
    }

    fn is_locked(&self) -> bool {
        self.status.is_emitted()
    }

    fn whitelist() -> &'static [CreditNoteField] {
        &[
            CreditNoteField::Status,
            CreditNoteField::IssuedAt,
            CreditNoteField::ModifiedAt,
        ]
    }

    fn changed_fields(persisted: &Self, proposed: &Self) -> Vec<CreditNoteField> {
        let mut changed = Vec::new();
        if persisted.number != proposed.number {
            changed.push(CreditNoteField::Number);
        }
        if persisted.invoice_id != proposed.invoice_id {
            changed.push(CreditNoteField::Invoice);
        }
        if persisted.status != proposed.status {
            changed.push(CreditNoteField::Status);
        }
        if persisted.reason != proposed.reason {
            changed.push(CreditNoteField::Reason);
        }
        if persisted.amendment_id != proposed.amendment_id {
            changed.push(CreditNoteField::Amendment);
        }
        if persisted.vat_rate != proposed.vat_rate {
            changed.push(CreditNoteField::VatRate);
        }
        if persisted.per_line_vat != proposed.per_line_vat {
            changed.push(CreditNoteField::PerLineVat);
        }
        if persisted.issued_at != proposed.issued_at {
            changed.push(CreditNoteField::IssuedAt);
        }
        if persisted.lines != proposed.lines {
            changed.push(CreditNoteField::Lines);
        }
        if persisted.amount_excl_tax != proposed.amount_excl_tax
            || persisted.amount_of_tax != proposed.amount_of_tax
            || persisted.amount_incl_tax != proposed.amount_incl_tax
        {
            changed.push(CreditNoteField::Totals);
        }
        if persisted.modified_at != proposed.modified_at {
            changed.push(CreditNoteField::ModifiedAt);
        }
        changed
    }

    fn transition_allowed(from: CreditNoteStatus, to: CreditNoteStatus) -> bool {
        use CreditNoteStatus::*;
        matches!(
            (from, to),
            (Draft, Issued) | (Issued, Sent) | (Issued, Refunded) | (Sent, Refunded)
        )
    }
}
