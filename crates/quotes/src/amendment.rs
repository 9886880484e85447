use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use devisio_calc::{CorrectionFigures, CorrectionInput, TaxableLine, compute_totals};
use devisio_core::{
    AmendmentId, AmendmentLineId, DocumentKind, EngineError, EngineResult, GuardedDocument,
    QuoteId, QuoteLineId,
};

/// Amendment status lifecycle. `Signed` is terminal and locks the rider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmendmentStatus {
    Draft,
    Sent,
    Signed,
    Cancelled,
}

impl core::fmt::Display for AmendmentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            AmendmentStatus::Draft => "draft",
            AmendmentStatus::Sent => "sent",
            AmendmentStatus::Signed => "signed",
            AmendmentStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// A correction line on an amendment.
///
/// When `source_line` references a line on the parent quote, `total_excl_tax`
/// stores the **delta** against that line, not the new absolute total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmendmentLine {
    pub id: AmendmentLineId,
    pub description: String,
    pub quantity: i64,
    /// Interpreted as an adjustment amount when `source_line` is set.
    pub unit_price: Decimal,
    pub source_line: Option<QuoteLineId>,
    /// Source line's total at capture time; never recomputed afterwards.
    pub old_value: Decimal,
    pub new_value: Decimal,
    pub delta: Decimal,
    pub vat_rate: Option<Decimal>,
    pub total_excl_tax: Decimal,
}

impl AmendmentLine {
    pub fn new(
        description: impl Into<String>,
        quantity: i64,
        unit_price: Decimal,
        vat_rate: Option<Decimal>,
        source_line: Option<QuoteLineId>,
    ) -> Self {
        Self {
            id: AmendmentLineId::new(),
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

impl TaxableLine for AmendmentLine {
    fn total_excl_tax(&self) -> Decimal {
        self.total_excl_tax
    }

    fn vat_rate(&self) -> Option<Decimal> {
        self.vat_rate
    }
}

/// Mutable fields of an amendment, for guard diffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmendmentField {
    Number,
    Quote,
    Status,
    Motive,
    VatRate,
    PerLineVat,
    SignedAt,
    ClientSignature,
    PdfFilename,
    PdfHash,
    Lines,
    Totals,
    ModifiedAt,
}

impl core::fmt::Display for AmendmentField {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            AmendmentField::Number => "number",
            AmendmentField::Quote => "quote",
            AmendmentField::Status => "status",
            AmendmentField::Motive => "motive",
            AmendmentField::VatRate => "vat_rate",
            AmendmentField::PerLineVat => "per_line_vat",
            AmendmentField::SignedAt => "signed_at",
            AmendmentField::ClientSignature => "client_signature",
            AmendmentField::PdfFilename => "pdf_filename",
            AmendmentField::PdfHash => "pdf_hash",
            AmendmentField::Lines => "lines",
            AmendmentField::Totals => "totals",
            AmendmentField::ModifiedAt => "modified_at",
        };
        f.write_str(label)
    }
}

/// An amendment (avenant): a rider correcting an already-signed quote.
///
/// The number is derived from the parent quote's number
/// (`{quoteYear}-{quoteSeq}-A{n}`) and stays `None` while the parent is
/// unnumbered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amendment {
    pub id: AmendmentId,
    pub number: Option<String>,
    pub quote_id: QuoteId,
    pub status: AmendmentStatus,
    /// Why the signed quote is being corrected. Mandatory.
    pub motive: String,
    pub vat_rate: Decimal,
    pub per_line_vat: bool,
    pub signed_at: Option<DateTime<Utc>>,
    pub client_signature: Option<String>,
    pub pdf_filename: Option<String>,
    pub pdf_hash: Option<String>,
    pub amount_excl_tax: Decimal,
    pub amount_of_tax: Decimal,
    pub amount_incl_tax: Decimal,
    pub lines: Vec<AmendmentLine>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Amendment {
    pub fn new(
        quote_id: QuoteId,
        motive: impl Into<String>,
        vat_rate: Decimal,
        per_line_vat: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<Self> {
        let motive = motive.into();
        if motive.trim().is_empty() {
            return Err(EngineError::validation("amendment motive must not be empty"));
        }
        Ok(Self {
            id: AmendmentId::new(),
            number: None,
            quote_id,
            status: AmendmentStatus::Draft,
            motive,
            vat_rate,
            per_line_vat,
            signed_at: None,
            client_signature: None,
            pdf_filename: None,
            pdf_hash: None,
            amount_excl_tax: Decimal::ZERO,
            amount_of_tax: Decimal::ZERO,
            amount_incl_tax: Decimal::ZERO,
            lines: Vec::new(),
            created_at: now,
            modified_at: now,
        })
    }

    /// Recompute totals from the lines. Since sourced lines store deltas,
    /// the resulting amounts are the net correction and may be negative.
    pub fn recompute_totals(&mut self) {
        let totals = compute_totals(&self.lines, self.vat_rate, self.per_line_vat);
        self.amount_excl_tax = totals.excl_tax;
        self.amount_of_tax = totals.tax;
        self.amount_incl_tax = totals.incl_tax;
    }

    pub fn validate_can_be_signed(&self) -> EngineResult<()> {
        if self.signed_at.is_some() {
            return Err(EngineError::signing_precondition(
                DocumentKind::Amendment,
                "amendment is already signed",
            ));
        }
        if self.lines.is_empty() {
            return Err(EngineError::signing_precondition(
                DocumentKind::Amendment,
                "amendment has no lines",
            ));
        }
        Ok(())
    }
}

impl GuardedDocument for Amendment {
    type Status = AmendmentStatus;
    type Field = AmendmentField;

    fn kind() -> DocumentKind {
        DocumentKind::Amendment
    }

    fn number(&self) -> Option<&str> {
        self.number.as_deref()
    }

    fn status(&self) -> AmendmentStatus {
        self.status
    }

    fn is_locked(&self) -> bool {
        self.status == AmendmentStatus::Signed
    }

    fn whitelist() -> &'static [AmendmentField] {
        &[
            AmendmentField::Status,
            AmendmentField::SignedAt,
            AmendmentField::ClientSignature,
            AmendmentField::ModifiedAt,
            AmendmentField::PdfFilename,
            AmendmentField::PdfHash,
        ]
    }

    fn changed_fields(persisted: &Self, proposed: &Self) -> Vec<AmendmentField> {
        let mut changed = Vec::new();
        if persisted.number != proposed.number {
            changed.push(AmendmentField::Number);
        }
        if persisted.quote_id != proposed.quote_id {
            changed.push(AmendmentField::Quote);
        }
        if persisted.status != proposed.status {
            changed.push(AmendmentField::Status);
        }
        if persisted.motive != proposed.motive {
            changed.push(AmendmentField::Motive);
        }
        if persisted.vat_rate != proposed.vat_rate {
            changed.push(AmendmentField::VatRate);
        }
        if persisted.per_line_vat != proposed.per_line_vat {
            changed.push(AmendmentField::PerLineVat);
        }
        if persisted.signed_at != proposed.signed_at {
            changed.push(AmendmentField::SignedAt);
        }
        if persisted.client_signature != proposed.client_signature {
            changed.push(AmendmentField::ClientSignature);
        }
        if persisted.pdf_filename != proposed.pdf_filename {
            changed.push(AmendmentField::PdfFilename);
        }
        if persisted.pdf_hash != proposed.pdf_hash {
            changed.push(AmendmentField::PdfHash);
        }
        if persisted.lines != proposed.lines {
            changed.push(AmendmentField::Lines);
        }
        if persisted.amount_excl_tax != proposed.amount_excl_tax
            || persisted.amount_of_tax != proposed.amount_of_tax
            || persisted.amount_incl_tax != proposed.amount_incl_tax
        {
            changed.push(AmendmentField::Totals);
        }
        if persisted.modified_at != proposed.modified_at {
            changed.push(AmendmentField::ModifiedAt);
        }
        changed
    }

    fn transition_allowed(from: AmendmentStatus, to: AmendmentStatus) -> bool {
        use AmendmentStatus::*;
        matches!(
            (from, to),
            (Draft, Sent) | (Draft, Cancelled) | (Sent, Signed) | (Sent, Cancelled)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devisio_calc::{CorrectionPolarity, apply_delta};
    use devisio_core::guard_write;
    use rust_decimal_macros::dec;

    fn amendment() -> Amendment {
        Amendment::new(QuoteId::new(), "Périmètre réduit", dec!(20), false, Utc::now()).unwrap()
    }

    #[test]
    fn empty_motive_is_rejected() {
        assert!(Amendment::new(QuoteId::new(), "   ", dec!(20), false, Utc::now()).is_err());
    }

    #[test]
    fn totals_aggregate_deltas() {
        let mut amendment = amendment();

        let mut corrected = AmendmentLine::new("Lot 1 revu", 1, dec!(-200.00), None, Some(QuoteLineId::new()));
        corrected.apply_figures(apply_delta(
            &corrected.correction_input(),
            Some(dec!(1000.00)),
            CorrectionPolarity::Amendment,
        ));
        let mut added = AmendmentLine::new("Lot 3 ajouté", 1, dec!(500.00), None, None);
        added.apply_figures(apply_delta(
            &added.correction_input(),
            None,
            CorrectionPolarity::Amendment,
        ));

        amendment.lines = vec![corrected, added];
        amendment.recompute_totals();
        assert_eq!(amendment.amount_excl_tax, dec!(300.00));
        assert_eq!(amendment.amount_incl_tax, dec!(360.00));
    }

    #[test]
    fn signed_amendment_accepts_pdf_backfill_only() {
        let mut signed = amendment();
        signed.lines.push(AmendmentLine::new("Lot", 1, dec!(10), None, None));
        signed.status = AmendmentStatus::Signed;

        let mut pdf = signed.clone();
        pdf.pdf_filename = Some("AV-1.pdf".into());
        pdf.pdf_hash = Some("sha256:abcd".into());
        assert!(guard_write(&signed, &pdf).is_ok());

        let mut retouched = signed.clone();
        retouched.motive = "Autre motif".into();
        assert!(matches!(
            guard_write(&signed, &retouched),
            Err(EngineError::ImmutableDocument { .. })
        ));
    }

    #[test]
    fn cancelled_is_reachable_from_draft_and_sent_only() {
        use AmendmentStatus::*;
        assert!(Amendment::transition_allowed(Draft, Cancelled));
        assert!(Amendment::transition_allowed(Sent, Cancelled));
        assert!(!Amendment::transition_allowed(Signed, Cancelled));
        assert!(!Amendment::transition_allowed(Draft, Signed));
    }
}
