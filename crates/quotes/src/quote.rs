use chrono::{DateTime, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use devisio_calc::{TaxableLine, compute_totals};
use devisio_core::{
    ClientId, DocumentKind, EngineError, EngineResult, GuardedDocument, QuoteId, QuoteLineId,
};

/// Quote status lifecycle.
///
/// `Signed`, `Refused`, `Expired` and `Cancelled` are terminal and lock the
/// quote (a signed quote is a binding contract under French law).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteStatus {
    Draft,
    Sent,
    Signed,
    Refused,
    Expired,
    Cancelled,
}

impl QuoteStatus {
    pub fn is_final(self) -> bool {
        matches!(
            self,
            QuoteStatus::Signed | QuoteStatus::Refused | QuoteStatus::Expired | QuoteStatus::Cancelled
        )
    }
}

impl core::fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            QuoteStatus::Draft => "draft",
            QuoteStatus::Sent => "sent",
            QuoteStatus::Signed => "signed",
            QuoteStatus::Refused => "refused",
            QuoteStatus::Expired => "expired",
            QuoteStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Billing interval of a recurring quote line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceInterval {
    Monthly,
    Quarterly,
    Yearly,
}

impl RecurrenceInterval {
    pub fn advance(self, from: NaiveDate) -> NaiveDate {
        let months = match self {
            RecurrenceInterval::Monthly => 1,
            RecurrenceInterval::Quarterly => 3,
            RecurrenceInterval::Yearly => 12,
        };
        from + Months::new(months)
    }
}

/// Subscription metadata on a quote line.
///
/// `next_renewal` is operational bookkeeping advanced by the renewal sweep;
/// it is not part of the contractual content protected by the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub interval: RecurrenceInterval,
    pub next_renewal: NaiveDate,
    /// Renewed automatically by the payment collaborator when true; picked up
    /// by the manual renewal sweep when false.
    pub auto: bool,
}

/// A line on a quote. Always holds absolute values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteLine {
    pub id: QuoteLineId,
    pub description: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    /// Per-line VAT rate; `None` falls back to the document rate and is not
    /// equivalent to `Some(0)`.
    pub vat_rate: Option<Decimal>,
    pub total_excl_tax: Decimal,
    pub recurrence: Option<Recurrence>,
}

impl QuoteLine {
    pub fn new(
        description: impl Into<String>,
        quantity: i64,
        unit_price: Decimal,
        vat_rate: Option<Decimal>,
    ) -> EngineResult<Self> {
        if quantity <= 0 {
            return Err(EngineError::validation("quote line quantity must be positive"));
        }
        Ok(Self {
            id: QuoteLineId::new(),
            description: description.into(),
            quantity,
            unit_price,
            vat_rate,
            total_excl_tax: Decimal::from(quantity) * unit_price,
            recurrence: None,
        })
    }

    /// Re-derive the stored total after quantity/price edits.
    pub fn recompute_total(&mut self) {
        self.total_excl_tax = Decimal::from(self.quantity) * self.unit_price;
    }

    /// Equality on the contractual content of the line.
    ///
    /// Renewal bookkeeping (`recurrence.next_renewal`) may move on a locked
    /// quote; everything else may not.
    fn same_contractual_content(&self, other: &Self) -> bool {
        self.id == other.id
            && self.description == other.description
            && self.quantity == other.quantity
            && self.unit_price == other.unit_price
            && self.vat_rate == other.vat_rate
            && self.total_excl_tax == other.total_excl_tax
            && self.recurrence.map(|r| (r.interval, r.auto))
                == other.recurrence.map(|r| (r.interval, r.auto))
    }
}

impl TaxableLine for QuoteLine {
    fn total_excl_tax(&self) -> Decimal {
        self.total_excl_tax
    }

    fn vat_rate(&self) -> Option<Decimal> {
        self.vat_rate
    }
}

/// Mutable fields of a quote, for guard diffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteField {
    Number,
    Client,
    Status,
    VatRate,
    PerLineVat,
    DepositPercent,
    ValidUntil,
    SignedAt,
    ClientSignature,
    Notes,
    Lines,
    Totals,
    ModifiedAt,
}

impl core::fmt::Display for QuoteField {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            QuoteField::Number => "number",
            QuoteField::Client => "client",
            QuoteField::Status => "status",
            QuoteField::VatRate => "vat_rate",
            QuoteField::PerLineVat => "per_line_vat",
            QuoteField::DepositPercent => "deposit_percent",
            QuoteField::ValidUntil => "valid_until",
            QuoteField::SignedAt => "signed_at",
            QuoteField::ClientSignature => "client_signature",
            QuoteField::Notes => "notes",
            QuoteField::Lines => "lines",
            QuoteField::Totals => "totals",
            QuoteField::ModifiedAt => "modified_at",
        };
        f.write_str(label)
    }
}

/// A quote (devis): a pre-contract proposal, binding once signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    /// `DEV-{year}-{month}-{seq}`, assigned at creation, never changed after.
    pub number: Option<String>,
    pub client_id: ClientId,
    pub status: QuoteStatus,
    /// Document-level VAT rate, applied to lines without their own rate.
    pub vat_rate: Decimal,
    /// When true, lines carrying their own rate are taxed at that rate.
    pub per_line_vat: bool,
    /// Percentage of the total requested as a deposit on signature; 0 bills
    /// the full amount immediately.
    pub deposit_percent: Decimal,
    pub valid_until: NaiveDate,
    pub signed_at: Option<DateTime<Utc>>,
    pub client_signature: Option<String>,
    pub notes: Option<String>,
    pub amount_excl_tax: Decimal,
    pub amount_of_tax: Decimal,
    pub amount_incl_tax: Decimal,
    pub lines: Vec<QuoteLine>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(
        client_id: ClientId,
        vat_rate: Decimal,
        per_line_vat: bool,
        deposit_percent: Decimal,
        valid_until: NaiveDate,
        now: DateTime<Utc>,
    ) -> EngineResult<Self> {
        if deposit_percent < Decimal::ZERO || deposit_percent > Decimal::ONE_HUNDRED {
            return Err(EngineError::validation(
                "deposit percentage must be between 0 and 100",
            ));
        }
        Ok(Self {
            id: QuoteId::new(),
            number: None,
            client_id,
            status: QuoteStatus::Draft,
            vat_rate,
            per_line_vat,
            deposit_percent,
            valid_until,
            signed_at: None,
            client_signature: None,
            notes: None,
            amount_excl_tax: Decimal::ZERO,
            amount_of_tax: Decimal::ZERO,
            amount_incl_tax: Decimal::ZERO,
            lines: Vec::new(),
            created_at: now,
            modified_at: now,
        })
    }

    /// Recompute document totals from the lines. Called after any line change.
    pub fn recompute_totals(&mut self) {
        let totals = compute_totals(&self.lines, self.vat_rate, self.per_line_vat);
        self.amount_excl_tax = totals.excl_tax;
        self.amount_of_tax = totals.tax;
        self.amount_incl_tax = totals.incl_tax;
    }

    pub fn line(&self, line_id: QuoteLineId) -> Option<&QuoteLine> {
        self.lines.iter().find(|l| l.id == line_id)
    }

    /// Precondition for the `-> Signed` transition, checked before any lock.
    pub fn validate_can_be_signed(&self) -> EngineResult<()> {
        if self.signed_at.is_some() {
            return Err(EngineError::signing_precondition(
                DocumentKind::Quote,
                "quote is already signed",
            ));
        }
        if self.lines.is_empty() {
            return Err(EngineError::signing_precondition(
                DocumentKind::Quote,
                "quote has no lines",
            ));
        }
        Ok(())
    }

    /// Whether the quote should lapse into `Expired` as of `today`.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        !self.status.is_final() && self.valid_until < today
    }
}

impl GuardedDocument for Quote {
    type Status = QuoteStatus;
    type Field = QuoteField;

    fn kind() -> DocumentKind {
        DocumentKind::Quote
    }

    fn number(&self) -> Option<&str> {
        self.number.as_deref()
    }

    fn status(&self) -> QuoteStatus {
        self.status
    }

    fn is_locked(&self) -> bool {
        self.status.is_final()
    }

    fn whitelist() -> &'static [QuoteField] {
        &[
            QuoteField::Status,
            QuoteField::SignedAt,
            QuoteField::ClientSignature,
            QuoteField::ModifiedAt,
        ]
    }

    fn changed_fields(persisted: &Self, proposed: &Self) -> Vec<QuoteField> {
        let mut changed = Vec::new();
        if persisted.number != proposed.number {
            changed.push(QuoteField::Number);
        }
        if persisted.client_id != proposed.client_id {
            changed.push(QuoteField::Client);
        }
        if persisted.status != proposed.status {
            changed.push(QuoteField::Status);
        }
        if persisted.vat_rate != proposed.vat_rate {
            changed.push(QuoteField::VatRate);
        }
        if persisted.per_line_vat != proposed.per_line_vat {
            changed.push(QuoteField::PerLineVat);
        }
        if persisted.deposit_percent != proposed.deposit_percent {
            changed.push(QuoteField::DepositPercent);
        }
        if persisted.valid_until != proposed.valid_until {
            changed.push(QuoteField::ValidUntil);
        }
        if persisted.signed_at != proposed.signed_at {
            changed.push(QuoteField::SignedAt);
        }
        if persisted.client_signature != proposed.client_signature {
            changed.push(QuoteField::ClientSignature);
        }
        if persisted.notes != proposed.notes {
            changed.push(QuoteField::Notes);
        }
        let lines_changed = persisted.lines.len() != proposed.lines.len()
            || persisted
                .lines
                .iter()
                .zip(&proposed.lines)
                .any(|(a, b)| !a.same_contractual_content(b));
        if lines_changed {
            changed.push(QuoteField::Lines);
        }
        if persisted.amount_excl_tax != proposed.amount_excl_tax
            || persisted.amount_of_tax != proposed.amount_of_tax
            || persisted.amount_incl_tax != proposed.amount_incl_tax
        {
            changed.push(QuoteField::Totals);
        }
        if persisted.modified_at != proposed.modified_at {
            changed.push(QuoteField::ModifiedAt);
        }
        changed
    }

    fn transition_allowed(from: QuoteStatus, to: QuoteStatus) -> bool {
        use QuoteStatus::*;
        matches!(
            (from, to),
            (Draft, Sent)
                | (Draft, Expired)
                | (Draft, Cancelled)
                | (Sent, Signed)
                | (Sent, Refused)
                | (Sent, Expired)
                | (Sent, Cancelled)
        )
    }
}
