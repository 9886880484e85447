//! Billing events emitted after persisted state transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use devisio_core::DocumentKind;

/// What happened to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingEventKind {
    QuoteSent,
    QuoteSigned,
    QuoteRefused,
    QuoteExpired,
    QuoteCancelled,
    DepositRequested,
    DepositPaid,
    AmendmentSent,
    AmendmentSigned,
    AmendmentCancelled,
    InvoiceIssued,
    InvoiceSent,
    InvoicePaid,
    InvoiceCancelled,
    InvoiceReminderDue,
    CreditNoteIssued,
    CreditNoteSent,
    CreditNoteRefunded,
    PaymentFailed,
    SubscriptionRenewed,
}

impl BillingEventKind {
    /// Stable dotted name, used as routing key by external collaborators.
    pub fn as_str(self) -> &'static str {
        match self {
            BillingEventKind::QuoteSent => "billing.quote.sent",
            BillingEventKind::QuoteSigned => "billing.quote.signed",
            BillingEventKind::QuoteRefused => "billing.quote.refused",
            BillingEventKind::QuoteExpired => "billing.quote.expired",
            BillingEventKind::QuoteCancelled => "billing.quote.cancelled",
            BillingEventKind::DepositRequested => "billing.deposit.requested",
            BillingEventKind::DepositPaid => "billing.deposit.paid",
            BillingEventKind::AmendmentSent => "billing.amendment.sent",
            BillingEventKind::AmendmentSigned => "billing.amendment.signed",
            BillingEventKind::AmendmentCancelled => "billing.amendment.cancelled",
            BillingEventKind::InvoiceIssued => "billing.invoice.issued",
            BillingEventKind::InvoiceSent => "billing.invoice.sent",
            BillingEventKind::InvoicePaid => "billing.invoice.paid",
            BillingEventKind::InvoiceCancelled => "billing.invoice.cancelled",
            BillingEventKind::InvoiceReminderDue => "billing.invoice.reminder_due",
            BillingEventKind::CreditNoteIssued => "billing.credit_note.issued",
            BillingEventKind::CreditNoteSent => "billing.credit_note.sent",
            BillingEventKind::CreditNoteRefunded => "billing.credit_note.refunded",
            BillingEventKind::PaymentFailed => "billing.payment.failed",
            BillingEventKind::SubscriptionRenewed => "billing.subscription.renewed",
        }
    }
}

/// A state-transition notification.
///
/// Carries identifiers only; collaborators needing the document's content
/// read it back through the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingEvent {
    pub document: DocumentKind,
    pub document_id: Uuid,
    pub number: Option<String>,
    pub kind: BillingEventKind,
    pub occurred_at: DateTime<Utc>,
}

impl BillingEvent {
    pub fn new(
        document: DocumentKind,
        document_id: impl Into<Uuid>,
        number: Option<String>,
        kind: BillingEventKind,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            document,
            document_id: document_id.into(),
            number,
            kind,
            occurred_at,
        }
    }
}
