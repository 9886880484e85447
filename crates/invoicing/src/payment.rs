use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use devisio_core::{InvoiceId, PaymentId};

/// Payment status, reported back by the payment collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Received,
    Failed,
}

/// A payment recorded against an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub invoice_id: InvoiceId,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub received_at: DateTime<Utc>,
    pub failure_reason: Option<String>,
}

impl Payment {
    pub fn received(invoice_id: InvoiceId, amount: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            id: PaymentId::new(),
            invoice_id,
            amount,
            status: PaymentStatus::Received,
            received_at: now,
            failure_reason: None,
        }
    }
}
