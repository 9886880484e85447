use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use devisio_core::{DepositId, InvoiceId, QuoteId, round2};

/// Deposit status, driven by the payment collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositStatus {
    Pending,
    Paid,
    Cancelled,
}

/// A deposit (acompte) requested against a signed quote.
///
/// Once paid, the amount is deducted from the invoice later billed from the
/// quote; `invoice_id` records that deduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub id: DepositId,
    pub quote_id: QuoteId,
    /// Invoice the deposit was deducted from, once billed.
    pub invoice_id: Option<InvoiceId>,
    /// Amount including tax.
    pub amount: Decimal,
    pub percent: Decimal,
    pub status: DepositStatus,
    pub requested_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Deposit {
    /// Create a pending deposit for `percent` of a quote's total (incl. tax).
    pub fn for_quote(
        quote_id: QuoteId,
        quote_total_incl_tax: Decimal,
        percent: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DepositId::new(),
            quote_id,
            invoice_id: None,
            amount: round2(quote_total_incl_tax * percent / Decimal::ONE_HUNDRED),
            percent,
            status: DepositStatus::Pending,
            requested_at: now,
            paid_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn deposit_amount_is_rounded_share_of_total() {
        let deposit = Deposit::for_quote(QuoteId::new(), dec!(1234.56), dec!(30), Utc::now());
        assert_eq!(deposit.amount, dec!(370.37));
        assert_eq!(deposit.status, DepositStatus::Pending);
    }
}
