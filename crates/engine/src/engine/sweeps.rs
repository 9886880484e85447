//! Scheduled sweeps: quote expiry, payment reminders, subscription renewal.
//!
//! Each sweep walks the matching documents, applies the relevant engine
//! operation and returns an aggregate count for the caller to report. A
//! failure on one document is logged and skipped; the sweep keeps going.

use chrono::{Days, NaiveDate, Utc};

use devisio_core::{DocumentKind, EngineResult};
use devisio_events::BillingEventKind;
use devisio_invoicing::{Invoice, InvoiceLine, InvoiceStatus};
use devisio_quotes::{Quote, QuoteStatus};

use super::quotes::PAYMENT_WINDOW_DAYS;
use super::BillingEngine;
use crate::store::DocumentStore;

impl<S: DocumentStore> BillingEngine<S> {
    /// Lapse every non-terminal quote whose validity date has passed.
    /// Returns the number of quotes expired.
    pub fn expire_overdue_quotes(&self, today: NaiveDate) -> EngineResult<usize> {
        let mut expired = 0;
        for quote in self.store().quotes()? {
            if !quote.is_expired(today) {
                continue;
            }
            match self.expire_quote(&quote) {
                Ok(_) => expired += 1,
                Err(e) => {
                    tracing::error!(quote = %quote.id, error = %e, "expiry sweep skipped a quote");
                }
            }
        }
        Ok(expired)
    }

    /// Flag every issued/sent invoice past its due date for a reminder:
    /// publish `InvoiceReminderDue` and bump the delivery tracking.
    /// Returns the number of reminders dispatched.
    pub fn dispatch_due_reminders(&self, today: NaiveDate) -> EngineResult<usize> {
        let mut dispatched = 0;
        for invoice in self.store().invoices()? {
            let overdue = matches!(invoice.status, InvoiceStatus::Issued | InvoiceStatus::Sent)
                && invoice.due_date < today;
            if !overdue {
                continue;
            }

            let mut proposed = invoice.clone();
            proposed.sent_count += 1;
            proposed.modified_at = Utc::now();
            match self.write_invoice(&invoice, proposed) {
                Ok(invoice) => {
                    self.publish(
                        DocumentKind::Invoice,
                        invoice.id,
                        invoice.number.clone(),
                        BillingEventKind::InvoiceReminderDue,
                    );
                    dispatched += 1;
                }
                Err(e) => {
                    tracing::error!(invoice = %invoice.id, error = %e, "reminder sweep skipped an invoice");
                }
            }
        }
        Ok(dispatched)
    }

    /// Renew manually-recurring lines of signed quotes that are due: bill
    /// them on a fresh invoice and advance their renewal dates. Returns the
    /// number of quotes renewed.
    pub fn renew_manual_subscriptions(&self, today: NaiveDate) -> EngineResult<usize> {
        let mut renewed = 0;
        for quote in self.store().quotes()? {
            if quote.status != QuoteStatus::Signed {
                continue;
            }
            let due: Vec<_> = quote
                .lines
                .iter()
                .filter(|l| {
                    l.recurrence
                        .is_some_and(|r| !r.auto && r.next_renewal <= today)
                })
                .cloned()
                .collect();
            if due.is_empty() {
                continue;
            }

            match self.renew_quote_lines(&quote, &due) {
                Ok(()) => renewed += 1,
                Err(e) => {
                    tracing::error!(quote = %quote.id, error = %e, "renewal sweep skipped a quote");
                }
            }
        }
        Ok(renewed)
    }

    fn renew_quote_lines(
        &self,
        quote: &Quote,
        due: &[devisio_quotes::QuoteLine],
    ) -> EngineResult<()> {
        let now = Utc::now();
        let mut invoice = Invoice::new(
            quote.client_id,
            None,
            quote.vat_rate,
            quote.per_line_vat,
            now.date_naive() + Days::new(PAYMENT_WINDOW_DAYS),
            now,
        );
        invoice.lines = due
            .iter()
            .map(|l| InvoiceLine::new(l.description.clone(), l.quantity, l.unit_price, l.vat_rate))
            .collect();
        invoice.recompute_totals();
        self.store().put_invoice(invoice.clone())?;
        self.issue_invoice(invoice.id)?;

        // Advance the renewal bookkeeping; operational, not contractual,
        // so the signed quote's lock tolerates it.
        let mut proposed = quote.clone();
        for line in &mut proposed.lines {
            if due.iter().any(|d| d.id == line.id) {
                if let Some(recurrence) = &mut line.recurrence {
                    recurrence.next_renewal = recurrence.interval.advance(recurrence.next_renewal);
                }
            }
        }
        proposed.modified_at = Utc::now();
        self.write_quote(quote, proposed)?;

        self.publish(
            DocumentKind::Quote,
            quote.id,
            quote.number.clone(),
            BillingEventKind::SubscriptionRenewed,
        );
        tracing::info!(quote = %quote.id, lines = due.len(), "manual subscription renewed");
        Ok(())
    }
}
