//! End-to-end tests for the full billing pipeline.
//!
//! Tests: Quote → Signature → Invoice → Amendment/CreditNote → Sweeps
//!
//! Verifies:
//! - Signature side effects produce the right billing documents
//! - Numbering stays sequential across cancellations
//! - Offsetting credit notes cancel their invoice
//! - Notifications reach subscribers in order

use std::sync::Arc;

use chrono::{Datelike, Days, Utc};
use rust_decimal_macros::dec;

use devisio_core::EngineError;
use devisio_events::{BillingEventKind, InMemorySink};
use devisio_invoicing::{Invoice, InvoiceStatus};
use devisio_quotes::{AmendmentStatus, Quote, QuoteStatus, Recurrence, RecurrenceInterval};

use crate::engine::BillingEngine;
use crate::numbering;
use crate::store::{DocumentStore, InMemoryStore};

fn setup() -> (BillingEngine<InMemoryStore>, Arc<InMemorySink>) {
    let sink = Arc::new(InMemorySink::new());
    let engine = BillingEngine::new(InMemoryStore::new(), sink.clone());
    (engine, sink)
}

fn today() -> chrono::NaiveDate {
    Utc::now().date_naive()
}

/// Helper: a sent quote with one 1000 € line at 20% VAT, ready to sign.
fn sent_quote(engine: &BillingEngine<InMemoryStore>, deposit_percent: rust_decimal::Decimal) -> Quote {
    let client = engine.create_client("Atelier Dupont").unwrap();
    let quote = engine
        .create_quote(
            client.id,
            dec!(20),
            false,
            deposit_percent,
            today() + Days::new(30),
        )
        .unwrap();
    engine
        .add_quote_line(quote.id, "Maintenance annuelle", 1, dec!(1000), None, None)
        .unwrap();
    engine.send_quote(quote.id).unwrap()
}

/// Helper: a signed quote together with the invoice its signature produced.
fn billed_quote(engine: &BillingEngine<InMemoryStore>) -> (Quote, Invoice) {
    let quote = sent_quote(engine, dec!(0));
    let outcome = engine.sign_quote(quote.id, "signature client").unwrap();
    (outcome.quote, outcome.invoice.unwrap())
}

#[test]
fn signed_quote_without_deposit_is_billed_immediately() {
    let (engine, _sink) = setup();
    let quote = sent_quote(&engine, dec!(0));

    let outcome = engine.sign_quote(quote.id, "signature client").unwrap();
    assert_eq!(outcome.quote.status, QuoteStatus::Signed);
    assert!(outcome.deposit.is_none());
    assert!(outcome.side_effect_failure.is_none());

    let invoice = outcome.invoice.unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Issued);
    assert_eq!(invoice.quote_id, Some(quote.id));
    assert_eq!(invoice.amount_excl_tax, dec!(1000));
    assert_eq!(invoice.amount_incl_tax, dec!(1200.00));

    let expected = numbering::format_number(&numbering::invoice_prefix(Utc::now().year()), 1);
    assert_eq!(invoice.number.as_deref(), Some(expected.as_str()));

    // Lines were copied, never re-linked: fresh ids, same content.
    assert_eq!(invoice.lines.len(), 1);
    assert_eq!(invoice.lines[0].total_excl_tax, dec!(1000));
}

#[test]
fn deposit_quote_defers_billing_until_billed_explicitly() {
    let (engine, _sink) = setup();
    let quote = sent_quote(&engine, dec!(30));

    let outcome = engine.sign_quote(quote.id, "signature client").unwrap();
    assert!(outcome.invoice.is_none());
    let deposit = outcome.deposit.unwrap();
    // 30% of 1200.00 incl tax.
    assert_eq!(deposit.amount, dec!(360.00));

    engine.mark_deposit_paid(deposit.id).unwrap();

    let invoice = engine.bill_quote(quote.id).unwrap();
    assert_eq!(invoice.deposit_paid, dec!(360.00));
    assert_eq!(invoice.outstanding_amount(), dec!(840.00));

    // Billing again returns the same invoice, never a second one.
    let again = engine.bill_quote(quote.id).unwrap();
    assert_eq!(again.id, invoice.id);

    // The paid deposit is now tied to the invoice it was deducted from.
    let deposits = engine.store().deposits_for_quote(quote.id).unwrap();
    assert_eq!(deposits[0].invoice_id, Some(invoice.id));

    let (_, invoice) = engine
        .mark_paid_by_external_payment(invoice.id, dec!(840.00))
        .unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Paid);
}

#[test]
fn positive_amendment_bills_a_complementary_invoice() {
    let (engine, _sink) = setup();
    let (quote, _invoice) = billed_quote(&engine);

    let amendment = engine
        .create_amendment(quote.id, "Prestation supplémentaire")
        .unwrap();
    engine
        .add_amendment_line(amendment.id, "Module export", 1, dec!(800), None, None)
        .unwrap();
    engine.send_amendment(amendment.id).unwrap();

    let outcome = engine.sign_amendment(amendment.id, "signature client").unwrap();
    assert_eq!(outcome.amendment.status, AmendmentStatus::Signed);
    assert!(outcome.credit_note.is_none());

    let complementary = outcome.invoice.unwrap();
    assert_eq!(complementary.amendment_id, Some(amendment.id));
    assert_eq!(complementary.quote_id, None);
    assert_eq!(complementary.amount_excl_tax, dec!(800));
    assert_eq!(complementary.status, InvoiceStatus::Issued);

    // The displayed quote total now carries the signed correction.
    let corrected = engine.quote_corrected_total(quote.id).unwrap();
    assert_eq!(corrected.excl_tax, dec!(1800));
    assert_eq!(corrected.incl_tax, dec!(2160.00));
}

#[test]
fn negative_amendment_credits_the_original_invoice() {
    let (engine, _sink) = setup();
    let (quote, invoice) = billed_quote(&engine);
    let source_line = quote.lines[0].id;

    let amendment = engine.create_amendment(quote.id, "Révision du montant").unwrap();
    // A -300 adjustment against the 1000 € line: 1000 → 700.
    let amendment = engine
        .add_amendment_line(amendment.id, "Maintenance annuelle", 1, dec!(-300), None, Some(source_line))
        .unwrap();
    assert_eq!(amendment.lines[0].old_value, dec!(1000));
    assert_eq!(amendment.lines[0].new_value, dec!(700));
    assert_eq!(amendment.lines[0].delta, dec!(-300));
    assert_eq!(amendment.amount_excl_tax, dec!(-300));

    engine.send_amendment(amendment.id).unwrap();
    let outcome = engine.sign_amendment(amendment.id, "signature client").unwrap();
    assert!(outcome.invoice.is_none());

    let note = outcome.credit_note.unwrap();
    assert_eq!(note.invoice_id, invoice.id);
    assert_eq!(note.amendment_id, Some(amendment.id));
    assert_eq!(note.amount_excl_tax, dec!(-300));
    assert_eq!(note.amount_incl_tax, dec!(-360.00));

    // -360 against 1200 leaves the invoice standing.
    let invoice = engine.invoice(invoice.id).unwrap();
    assert_ne!(invoice.status, InvoiceStatus::Cancelled);

    let corrected = engine.invoice_corrected_total(invoice.id).unwrap();
    assert_eq!(corrected.incl_tax, dec!(840.00));

    // Re-signing is rejected, and billing stays idempotent underneath.
    let err = engine.sign_amendment(amendment.id, "signature client").unwrap_err();
    assert!(matches!(err, EngineError::SigningPrecondition { .. }));
}

#[test]
fn amendment_signature_survives_billing_failure() {
    let (engine, _sink) = setup();
    // Deposit path: the quote is signed but nothing was invoiced yet, so a
    // negative rider has no invoice to credit.
    let quote = sent_quote(&engine, dec!(30));
    engine.sign_quote(quote.id, "signature client").unwrap();
    let source_line = engine.store().quote(quote.id).unwrap().lines[0].id;

    let amendment = engine.create_amendment(quote.id, "Révision du montant").unwrap();
    engine
        .add_amendment_line(amendment.id, "Maintenance annuelle", 1, dec!(-300), None, Some(source_line))
        .unwrap();
    engine.send_amendment(amendment.id).unwrap();

    let outcome = engine.sign_amendment(amendment.id, "signature client").unwrap();
    // The signature committed; the failed side effect is reported, not rolled back.
    assert_eq!(outcome.amendment.status, AmendmentStatus::Signed);
    assert!(outcome.credit_note.is_none());
    assert!(outcome.side_effect_failure.is_some());
}

#[test]
fn offsetting_credit_note_cancels_the_invoice() {
    let (engine, _sink) = setup();
    let (_quote, invoice) = billed_quote(&engine);

    let note = engine.create_credit_note(invoice.id, "Prestation annulée").unwrap();
    let note = engine
        .add_credit_note_line(note.id, "Annulation intégrale", 1, dec!(1000), None, None)
        .unwrap();
    assert_eq!(note.amount_incl_tax, dec!(-1200.00));

    engine.issue_credit_note(note.id).unwrap();

    // -1200.00 fully offsets the 1200.00 invoice.
    let invoice = engine.invoice(invoice.id).unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Cancelled);
    // Cancellation changes status, never the number.
    assert!(invoice.number.is_some());
}

#[test]
fn cancelled_invoice_rejects_payments_outright() {
    let (engine, _sink) = setup();
    let (_quote, invoice) = billed_quote(&engine);

    let note = engine.create_credit_note(invoice.id, "Prestation annulée").unwrap();
    engine
        .add_credit_note_line(note.id, "Annulation intégrale", 1, dec!(1000), None, None)
        .unwrap();
    engine.issue_credit_note(note.id).unwrap();
    assert_eq!(engine.invoice(invoice.id).unwrap().status, InvoiceStatus::Cancelled);

    let err = engine
        .mark_paid_by_external_payment(invoice.id, dec!(1200.00))
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    // The rejected payment never reached the store.
    assert!(engine.store().payments_for_invoice(invoice.id).unwrap().is_empty());
}

#[test]
fn partial_credit_note_leaves_the_invoice_standing() {
    let (engine, _sink) = setup();
    let (_quote, invoice) = billed_quote(&engine);

    let note = engine.create_credit_note(invoice.id, "Remise commerciale").unwrap();
    engine
        .add_credit_note_line(note.id, "Remise", 1, dec!(150), None, None)
        .unwrap();
    engine.issue_credit_note(note.id).unwrap();

    let invoice = engine.invoice(invoice.id).unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Issued);
    assert_eq!(
        engine.invoice_corrected_total(invoice.id).unwrap().incl_tax,
        dec!(1020.00)
    );
}

#[test]
fn invoice_numbering_stays_sequential_across_cancellation() {
    let (engine, _sink) = setup();
    let prefix = numbering::invoice_prefix(Utc::now().year());

    let (_q1, first) = billed_quote(&engine);
    let (_q2, second) = billed_quote(&engine);
    assert_eq!(first.number.as_deref(), Some(numbering::format_number(&prefix, 1).as_str()));
    assert_eq!(second.number.as_deref(), Some(numbering::format_number(&prefix, 2).as_str()));

    // Cancel the first through a full offset.
    let note = engine.create_credit_note(first.id, "Prestation annulée").unwrap();
    engine
        .add_credit_note_line(note.id, "Annulation intégrale", 1, dec!(1000), None, None)
        .unwrap();
    engine.issue_credit_note(note.id).unwrap();
    assert_eq!(engine.invoice(first.id).unwrap().status, InvoiceStatus::Cancelled);

    // The cancelled number is never reused; the sequence keeps counting.
    let (_q3, third) = billed_quote(&engine);
    assert_eq!(third.number.as_deref(), Some(numbering::format_number(&prefix, 3).as_str()));
}

#[test]
fn amendment_numbers_derive_from_the_parent_quote() {
    let (engine, _sink) = setup();
    let (quote, _invoice) = billed_quote(&engine);
    let quote_number = quote.number.unwrap();

    let first = engine.create_amendment(quote.id, "Premier avenant").unwrap();
    let second = engine.create_amendment(quote.id, "Second avenant").unwrap();

    assert_eq!(
        first.number,
        numbering::amendment_number(&quote_number, 0)
    );
    assert_eq!(
        second.number,
        numbering::amendment_number(&quote_number, 1)
    );
}

#[test]
fn expiry_sweep_lapses_overdue_quotes() {
    let (engine, _sink) = setup();
    let client = engine.create_client("Atelier Dupont").unwrap();

    let stale_draft = engine
        .create_quote(client.id, dec!(20), false, dec!(0), today() - Days::new(1))
        .unwrap();
    let stale_sent = engine
        .create_quote(client.id, dec!(20), false, dec!(0), today() - Days::new(1))
        .unwrap();
    engine
        .add_quote_line(stale_sent.id, "Ligne", 1, dec!(100), None, None)
        .unwrap();
    engine.send_quote(stale_sent.id).unwrap();
    let fresh = engine
        .create_quote(client.id, dec!(20), false, dec!(0), today() + Days::new(10))
        .unwrap();

    assert_eq!(engine.expire_overdue_quotes(today()).unwrap(), 2);
    assert_eq!(engine.store().quote(stale_draft.id).unwrap().status, QuoteStatus::Expired);
    assert_eq!(engine.store().quote(stale_sent.id).unwrap().status, QuoteStatus::Expired);
    assert_eq!(engine.store().quote(fresh.id).unwrap().status, QuoteStatus::Draft);

    // Terminal statuses never lapse; a second run finds nothing.
    assert_eq!(engine.expire_overdue_quotes(today()).unwrap(), 0);
}

#[test]
fn reading_an_overdue_quote_lapses_it_lazily() {
    let (engine, _sink) = setup();
    let client = engine.create_client("Atelier Dupont").unwrap();
    let quote = engine
        .create_quote(client.id, dec!(20), false, dec!(0), today() - Days::new(1))
        .unwrap();

    let quote = engine.get_quote(quote.id, today()).unwrap();
    assert_eq!(quote.status, QuoteStatus::Expired);

    // An expired quote is locked against contractual edits.
    let err = engine
        .add_quote_line(quote.id, "Trop tard", 1, dec!(100), None, None)
        .unwrap_err();
    assert!(matches!(err, EngineError::ImmutableDocument { .. }));
}

#[test]
fn reminder_sweep_flags_overdue_invoices() {
    let (engine, _sink) = setup();
    let client = engine.create_client("Atelier Dupont").unwrap();
    let invoice = engine
        .create_invoice(client.id, None, dec!(20), false, today() - Days::new(15))
        .unwrap();
    engine
        .add_invoice_line(invoice.id, "Prestation", 1, dec!(500), None)
        .unwrap();
    let invoice = engine.issue_invoice(invoice.id).unwrap();
    assert_eq!(invoice.sent_count, 0);

    assert_eq!(engine.dispatch_due_reminders(today()).unwrap(), 1);
    assert_eq!(engine.invoice(invoice.id).unwrap().sent_count, 1);

    // A paid invoice stops receiving reminders.
    engine.mark_invoice_paid(invoice.id).unwrap();
    assert_eq!(engine.dispatch_due_reminders(today()).unwrap(), 0);
}

#[test]
fn renewal_sweep_bills_due_manual_subscriptions() {
    let (engine, _sink) = setup();
    let client = engine.create_client("Atelier Dupont").unwrap();
    let quote = engine
        .create_quote(client.id, dec!(20), false, dec!(0), today() + Days::new(30))
        .unwrap();
    let recurrence = Recurrence {
        interval: RecurrenceInterval::Monthly,
        next_renewal: today() - Days::new(1),
        auto: false,
    };
    engine
        .add_quote_line(quote.id, "Abonnement mensuel", 1, dec!(90), None, Some(recurrence))
        .unwrap();
    engine.send_quote(quote.id).unwrap();
    let outcome = engine.sign_quote(quote.id, "signature client").unwrap();
    let signature_invoice = outcome.invoice.unwrap();

    assert_eq!(engine.renew_manual_subscriptions(today()).unwrap(), 1);

    // The renewal billed a standalone invoice, distinct from the signature one.
    let invoices = engine.store().invoices().unwrap();
    let renewal = invoices
        .iter()
        .find(|i| i.id != signature_invoice.id)
        .unwrap();
    assert_eq!(renewal.quote_id, None);
    assert_eq!(renewal.status, InvoiceStatus::Issued);
    assert_eq!(renewal.amount_excl_tax, dec!(90));

    // next_renewal moved forward even though the quote is locked.
    let quote = engine.store().quote(quote.id).unwrap();
    let next = quote.lines[0].recurrence.unwrap().next_renewal;
    assert!(next > today());

    assert_eq!(engine.renew_manual_subscriptions(today()).unwrap(), 0);
}

#[test]
fn notifications_reach_subscribers_in_order() {
    let (engine, sink) = setup();
    let subscription = sink.subscribe();

    let quote = sent_quote(&engine, dec!(0));
    engine.sign_quote(quote.id, "signature client").unwrap();

    let kinds: Vec<BillingEventKind> = subscription.drain().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            BillingEventKind::QuoteSent,
            BillingEventKind::QuoteSigned,
            BillingEventKind::InvoiceIssued,
        ]
    );
}

#[test]
fn events_carry_the_document_number() {
    let (engine, sink) = setup();
    let quote = sent_quote(&engine, dec!(0));
    let subscription = sink.subscribe();
    engine.sign_quote(quote.id, "signature client").unwrap();

    let events = subscription.drain();
    let signed = events
        .iter()
        .find(|e| e.kind == BillingEventKind::QuoteSigned)
        .unwrap();
    assert_eq!(signed.kind.as_str(), "billing.quote.signed");
    assert_eq!(signed.number, engine.store().quote(quote.id).unwrap().number);
}
