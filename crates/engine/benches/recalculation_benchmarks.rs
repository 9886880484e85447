use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use chrono::{Days, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use devisio_calc::{apply_delta, compute_totals, CorrectionInput, CorrectionPolarity};
use devisio_engine::{BillingEngine, InMemoryStore};
use devisio_events::InMemorySink;
use devisio_quotes::QuoteLine;

fn setup_engine() -> BillingEngine<InMemoryStore> {
    BillingEngine::new(InMemoryStore::new(), Arc::new(InMemorySink::new()))
}

fn sample_lines(count: usize) -> Vec<QuoteLine> {
    (0..count)
        .map(|i| {
            let rate = match i % 4 {
                0 => Some(dec!(20)),
                1 => Some(dec!(10)),
                2 => Some(dec!(5.5)),
                _ => None,
            };
            QuoteLine::new(
                format!("Ligne {i}"),
                (i % 9 + 1) as i64,
                Decimal::new((i as i64 % 1000) * 100 + 99, 2),
                rate,
            )
            .unwrap()
        })
        .collect()
}

fn bench_totals_recalculation(c: &mut Criterion) {
    let mut group = c.benchmark_group("totals_recalculation");

    for line_count in [1, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*line_count as u64));
        group.bench_with_input(
            BenchmarkId::new("per_line_vat", line_count),
            line_count,
            |b, &count| {
                let lines = sample_lines(count);
                b.iter(|| black_box(compute_totals(black_box(&lines), dec!(20), true)));
            },
        );
        group.bench_with_input(
            BenchmarkId::new("flat_rate", line_count),
            line_count,
            |b, &count| {
                let lines = sample_lines(count);
                b.iter(|| black_box(compute_totals(black_box(&lines), dec!(20), false)));
            },
        );
    }

    group.finish();
}

fn bench_delta_application(c: &mut Criterion) {
    let mut group = c.benchmark_group("delta_application");
    group.sample_size(1000);

    group.bench_function("sourced_reduction", |b| {
        let input = CorrectionInput {
            quantity: Some(1),
            unit_price: Some(dec!(700)),
            old_value: Decimal::ZERO,
            total_excl_tax: Decimal::ZERO,
        };
        b.iter(|| {
            black_box(apply_delta(
                black_box(&input),
                Some(dec!(1000)),
                CorrectionPolarity::Amendment,
            ))
        });
    });

    group.bench_function("credit_aggregate", |b| {
        let input = CorrectionInput {
            quantity: Some(1),
            unit_price: Some(dec!(-300)),
            old_value: Decimal::ZERO,
            total_excl_tax: Decimal::ZERO,
        };
        b.iter(|| {
            black_box(apply_delta(
                black_box(&input),
                None,
                CorrectionPolarity::CreditNote,
            ))
        });
    });

    group.finish();
}

fn bench_signature_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("signature_pipeline");
    group.sample_size(200);

    for line_count in [1, 10, 50].iter() {
        group.bench_with_input(
            BenchmarkId::new("sign_and_bill", line_count),
            line_count,
            |b, &count| {
                let engine = setup_engine();
                let client = engine.create_client("Client de test").unwrap();
                let valid_until = Utc::now().date_naive() + Days::new(30);

                b.iter(|| {
                    let quote = engine
                        .create_quote(client.id, dec!(20), true, dec!(0), valid_until)
                        .unwrap();
                    for i in 0..count {
                        engine
                            .add_quote_line(
                                quote.id,
                                format!("Ligne {i}"),
                                1,
                                dec!(100),
                                None,
                                None,
                            )
                            .unwrap();
                    }
                    engine.send_quote(quote.id).unwrap();
                    black_box(engine.sign_quote(quote.id, "signature").unwrap());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_totals_recalculation,
    bench_delta_application,
    bench_signature_pipeline
);
criterion_main!(benches);
