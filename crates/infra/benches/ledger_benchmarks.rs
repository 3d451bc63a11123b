use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::NaiveDate;
use std::sync::Arc;
use tesouro_core::{Amount, TenantId, UserId};
use tesouro_events::InMemoryEventBus;
use tesouro_infra::event_store::{InMemoryEventStore, StoredEvent};
use tesouro_infra::projections::{OpenObligationsProjection, TrackedObligation};
use tesouro_infra::read_model::InMemoryTenantStore;
use tesouro_infra::{
    FixedClock, InMemoryLedger, LedgerConfig, NewObligation, ObligationLedger, PaymentRequest,
    TreasuryRegister,
};
use tesouro_ledger::{
    BankAccountRef, ObligationId, ObligationKind, Settlement, SettlementId, derive,
};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, d).unwrap()
}

fn ledger(store: Arc<InMemoryEventStore>) -> InMemoryLedger {
    ObligationLedger::new(
        store,
        Arc::new(InMemoryEventBus::new()),
        Arc::new(TreasuryRegister::new()),
        Arc::new(FixedClock::on(day(1))),
        LedgerConfig::default(),
    )
}

fn new_payable(cents: i64) -> NewObligation {
    NewObligation {
        kind: ObligationKind::Payable,
        description: "Bench".to_string(),
        document_number: None,
        counterparty: None,
        category: None,
        issue_date: None,
        competence_date: None,
        due_date: day(15),
        original_amount: Amount::from_cents(cents),
    }
}

/// Payments of 1 cent each, every third one reversed.
fn settlement_log(obligation_id: ObligationId, len: usize) -> Vec<Settlement> {
    let user = UserId::new();
    let mut log = Vec::with_capacity(len);
    for i in 0..len {
        if i % 3 == 2 {
            let target = log[i - 1].clone();
            log.push(Settlement::reversal_of(&target, SettlementId::new(), day(2), "bench", user));
        } else {
            log.push(Settlement::payment(
                SettlementId::new(),
                obligation_id,
                day(2),
                Amount::from_cents(1),
                Amount::ZERO,
                Amount::ZERO,
                BankAccountRef::new("cc"),
                user,
            ));
        }
    }
    log
}

fn bench_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("derivation");
    let id = ObligationId::generate();

    for len in [10usize, 100, 1_000].iter() {
        let log = settlement_log(id, *len);
        group.throughput(Throughput::Elements(*len as u64));
        group.bench_with_input(BenchmarkId::new("derive_status", len), &log, |b, log| {
            b.iter(|| black_box(derive(Amount::from_cents(1_000_000), day(15), log, day(20))))
        });
    }

    group.finish();
}

fn bench_register_payment(c: &mut Criterion) {
    let mut group = c.benchmark_group("register_payment");

    for history in [0usize, 50, 200].iter() {
        group.bench_with_input(BenchmarkId::new("with_history", history), history, |b, &history| {
            let ledger = ledger(Arc::new(InMemoryEventStore::new()));
            let (t, u) = (TenantId::new(), UserId::new());
            let id = ledger.create_obligation(t, u, new_payable(1_000_000_000)).unwrap().id;
            for _ in 0..history {
                ledger
                    .register_payment(t, u, id, PaymentRequest::new(day(2), Amount::from_cents(1), BankAccountRef::new("cc")))
                    .unwrap();
            }

            b.iter(|| {
                let request = PaymentRequest::new(day(2), Amount::from_cents(1), BankAccountRef::new("cc"));
                black_box(ledger.register_payment(t, u, id, request).unwrap())
            })
        });
    }

    group.finish();
}

fn bench_projection_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("projection_rebuild");
    group.sample_size(20);

    for obligations in [10usize, 100, 500].iter() {
        let store = Arc::new(InMemoryEventStore::new());
        let ledger = ledger(store.clone());
        let (t, u) = (TenantId::new(), UserId::new());
        for _ in 0..*obligations {
            let id = ledger.create_obligation(t, u, new_payable(10_000)).unwrap().id;
            ledger
                .register_payment(t, u, id, PaymentRequest::new(day(2), Amount::from_cents(2_500), BankAccountRef::new("cc")))
                .unwrap();
        }
        let envelopes: Vec<_> = store.load_tenant(t).unwrap().iter().map(StoredEvent::to_envelope).collect();

        group.throughput(Throughput::Elements(envelopes.len() as u64));
        group.bench_with_input(BenchmarkId::new("rebuild_from_events", obligations), &envelopes, |b, envs| {
            b.iter(|| {
                let projection: OpenObligationsProjection<InMemoryTenantStore<ObligationId, TrackedObligation>> =
                    OpenObligationsProjection::new(InMemoryTenantStore::new());
                projection.rebuild_from_scratch(envs.clone()).unwrap();
                black_box(projection.summary(t, ObligationKind::Payable, day(20)))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_derivation, bench_register_payment, bench_projection_rebuild);
criterion_main!(benches);
