use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{DateTime, Duration, TimeZone, Utc};
use shelfwise_catalog::{CatalogItem, Pricing};
use shelfwise_core::{ItemId, LocationId, SourceId, TenantId};
use shelfwise_events::InMemoryEventBus;
use shelfwise_infra::ledger_store::InMemoryLedgerStore;
use shelfwise_infra::read_model::{InMemoryAuditLogStore, InMemoryTenantStore};
use shelfwise_infra::{EngineConfig, LocationKind, StockEngine, StockEnvelope};
use shelfwise_ledger::{LedgerKey, LedgerKind, NewRecord, RecordType, RemovalReason, SourceKind};
use std::sync::Arc;

type Engine = StockEngine<
    Arc<InMemoryLedgerStore>,
    Arc<InMemoryTenantStore<ItemId, CatalogItem>>,
    Arc<InMemoryAuditLogStore>,
    Arc<InMemoryEventBus<StockEnvelope>>,
>;

struct Fixture {
    engine: Engine,
    tenant_id: TenantId,
    shelf: LocationId,
    item_id: ItemId,
}

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn receipt(fx: &Fixture, at: DateTime<Utc>, quantity: i64) -> NewRecord {
    NewRecord {
        tenant_id: fx.tenant_id,
        ledger_kind: LedgerKind::Inventory,
        location_id: fx.shelf,
        item_id: fx.item_id,
        record_date: at,
        record_type: RecordType::Add,
        quantity,
        unit_price: Some(250),
        removal_reason: None,
        source_kind: SourceKind::Purchase,
        source_id: Some(SourceId::new()),
        destination_id: None,
        quantity_leaving_warehouse: None,
    }
}

fn sale(fx: &Fixture, at: DateTime<Utc>) -> NewRecord {
    NewRecord {
        record_type: RecordType::Remove,
        unit_price: None,
        removal_reason: Some(RemovalReason::Sales),
        source_kind: SourceKind::Sale,
        ..receipt(fx, at, 1)
    }
}

/// A shelf ledger of `history` alternating receipts and sales, one per hour.
fn setup(history: usize, merchandised: bool) -> Fixture {
    let tenant_id = TenantId::new();
    let shelf = LocationId::new();
    let config = EngineConfig::default().with_location(tenant_id, shelf, LocationKind::available());
    let engine = StockEngine::new(
        Arc::new(InMemoryLedgerStore::new()),
        Arc::new(InMemoryTenantStore::new()),
        Arc::new(InMemoryAuditLogStore::new()),
        Arc::new(InMemoryEventBus::new()),
        config,
    );
    let fx = Fixture {
        engine,
        tenant_id,
        shelf,
        item_id: ItemId::new(),
    };
    if merchandised {
        fx.engine
            .merchandise(tenant_id, fx.item_id, Pricing::marked(300))
            .unwrap();
    }

    for i in 0..history {
        // Hour 0 is left free for backdated inserts.
        let at = epoch() + Duration::hours(i as i64 + 1);
        let new = if i % 2 == 0 { receipt(&fx, at, 3) } else { sale(&fx, at) };
        fx.engine.create(new).unwrap();
    }
    fx
}

fn bench_append_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_latency");

    group.bench_function("append_at_end", |b| {
        let fx = setup(100, true);
        let mut hour = 1_000;
        b.iter(|| {
            hour += 1;
            let new = receipt(&fx, epoch() + Duration::hours(hour), black_box(2));
            fx.engine.create(new).unwrap();
        });
    });

    group.bench_function("append_unmerchandised", |b| {
        let fx = setup(100, false);
        let mut hour = 1_000;
        b.iter(|| {
            hour += 1;
            let new = receipt(&fx, epoch() + Duration::hours(hour), black_box(2));
            black_box(fx.engine.create(new).unwrap());
        });
    });

    group.finish();
}

fn bench_backdated_cascade(c: &mut Criterion) {
    let mut group = c.benchmark_group("backdated_cascade");
    group.sample_size(20);

    for history in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*history as u64));
        group.bench_with_input(BenchmarkId::new("insert_before_history", history), history, |b, &size| {
            // Fresh ledger per batch so every insert recomputes the same tail.
            b.iter_batched(
                || setup(size, true),
                |fx| {
                    let outcome = fx.engine.create(receipt(&fx, epoch(), 1)).unwrap();
                    black_box(outcome.committed.len());
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn bench_catalog_resync(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalog_resync");

    for history in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("unchanged_item", history), history, |b, &size| {
            let fx = setup(size, true);
            b.iter(|| {
                black_box(fx.engine.resync_item(fx.tenant_id, fx.item_id).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_chain_verification(c: &mut Criterion) {
    let fx = setup(1000, false);
    let key = LedgerKey::new(fx.tenant_id, LedgerKind::Inventory, fx.shelf, fx.item_id);
    c.bench_function("verify_chain_1000", |b| {
        b.iter(|| fx.engine.verify_chain(fx.tenant_id, black_box(&key)).unwrap());
    });
}

fn configure() -> Criterion {
    shelfwise_observability::init_with_default("error");
    Criterion::default()
}

criterion_group! {
    name = benches;
    config = configure();
    targets = bench_append_latency, bench_backdated_cascade, bench_catalog_resync, bench_chain_verification
}
criterion_main!(benches);
