//! Performance benchmarks for till-engine

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use till_engine::{
    classify, diff_records, merge_fields, EntityKind, RecordData, SyncWindows,
};

fn product(updated_at: i64, price: f64) -> RecordData {
    RecordData::new("p1", 1_000, updated_at)
        .with_field("sku", json!("SKU-001"))
        .with_field("barcode", json!("8901234567890"))
        .with_field("name", json!("Black beans 500g"))
        .with_field("description", json!("Premium black beans"))
        .with_field("category_id", json!("cat-1"))
        .with_field("cost_price", json!(6.5))
        .with_field("selling_price", json!(price))
        .with_field("tax_rate", json!(5.0))
        .with_field("stock_quantity", json!(42.0))
        .with_field("min_stock_level", json!(10.0))
        .with_field("unit", json!("pcs"))
        .with_field("is_active", json!(true))
        .with_field("store_id", json!("store-1"))
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");

    let local = product(10_000, 10.0);
    let identical = product(10_000, 10.0);
    let divergent = product(130_000, 12.0)
        .with_field("description", json!("Budget black beans"))
        .with_field("stock_quantity", json!(40.0));

    group.bench_function("identical_records", |b| {
        b.iter(|| diff_records(EntityKind::Product, black_box(&local), black_box(&identical)))
    });

    group.bench_function("divergent_records", |b| {
        b.iter(|| diff_records(EntityKind::Product, black_box(&local), black_box(&divergent)))
    });

    group.finish();
}

fn bench_classify_and_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify_and_merge");

    let local = product(10_000, 10.0);
    let remote = product(130_000, 12.0);
    let windows = SyncWindows::default();

    group.bench_function("classify", |b| {
        b.iter(|| {
            classify(
                EntityKind::Product,
                black_box(&local),
                black_box(&remote),
                windows,
            )
        })
    });

    let diffs = diff_records(EntityKind::Product, &local, &remote);
    group.bench_function("merge", |b| {
        b.iter(|| merge_fields(black_box(&local), black_box(&remote), black_box(&diffs), 500_000))
    });

    group.finish();
}

criterion_group!(benches, bench_diff, bench_classify_and_merge);
criterion_main!(benches);
