use std::sync::Arc;

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use stackview_core::{Item, ItemId};
use stackview_inventory::{AggregationStore, Catalog, CatalogEntry};

const CLASSES: [&str; 8] = [
    "chair", "table", "lamp", "plant", "sofa", "rug", "bed", "shelf",
];

fn catalog() -> Catalog {
    CLASSES.iter().enumerate().fold(Catalog::new(), |c, (i, class)| {
        c.with_entry(*class, CatalogEntry::new(class.to_uppercase(), i as f64 + 0.5))
    })
}

fn items(n: usize) -> Vec<Item> {
    (0..n)
        .map(|i| Item::floor(i as i64, CLASSES[i % CLASSES.len()]))
        .collect()
}

fn bench_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_add");
    let enricher = Arc::new(catalog());

    for n in [500usize, 5_000] {
        let batch = items(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("add_new_items", n), &batch, |b, batch| {
            b.iter(|| {
                let store = AggregationStore::new(enricher.clone());
                black_box(store.add_new_items(batch.iter().cloned()));
            });
        });
    }

    group.finish();
}

fn bench_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_remove");
    let enricher = Arc::new(catalog());

    for n in [500usize, 5_000] {
        let batch = items(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("remove_all", n), &batch, |b, batch| {
            b.iter_batched(
                || {
                    let store = AggregationStore::new(enricher.clone());
                    store.add_new_items(batch.iter().cloned());
                    store
                },
                |store| {
                    for i in 0..batch.len() {
                        black_box(store.remove_item(ItemId::new(i as i64)));
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_add, bench_remove);
criterion_main!(benches);
