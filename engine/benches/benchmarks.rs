//! Performance benchmarks for geolab-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use geolab_engine::clock::millis_to_timestamp;
use geolab_engine::{
    BulkReconciler, ChangeSet, GeoPoint, MemoryIndex, NewPerson, Person, SearchIndex, SearchQuery,
};
use std::collections::BTreeSet;

fn person(id: i64) -> Person {
    NewPerson {
        firstname: format!("First {}", id),
        lastname: format!("Last {}", id),
        address: format!("{} rue Sainte-Catherine", id),
        city: "Montréal".into(),
        postal_code: "H3B 1A7".into(),
        country: "Canada".into(),
        email: format!("person{}@example.com", id),
        phone: "514-555-0100".into(),
        location: GeoPoint::new(45.4 + (id % 100) as f64 * 0.001, -73.6 + (id % 77) as f64 * 0.001),
    }
    .into_person(id, millis_to_timestamp(1_000 + id))
}

fn bench_change_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("change_set");

    for size in [100i64, 1_000, 10_000].iter() {
        // Half the records modified, a quarter of the index orphaned
        let records: Vec<Person> = (0..*size).map(person).collect();
        let record_ids: BTreeSet<i64> = (0..*size).collect();
        let index_ids: BTreeSet<i64> = (size / 4..size + size / 4).collect();
        let watermark = millis_to_timestamp(1_000 + size / 2);

        group.bench_with_input(BenchmarkId::new("compute", size), size, |b, _| {
            b.iter(|| {
                ChangeSet::compute(
                    black_box(watermark),
                    black_box(records.clone()),
                    black_box(&record_ids),
                    black_box(&index_ids),
                )
            })
        });
    }

    group.finish();
}

fn bench_reconciliation(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconciliation");

    for size in [10i64, 100, 1_000].iter() {
        let records: Vec<Person> = (0..*size).map(person).collect();
        let record_ids: BTreeSet<i64> = (0..*size).collect();
        let index_ids: BTreeSet<i64> = (0..size * 2).collect();
        let change_set =
            ChangeSet::compute(millis_to_timestamp(0), records, &record_ids, &index_ids);

        group.bench_with_input(BenchmarkId::new("plan", size), size, |b, _| {
            b.iter(|| BulkReconciler::new().plan(black_box(&change_set)))
        });

        group.bench_with_input(BenchmarkId::new("apply_memory", size), size, |b, _| {
            b.iter(|| {
                let index = MemoryIndex::new();
                futures::executor::block_on(
                    BulkReconciler::new().apply(black_box(&index), black_box(&change_set)),
                )
            })
        });
    }

    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    let index = MemoryIndex::with_documents((0..5_000).map(|id| (id, person(id).to_document())));

    group.bench_function("text", |b| {
        let query = SearchQuery::Text {
            term: "last 42".into(),
        };
        b.iter(|| futures::executor::block_on(index.search(black_box(&query), 20)))
    });

    group.bench_function("geo", |b| {
        let query = SearchQuery::Geo {
            center: GeoPoint::new(45.45, -73.55),
            radius_m: 1_000,
        };
        b.iter(|| futures::executor::block_on(index.search(black_box(&query), 20)))
    });

    group.finish();
}

fn bench_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization");

    group.bench_function("document_to_json", |b| {
        let doc = person(1).to_document();
        b.iter(|| serde_json::to_string(black_box(&doc)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_change_set,
    bench_reconciliation,
    bench_search,
    bench_serialization,
);
criterion_main!(benches);
