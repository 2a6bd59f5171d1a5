//! Benchmarks for query construction and dispatch
//!
//! Run with: cargo bench

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use serde_json::json;

use malcolmdb::{Db, driver::MemoryDriver};

/// Create a database with `num_drivers` in-memory drivers, each holding `num_records` users
fn create_db(num_drivers: usize, num_records: usize) -> Db {
    let mut db = Db::new();
    for i in 0..num_drivers {
        db.add_driver(format!("memory_{i}"), MemoryDriver::new);
    }

    let records = (0..num_records)
        .map(|i| json!({"name": format!("user_{i}"), "age": i % 90, "address": {"city": "Rome"}}))
        .collect();
    db.collection("users").insert_many(records);

    db
}

/// Benchmark unlabeled selects fanned out to an increasing number of drivers
fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for num_drivers in [1, 4, 16].iter() {
        let db = create_db(*num_drivers, 1000);

        group.bench_with_input(
            BenchmarkId::new("select_adults", num_drivers),
            &db,
            |b, db| {
                b.iter(|| {
                    let result = db
                        .collection("users")
                        .select(Some(json!({"name": true})))
                        .filter(json!({"age": {"$gt": 18}}))
                        .limit(black_box(10));
                    black_box(result)
                });
            },
        );
    }

    group.finish();
}

/// Benchmark predicate evaluation over growing collections
fn bench_predicates(c: &mut Criterion) {
    let mut group = c.benchmark_group("predicates");

    for num_records in [100, 1000, 10000].iter() {
        let db = create_db(1, *num_records);

        group.bench_with_input(
            BenchmarkId::new("range_and_path", num_records),
            &db,
            |b, db| {
                b.iter(|| {
                    let result = db
                        .collection("users")
                        .select(None)
                        .filter(json!({"age": {"$between": [20, 40]}}))
                        .filter(json!({"address.city": "Rome"}))
                        .all();
                    black_box(result)
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_fan_out, bench_predicates);
criterion_main!(benches);
