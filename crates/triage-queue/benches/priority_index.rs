//! Performance benchmarks for the triage queue
//!
//! These benchmarks measure the index operations on the assignment and
//! reprioritization paths, plus end-to-end intake against in-memory SQLite.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;
use triage_queue::prelude::*;
use triage_queue::queue::PriorityIndex;

fn case(i: usize) -> CaseRecord {
    let at = Utc.with_ymd_and_hms(2024, 3, 6, 9, 0, 0).unwrap() + Duration::milliseconds(i as i64);
    CaseRecord {
        case_id: format!("case-{i:06}"),
        priority: Priority::ALL[i % 4],
        enqueued_at: at,
        ranked_at: at,
        requester_id: format!("requester-{}", i % 97),
        situation_type: "eviction".to_string(),
        metadata: serde_json::Value::Null,
        assigned_responder_id: None,
        active: true,
    }
}

/// Benchmark removal of arbitrary cases, as assignment does
fn benchmark_index_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_remove_middle");
    for size in [1_000usize, 10_000] {
        let cases: Vec<CaseRecord> = (0..size).map(case).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &cases, |b, cases| {
            b.iter_batched(
                || PriorityIndex::from_cases(cases.clone()),
                |mut index| {
                    for i in (0..size).step_by(size / 100) {
                        black_box(index.remove(&format!("case-{i:06}")));
                    }
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

/// Benchmark reprioritization
fn benchmark_index_reinsert(c: &mut Criterion) {
    let cases: Vec<CaseRecord> = (0..10_000).map(case).collect();
    let later = Utc.with_ymd_and_hms(2024, 3, 6, 12, 0, 0).unwrap();

    c.bench_function("index_reinsert_10k", |b| {
        b.iter_batched(
            || PriorityIndex::from_cases(cases.clone()),
            |mut index| {
                for i in (0..10_000).step_by(100) {
                    black_box(index.reinsert(&format!("case-{i:06}"), Priority::Urgent, later));
                }
            },
            criterion::BatchSize::LargeInput,
        );
    });
}

/// Benchmark intake through the scheduler with durable writes
fn benchmark_scheduler_add(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let scheduler = rt.block_on(async {
        let store: Arc<dyn CaseStore> = Arc::new(SqliteCaseStore::in_memory().await.unwrap());
        QueueScheduler::new(store, &QueueEngineConfig::in_memory()).await.unwrap()
    });

    c.bench_function("scheduler_add_case", |b| {
        b.to_async(&rt).iter(|| async {
            let mut new_case = NewCase::new("unused", "HIGH", "requester", "housing");
            new_case.case_id = None;
            black_box(scheduler.add_case(new_case).await.unwrap());
        });
    });
}

criterion_group!(
    benches,
    benchmark_index_remove,
    benchmark_index_reinsert,
    benchmark_scheduler_add
);
criterion_main!(benches);
