//! Snapshot timer lifecycle and analytics over recorded history

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use triage_queue::prelude::*;

const QUERY_TIMEOUT: StdDuration = StdDuration::from_secs(5);

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 6, 10, 0, 0).unwrap()
}

async fn store() -> Arc<dyn CaseStore> {
    Arc::new(SqliteCaseStore::in_memory().await.unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timer_records_until_stopped() {
    let store = store().await;
    let snapshots = SnapshotScheduler::new(
        store.clone(),
        Arc::new(SystemClock),
        StdDuration::from_millis(40),
        QUERY_TIMEOUT,
    );

    assert!(!snapshots.is_running());
    assert!(snapshots.start());
    assert!(!snapshots.start(), "second start must be a no-op");
    assert!(snapshots.is_running());

    tokio::time::sleep(StdDuration::from_millis(300)).await;
    assert!(snapshots.stop().await);
    assert!(!snapshots.stop().await, "second stop must be a no-op");
    assert!(!snapshots.is_running());

    let recorded = store.get_snapshot_history(100).await.unwrap().len();
    assert!(recorded >= 2, "expected several snapshots, got {recorded}");

    // No dangling timer after stop
    tokio::time::sleep(StdDuration::from_millis(150)).await;
    assert_eq!(store.get_snapshot_history(100).await.unwrap().len(), recorded);

    // Restart works after a stop
    assert!(snapshots.start());
    assert!(snapshots.stop().await);
}

#[tokio::test]
async fn test_first_tick_is_skipped() {
    let store = store().await;
    let snapshots = SnapshotScheduler::new(
        store.clone(),
        Arc::new(SystemClock),
        StdDuration::from_secs(3600),
        QUERY_TIMEOUT,
    );

    snapshots.start();
    tokio::time::sleep(StdDuration::from_millis(50)).await;
    snapshots.stop().await;

    assert!(store.get_snapshot_history(10).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_snapshots_each_append_one_row() {
    let store = store().await;
    let clock = ManualClock::new(start());
    let scheduler = QueueScheduler::with_clock(store.clone(), &QueueEngineConfig::in_memory(), Arc::new(clock.clone()))
        .await
        .unwrap();
    for i in 0..5 {
        scheduler
            .add_case(NewCase::new(format!("case-{i}"), "HIGH", "requester", "eviction"))
            .await
            .unwrap();
    }
    scheduler.assign_case("case-0", "r1").await.unwrap();

    let snapshots = Arc::new(SnapshotScheduler::new(
        store.clone(),
        Arc::new(clock.clone()),
        StdDuration::from_secs(3600),
        QUERY_TIMEOUT,
    ));
    let runs: Vec<_> = (0..8)
        .map(|_| {
            let snapshots = snapshots.clone();
            tokio::spawn(async move { snapshots.run_once().await })
        })
        .collect();
    for run in runs {
        run.await.unwrap().unwrap();
    }

    let history = store.get_snapshot_history(100).await.unwrap();
    assert_eq!(history.len(), 8);
    for snapshot in history {
        assert_eq!(snapshot.total_cases, 5);
        assert_eq!(snapshot.active_cases, 4);
        assert_eq!(snapshot.resolved_cases, 1);
        assert_eq!(snapshot.active_by_priority.high, 4);
    }
}

#[tokio::test]
async fn test_engine_analytics_report() {
    let clock = ManualClock::new(start());
    let mut config = QueueEngineConfig::in_memory();
    config.snapshots.enabled = false;
    config.snapshots.history_limit = 2;

    let engine = TriageEngine::with_clock(config, Arc::new(clock.clone())).await.unwrap();
    assert!(!engine.snapshots().is_running());
    let queue = engine.scheduler();

    // Empty queue: nothing to average
    let report = engine.analytics().report().await.unwrap();
    assert_eq!(report.live.total_active, 0);
    assert_eq!(report.live.wait.average_minutes, None);
    assert!(report.live.bottlenecks.is_empty());
    assert!(report.snapshot_history.is_empty());

    queue.add_case(NewCase::new("p1", "URGENT", "u1", "police")).await.unwrap();
    queue.add_case(NewCase::new("e1", "HIGH", "u2", "eviction")).await.unwrap();
    clock.advance(Duration::minutes(20));
    queue.add_case(NewCase::new("c1", "MEDIUM", "u3", "court")).await.unwrap();
    queue.add_case(NewCase::new("i1", "MEDIUM", "u4", "immigration")).await.unwrap();
    clock.advance(Duration::minutes(10));

    queue.assign_case("p1", "lawyer-a").await.unwrap();
    clock.advance(Duration::minutes(15));
    queue.complete_case("p1").await.unwrap();

    for _ in 0..3 {
        engine.snapshots().run_once().await.unwrap();
        clock.advance(Duration::minutes(1));
    }

    let report = engine.analytics().report().await.unwrap();
    assert_eq!(report.live.total_active, 3);
    assert_eq!(report.live.by_priority.medium, 2);
    assert_eq!(report.live.situation_distribution.get("eviction"), Some(&1));

    let leaders: Vec<&str> = report
        .live
        .bottlenecks
        .iter()
        .map(|b| b.situation_type.as_str())
        .collect();
    assert_eq!(leaders, vec!["eviction", "court", "immigration"]);

    assert_eq!(report.snapshot_history.len(), 2);
    assert!(report.snapshot_history[0].taken_at > report.snapshot_history[1].taken_at);

    assert_eq!(report.responder_performance.len(), 1);
    assert_eq!(report.responder_performance[0].responder_id, "lawyer-a");
    assert_eq!(report.responder_performance[0].avg_resolution_minutes, Some(15.0));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["total_active"], 3);

    engine.shutdown().await;
}
