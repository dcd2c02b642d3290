mod common;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_test::assert_ok;

use common::{context, fakes, idle_browser, test_config, Behaviour, FakeAdapter};
use live_ingestion::adapters::FetchOutcome;
use live_ingestion::model::Sport;
use live_ingestion::scheduler::Scheduler;
use live_ingestion::shutdown::Shutdown;
use live_ingestion::store::MemoryStore;

fn scheduler(store: &MemoryStore, adapters: Vec<Arc<FakeAdapter>>, sports: &str) -> Scheduler {
    let config = test_config(&[("SPORTS", sports), ("TICK_INTERVAL_MS", "50")]);
    Scheduler::new(context(config, store.clone(), idle_browser(), fakes(adapters)))
}

#[tokio::test]
async fn primary_adapter_copy_wins() {
    let store = MemoryStore::new();
    let primary = FakeAdapter::returning("a", &[Sport::Cricket], &[("sf_42", "1.8")]);
    let fallback = FakeAdapter::returning("b", &[Sport::Cricket], &[("sf_42", "2.0"), ("sf_43", "3.1")]);
    let sched = scheduler(&store, vec![primary, fallback], "cricket");

    let report = sched.run_tick(Sport::Cricket).await;
    assert_eq!(report.merged, 2);
    assert_eq!(report.duplicates, 1);

    let row = store.row(Sport::Cricket, "sf_42").await.unwrap();
    assert_eq!(row.home_odds.as_deref(), Some("1.8"));
    assert_eq!(store.count(Sport::Cricket).await, 2);
}

#[tokio::test]
async fn failing_adapters_do_not_starve_siblings() {
    let store = MemoryStore::new();
    let broken = FakeAdapter::new("broken", &[Sport::Football], Behaviour::Fail);
    let buggy = FakeAdapter::new("buggy", &[Sport::Football], Behaviour::Panic);
    let healthy = FakeAdapter::returning("ok", &[Sport::Football], &[("s24_1", "1.5"), ("s24_2", "1.9")]);
    let sched = scheduler(&store, vec![broken, buggy, healthy.clone()], "football");

    let report = sched.run_tick(Sport::Football).await;
    assert!(matches!(report.fetches[0].1, FetchOutcome::Failed(_)));
    assert_eq!(report.fetches[1].1, FetchOutcome::Panicked);
    assert_eq!(report.fetches[2].1, FetchOutcome::Ok(2));
    assert_eq!(report.fetched(), 2);
    assert_eq!(store.count(Sport::Football).await, 2);
    assert_eq!(healthy.calls(), 1);
}

#[tokio::test]
async fn hung_adapter_is_cut_off_at_its_deadline() {
    let store = MemoryStore::new();
    let hung = FakeAdapter::new("hung", &[Sport::Tennis], Behaviour::Hang);
    let healthy = FakeAdapter::returning("ok", &[Sport::Tennis], &[("s24_9", "1.2")]);
    let config = test_config(&[("SPORTS", "tennis"), ("JSON_API_TIMEOUT_SECS", "1")]);
    let sched = Scheduler::new(context(config, store.clone(), idle_browser(), fakes(vec![hung, healthy])));

    let report = sched.run_tick(Sport::Tennis).await;
    assert_eq!(report.fetches[0].1, FetchOutcome::TimedOut);
    assert_eq!(store.count(Sport::Tennis).await, 1);
}

#[tokio::test]
async fn upsert_failure_is_confined_to_its_sport() {
    let store = MemoryStore::new();
    store.fail_sport(Sport::Football).await;
    let adapter = FakeAdapter::returning("a", &[Sport::Football, Sport::Cricket], &[("sf_1", "1.4")]);
    let sched = scheduler(&store, vec![adapter], "football,cricket");

    let reports = sched.run_once().await;
    assert_eq!(reports.len(), 2);
    let football = reports.iter().find(|r| r.sport == Sport::Football).unwrap();
    let cricket = reports.iter().find(|r| r.sport == Sport::Cricket).unwrap();
    assert!(football.failure.is_some());
    assert!(football.upserted.is_none());
    assert!(cricket.failure.is_none());
    assert_eq!(cricket.upserted.map(|c| c.inserted), Some(1));
    assert_eq!(store.count(Sport::Football).await, 0);
    assert_eq!(store.count(Sport::Cricket).await, 1);
}

#[tokio::test]
async fn stuck_rows_are_reported_after_upsert() {
    let store = MemoryStore::new();
    let adapter = FakeAdapter::returning("a", &[Sport::Cricket], &[("sf_1", "1.4"), ("sf_2", "1.6")]);
    let sched = scheduler(&store, vec![adapter], "cricket");
    sched.run_tick(Sport::Cricket).await;

    // A row this tick no longer refreshes.
    store
        .set_last_updated(Sport::Cricket, "sf_1", Utc::now() - chrono::Duration::minutes(12))
        .await;
    let quiet = FakeAdapter::returning("a", &[Sport::Cricket], &[("sf_2", "1.6")]);
    let sched = scheduler(&store, vec![quiet], "cricket");
    let report = sched.run_tick(Sport::Cricket).await;
    assert_eq!(report.stuck, vec!["sf_1".to_string()]);
}

#[tokio::test]
async fn sports_without_adapters_are_not_polled() {
    let store = MemoryStore::new();
    let adapter = FakeAdapter::returning("a", &[Sport::Cricket], &[]);
    let sched = scheduler(&store, vec![adapter], "cricket,snooker");
    assert_eq!(sched.sports(), vec![Sport::Cricket]);
}

#[tokio::test]
async fn loop_ticks_until_shutdown() {
    let store = MemoryStore::new();
    let adapter = FakeAdapter::returning("a", &[Sport::Cricket, Sport::Football], &[("sf_1", "1.4")]);
    let config = test_config(&[
        ("SPORTS", "cricket,football"),
        ("TICK_INTERVAL_MS", "50"),
        ("SHUTDOWN_GRACE_SECS", "2"),
    ]);
    let ctx = context(config, store.clone(), idle_browser(), fakes(vec![adapter.clone()]));
    let health = ctx.health.clone();
    let sched = Arc::new(Scheduler::new(ctx));

    let shutdown = Shutdown::new();
    let running = tokio::spawn(Arc::clone(&sched).run(shutdown.subscribe()));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(health.is_running());
    shutdown.trigger();
    assert_ok!(tokio::time::timeout(Duration::from_secs(5), running).await);

    assert!(!health.is_running());
    assert!(adapter.calls() >= 4, "expected repeated ticks, got {}", adapter.calls());
    assert_eq!(store.count(Sport::Cricket).await, 1);
    assert_eq!(store.count(Sport::Football).await, 1);
}

fn looping(store: &MemoryStore, adapter: &Arc<FakeAdapter>, settings: &[(&str, &str)]) -> Arc<Scheduler> {
    let config = test_config(settings);
    Arc::new(Scheduler::new(context(config, store.clone(), idle_browser(), fakes(vec![adapter.clone()]))))
}

fn gaps(starts: &[Instant]) -> Vec<Duration> {
    starts.windows(2).map(|w| w[1] - w[0]).collect()
}

#[tokio::test]
async fn overrunning_tick_is_followed_at_once_without_backlog() {
    let store = MemoryStore::new();
    let rows = vec![("sf_1".to_string(), "1.4".to_string())];
    let adapter = FakeAdapter::new("slow", &[Sport::Cricket], Behaviour::Slow(Duration::from_millis(200), rows));
    let sched = looping(
        &store,
        &adapter,
        &[("SPORTS", "cricket"), ("TICK_INTERVAL_MS", "50"), ("SHUTDOWN_GRACE_SECS", "2")],
    );

    let shutdown = Shutdown::new();
    let running = tokio::spawn(Arc::clone(&sched).run(shutdown.subscribe()));
    tokio::time::sleep(Duration::from_millis(700)).await;
    shutdown.trigger();
    assert_ok!(tokio::time::timeout(Duration::from_secs(5), running).await);

    let starts = adapter.started();
    assert!((3..=4).contains(&starts.len()), "ticks: {}", starts.len());
    for gap in gaps(&starts) {
        // Never two ticks at once, never a sleep after an overrun.
        assert!(gap >= Duration::from_millis(200), "gap {:?}", gap);
        assert!(gap < Duration::from_millis(320), "gap {:?}", gap);
    }
}

#[tokio::test]
async fn quick_ticks_wait_for_the_interval() {
    let store = MemoryStore::new();
    let adapter = FakeAdapter::returning("a", &[Sport::Cricket], &[("sf_1", "1.4")]);
    let sched = looping(&store, &adapter, &[("SPORTS", "cricket"), ("TICK_INTERVAL_MS", "200")]);

    let shutdown = Shutdown::new();
    let running = tokio::spawn(Arc::clone(&sched).run(shutdown.subscribe()));
    tokio::time::sleep(Duration::from_millis(650)).await;
    shutdown.trigger();
    assert_ok!(tokio::time::timeout(Duration::from_secs(5), running).await);

    let starts = adapter.started();
    assert!((3..=4).contains(&starts.len()), "ticks: {}", starts.len());
    for gap in gaps(&starts) {
        assert!(gap >= Duration::from_millis(195), "gap {:?}", gap);
    }
}

#[tokio::test]
async fn hung_tick_is_aborted_when_the_grace_window_expires() {
    let store = MemoryStore::new();
    let adapter = FakeAdapter::new("hung", &[Sport::Cricket], Behaviour::Hang);
    let config = test_config(&[
        ("SPORTS", "cricket"),
        ("JSON_API_TIMEOUT_SECS", "60"),
        ("SHUTDOWN_GRACE_SECS", "1"),
    ]);
    let ctx = context(config, store.clone(), idle_browser(), fakes(vec![adapter.clone()]));
    let health = ctx.health.clone();
    let sched = Arc::new(Scheduler::new(ctx));

    let shutdown = Shutdown::new();
    let running = tokio::spawn(Arc::clone(&sched).run(shutdown.subscribe()));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(adapter.calls(), 1);

    let stopping = Instant::now();
    shutdown.trigger();
    assert_ok!(tokio::time::timeout(Duration::from_secs(3), running).await);
    let took = stopping.elapsed();
    assert!(took >= Duration::from_millis(900), "returned before the grace window: {:?}", took);
    assert!(took < Duration::from_secs(2), "abort took {:?}", took);
    assert!(!health.is_running());
    assert_eq!(store.count(Sport::Cricket).await, 0);
}
