//! Sync cycles and the scheduler against a scripted contact source.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;

use common::{contact, labels, pipeline, FakeSource};
use tagsync::cache::{BuildError, CacheUnavailable};
use tagsync::sync::{CycleError, Scheduler};
use tagsync::upstream::FetchError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn nothing_is_served_before_the_first_cycle() {
    let source = FakeSource::with_contacts(vec![contact(1, json!("1023"), labels(&["Laser"]))]);
    let pipeline = pipeline(source, FETCH_TIMEOUT);
    let reader = pipeline.reader();

    assert_eq!(reader.current().unwrap_err(), CacheUnavailable);

    let report = pipeline.run_cycle().await.unwrap();
    assert_eq!(report.generation, 1);
    assert_eq!(report.door_entries, 1);
    assert_eq!(report.machine_entries, 1);
    assert_eq!(report.reconcile.members_written, 1);

    let snap = reader.current().unwrap();
    assert_eq!(snap.door()[&1023].as_deref(), Some("Full"));
}

#[tokio::test]
async fn failed_fetch_keeps_previous_snapshot() {
    let source = FakeSource::with_contacts(vec![contact(1, json!("1023"), labels(&["Laser"]))]);
    let pipeline = pipeline(Arc::clone(&source), FETCH_TIMEOUT);
    let reader = pipeline.reader();

    pipeline.run_cycle().await.unwrap();
    let before = reader.current().unwrap();
    let door = before.door_json().to_vec();
    let machine = before.machine_json().to_vec();

    source.set_failing(true);
    let err = pipeline.run_cycle().await.unwrap_err();
    assert!(matches!(err, CycleError::Fetch(FetchError::Other(_))), "got {err:?}");

    let after = reader.current().unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.generation(), 1);
    assert_eq!(after.door_json(), door.as_slice());
    assert_eq!(after.machine_json(), machine.as_slice());

    // Recovery on the next cycle.
    source.set_failing(false);
    assert_eq!(pipeline.run_cycle().await.unwrap().generation, 2);
}

/// Runs one good cycle, lets `sabotage` break the store, then checks that the
/// next cycle fails with neither the store nor the published caches changed.
async fn assert_failed_cycle_changes_nothing(
    sabotage: &str,
    expect: fn(&CycleError) -> bool,
) {
    let source = FakeSource::with_contacts(vec![contact(1, json!("10"), labels(&["Laser"]))]);
    let pipeline = pipeline(Arc::clone(&source), FETCH_TIMEOUT);
    let reader = pipeline.reader();
    pipeline.run_cycle().await.unwrap();

    pipeline.with_store(|s| s.connection().execute_batch(sabotage).unwrap());
    let rows_before = pipeline.with_store(|s| s.read_contents().unwrap());
    let before = reader.current().unwrap();
    let door = before.door_json().to_vec();
    let machine = before.machine_json().to_vec();

    source.set_contacts(vec![
        contact(1, json!("10"), labels(&["Lathe"])),
        contact(2, json!("20"), labels(&["Laser"])),
    ]);
    let err = pipeline.run_cycle().await.unwrap_err();
    assert!(expect(&err), "got {err:?}");

    let after = reader.current().unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.door_json(), door.as_slice());
    assert_eq!(after.machine_json(), machine.as_slice());
    assert_eq!(pipeline.with_store(|s| s.read_contents().unwrap()), rows_before);
    assert_eq!(pipeline.with_store(|s| s.member(2).unwrap()), None);
}

#[tokio::test]
async fn store_error_keeps_store_and_snapshot() {
    assert_failed_cycle_changes_nothing(
        "CREATE TRIGGER no_links BEFORE INSERT ON membership_trainings \
         BEGIN SELECT RAISE(ABORT, 'links frozen'); END;",
        |e| matches!(e, CycleError::Persistence(_)),
    )
    .await;
}

#[tokio::test]
async fn build_error_keeps_store_and_snapshot() {
    assert_failed_cycle_changes_nothing(
        "INSERT INTO trainings VALUES ('Ghost');
         INSERT INTO membership_trainings VALUES (999, 'Ghost');",
        |e| matches!(e, CycleError::Build(BuildError::OrphanLink { tag_id: 999, .. })),
    )
    .await;
}

#[tokio::test]
async fn slow_fetch_times_out() {
    let source = FakeSource::with_contacts(vec![contact(1, json!("1023"), labels(&[]))]);
    source.set_delay(Some(Duration::from_millis(500)));
    let pipeline = pipeline(source, Duration::from_millis(50));

    let err = pipeline.run_cycle().await.unwrap_err();
    assert!(matches!(err, CycleError::Fetch(FetchError::Timeout(_))), "got {err:?}");
    assert!(pipeline.reader().current().is_err());
    assert_eq!(pipeline.with_store(|s| s.member_count().unwrap()), 0);
}

#[tokio::test]
async fn tag_change_moves_access_to_the_new_tag() {
    let source = FakeSource::with_contacts(vec![contact(1, json!("100"), labels(&["Laser"]))]);
    let pipeline = pipeline(Arc::clone(&source), FETCH_TIMEOUT);
    pipeline.run_cycle().await.unwrap();

    source.set_contacts(vec![contact(1, json!("200"), labels(&["Laser"]))]);
    let report = pipeline.run_cycle().await.unwrap();
    assert_eq!(report.reconcile.stale_tags_cleared, 1);

    let snap = pipeline.reader().current().unwrap();
    assert!(!snap.door().contains_key(&100));
    assert!(!snap.machine().contains_key(&100));
    assert_eq!(snap.machine()[&200].iter().collect::<Vec<_>>(), vec!["Laser"]);
}

#[tokio::test]
async fn tick_during_running_cycle_is_dropped() {
    let source = FakeSource::with_contacts(vec![contact(1, json!("1023"), labels(&[]))]);
    source.set_delay(Some(Duration::from_millis(200)));
    let scheduler = Scheduler::new(
        Arc::new(pipeline(Arc::clone(&source), FETCH_TIMEOUT)),
        Duration::from_secs(3600),
    );

    let first = scheduler.try_start_cycle().expect("first cycle starts");
    assert!(scheduler.is_cycle_running());
    assert!(scheduler.try_start_cycle().is_none());

    first.await.unwrap().unwrap();
    assert!(!scheduler.is_cycle_running());
    assert_eq!(source.calls(), 1);

    // Guard is free again once the cycle is done.
    scheduler.try_start_cycle().expect("guard released").await.unwrap().unwrap();
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn scheduler_syncs_at_startup_and_stops_on_shutdown() {
    let source = FakeSource::with_contacts(vec![contact(1, json!("1023"), labels(&["Laser"]))]);
    let pipeline = Arc::new(pipeline(Arc::clone(&source), FETCH_TIMEOUT));
    let mut reader = pipeline.reader();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(Scheduler::new(pipeline, Duration::from_secs(3600)).run(shutdown_rx));

    let snap = tokio::time::timeout(Duration::from_secs(5), reader.next())
        .await
        .expect("first cycle publishes")
        .expect("publisher alive");
    assert_eq!(snap.generation(), 1);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task).await.expect("scheduler stops").unwrap();
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn ticks_during_a_slow_cycle_do_not_queue() {
    let source = FakeSource::with_contacts(vec![contact(1, json!("1023"), labels(&[]))]);
    source.set_delay(Some(Duration::from_millis(400)));
    let pipeline = Arc::new(pipeline(Arc::clone(&source), FETCH_TIMEOUT));
    let reader = pipeline.reader();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(Scheduler::new(pipeline, Duration::from_millis(50)).run(shutdown_rx));

    // Several ticks fire while the first fetch is still sleeping.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(source.calls(), 1);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task).await.expect("scheduler stops").unwrap();

    // Shutdown waited for the in-flight cycle; no dropped tick ran later.
    assert_eq!(source.calls(), 1);
    assert_eq!(reader.current().unwrap().generation(), 1);
}
