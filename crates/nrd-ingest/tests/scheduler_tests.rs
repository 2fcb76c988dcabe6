//! Run lock and run-on-start behaviour

mod common;

use common::{quick_config, FakeBrowser, RecordingSink};
use nrd_ingest::pipeline::{AcquisitionPipeline, RunOutcome};
use nrd_ingest::scheduler::{ScheduledRunner, Scheduler, TriggerResult};
use std::sync::Arc;
use std::time::Duration;

fn slow_pipeline(dir: &std::path::Path, browser: &FakeBrowser) -> Arc<AcquisitionPipeline> {
    Arc::new(AcquisitionPipeline::new(
        quick_config(dir),
        Arc::new(browser.clone()),
        Arc::new(RecordingSink::lines()),
    ))
}

#[tokio::test]
async fn test_overlapping_trigger_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut browser = FakeBrowser::with_rows(Vec::new());
    browser.navigation_delay = Some(Duration::from_millis(300));

    let runner = Arc::new(ScheduledRunner::new(slow_pipeline(dir.path(), &browser)));

    let first = {
        let runner = Arc::clone(&runner);
        tokio::spawn(async move { runner.trigger().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(runner.trigger().await, TriggerResult::Skipped);
    assert_eq!(
        first.await.unwrap(),
        TriggerResult::Completed(RunOutcome::NoLinkForToday)
    );
    assert_eq!(browser.counters.launches(), 1);

    // lock is released once the run ends
    assert_eq!(
        runner.trigger().await,
        TriggerResult::Completed(RunOutcome::NoLinkForToday)
    );
}

#[tokio::test]
async fn test_failed_run_is_reported_not_propagated() {
    let dir = tempfile::tempdir().unwrap();
    let mut browser = FakeBrowser::with_rows(Vec::new());
    browser.fail_navigation = true;

    let runner = ScheduledRunner::new(slow_pipeline(dir.path(), &browser));

    assert!(matches!(runner.trigger().await, TriggerResult::Failed(_)));
    // next trigger is unaffected
    assert!(matches!(runner.trigger().await, TriggerResult::Failed(_)));
    assert_eq!(browser.counters.closes(), 2);
}

#[tokio::test]
async fn test_invalid_cadence_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let browser = FakeBrowser::default();

    assert!(Scheduler::new(slow_pipeline(dir.path(), &browser), "every day").is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_on_start_triggers_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let browser = FakeBrowser::default();

    let scheduler = Scheduler::new(slow_pipeline(dir.path(), &browser), "0 0 1 1 *")
        .unwrap()
        .run_on_start(true);
    assert_eq!(scheduler.cadence(), "0 0 0 1 1 *");

    let mut sched = scheduler.start().await.unwrap();

    let mut waited = Duration::ZERO;
    while browser.counters.closes() == 0 && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += Duration::from_millis(20);
    }

    assert_eq!(browser.counters.launches(), 1);
    sched.shutdown().await.unwrap();
}
