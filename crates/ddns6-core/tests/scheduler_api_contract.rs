//! Architectural Contract Test: Scheduler API
//!
//! Contract violations (duplicate ids, unknown ids, mutating a busy job,
//! operating on a stopped scheduler) are rejected synchronously and never
//! disturb running jobs.

mod common;

use ddns6_core::scheduler::{JobState, Scheduler, TaskFn};
use ddns6_core::{Error, SchedulerConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn noop_task() -> TaskFn {
    Arc::new(|_ctx| Box::pin(async { Ok(()) }))
}

fn counting_task(counter: Arc<AtomicUsize>) -> TaskFn {
    Arc::new(move |_ctx| {
        let counter = Arc::clone(&counter);
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    })
}

fn sleeping_task(millis: u64) -> TaskFn {
    Arc::new(move |_ctx| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(())
        })
    })
}

/// Poll until the job reaches the wanted state or the deadline passes
async fn wait_for_state(scheduler: &Scheduler, id: &str, wanted: JobState) -> bool {
    for _ in 0..100 {
        if scheduler.job_state(id) == Some(wanted) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn duplicate_registration_is_rejected_and_harmless() {
    let (scheduler, _err_rx) = Scheduler::new(SchedulerConfig::default()).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    scheduler
        .add_job("x", Duration::from_millis(30), counting_task(Arc::clone(&calls)))
        .unwrap();

    let err = scheduler
        .add_job("x", Duration::from_millis(99), noop_task())
        .unwrap_err();
    assert!(matches!(err, Error::JobAlreadyExists(ref id) if id == "x"));

    // The original job keeps running unaffected.
    let before = calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(calls.load(Ordering::SeqCst) > before);
    assert_eq!(scheduler.job_interval("x"), Some(Duration::from_millis(30)));

    scheduler.graceful_shutdown().await;
}

#[tokio::test]
async fn unknown_job_ids_are_rejected() {
    let (scheduler, _err_rx) = Scheduler::new(SchedulerConfig::default()).unwrap();

    assert!(matches!(
        scheduler.stop_job("ghost").unwrap_err(),
        Error::JobNotFound(ref id) if id == "ghost"
    ));
    assert!(matches!(
        scheduler
            .update_job("ghost", Duration::from_secs(1), None)
            .unwrap_err(),
        Error::JobNotFound(ref id) if id == "ghost"
    ));

    scheduler.graceful_shutdown().await;
}

#[tokio::test]
async fn busy_job_cannot_be_mutated() {
    let (scheduler, _err_rx) = Scheduler::new(SchedulerConfig::default()).unwrap();

    scheduler
        .add_job("busy", Duration::from_millis(20), sleeping_task(300))
        .unwrap();
    assert!(
        wait_for_state(&scheduler, "busy", JobState::Running).await,
        "job should enter Running"
    );

    assert!(matches!(
        scheduler.stop_job("busy").unwrap_err(),
        Error::JobBusy(ref id) if id == "busy"
    ));
    assert!(matches!(
        scheduler
            .update_job("busy", Duration::from_secs(1), None)
            .unwrap_err(),
        Error::JobBusy(ref id) if id == "busy"
    ));

    scheduler.graceful_shutdown().await;
}

#[tokio::test]
async fn idle_job_can_be_updated_and_stopped() {
    let (scheduler, _err_rx) = Scheduler::new(SchedulerConfig::default()).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    scheduler
        .add_job("job", Duration::from_millis(25), counting_task(Arc::clone(&calls)))
        .unwrap();

    scheduler
        .update_job("job", Duration::from_millis(40), None)
        .unwrap();
    assert_eq!(scheduler.job_interval("job"), Some(Duration::from_millis(40)));

    // The restarted loop keeps executing the retained task.
    let before = calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(calls.load(Ordering::SeqCst) > before);

    scheduler.stop_job("job").unwrap();
    assert_eq!(scheduler.job_state("job"), None, "stop removes the job");
    assert_eq!(scheduler.job_count(), 0);

    scheduler.graceful_shutdown().await;
}

#[tokio::test]
async fn stopped_scheduler_rejects_everything() {
    let (scheduler, _err_rx) = Scheduler::new(SchedulerConfig::default()).unwrap();
    scheduler
        .add_job("job", Duration::from_millis(30), noop_task())
        .unwrap();
    scheduler.graceful_shutdown().await;

    assert!(matches!(
        scheduler
            .add_job("late", Duration::from_millis(30), noop_task())
            .unwrap_err(),
        Error::SchedulerStopped
    ));
    assert!(matches!(
        scheduler.stop_job("job").unwrap_err(),
        Error::SchedulerStopped
    ));
    assert!(matches!(
        scheduler
            .update_job("job", Duration::from_secs(1), None)
            .unwrap_err(),
        Error::SchedulerStopped
    ));
}
