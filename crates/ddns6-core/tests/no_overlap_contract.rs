//! Architectural Contract Test: No Overlap
//!
//! No two invocations of the same job's task are ever active concurrently,
//! even when the task runs longer than the interval. Late ticks are skipped,
//! not queued.

mod common;

use ddns6_core::scheduler::{JobState, Scheduler, TaskFn};
use ddns6_core::SchedulerConfig;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test]
async fn slow_task_never_overlaps_itself() {
    let (scheduler, _err_rx) = Scheduler::new(SchedulerConfig::default()).unwrap();

    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));
    let entries = Arc::new(AtomicUsize::new(0));

    let task: TaskFn = {
        let active = Arc::clone(&active);
        let max_active = Arc::clone(&max_active);
        let entries = Arc::clone(&entries);
        Arc::new(move |_ctx| {
            let active = Arc::clone(&active);
            let max_active = Arc::clone(&max_active);
            let entries = Arc::clone(&entries);
            Box::pin(async move {
                entries.fetch_add(1, Ordering::SeqCst);
                let now_active = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_active.fetch_max(now_active, Ordering::SeqCst);

                // Runs three times longer than the interval.
                tokio::time::sleep(Duration::from_millis(120)).await;

                active.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
        })
    };

    scheduler
        .add_job("slow", Duration::from_millis(40), task)
        .unwrap();

    tokio::time::sleep(Duration::from_millis(550)).await;
    scheduler.graceful_shutdown().await;

    let entered = entries.load(Ordering::SeqCst);
    assert_eq!(
        max_active.load(Ordering::SeqCst),
        1,
        "concurrent entries of the same task must never exceed 1"
    );
    assert!(entered >= 2, "the job should have fired repeatedly, got {entered}");
    // 550ms / 40ms = ~13 ticks; a 120ms task allows at most ~5 executions.
    // Anything close to the raw tick count would mean skipped ticks were
    // queued instead of dropped.
    assert!(
        entered <= 6,
        "skipped ticks must not be queued, got {entered} executions"
    );
}

#[tokio::test]
async fn fast_task_runs_once_per_tick() {
    let (scheduler, _err_rx) = Scheduler::new(SchedulerConfig::default()).unwrap();

    let entries = Arc::new(AtomicUsize::new(0));
    let task: TaskFn = {
        let entries = Arc::clone(&entries);
        Arc::new(move |_ctx| {
            let entries = Arc::clone(&entries);
            Box::pin(async move {
                entries.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    };

    scheduler
        .add_job("fast", Duration::from_millis(30), task)
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    scheduler.graceful_shutdown().await;

    let entered = entries.load(Ordering::SeqCst);
    // First invocation one full interval after registration, then roughly
    // one per tick.
    assert!(
        (3..=8).contains(&entered),
        "expected about one execution per tick, got {entered}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn update_job_never_races_a_running_execution() {
    let (scheduler, _err_rx) = Scheduler::new(SchedulerConfig::default()).unwrap();

    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));

    let task: TaskFn = {
        let active = Arc::clone(&active);
        let max_active = Arc::clone(&max_active);
        Arc::new(move |_ctx| {
            let active = Arc::clone(&active);
            let max_active = Arc::clone(&max_active);
            Box::pin(async move {
                let now_active = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_active.fetch_max(now_active, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(8)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
        })
    };

    scheduler
        .add_job("hammered", Duration::from_millis(1), task)
        .unwrap();

    // Hammer updates whenever the job looks idle. The state can flip to
    // Running between the read and the update call, so a racy update path
    // would let the old loop start one more task alongside the fresh one.
    let deadline = tokio::time::Instant::now() + Duration::from_millis(400);
    while tokio::time::Instant::now() < deadline {
        if scheduler.job_state("hammered") == Some(JobState::Idle) {
            let _ = scheduler.update_job("hammered", Duration::from_millis(1), None);
        }
        tokio::task::yield_now().await;
    }

    scheduler.graceful_shutdown().await;

    assert_eq!(
        max_active.load(Ordering::SeqCst),
        1,
        "an update must never race a running execution of the same job"
    );
}
