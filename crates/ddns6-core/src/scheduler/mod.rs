//! Concurrent task scheduler
//!
//! The scheduler owns a set of named, recurring jobs. Each job runs on its
//! own tokio task, driven by its own timer; the scheduler itself never
//! busy-polls.
//!
//! ## Per-job state machine
//!
//! ```text
//!            tick fires            task returns
//!   Idle ──────────────► Running ──────────────► Idle
//!    │                                            │
//!    │ cancel / scheduler stop                    │
//!    ▼                                            ▼
//!  Stopping ──────────────────────────────────► Stopped
//! ```
//!
//! A tick that finds the job not `Idle` is skipped, never queued. This is
//! the no-overlap guarantee: a slow task cannot race a second invocation of
//! itself. Task errors and recovered panics are published to a bounded error
//! channel; they never terminate the job or its siblings.

use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Future returned by a task function
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// A task function: invoked once per tick with the job's cancellation context
pub type TaskFn = Arc<dyn Fn(JobContext) -> TaskFuture + Send + Sync>;

/// Run state of a job, stored as an atomic for compare-and-swap transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JobState {
    /// Waiting for the next tick or cancellation
    Idle = 0,
    /// Task executing
    Running = 1,
    /// Cancellation observed, loop exiting
    Stopping = 2,
    /// Terminal
    Stopped = 3,
}

impl JobState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => JobState::Idle,
            1 => JobState::Running,
            2 => JobState::Stopping,
            _ => JobState::Stopped,
        }
    }
}

/// Cancellation context handed to every task invocation
///
/// Cancellation is cooperative: the job loop only observes it at tick
/// boundaries, but a long-running task can poll [`JobContext::is_cancelled`]
/// or await [`JobContext::cancelled`] to bail out early.
#[derive(Clone)]
pub struct JobContext {
    cancel: watch::Receiver<bool>,
}

impl JobContext {
    /// Whether cancellation has been signalled
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolve once cancellation is signalled
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            // A closed channel means the job is gone; treat as cancelled.
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// A context not tied to any scheduler job, plus its cancellation handle
    ///
    /// Useful for invoking a task function directly, as in one-shot runs
    /// and tests. Send `true` on the returned handle to cancel.
    pub fn standalone() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { cancel: rx })
    }
}

/// A registered job. Exclusively owned by the registry; its run loop holds
/// clones of the state cell and cancellation receiver.
struct Job {
    interval: Duration,
    task: TaskFn,
    state: Arc<AtomicU8>,
    cancel_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

/// Concurrent task scheduler
///
/// Create with [`Scheduler::new`], which also hands back the read side of
/// the error stream. All mutation methods are synchronous and safe to call
/// concurrently; operations on the same job id are serialized by requiring
/// the job to be `Idle`.
pub struct Scheduler {
    jobs: RwLock<HashMap<String, Job>>,
    /// Strong sender kept until shutdown; job loops hold weak clones so the
    /// stream closes as soon as shutdown drops this and the loops exit.
    err_tx: Mutex<Option<mpsc::Sender<Error>>>,
    stop_tx: watch::Sender<bool>,
    stopped: AtomicBool,
    shutdown_timeout: Duration,
}

impl Scheduler {
    /// Create a scheduler and the receiving end of its error stream
    ///
    /// Every task failure and recovered panic is published to the returned
    /// receiver, wrapped in an error identifying the job id. The channel is
    /// bounded; when the consumer falls behind, new errors are dropped with
    /// a warning. The stream closes after [`Scheduler::graceful_shutdown`].
    pub fn new(config: SchedulerConfig) -> Result<(Self, mpsc::Receiver<Error>)> {
        config.validate()?;

        let (err_tx, err_rx) = mpsc::channel(config.error_channel_capacity);
        let (stop_tx, _) = watch::channel(false);

        let scheduler = Self {
            jobs: RwLock::new(HashMap::new()),
            err_tx: Mutex::new(Some(err_tx)),
            stop_tx,
            stopped: AtomicBool::new(false),
            shutdown_timeout: config.shutdown_timeout(),
        };

        Ok((scheduler, err_rx))
    }

    /// Register a new job and start its run loop
    ///
    /// The first invocation happens one full `interval` after registration.
    ///
    /// # Errors
    ///
    /// - [`Error::SchedulerStopped`] after shutdown has begun
    /// - [`Error::InvalidInterval`] for a zero interval
    /// - [`Error::JobAlreadyExists`] if the id is taken
    pub fn add_job(&self, id: impl Into<String>, interval: Duration, task: TaskFn) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(Error::SchedulerStopped);
        }
        if interval.is_zero() {
            return Err(Error::InvalidInterval);
        }

        let id = id.into();
        let mut jobs = self.jobs.write().expect("job registry lock poisoned");
        if jobs.contains_key(&id) {
            return Err(Error::JobAlreadyExists(id));
        }

        let job = self.spawn_job(id.clone(), interval, task);
        jobs.insert(id.clone(), job);
        debug!(job_id = %id, ?interval, "job added");
        Ok(())
    }

    /// Replace a job's interval and (optionally) its task function
    ///
    /// The old run loop is cancelled and a fresh loop is started with the
    /// new settings. Only an `Idle` job can be updated; a running execution
    /// is never raced.
    ///
    /// # Errors
    ///
    /// - [`Error::SchedulerStopped`] after shutdown has begun
    /// - [`Error::InvalidInterval`] for a zero interval
    /// - [`Error::JobNotFound`] if the id is unknown
    /// - [`Error::JobBusy`] if the job is not idle
    pub fn update_job(&self, id: &str, interval: Duration, task: Option<TaskFn>) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(Error::SchedulerStopped);
        }
        if interval.is_zero() {
            return Err(Error::InvalidInterval);
        }

        let mut jobs = self.jobs.write().expect("job registry lock poisoned");
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;

        // Latch the old cell out of Idle with a CAS, like `stop_job`. A
        // plain read would leave a window where a pending tick still wins
        // the Idle -> Running exchange on the old loop and runs one more
        // task concurrently with the replacement loop.
        if job
            .state
            .compare_exchange(
                JobState::Idle as u8,
                JobState::Stopping as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return Err(Error::JobBusy(id.to_string()));
        }

        // Stop the old loop; it exits at its next select point. The fresh
        // loop gets its own state cell so a late `Stopped` store from the
        // old loop cannot clobber the restarted job.
        let _ = job.cancel_tx.send(true);
        let task = task.unwrap_or_else(|| Arc::clone(&job.task));
        let replacement = self.spawn_job(id.to_string(), interval, task);
        *job = replacement;

        info!(job_id = %id, ?interval, "job updated");
        Ok(())
    }

    /// Stop a job and remove it from the registry
    ///
    /// # Errors
    ///
    /// - [`Error::SchedulerStopped`] after shutdown has begun
    /// - [`Error::JobNotFound`] if the id is unknown
    /// - [`Error::JobBusy`] if the job is not idle
    pub fn stop_job(&self, id: &str) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(Error::SchedulerStopped);
        }

        let mut jobs = self.jobs.write().expect("job registry lock poisoned");
        let job = jobs
            .get(id)
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;

        if job
            .state
            .compare_exchange(
                JobState::Idle as u8,
                JobState::Stopping as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return Err(Error::JobBusy(id.to_string()));
        }

        let _ = job.cancel_tx.send(true);
        jobs.remove(id);
        info!(job_id = %id, "job stopped");
        Ok(())
    }

    /// Current run state of a job, if registered
    pub fn job_state(&self, id: &str) -> Option<JobState> {
        self.jobs
            .read()
            .expect("job registry lock poisoned")
            .get(id)
            .map(|job| JobState::from_u8(job.state.load(Ordering::SeqCst)))
    }

    /// Configured interval of a job, if registered
    pub fn job_interval(&self, id: &str) -> Option<Duration> {
        self.jobs
            .read()
            .expect("job registry lock poisoned")
            .get(id)
            .map(|job| job.interval)
    }

    /// Number of registered jobs
    pub fn job_count(&self) -> usize {
        self.jobs.read().expect("job registry lock poisoned").len()
    }

    /// Stop every job and wait (bounded) for all run loops to exit
    ///
    /// Idempotent and terminal: the first call shuts down, later calls
    /// return immediately, and no further jobs are accepted afterwards.
    /// Jobs are left in the registry in `Stopped` state for observability.
    /// If loops are still running when the timeout elapses, shutdown
    /// proceeds anyway with a warning. Finally the error stream is closed.
    pub async fn graceful_shutdown(&self) {
        if self
            .stopped
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        info!("scheduler shutting down");
        let _ = self.stop_tx.send(true);

        let handles: Vec<JoinHandle<()>> = {
            let mut jobs = self.jobs.write().expect("job registry lock poisoned");
            jobs.values_mut().filter_map(|job| job.handle.take()).collect()
        };

        let join_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };

        match tokio::time::timeout(self.shutdown_timeout, join_all).await {
            Ok(()) => info!("all jobs stopped"),
            Err(_) => warn!(
                timeout = ?self.shutdown_timeout,
                "graceful shutdown timed out with job loops still running"
            ),
        }

        // Dropping the last strong sender closes the error stream once the
        // consumer drains what is buffered.
        self.err_tx.lock().expect("error sender lock poisoned").take();
    }

    fn spawn_job(&self, id: String, interval: Duration, task: TaskFn) -> Job {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let state = Arc::new(AtomicU8::new(JobState::Idle as u8));

        let err_tx = self
            .err_tx
            .lock()
            .expect("error sender lock poisoned")
            .as_ref()
            .map(|tx| tx.downgrade());

        let runner = JobRunner {
            id,
            interval,
            task: Arc::clone(&task),
            state: Arc::clone(&state),
            cancel_rx,
            stop_rx: self.stop_tx.subscribe(),
            err_tx,
        };

        let handle = tokio::spawn(runner.run());

        Job {
            interval,
            task,
            state,
            cancel_tx,
            handle: Some(handle),
        }
    }
}

/// Everything one run loop owns. Consumed by [`JobRunner::run`].
struct JobRunner {
    id: String,
    interval: Duration,
    task: TaskFn,
    state: Arc<AtomicU8>,
    cancel_rx: watch::Receiver<bool>,
    stop_rx: watch::Receiver<bool>,
    err_tx: Option<mpsc::WeakSender<Error>>,
}

impl JobRunner {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        // Late ticks are skipped, not queued: no burst of back-to-back
        // invocations after a slow task.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // `interval` fires immediately; consume that tick so the first task
        // invocation happens one full interval after registration.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.transition(JobState::Idle, JobState::Running) {
                        warn!(
                            job_id = %self.id,
                            state = ?JobState::from_u8(self.state.load(Ordering::SeqCst)),
                            "tick skipped: job not idle"
                        );
                        continue;
                    }

                    debug!(job_id = %self.id, "job starting");
                    self.run_task_once().await;

                    if !self.transition(JobState::Running, JobState::Idle) {
                        warn!(
                            job_id = %self.id,
                            state = ?JobState::from_u8(self.state.load(Ordering::SeqCst)),
                            "job state inconsistency after task"
                        );
                    }
                    debug!(job_id = %self.id, "job completed");
                }
                _ = self.cancel_rx.changed() => {
                    self.state.store(JobState::Stopping as u8, Ordering::SeqCst);
                    break;
                }
                _ = self.stop_rx.changed() => {
                    self.state.store(JobState::Stopping as u8, Ordering::SeqCst);
                    break;
                }
            }
        }

        self.state.store(JobState::Stopped as u8, Ordering::SeqCst);
        info!(job_id = %self.id, "job loop exited");
    }

    /// Invoke the task once, containing errors and panics
    ///
    /// The task future runs in its own tokio task so that a panic unwinds
    /// there instead of tearing down this loop; the resulting `JoinError`
    /// is converted into [`Error::JobPanic`] and published.
    async fn run_task_once(&self) {
        let ctx = JobContext {
            cancel: self.cancel_rx.clone(),
        };
        let fut = (self.task)(ctx);

        match tokio::spawn(fut).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                self.send_error(Error::JobFailed {
                    id: self.id.clone(),
                    source: Box::new(err),
                });
            }
            Err(join_err) if join_err.is_panic() => {
                let message = panic_message(join_err.into_panic());
                error!(job_id = %self.id, panic = %message, "job panic recovered");
                self.send_error(Error::JobPanic {
                    id: self.id.clone(),
                    message,
                });
            }
            Err(_) => {
                // Runtime is shutting down; nothing left to report.
            }
        }
    }

    fn transition(&self, from: JobState, to: JobState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Publish an error without ever blocking the loop
    fn send_error(&self, err: Error) {
        let Some(tx) = self.err_tx.as_ref().and_then(|weak| weak.upgrade()) else {
            warn!(job_id = %self.id, error = %err, "error stream closed, dropping error");
            return;
        };
        if let Err(send_err) = tx.try_send(err) {
            warn!(
                job_id = %self.id,
                error = %send_err,
                "error channel full, dropping error"
            );
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
