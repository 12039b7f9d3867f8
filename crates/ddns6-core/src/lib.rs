// # ddns6-core
//
// Core library for the ddns6 dynamic-DNS system.
//
// ## Architecture Overview
//
// - **Scheduler**: runs named, recurring jobs on independent timers,
//   guaranteeing at most one concurrent execution per job, recovering
//   panics into reported errors and shutting down cleanly.
// - **AddressReconciler**: caches the last applied address for one DNS
//   target and decides, on each tick, whether the observed address
//   actually requires a remote update.
// - **AddressFetcher** / **RecordUpdater**: the two seams the outside
//   world plugs into: obtaining the current public IPv6 address and
//   pushing it to a DNS provider.
//
// ## Design Principles
//
// 1. **No overlap**: a slow task never races a second invocation of
//    itself; late ticks are skipped, not queued.
// 2. **Failures are diagnostic**: task errors and recovered panics flow
//    to a bounded error stream; they never stop a job or the scheduler.
// 3. **Explicit construction**: no process-wide singletons; the
//    scheduler is built from an explicit config and hands back its
//    error stream at construction.

pub mod config;
pub mod error;
pub mod reconcile;
pub mod scheduler;
pub mod traits;

pub use config::{SchedulerConfig, TargetConfig};
pub use error::{Error, Result};
pub use reconcile::AddressReconciler;
pub use scheduler::{JobContext, JobState, Scheduler, TaskFn};
pub use traits::{AddressFetcher, RecordUpdater, UpdateOutcome};
