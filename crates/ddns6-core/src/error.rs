//! Error types for the ddns6 system
//!
//! Reconciliation errors (`FetchFailed`, `EmptyAddress`, `ApplyFailed`, ...)
//! are recoverable: they surface on the scheduler's error stream and the job
//! retries on its next tick. Scheduler API errors (`JobAlreadyExists`,
//! `JobBusy`, ...) are contract violations returned synchronously to the
//! caller. `JobPanic` is a task defect recovered at the job-loop boundary.

use thiserror::Error;

/// Result type alias for ddns6 operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the ddns6 system
#[derive(Error, Debug)]
pub enum Error {
    /// Address source unreachable or returned malformed data
    #[error("address fetch failed: {0}")]
    FetchFailed(String),

    /// All bounded fetch attempts failed
    #[error("address fetch exhausted after {attempts} attempts: {last}")]
    FetchExhausted {
        /// How many attempts were made
        attempts: usize,
        /// The error from the final attempt
        last: String,
    },

    /// Fetch succeeded but yielded nothing usable
    #[error("address fetch produced no usable address")]
    EmptyAddress,

    /// Remote update attempt failed for a reason other than "already correct"
    #[error("record update failed: {0}")]
    ApplyFailed(String),

    /// Operation aborted because its context was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// A job with this id is already registered
    #[error("job {0:?} already exists")]
    JobAlreadyExists(String),

    /// No job with this id is registered
    #[error("job {0:?} not found")]
    JobNotFound(String),

    /// The job is not idle, so it cannot be mutated right now
    #[error("job {0:?} is not idle")]
    JobBusy(String),

    /// The scheduler has been shut down and accepts no further operations
    #[error("scheduler is stopped")]
    SchedulerStopped,

    /// Job intervals must be positive
    #[error("job interval must be positive")]
    InvalidInterval,

    /// A task function returned an error
    #[error("job {id:?} failed: {source}")]
    JobFailed {
        /// Id of the failing job
        id: String,
        /// The task's error
        #[source]
        source: Box<Error>,
    },

    /// A task function panicked; recovered at the job-loop boundary
    #[error("job {id:?} panicked: {message}")]
    JobPanic {
        /// Id of the panicking job
        id: String,
        /// Stringified panic payload
        message: String,
    },

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP client errors (from fetchers and provider APIs)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Provider-specific error
    #[error("provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a fetch error
    pub fn fetch_failed(msg: impl Into<String>) -> Self {
        Self::FetchFailed(msg.into())
    }

    /// Create an apply error
    pub fn apply_failed(msg: impl Into<String>) -> Self {
        Self::ApplyFailed(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
