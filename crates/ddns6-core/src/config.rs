//! Configuration types for the ddns6 system
//!
//! All configuration is carried in explicit, statically-typed structs with
//! serde derives. Environment binding happens in the daemon binary via an
//! explicit loader; nothing here reads the process environment.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default capacity of the scheduler's bounded error channel
pub const DEFAULT_ERROR_CHANNEL_CAPACITY: usize = 100;

/// Default graceful-shutdown timeout in seconds
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// One logical DNS target: a domain/subdomain pair and a record type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Apex domain, e.g. "example.com"
    pub domain: String,

    /// Subdomain label, e.g. "home"; empty means the apex itself
    #[serde(default)]
    pub subdomain: String,

    /// DNS record type; IPv6 targets use "AAAA"
    #[serde(default = "default_record_type")]
    pub record_type: String,
}

fn default_record_type() -> String {
    "AAAA".to_string()
}

impl TargetConfig {
    /// Create a target with the default record type
    pub fn new(domain: impl Into<String>, subdomain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            subdomain: subdomain.into(),
            record_type: default_record_type(),
        }
    }

    /// Fully-qualified record name ("sub.example.com", or the apex)
    pub fn fqdn(&self) -> String {
        if self.subdomain.is_empty() {
            self.domain.clone()
        } else {
            format!("{}.{}", self.subdomain, self.domain)
        }
    }

    /// Validate the target configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.domain.is_empty() {
            return Err(crate::Error::config("target domain cannot be empty"));
        }
        if self.record_type.is_empty() {
            return Err(crate::Error::config("target record type cannot be empty"));
        }
        Ok(())
    }
}

/// Scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Capacity of the bounded error channel; when full, new errors are
    /// dropped with a warning
    #[serde(default = "default_error_channel_capacity")]
    pub error_channel_capacity: usize,

    /// How long `graceful_shutdown` waits for job loops to exit
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_error_channel_capacity() -> usize {
    DEFAULT_ERROR_CHANNEL_CAPACITY
}

fn default_shutdown_timeout_secs() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_SECS
}

impl SchedulerConfig {
    /// Shutdown timeout as a `Duration`
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Validate the scheduler configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.error_channel_capacity == 0 {
            return Err(crate::Error::config(
                "error channel capacity must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            error_channel_capacity: default_error_channel_capacity(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}
