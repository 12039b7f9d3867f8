//! Test doubles and helpers for the architecture contract tests
//!
//! The doubles count their calls with atomics and can be scripted with a
//! queue of per-call results; when the script runs dry they fall back to a
//! fixed default behavior.

#![allow(dead_code)]

use ddns6_core::traits::{AddressFetcher, RecordUpdater, UpdateOutcome};
use ddns6_core::{Error, Result};
use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Parse helper for test addresses
pub fn addr(s: &str) -> IpAddr {
    s.parse().expect("valid test address")
}

/// One scripted fetch result
pub enum FetchStep {
    Ok(IpAddr),
    Fail(String),
}

/// An `AddressFetcher` with a scripted result queue and a fixed fallback
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<FetchStep>>,
    fallback: FetchStep,
    fetch_count: AtomicUsize,
}

impl ScriptedFetcher {
    /// Always returns `address` once the script is exhausted
    pub fn fixed(address: IpAddr) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: FetchStep::Ok(address),
            fetch_count: AtomicUsize::new(0),
        }
    }

    /// Always fails once the script is exhausted
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: FetchStep::Fail(message.into()),
            fetch_count: AtomicUsize::new(0),
        }
    }

    /// Queue a result for the next fetch call
    pub fn push(&self, step: FetchStep) {
        self.script.lock().unwrap().push_back(step);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AddressFetcher for ScriptedFetcher {
    async fn fetch(&self) -> Result<IpAddr> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().unwrap().pop_front();
        let step = step.as_ref().unwrap_or(&self.fallback);
        match step {
            FetchStep::Ok(address) => Ok(*address),
            FetchStep::Fail(message) => Err(Error::fetch_failed(message.clone())),
        }
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// Fixed behavior of a [`MockUpdater`] once its script is exhausted
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum UpdaterMode {
    /// Report every apply as a fresh update
    Updating,
    /// Report the remote record as already correct
    Unchanged,
    /// Fail every apply
    Failing,
}

/// A `RecordUpdater` that records calls and follows a scripted mode queue
pub struct MockUpdater {
    mode: UpdaterMode,
    script: Mutex<VecDeque<UpdaterMode>>,
    apply_count: AtomicUsize,
    applied: Mutex<Vec<(String, String, IpAddr)>>,
}

impl MockUpdater {
    pub fn new(mode: UpdaterMode) -> Self {
        Self {
            mode,
            script: Mutex::new(VecDeque::new()),
            apply_count: AtomicUsize::new(0),
            applied: Mutex::new(Vec::new()),
        }
    }

    /// Queue a one-off mode for the next apply call
    pub fn push(&self, mode: UpdaterMode) {
        self.script.lock().unwrap().push_back(mode);
    }

    pub fn apply_count(&self) -> usize {
        self.apply_count.load(Ordering::SeqCst)
    }

    /// Every `(domain, subdomain, address)` this updater was asked to apply
    pub fn applied(&self) -> Vec<(String, String, IpAddr)> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RecordUpdater for MockUpdater {
    async fn apply(
        &self,
        domain: &str,
        subdomain: &str,
        address: IpAddr,
    ) -> Result<UpdateOutcome> {
        self.apply_count.fetch_add(1, Ordering::SeqCst);
        self.applied
            .lock()
            .unwrap()
            .push((domain.to_string(), subdomain.to_string(), address));

        let mode = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.mode);

        match mode {
            UpdaterMode::Updating => Ok(UpdateOutcome::Updated {
                previous: None,
                current: address,
            }),
            UpdaterMode::Unchanged => Ok(UpdateOutcome::Unchanged { current: address }),
            UpdaterMode::Failing => Err(Error::provider("mock", "simulated provider outage")),
        }
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
