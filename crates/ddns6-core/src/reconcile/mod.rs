//! Address reconciliation
//!
//! The [`AddressReconciler`] holds the last address it has confirmed for one
//! DNS target and decides, on each tick, whether the currently observed
//! address requires a remote update.
//!
//! ## Flow per tick
//!
//! 1. Bail out if the context is already cancelled.
//! 2. Fetch the current address (bounded retry, see below).
//! 3. Reject an unspecified address as unusable.
//! 4. Compare against the cached address; equal means steady state and the
//!    updater is never called.
//! 5. Otherwise apply. A provider-reported `Unchanged` is absorbed as a
//!    soft success: the remote record already matched even though the local
//!    cache was stale (e.g. after a restart). Any other apply failure leaves
//!    the cache untouched so the next tick retries.
//!
//! ## Invariant
//!
//! `last_address` is written only after a confirmed `Updated`/`Created`
//! outcome. Fetch failures, empty results, apply failures and the
//! `Unchanged` classification never mutate it.

use crate::config::TargetConfig;
use crate::error::{Error, Result};
use crate::scheduler::{JobContext, TaskFn};
use crate::traits::{AddressFetcher, RecordUpdater, UpdateOutcome};
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Fetch attempts per reconcile call before giving up
const MAX_FETCH_ATTEMPTS: usize = 3;

#[derive(Debug, Default)]
struct ReconcileState {
    /// The most recently confirmed address, empty until the first
    /// successful apply
    last_address: Option<IpAddr>,
    /// The most recent fetch/apply error, for external inspection
    last_error: Option<String>,
    /// When the last confirmed apply happened
    last_applied: Option<DateTime<Utc>>,
}

/// Per-target reconciler
///
/// The cached state is guarded by a mutex, serializing concurrent reconcile
/// calls for the same target; different targets are fully independent.
pub struct AddressReconciler {
    target: TargetConfig,
    state: Mutex<ReconcileState>,
}

impl AddressReconciler {
    /// Create a reconciler for one DNS target
    pub fn new(target: TargetConfig) -> Result<Self> {
        target.validate()?;
        Ok(Self {
            target,
            state: Mutex::new(ReconcileState::default()),
        })
    }

    /// The target this reconciler manages
    pub fn target(&self) -> &TargetConfig {
        &self.target
    }

    /// The most recently confirmed address, if any
    pub async fn last_address(&self) -> Option<IpAddr> {
        self.state.lock().await.last_address
    }

    /// The most recent fetch/apply error, if any
    pub async fn last_error(&self) -> Option<String> {
        self.state.lock().await.last_error.clone()
    }

    /// When the last confirmed apply happened, if ever
    pub async fn last_applied(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.last_applied
    }

    /// Run one reconciliation pass
    pub async fn reconcile(
        &self,
        ctx: &JobContext,
        fetcher: &dyn AddressFetcher,
        updater: &dyn RecordUpdater,
    ) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut state = self.state.lock().await;

        let address = match self.fetch_with_retry(ctx, fetcher).await {
            Ok(address) => address,
            Err(err) => {
                state.last_error = Some(err.to_string());
                return Err(err);
            }
        };

        if address.is_unspecified() {
            let err = Error::EmptyAddress;
            state.last_error = Some(err.to_string());
            return Err(err);
        }

        if state.last_address == Some(address) {
            // Steady state: the common case, no provider call.
            debug!(
                fqdn = %self.target.fqdn(),
                %address,
                "address unchanged, nothing to do"
            );
            return Ok(());
        }

        match updater
            .apply(&self.target.domain, &self.target.subdomain, address)
            .await
        {
            Ok(UpdateOutcome::Unchanged { current }) => {
                // The remote record already matched while our cache was
                // stale. Soft success; the cache only holds values this
                // reconciler has itself confirmed.
                info!(
                    fqdn = %self.target.fqdn(),
                    %current,
                    provider = updater.provider_name(),
                    "remote record already current"
                );
                Ok(())
            }
            Ok(outcome) => {
                let previous = state.last_address.replace(address);
                state.last_applied = Some(Utc::now());
                state.last_error = None;
                info!(
                    fqdn = %self.target.fqdn(),
                    %address,
                    ?previous,
                    created = matches!(outcome, UpdateOutcome::Created { .. }),
                    provider = updater.provider_name(),
                    "record updated"
                );
                Ok(())
            }
            Err(err) => {
                // Cache left stale on purpose: the next tick sees the
                // address as still-changed and retries the apply.
                let err = Error::ApplyFailed(err.to_string());
                state.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Fetch with a small bounded number of attempts
    ///
    /// Aborts between attempts if the context is cancelled. After exhausting
    /// all attempts the last error is wrapped in [`Error::FetchExhausted`]
    /// so callers can tell "never even fetched" from "provider rejected".
    async fn fetch_with_retry(
        &self,
        ctx: &JobContext,
        fetcher: &dyn AddressFetcher,
    ) -> Result<IpAddr> {
        let mut last_err: Option<Error> = None;

        for attempt in 1..=MAX_FETCH_ATTEMPTS {
            if ctx.is_cancelled() {
                return Err(Error::Cancelled);
            }

            match fetcher.fetch().await {
                Ok(address) => return Ok(address),
                Err(err) => {
                    warn!(
                        fqdn = %self.target.fqdn(),
                        source = fetcher.source_name(),
                        attempt,
                        error = %err,
                        "address fetch attempt failed"
                    );
                    last_err = Some(err);
                }
            }
        }

        Err(Error::FetchExhausted {
            attempts: MAX_FETCH_ATTEMPTS,
            last: last_err
                .map(|err| err.to_string())
                .unwrap_or_else(|| "no attempts made".to_string()),
        })
    }

    /// Close this reconciler over a fetcher/updater pair, yielding the task
    /// shape the scheduler accepts
    pub fn into_task(
        self: Arc<Self>,
        fetcher: Arc<dyn AddressFetcher>,
        updater: Arc<dyn RecordUpdater>,
    ) -> TaskFn {
        Arc::new(move |ctx: JobContext| {
            let reconciler = Arc::clone(&self);
            let fetcher = Arc::clone(&fetcher);
            let updater = Arc::clone(&updater);
            Box::pin(async move {
                reconciler
                    .reconcile(&ctx, fetcher.as_ref(), updater.as_ref())
                    .await
            })
        })
    }
}

impl std::fmt::Debug for AddressReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressReconciler")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
