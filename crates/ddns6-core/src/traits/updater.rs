// # Record Updater Trait
//
// Defines the interface for pushing an address to a DNS provider.
//
// ## Implementations
//
// - Cloudflare: `ddns6-provider-cloudflare` crate
// - Future: Tencent DNSPod, GoDaddy, Route53, ...
//
// Updaters are untrusted, stateless, single-shot integrations:
//
// - One logical update per `apply` call; the scheduler owns all timing.
// - No retry or backoff logic (a failed apply is retried on the next tick
//   by the reconciler's caller).
// - No caching of addresses (owned by `AddressReconciler`).
// - The one piece of intelligence they MUST have: when the remote record
//   already carries the requested value, report `UpdateOutcome::Unchanged`
//   instead of an error, so the reconciler can absorb the no-op.

use async_trait::async_trait;
use std::net::IpAddr;

/// Result of a DNS update operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Record existed with a different value and was rewritten
    Updated {
        /// The value the record held before, when the provider reports it
        previous: Option<IpAddr>,
        /// The value the record holds now
        current: IpAddr,
    },

    /// Record did not exist and was created
    Created {
        /// The value the record holds now
        current: IpAddr,
    },

    /// Record already held the requested value; nothing was written
    Unchanged {
        /// The value the record already held
        current: IpAddr,
    },
}

/// Trait for DNS provider implementations
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait RecordUpdater: Send + Sync {
    /// Apply `address` to the record identified by `domain`/`subdomain`
    ///
    /// Must handle three cases:
    /// - record exists with a different value → rewrite, return `Updated`
    /// - record is missing → create, return `Created`
    /// - record already equals `address` → no write, return `Unchanged`
    ///
    /// # Idempotency
    ///
    /// Calling `apply` repeatedly with the same address must be safe; every
    /// call after the first successful one reports `Unchanged`.
    async fn apply(
        &self,
        domain: &str,
        subdomain: &str,
        address: IpAddr,
    ) -> Result<UpdateOutcome, crate::Error>;

    /// Name of this provider (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
