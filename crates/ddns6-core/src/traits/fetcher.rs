// # Address Fetcher Trait
//
// Defines the interface for obtaining the host's current public address.
//
// ## Implementations
//
// - HTTP site lookup: `ddns6-ip-http` crate
// - DNS-socket probe: `ddns6-ip-dns` crate
//
// Fetchers are single-shot observers: one call, one answer. They must be
// safe to call repeatedly (the reconciler retries a failed fetch a bounded
// number of times per tick) and must bound their own I/O with timeouts
// rather than relying on the caller to interrupt them. Retry policy and the
// decision whether an update is needed are owned by the reconciler, never
// by a fetcher.

use async_trait::async_trait;
use std::net::IpAddr;

/// Trait for address source implementations
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait AddressFetcher: Send + Sync {
    /// Fetch the current public address in canonical form
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddr)`: the current address
    /// - `Err(Error)`: if no address could be determined
    async fn fetch(&self) -> Result<IpAddr, crate::Error>;

    /// Name of this source (for logging/debugging)
    fn source_name(&self) -> &'static str;
}
