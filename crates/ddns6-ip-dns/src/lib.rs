// # DNS Socket Address Fetcher
//
// Derives the host's global IPv6 address by connecting a UDP socket to a
// public IPv6 resolver and reading back the local address the kernel chose
// for that route. No datagram is ever sent; "connecting" a UDP socket only
// runs route selection, so this works offline-fast and leaks nothing.
//
// The resolver list is tried in order; the first connect that yields a
// routable local address wins. A host without IPv6 connectivity fails every
// connect and the fetch errors out, which the reconciler reports and
// retries on the next tick.

use async_trait::async_trait;
use ddns6_core::traits::AddressFetcher;
use ddns6_core::{Error, Result};
use std::net::IpAddr;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Public IPv6 resolvers used for route selection, tried in order
pub const DEFAULT_RESOLVERS: &[&str] = &[
    "2606:4700:4700::1111",
    "2001:4860:4860::8888",
    "2400:3200:baba::1",
];

/// Address fetcher backed by UDP route selection against public resolvers
pub struct ResolverFetcher {
    resolvers: Vec<String>,
}

impl ResolverFetcher {
    /// Create a fetcher with the default resolver list
    pub fn new() -> Self {
        Self::with_resolvers(DEFAULT_RESOLVERS.iter().map(|r| r.to_string()))
    }

    /// Create a fetcher with a custom resolver list
    pub fn with_resolvers(resolvers: impl IntoIterator<Item = String>) -> Self {
        Self {
            resolvers: resolvers.into_iter().collect(),
        }
    }

    async fn probe(&self, resolver: &str) -> Result<IpAddr> {
        let socket = UdpSocket::bind("[::]:0")
            .await
            .map_err(|e| Error::fetch_failed(format!("binding probe socket failed: {e}")))?;

        socket
            .connect(format!("[{resolver}]:53"))
            .await
            .map_err(|e| Error::fetch_failed(format!("no route towards {resolver}: {e}")))?;

        let local = socket
            .local_addr()
            .map_err(|e| Error::fetch_failed(format!("reading local address failed: {e}")))?;

        let address = local.ip();
        if usable(address) {
            Ok(address)
        } else {
            Err(Error::fetch_failed(format!(
                "route towards {resolver} chose non-global source {address}"
            )))
        }
    }
}

impl Default for ResolverFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AddressFetcher for ResolverFetcher {
    async fn fetch(&self) -> Result<IpAddr> {
        for resolver in &self.resolvers {
            match self.probe(resolver).await {
                Ok(address) => {
                    debug!(%address, resolver, "address derived from route selection");
                    return Ok(address);
                }
                Err(err) => {
                    warn!(resolver, error = %err, "resolver probe failed, trying next");
                }
            }
        }

        Err(Error::fetch_failed(
            "no resolver probe yielded a usable IPv6 address",
        ))
    }

    fn source_name(&self) -> &'static str {
        "dns-socket"
    }
}

/// A source address usable for a public DNS record: IPv6, specified, and
/// neither loopback nor link-local
fn usable(address: IpAddr) -> bool {
    match address {
        IpAddr::V4(_) => false,
        IpAddr::V6(v6) => {
            !v6.is_unspecified() && !v6.is_loopback() && (v6.segments()[0] & 0xffc0) != 0xfe80
        }
    }
}
