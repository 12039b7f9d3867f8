// # HTTP Site Address Fetcher
//
// Asks public "what is my IP" services for the host's IPv6 address.
//
// ## Purpose
//
// This fetcher works from behind NAT66 and on any platform, at the cost of
// depending on an external service. The URL list is tried in order; the
// first parseable IPv6 answer wins, so a dead service only adds latency.
//
// The fetcher is a single-shot observer: no caching, no retries across
// calls (the reconciler owns retry policy), and every request is bounded
// by the client timeout rather than by the caller.

use async_trait::async_trait;
use ddns6_core::traits::AddressFetcher;
use ddns6_core::{Error, Result};
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, warn};

/// Default lookup services, tried in order
pub const DEFAULT_LOOKUP_URLS: &[&str] = &[
    "https://ipv6.icanhazip.com",
    "https://v6.ident.me",
];

/// Per-request timeout
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Address fetcher backed by public HTTP lookup services
pub struct SiteFetcher {
    urls: Vec<String>,
    client: reqwest::Client,
}

impl SiteFetcher {
    /// Create a fetcher with the default service list
    pub fn new() -> Self {
        Self::with_urls(DEFAULT_LOOKUP_URLS.iter().map(|url| url.to_string()))
    }

    /// Create a fetcher with a custom service list
    pub fn with_urls(urls: impl IntoIterator<Item = String>) -> Self {
        Self {
            urls: urls.into_iter().collect(),
            client: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    async fn fetch_from(&self, url: &str) -> Result<IpAddr> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::http(format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::http(format!(
                "{url} answered with status {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::http(format!("reading body from {url} failed: {e}")))?;

        parse_address(&body)
    }
}

impl Default for SiteFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AddressFetcher for SiteFetcher {
    async fn fetch(&self) -> Result<IpAddr> {
        let mut last_err = Error::fetch_failed("no lookup services configured");

        for url in &self.urls {
            match self.fetch_from(url).await {
                Ok(address) => {
                    debug!(%address, url, "address obtained from lookup service");
                    return Ok(address);
                }
                Err(err) => {
                    warn!(url, error = %err, "lookup service failed, trying next");
                    last_err = err;
                }
            }
        }

        Err(Error::fetch_failed(format!(
            "all lookup services failed, last error: {last_err}"
        )))
    }

    fn source_name(&self) -> &'static str {
        "http-site"
    }
}

/// Parse a lookup-service response body into an IPv6 address
fn parse_address(body: &str) -> Result<IpAddr> {
    let text = body.trim();
    let address: IpAddr = text
        .parse()
        .map_err(|_| Error::fetch_failed(format!("not an IP address: {text:?}")))?;

    if !address.is_ipv6() {
        return Err(Error::fetch_failed(format!(
            "expected an IPv6 address, got {address}"
        )));
    }

    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_trimmed_ipv6_body() {
        let address = parse_address("2001:db8::1\n").unwrap();
        assert_eq!(address, "2001:db8::1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn rejects_an_ipv4_answer() {
        assert!(parse_address("203.0.113.7").is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_address("<html>not an ip</html>").is_err());
    }

    #[test]
    fn default_service_list_is_nonempty() {
        let fetcher = SiteFetcher::new();
        assert!(!fetcher.urls.is_empty());
    }
}
