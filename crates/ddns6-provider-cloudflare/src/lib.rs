// # Cloudflare Record Updater
//
// `RecordUpdater` implementation against the Cloudflare v4 API.
//
// ## Behavior per apply
//
// 1. Resolve the zone id for the domain (cached nothing; one GET, skipped
//    when a zone id was configured explicitly).
// 2. Look up the record for the fqdn and record type.
// 3. Missing record → POST create → `Created`.
// 4. Record already carries the requested address → no write → `Unchanged`.
// 5. Otherwise → PUT → `Updated`.
//
// The updater is stateless and single-shot: no retries, no backoff, no
// caching. The reconciler owns all of that. One reconcile pass costs at
// most three API calls.
//
// ## Security
//
// The API token never appears in logs; the `Debug` implementation redacts
// it.

use async_trait::async_trait;
use ddns6_core::traits::{RecordUpdater, UpdateOutcome};
use ddns6_core::{Error, Result};
use serde_json::{Value, json};
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info};

/// Cloudflare API base URL
const API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Per-request timeout
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default TTL for created records (seconds); 1 means "automatic" on
/// Cloudflare
const CREATE_TTL: u32 = 1;

/// Cloudflare `RecordUpdater`
pub struct CloudflareUpdater {
    /// API token with Zone:DNS:Edit permission; never logged
    api_token: String,
    /// Optional pre-configured zone id, skipping zone lookup
    zone_id: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for CloudflareUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareUpdater")
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .finish_non_exhaustive()
    }
}

impl CloudflareUpdater {
    /// Create an updater
    ///
    /// # Errors
    ///
    /// Fails fast on an empty token rather than failing on the first apply.
    pub fn new(api_token: impl Into<String>, zone_id: Option<String>) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("building HTTP client failed: {e}")))?;

        Ok(Self {
            api_token,
            zone_id,
            client,
        })
    }

    async fn resolve_zone_id(&self, domain: &str) -> Result<String> {
        if let Some(ref zone_id) = self.zone_id {
            return Ok(zone_id.clone());
        }

        debug!(domain, "looking up zone id");
        let url = format!("{API_BASE}/zones?name={domain}");
        let body = self.get(&url, "zone lookup").await?;

        let zone = body["result"]
            .as_array()
            .and_then(|zones| zones.first())
            .ok_or_else(|| Error::provider("cloudflare", format!("zone not found: {domain}")))?;

        zone["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::provider("cloudflare", "zone id missing from response"))
    }

    /// Find the record for `fqdn`; returns its id and current address
    async fn find_record(
        &self,
        zone_id: &str,
        fqdn: &str,
        record_type: &str,
    ) -> Result<Option<(String, Option<IpAddr>)>> {
        let url =
            format!("{API_BASE}/zones/{zone_id}/dns_records?name={fqdn}&type={record_type}");
        let body = self.get(&url, "record lookup").await?;

        let Some(record) = body["result"].as_array().and_then(|records| records.first())
        else {
            return Ok(None);
        };

        let id = record["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::provider("cloudflare", "record id missing from response"))?;
        let current = record["content"].as_str().and_then(|s| s.parse().ok());

        Ok(Some((id, current)))
    }

    async fn create_record(
        &self,
        zone_id: &str,
        fqdn: &str,
        record_type: &str,
        address: IpAddr,
    ) -> Result<()> {
        let url = format!("{API_BASE}/zones/{zone_id}/dns_records");
        let payload = json!({
            "type": record_type,
            "name": fqdn,
            "content": address.to_string(),
            "ttl": CREATE_TTL,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::http(format!("record create request failed: {e}")))?;

        Self::parse_api_body(response, "record create").await.map(|_| ())
    }

    async fn rewrite_record(
        &self,
        zone_id: &str,
        record_id: &str,
        fqdn: &str,
        record_type: &str,
        address: IpAddr,
    ) -> Result<()> {
        let url = format!("{API_BASE}/zones/{zone_id}/dns_records/{record_id}");
        let payload = json!({
            "type": record_type,
            "name": fqdn,
            "content": address.to_string(),
        });

        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::http(format!("record update request failed: {e}")))?;

        Self::parse_api_body(response, "record update").await.map(|_| ())
    }

    async fn get(&self, url: &str, what: &str) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::http(format!("{what} request failed: {e}")))?;

        Self::parse_api_body(response, what).await
    }

    /// Map HTTP/API failures to errors and hand back the JSON body
    async fn parse_api_body(response: reqwest::Response, what: &str) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => Error::provider(
                    "cloudflare",
                    format!("{what} rejected: invalid token or insufficient permissions"),
                ),
                429 => Error::provider("cloudflare", format!("{what} rate limited")),
                500..=599 => Error::provider(
                    "cloudflare",
                    format!("{what} hit a server error (transient): {status}"),
                ),
                _ => Error::provider("cloudflare", format!("{what} failed: {status} {detail}")),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::provider("cloudflare", format!("{what} returned bad JSON: {e}")))?;

        if body["success"] == Value::Bool(false) {
            return Err(Error::provider(
                "cloudflare",
                format!("{what} unsuccessful: {}", body["errors"]),
            ));
        }

        Ok(body)
    }
}

/// FQDN for a domain/subdomain pair; an empty subdomain means the apex
fn record_name(domain: &str, subdomain: &str) -> String {
    if subdomain.is_empty() {
        domain.to_string()
    } else {
        format!("{subdomain}.{domain}")
    }
}

#[async_trait]
impl RecordUpdater for CloudflareUpdater {
    async fn apply(
        &self,
        domain: &str,
        subdomain: &str,
        address: IpAddr,
    ) -> Result<UpdateOutcome> {
        let record_type = match address {
            IpAddr::V4(_) => "A",
            IpAddr::V6(_) => "AAAA",
        };
        let fqdn = record_name(domain, subdomain);

        let zone_id = self.resolve_zone_id(domain).await?;

        match self.find_record(&zone_id, &fqdn, record_type).await? {
            None => {
                self.create_record(&zone_id, &fqdn, record_type, address)
                    .await?;
                info!(%fqdn, %address, "record created");
                Ok(UpdateOutcome::Created { current: address })
            }
            Some((_, Some(current))) if current == address => {
                debug!(%fqdn, %address, "record already current, nothing written");
                Ok(UpdateOutcome::Unchanged { current })
            }
            Some((record_id, previous)) => {
                self.rewrite_record(&zone_id, &record_id, &fqdn, record_type, address)
                    .await?;
                info!(%fqdn, %address, ?previous, "record rewritten");
                Ok(UpdateOutcome::Updated {
                    previous,
                    current: address,
                })
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_name_joins_subdomain_and_apex() {
        assert_eq!(record_name("example.com", "home"), "home.example.com");
        assert_eq!(record_name("example.com", ""), "example.com");
    }

    #[test]
    fn empty_token_is_rejected() {
        assert!(CloudflareUpdater::new("", None).is_err());
    }

    #[test]
    fn debug_output_redacts_the_token() {
        let updater = CloudflareUpdater::new("secret-token", None).unwrap();
        let rendered = format!("{updater:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("REDACTED"));
    }
}
