// # ddns6d - IPv6 DDNS Daemon
//
// Thin integration layer: reads configuration from environment variables,
// wires an address fetcher, the Cloudflare updater, and the reconciler
// into the scheduler, then waits for a shutdown signal. All DDNS logic
// lives in ddns6-core.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// - `DDNS6_DOMAIN`: Zone apex domain (required), e.g. example.com
// - `DDNS6_SUBDOMAIN`: Record label under the domain (empty = apex)
// - `DDNS6_IP_SOURCE`: Where to learn the local address (http, dns)
// - `DDNS6_INTERVAL_SECS`: Seconds between reconcile passes (default 300)
// - `DDNS6_API_TOKEN`: Cloudflare API token (required)
// - `DDNS6_ZONE_ID`: Cloudflare zone id (optional, skips zone lookup)
// - `DDNS6_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export DDNS6_DOMAIN=example.com
// export DDNS6_SUBDOMAIN=home
// export DDNS6_API_TOKEN=your_token
// export DDNS6_INTERVAL_SECS=300
//
// ddns6d
// ```

use anyhow::Result;
use ddns6_core::{AddressFetcher, AddressReconciler, Scheduler, SchedulerConfig, TargetConfig};
use ddns6_ip_dns::ResolverFetcher;
use ddns6_ip_http::SiteFetcher;
use ddns6_provider_cloudflare::CloudflareUpdater;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Name of the single scheduled job
const JOB_ID: &str = "ddns_update";

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum Ddns6ExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<Ddns6ExitCode> for ExitCode {
    fn from(code: Ddns6ExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    domain: String,
    subdomain: String,
    ip_source: String,
    interval_secs: u64,
    api_token: String,
    zone_id: Option<String>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            domain: env::var("DDNS6_DOMAIN").map_err(|_| {
                anyhow::anyhow!(
                    "DDNS6_DOMAIN is required. Set it via: export DDNS6_DOMAIN=example.com"
                )
            })?,
            subdomain: env::var("DDNS6_SUBDOMAIN").unwrap_or_default(),
            ip_source: env::var("DDNS6_IP_SOURCE").unwrap_or_else(|_| "http".to_string()),
            interval_secs: env::var("DDNS6_INTERVAL_SECS")
                .ok()
                .map(|s| s.parse())
                .transpose()
                .map_err(|e| anyhow::anyhow!("DDNS6_INTERVAL_SECS is not a number: {}", e))?
                .unwrap_or(300),
            api_token: env::var("DDNS6_API_TOKEN").map_err(|_| {
                anyhow::anyhow!(
                    "DDNS6_API_TOKEN is required. \
                    Set it via: export DDNS6_API_TOKEN=your_token"
                )
            })?,
            zone_id: env::var("DDNS6_ZONE_ID").ok(),
            log_level: env::var("DDNS6_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.api_token.is_empty() {
            anyhow::bail!("DDNS6_API_TOKEN cannot be empty");
        }

        // Check for obvious placeholder tokens (common mistake)
        let token_lower = self.api_token.to_lowercase();
        if token_lower.contains("your_token")
            || token_lower.contains("replace_me")
            || token_lower.contains("example")
        {
            anyhow::bail!(
                "DDNS6_API_TOKEN appears to be a placeholder. \
                Use an actual API token from Cloudflare."
            );
        }

        match self.ip_source.as_str() {
            "http" | "dns" => {}
            _ => anyhow::bail!(
                "DDNS6_IP_SOURCE '{}' is not supported. Supported sources: http, dns",
                self.ip_source
            ),
        }

        if !(10..=86400).contains(&self.interval_secs) {
            anyhow::bail!(
                "DDNS6_INTERVAL_SECS must be between 10 and 86400 seconds. Got: {}",
                self.interval_secs
            );
        }

        validate_domain_name(&self.domain)?;
        if !self.subdomain.is_empty() {
            validate_domain_name(&self.subdomain)?;
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "DDNS6_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }
}

/// Basic DNS name validation per RFC 1035; catches common mistakes, not
/// every invalid name
fn validate_domain_name(domain: &str) -> Result<()> {
    if domain.is_empty() {
        anyhow::bail!("Domain name cannot be empty");
    }

    if domain.len() > 253 {
        anyhow::bail!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        );
    }

    for label in domain.split('.') {
        if label.is_empty() {
            anyhow::bail!("Domain name has empty label: '{}'", domain);
        }

        if label.len() > 63 {
            anyhow::bail!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            );
        }

        if !label.chars().all(|c| c.is_alphanumeric() || c == '-') {
            anyhow::bail!(
                "Domain label contains invalid characters. Label: '{}'. \
                Valid: alphanumeric and hyphen only.",
                label
            );
        }

        if label.starts_with('-') || label.ends_with('-') {
            anyhow::bail!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            );
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return Ddns6ExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return Ddns6ExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return Ddns6ExitCode::ConfigError.into();
    }

    info!("Starting ddns6d daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return Ddns6ExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {}", e);
            Ddns6ExitCode::RuntimeError
        } else {
            Ddns6ExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon until a shutdown signal arrives
async fn run_daemon(config: Config) -> Result<()> {
    let target = TargetConfig::new(&config.domain, &config.subdomain);
    let fqdn = target.fqdn();

    let fetcher: Arc<dyn AddressFetcher> = match config.ip_source.as_str() {
        "dns" => Arc::new(ResolverFetcher::new()),
        _ => Arc::new(SiteFetcher::new()),
    };
    info!(source = fetcher.source_name(), "address source selected");

    let updater = Arc::new(CloudflareUpdater::new(
        config.api_token.clone(),
        config.zone_id.clone(),
    )?);

    let reconciler = Arc::new(AddressReconciler::new(target)?);

    let (scheduler, mut err_rx) = Scheduler::new(SchedulerConfig::default())?;
    scheduler.add_job(
        JOB_ID,
        Duration::from_secs(config.interval_secs),
        reconciler.into_task(fetcher, updater),
    )?;

    info!(
        %fqdn,
        interval_secs = config.interval_secs,
        "reconcile job scheduled"
    );

    // Surface job failures in the daemon log; the loop ends when the
    // scheduler shuts down and drops its sender
    let drain = tokio::spawn(async move {
        while let Some(e) = err_rx.recv().await {
            warn!(error = %e, "scheduled job reported an error");
        }
    });

    let signal_name = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal_name);

    scheduler.graceful_shutdown().await;
    let _ = drain.await;

    info!("Shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(name)
}

/// Wait for CTRL-C (fallback for non-Unix platforms)
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
