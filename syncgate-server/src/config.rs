//! Server configuration and CLI argument parsing
//!
//! All settings come from CLI arguments or environment variables with the
//! SYNCGATE_ prefix; CLI arguments take precedence. The quota table can be
//! supplied as a JSON file, otherwise the built-in defaults apply. Nothing
//! in the decision logic is hard-coded here: limits, failure policy, store
//! sizing, timeouts, and the TTL grace are all externally tunable.
//!
//! # Example Usage
//!
//! ```bash
//! # CLI arguments
//! syncgate --port 9090 --failure-policy open
//!
//! # Environment variables
//! export SYNCGATE_PORT=9090
//! export SYNCGATE_QUOTAS=/etc/syncgate/quotas.json
//! syncgate
//! ```

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use syncgate::{FailurePolicy, QuotaTable};

/// Main configuration structure for the server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address
    pub listen: ListenConfig,
    /// Tier × category quota table
    pub quotas: QuotaTable,
    /// Admission behavior when the store is unreachable
    pub failure_policy: FailurePolicy,
    /// Counter store sizing and hygiene
    pub store: StoreConfig,
    /// Upper bound on each store round trip
    pub store_timeout: Duration,
    /// TTL buffer past the window end
    pub ttl_grace: Duration,
    /// Logging level (error, warn, info, debug, trace)
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Initial capacity of the counter store
    pub capacity: usize,
    /// Interval between expired-entry sweeps (seconds)
    pub cleanup_interval: u64,
}

/// Command-line arguments for the server.
///
/// All arguments can also be set via environment variables with the
/// SYNCGATE_ prefix. CLI arguments take precedence.
#[derive(Parser, Debug)]
#[command(
    name = "syncgate",
    about = "License-tiered admission control for the sync API",
    long_about = "License-tiered admission control for the sync API.\n\nServes an admission-check endpoint plus health and metrics, and hosts the rate-limiting middleware embedded by the sync API handlers.\n\nEnvironment variables with the SYNCGATE_ prefix are supported. CLI arguments take precedence."
)]
pub struct Args {
    #[arg(
        long,
        value_name = "HOST",
        help = "Host address to bind",
        default_value = "127.0.0.1",
        env = "SYNCGATE_HOST"
    )]
    pub host: String,
    #[arg(
        long,
        value_name = "PORT",
        help = "Port to listen on",
        default_value_t = 8080,
        env = "SYNCGATE_PORT"
    )]
    pub port: u16,

    #[arg(
        long,
        value_name = "FILE",
        help = "JSON quota table (built-in defaults when omitted)",
        env = "SYNCGATE_QUOTAS"
    )]
    pub quotas: Option<PathBuf>,

    #[arg(
        long,
        value_name = "POLICY",
        help = "Admission behavior when the store is unreachable: closed, open",
        default_value = "closed",
        env = "SYNCGATE_FAILURE_POLICY"
    )]
    pub failure_policy: FailurePolicy,

    // Store configuration
    #[arg(
        long,
        value_name = "SIZE",
        help = "Initial counter store capacity",
        default_value_t = 100_000,
        env = "SYNCGATE_STORE_CAPACITY"
    )]
    pub store_capacity: usize,
    #[arg(
        long,
        value_name = "SECS",
        help = "Interval between expired-entry sweeps (seconds)",
        default_value_t = 300,
        env = "SYNCGATE_STORE_CLEANUP_INTERVAL"
    )]
    pub store_cleanup_interval: u64,
    #[arg(
        long,
        value_name = "MS",
        help = "Per-operation store timeout (milliseconds)",
        default_value_t = 1000,
        env = "SYNCGATE_STORE_TIMEOUT_MS"
    )]
    pub store_timeout_ms: u64,
    #[arg(
        long,
        value_name = "SECS",
        help = "Entry TTL grace past the window end (seconds)",
        default_value_t = 60,
        env = "SYNCGATE_TTL_GRACE"
    )]
    pub ttl_grace_secs: u64,

    #[arg(
        long,
        value_name = "LEVEL",
        help = "Log level: error, warn, info, debug, trace",
        default_value = "info",
        env = "SYNCGATE_LOG_LEVEL"
    )]
    pub log_level: String,
}

impl Config {
    /// Build configuration from environment variables and CLI arguments.
    pub fn from_env_and_args() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<Self> {
        let quotas = match &args.quotas {
            Some(path) => load_quota_table(path)?,
            None => QuotaTable::default(),
        };

        let config = Config {
            listen: ListenConfig {
                host: args.host,
                port: args.port,
            },
            quotas,
            failure_policy: args.failure_policy,
            store: StoreConfig {
                capacity: args.store_capacity,
                cleanup_interval: args.store_cleanup_interval,
            },
            store_timeout: Duration::from_millis(args.store_timeout_ms),
            ttl_grace: Duration::from_secs(args.ttl_grace_secs),
            log_level: args.log_level,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.quotas.validate()?;

        if self.store_timeout.is_zero() {
            return Err(anyhow!("store timeout must be positive"));
        }
        if self.store.cleanup_interval == 0 {
            return Err(anyhow!("store cleanup interval must be positive"));
        }

        Ok(())
    }
}

/// Load an operator-supplied quota table.
pub fn load_quota_table(path: &Path) -> Result<QuotaTable> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading quota table {}", path.display()))?;
    let table: QuotaTable = serde_json::from_str(&raw)
        .with_context(|| format!("parsing quota table {}", path.display()))?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncgate::{EndpointCategory, LicenseTier, Quota};

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["syncgate"]);
        let config = Config::from_args(args).unwrap();

        assert_eq!(config.listen.port, 8080);
        assert_eq!(config.failure_policy, FailurePolicy::Closed);
        assert_eq!(config.store_timeout, Duration::from_millis(1000));
        assert_eq!(config.ttl_grace, Duration::from_secs(60));
        assert_eq!(
            config.quotas.lookup(LicenseTier::Basic, EndpointCategory::Auth),
            Quota::new(5, 60)
        );
    }

    #[test]
    fn test_failure_policy_argument() {
        let args = Args::parse_from(["syncgate", "--failure-policy", "open"]);
        let config = Config::from_args(args).unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::Open);

        assert!(Args::try_parse_from(["syncgate", "--failure-policy", "sometimes"]).is_err());
    }

    #[test]
    fn test_zero_store_timeout_rejected() {
        let args = Args::parse_from(["syncgate", "--store-timeout-ms", "0"]);
        assert!(Config::from_args(args).is_err());
    }

    #[test]
    fn test_zero_cleanup_interval_rejected() {
        let args = Args::parse_from(["syncgate", "--store-cleanup-interval", "0"]);
        assert!(Config::from_args(args).is_err());
    }

    #[test]
    fn test_missing_quota_file_rejected() {
        let args = Args::parse_from(["syncgate", "--quotas", "/nonexistent/quotas.json"]);
        assert!(Config::from_args(args).is_err());
    }
}
