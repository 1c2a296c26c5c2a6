//! # Configuration
//!
//! Settings for one benchmark run. Durations are stored as milliseconds so
//! they can be overridden from TOML files and `ISUCARI_*` environment
//! variables without a custom format.

pub mod loader;

pub use loader::ConfigLoader;

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level benchmarker configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Target application and simulator URLs
    pub target: TargetConfig,

    /// Simulator listeners and latency
    pub external: ExternalConfig,

    /// Ground-truth data locations
    pub data: DataConfig,

    /// Run phases and pacing
    pub timing: TimingConfig,

    /// Count tolerances for listing crawls
    pub slack: CrawlSlack,

    /// Log output
    pub logging: LoggingConfig,
}

/// Where the target application and the simulators are reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Base URL of the target application
    pub app_url: String,

    /// Value of the `Host` header sent to the target
    pub target_host: String,

    /// Payment simulator URL as seen by the target
    pub payment_url: String,

    /// Shipment simulator URL as seen by the target
    pub shipment_url: String,

    /// Per-request timeout
    pub request_timeout_ms: u64,

    /// Timeout of the `/initialize` call
    pub initialize_timeout_ms: u64,
}

/// Simulator listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalConfig {
    /// Payment simulator port
    pub payment_port: u16,

    /// Shipment simulator port
    pub shipment_port: u16,

    /// Comma separated allow-list; empty allows everyone
    pub allowed_ips: String,

    /// Latency added to every simulator response during the validation phase
    pub validation_delay_ms: u64,

    /// Latency of the standalone simulator binaries
    pub standalone_delay_ms: u64,

    /// Delay between `/accept` and the reservation reporting `done`
    pub shipment_done_delay_ms: u64,

    /// Card token lifetime
    pub card_token_ttl_ms: u64,
}

/// Ground-truth data locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding `result/`, `images/` and `keywords.tsv`
    pub data_dir: PathBuf,

    /// Directory holding `js/` and `css/`; skipped when absent
    pub static_dir: Option<PathBuf>,

    /// Seed for user shuffles; random when unset
    pub seed: Option<u64>,
}

/// Phase lengths and scenario pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Length of the validation phase
    pub execution_secs: u64,

    /// Pause between validation and the final check
    pub final_check_wait_ms: u64,

    /// Interval of each load loop
    pub load_interval_ms: u64,

    /// Delay before the first campaign round
    pub campaign_start_ms: u64,

    /// Interval between campaign rounds
    pub campaign_interval_ms: u64,
}

/// Tolerances applied when a crawled count is compared with ground truth.
///
/// Concurrent scenarios keep selling and buying while a crawl runs, so an
/// exact match is only demanded where nothing else can interfere.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSlack {
    /// User page count tolerance during the verification pass
    pub verify_user_items: i64,

    /// User page count tolerance during check and load loops
    pub user_items: i64,

    /// Transactions count tolerance during verification and check loops
    pub transactions: i64,

    /// Transactions count tolerance during load loops
    pub load_transactions: i64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            app_url: "http://127.0.0.1:8000".to_string(),
            target_host: "isucon9.catatsuy.org".to_string(),
            payment_url: "http://localhost:5555".to_string(),
            shipment_url: "http://localhost:7000".to_string(),
            request_timeout_ms: 10_000,
            initialize_timeout_ms: 15_000,
        }
    }
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            payment_port: 5555,
            shipment_port: 7000,
            allowed_ips: String::new(),
            validation_delay_ms: 800,
            standalone_delay_ms: 200,
            shipment_done_delay_ms: 5_000,
            card_token_ttl_ms: 5 * 60 * 1000,
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("initial-data"),
            static_dir: None,
            seed: None,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            execution_secs: 60,
            final_check_wait_ms: 1_000,
            load_interval_ms: 3_000,
            campaign_start_ms: 13_000,
            campaign_interval_ms: 8_000,
        }
    }
}

impl Default for CrawlSlack {
    fn default() -> Self {
        Self { verify_user_items: 1, user_items: 10, transactions: 1, load_transactions: 5 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl BenchConfig {
    /// Check cross-field constraints.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("target.app_url", &self.target.app_url),
            ("target.payment_url", &self.target.payment_url),
            ("target.shipment_url", &self.target.shipment_url),
        ] {
            let rest = url
                .strip_prefix("http://")
                .or_else(|| url.strip_prefix("https://"))
                .ok_or_else(|| Error::Configuration {
                    message: format!("{name} must start with http:// or https://: {url}"),
                })?;
            if rest.trim_end_matches('/').is_empty() {
                return Err(Error::Configuration { message: format!("{name} has no host: {url}") });
            }
        }

        if self.target.request_timeout_ms == 0 {
            return Err(Error::Configuration {
                message: "target.request_timeout_ms must be greater than 0".into(),
            });
        }

        if self.timing.execution_secs == 0 {
            return Err(Error::Configuration {
                message: "timing.execution_secs must be greater than 0".into(),
            });
        }

        if self.slack.user_items < 0 || self.slack.transactions < 0 {
            return Err(Error::Configuration { message: "slack values must not be negative".into() });
        }

        self.allowed_ips()?;
        Ok(())
    }

    /// Parsed `external.allowed_ips`.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for an entry that is not an IP address.
    pub fn allowed_ips(&self) -> Result<Vec<IpAddr>> {
        self.external
            .allowed_ips
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse().map_err(|_| Error::Configuration {
                    message: format!("external.allowed_ips: {s} cannot be parsed"),
                })
            })
            .collect()
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.target.request_timeout_ms)
    }

    /// Length of the validation phase.
    #[must_use]
    pub const fn execution_time(&self) -> Duration {
        Duration::from_secs(self.timing.execution_secs)
    }
}
