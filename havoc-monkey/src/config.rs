//! Configuration loading for havoc-monkey.
//!
//! Configuration is loaded from a TOML file (default: `havoc.toml`):
//!
//! ```toml
//! [credentials]
//! username = "lab"
//! password = "lab123"
//!
//! [devices.vSRX1]
//! address = "192.168.56.11"
//! interfaces = ["ge-0/0/0", "ge-0/0/1", "ge-0/0/2"]
//!
//! [schedule]
//! sleep_min_secs = 5
//! sleep_max_secs = 15
//! ```
//!
//! Anything wrong with the fleet is fatal at load time.

use crate::engine::EngineOptions;
use havoc_core::{ActionKind, Credentials, Device, Fleet, ParamRanges};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Root configuration for havoc-monkey.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Fleet-wide default credentials.
    #[serde(default)]
    pub credentials: CredentialsConfig,
    /// Devices by name.
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceConfig>,
    /// Chaos loop configuration.
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// HTTP surface configuration.
    #[serde(default)]
    pub http: HttpConfig,
    /// Telemetry buffer configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Log output configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Login credentials.
#[derive(Clone, Default, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct CredentialsConfig {
    /// Login user.
    #[serde(default)]
    pub username: String,
    /// Login password. Key-based login when absent.
    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// One device.
#[derive(Clone, Default, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct DeviceConfig {
    /// Management address.
    #[serde(default)]
    pub address: String,
    /// Interfaces, in order.
    #[serde(default)]
    pub interfaces: Vec<String>,
    /// Interfaces never selected as a target.
    #[serde(default)]
    pub excluded_interfaces: Vec<String>,
    /// Overrides the fleet-wide username.
    #[serde(default)]
    pub username: Option<String>,
    /// Overrides the fleet-wide password.
    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("address", &self.address)
            .field("interfaces", &self.interfaces)
            .field("excluded_interfaces", &self.excluded_interfaces)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Chaos loop configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Shortest wait after a cycle, in seconds (default: 5).
    #[serde(default = "default_sleep_min")]
    pub sleep_min_secs: u64,
    /// Longest wait after a cycle, in seconds (default: 15).
    #[serde(default = "default_sleep_max")]
    pub sleep_max_secs: u64,
    /// Interfaces excluded on every device (default: management port ge-0/0/0).
    #[serde(default = "default_avoid_interfaces")]
    pub avoid_interfaces: Vec<String>,
    /// Kinds the autonomous loop picks from (default: every forward kind).
    #[serde(default = "default_actions")]
    pub actions: Vec<ActionKind>,
    /// Lowest injected latency figure in ms (default: 50).
    #[serde(default = "default_latency_ms_min")]
    pub latency_ms_min: u32,
    /// Highest injected latency figure in ms (default: 500).
    #[serde(default = "default_latency_ms_max")]
    pub latency_ms_max: u32,
    /// Lowest shaper ceiling in Mbit/s (default: 1).
    #[serde(default = "default_shaper_mbps_min")]
    pub shaper_mbps_min: u32,
    /// Highest shaper ceiling in Mbit/s (default: 100).
    #[serde(default = "default_shaper_mbps_max")]
    pub shaper_mbps_max: u32,
    /// Shaper burst in KB (default: 100).
    #[serde(default = "default_shaper_burst_kb")]
    pub shaper_burst_kb: u32,
    /// Surge policer ceiling in Mbit/s (default: 1000).
    #[serde(default = "default_surge_bandwidth")]
    pub surge_bandwidth_mbps: u32,
    /// Surge policer burst in KB (default: 500).
    #[serde(default = "default_surge_burst")]
    pub surge_burst_kb: u32,
    /// Congestion policer ceiling in Mbit/s (default: 10).
    #[serde(default = "default_congestion_bandwidth")]
    pub congestion_bandwidth_mbps: u32,
    /// Congestion policer burst in KB (default: 100).
    #[serde(default = "default_congestion_burst")]
    pub congestion_burst_kb: u32,
    /// RNG seed. Random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// HTTP surface configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Serve the HTTP surface (default: true).
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    /// Bind address (default: 127.0.0.1:8085).
    #[serde(default = "default_http_bind")]
    pub bind_address: String,
}

/// Telemetry buffer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Chaos events kept for display (default: 20).
    #[serde(default = "default_event_log_capacity")]
    pub event_log_capacity: usize,
    /// Samples kept per latency/packet-loss series (default: 100).
    #[serde(default = "default_series_capacity")]
    pub series_capacity: usize,
    /// Pending observations before producers are refused (default: 1024).
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// Log output configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Output format (default: pretty).
    #[serde(default)]
    pub format: LogFormat,
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human oriented.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
}

// Default value functions
fn default_sleep_min() -> u64 {
    5
}

fn default_sleep_max() -> u64 {
    15
}

fn default_avoid_interfaces() -> Vec<String> {
    vec!["ge-0/0/0".to_string()]
}

fn default_actions() -> Vec<ActionKind> {
    ActionKind::PERTURBING.to_vec()
}

fn default_latency_ms_min() -> u32 {
    50
}

fn default_latency_ms_max() -> u32 {
    500
}

fn default_shaper_mbps_min() -> u32 {
    1
}

fn default_shaper_mbps_max() -> u32 {
    100
}

fn default_shaper_burst_kb() -> u32 {
    100
}

fn default_surge_bandwidth() -> u32 {
    1000
}

fn default_surge_burst() -> u32 {
    500
}

fn default_congestion_bandwidth() -> u32 {
    10
}

fn default_congestion_burst() -> u32 {
    100
}

fn default_http_enabled() -> bool {
    true
}

fn default_http_bind() -> String {
    "127.0.0.1:8085".to_string()
}

fn default_event_log_capacity() -> usize {
    20
}

fn default_series_capacity() -> usize {
    100
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            sleep_min_secs: default_sleep_min(),
            sleep_max_secs: default_sleep_max(),
            avoid_interfaces: default_avoid_interfaces(),
            actions: default_actions(),
            latency_ms_min: default_latency_ms_min(),
            latency_ms_max: default_latency_ms_max(),
            shaper_mbps_min: default_shaper_mbps_min(),
            shaper_mbps_max: default_shaper_mbps_max(),
            shaper_burst_kb: default_shaper_burst_kb(),
            surge_bandwidth_mbps: default_surge_bandwidth(),
            surge_burst_kb: default_surge_burst(),
            congestion_bandwidth_mbps: default_congestion_bandwidth(),
            congestion_burst_kb: default_congestion_burst(),
            seed: None,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_http_bind(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            event_log_capacity: default_event_log_capacity(),
            series_capacity: default_series_capacity(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check the fleet and schedule for anything that would make a run
    /// meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.devices.is_empty() {
            return Err(ConfigError::invalid("no devices configured"));
        }

        for (name, device) in &self.devices {
            if device.address.trim().is_empty() {
                return Err(ConfigError::invalid(format!("device {} has no address", name)));
            }
            if device.interfaces.is_empty() {
                return Err(ConfigError::invalid(format!(
                    "device {} has no interfaces",
                    name
                )));
            }
            let username = device.username.as_deref().unwrap_or(&self.credentials.username);
            if username.trim().is_empty() {
                return Err(ConfigError::invalid(format!(
                    "device {} has no username and [credentials] sets none",
                    name
                )));
            }
        }

        let s = &self.schedule;
        check_range("sleep", s.sleep_min_secs, s.sleep_max_secs)?;
        check_range("latency_ms", s.latency_ms_min, s.latency_ms_max)?;
        check_range("shaper_mbps", s.shaper_mbps_min, s.shaper_mbps_max)?;
        if s.actions.is_empty() {
            return Err(ConfigError::invalid("schedule.actions is empty"));
        }
        if self.telemetry.channel_capacity == 0 {
            return Err(ConfigError::invalid("telemetry.channel_capacity must be > 0"));
        }

        Ok(())
    }

    /// Non-fatal problems, for logging once tracing is up.
    pub fn warnings(&self) -> Vec<String> {
        self.fleet()
            .devices()
            .iter()
            .filter(|d| d.eligible_interfaces().is_empty())
            .map(|d| {
                format!(
                    "every interface on {} is excluded; it will never be perturbed",
                    d.name
                )
            })
            .collect()
    }

    /// Build the fleet, merging `avoid_interfaces` into every device's
    /// excluded set.
    pub fn fleet(&self) -> Fleet {
        let devices = self
            .devices
            .iter()
            .map(|(name, d)| {
                let username = d.username.as_deref().unwrap_or(&self.credentials.username);
                let password = d
                    .password
                    .as_deref()
                    .or(self.credentials.password.as_deref());
                let credentials = match password {
                    Some(p) => Credentials::new(username, p),
                    None => Credentials::key_based(username),
                };
                let interfaces: Vec<&str> = d.interfaces.iter().map(String::as_str).collect();
                Device::new(name, &d.address, credentials, &interfaces)
                    .exclude(d.excluded_interfaces.iter().cloned())
                    .exclude(self.schedule.avoid_interfaces.iter().cloned())
            })
            .collect();
        Fleet::new(devices)
    }

    /// Parameter ranges for action selection.
    pub fn param_ranges(&self) -> ParamRanges {
        let s = &self.schedule;
        ParamRanges {
            latency_ms_min: s.latency_ms_min,
            latency_ms_max: s.latency_ms_max,
            shaper_mbps_min: s.shaper_mbps_min,
            shaper_mbps_max: s.shaper_mbps_max,
            shaper_burst_kb: s.shaper_burst_kb,
            surge_bandwidth_mbps: s.surge_bandwidth_mbps,
            surge_burst_kb: s.surge_burst_kb,
            congestion_bandwidth_mbps: s.congestion_bandwidth_mbps,
            congestion_burst_kb: s.congestion_burst_kb,
        }
    }

    /// Engine options derived from the schedule and telemetry sections.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            sleep_min: Duration::from_secs(self.schedule.sleep_min_secs),
            sleep_max: Duration::from_secs(self.schedule.sleep_max_secs),
            actions: self.schedule.actions.clone(),
            ranges: self.param_ranges(),
            seed: self.schedule.seed,
            event_log_capacity: self.telemetry.event_log_capacity,
            series_capacity: self.telemetry.series_capacity,
        }
    }
}

fn check_range<T: PartialOrd + std::fmt::Display>(
    name: &str,
    min: T,
    max: T,
) -> Result<(), ConfigError> {
    if min > max {
        return Err(ConfigError::invalid(format!(
            "{}: min {} is greater than max {}",
            name, min, max
        )));
    }
    Ok(())
}

/// Configuration error types. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Configuration parsed but is unusable.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            reason: reason.into(),
        }
    }
}
