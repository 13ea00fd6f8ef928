//! Configuration management

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main probe configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub worker: WorkerSettings,

    #[serde(default)]
    pub measurement: MeasurementSettings,

    #[serde(default)]
    pub lookup: LookupSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementSettings {
    /// Wall-clock cap for dig invocations, in seconds
    #[serde(default = "default_dns_cap_secs")]
    pub dns_cap_secs: u64,

    /// Wall-clock cap for ping invocations, in seconds
    #[serde(default = "default_ping_cap_secs")]
    pub ping_cap_secs: u64,

    /// Wall-clock cap for traceroute invocations, in seconds
    #[serde(default = "default_traceroute_cap_secs")]
    pub traceroute_cap_secs: u64,

    /// Wall-clock cap for mtr invocations, in seconds
    #[serde(default = "default_mtr_cap_secs")]
    pub mtr_cap_secs: u64,

    /// HTTP request timeout, in seconds
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Response bytes retained in `rawBody`; the download continues past the
    /// cap but further bytes are dropped
    #[serde(default = "default_http_body_limit")]
    pub http_body_limit: usize,
}

impl Default for MeasurementSettings {
    fn default() -> Self {
        Self {
            dns_cap_secs: default_dns_cap_secs(),
            ping_cap_secs: default_ping_cap_secs(),
            traceroute_cap_secs: default_traceroute_cap_secs(),
            mtr_cap_secs: default_mtr_cap_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            http_body_limit: default_http_body_limit(),
        }
    }
}

impl MeasurementSettings {
    pub fn dns_cap(&self) -> Duration {
        Duration::from_secs(self.dns_cap_secs)
    }

    pub fn ping_cap(&self) -> Duration {
        Duration::from_secs(self.ping_cap_secs)
    }

    pub fn traceroute_cap(&self) -> Duration {
        Duration::from_secs(self.traceroute_cap_secs)
    }

    pub fn mtr_cap(&self) -> Duration {
        Duration::from_secs(self.mtr_cap_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupSettings {
    /// Per-query timeout for ASN TXT lookups, in milliseconds
    #[serde(default = "default_asn_timeout_ms")]
    pub asn_timeout_ms: u64,

    /// Per-query timeout for reverse-DNS lookups, in milliseconds
    #[serde(default = "default_rdns_timeout_ms")]
    pub rdns_timeout_ms: u64,
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self {
            asn_timeout_ms: default_asn_timeout_ms(),
            rdns_timeout_ms: default_rdns_timeout_ms(),
        }
    }
}

impl LookupSettings {
    pub fn asn_timeout(&self) -> Duration {
        Duration::from_millis(self.asn_timeout_ms)
    }

    pub fn rdns_timeout(&self) -> Duration {
        Duration::from_millis(self.rdns_timeout_ms)
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}
fn default_dns_cap_secs() -> u64 {
    20
}
fn default_ping_cap_secs() -> u64 {
    30
}
fn default_traceroute_cap_secs() -> u64 {
    60
}
fn default_mtr_cap_secs() -> u64 {
    40
}
fn default_http_timeout_secs() -> u64 {
    10
}
fn default_http_body_limit() -> usize {
    10_000
}
fn default_asn_timeout_ms() -> u64 {
    2000
}
fn default_rdns_timeout_ms() -> u64 {
    1000
}

impl ProbeConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, crate::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;

        let config: ProbeConfig = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }
}

/// Whether the probe runs in development mode (`PROBE_ENV=development`).
/// Development mode stretches MTR's inter-packet interval to go easy on
/// local networks.
pub fn development() -> bool {
    std::env::var("PROBE_ENV").is_ok_and(|v| v == "development")
}
