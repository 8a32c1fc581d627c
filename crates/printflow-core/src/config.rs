// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Agent configuration.
//
// The ERP resolves global vs. per-terminal server URLs on its side; the agent
// sees one effective configuration at startup, loaded from a TOML file with
// every field defaulted so an empty file is a valid config.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::types::{PrinterCapabilities, PrinterTransport};

/// Complete agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Listen address for the HTTP front door.  The ERP's default agent URL
    /// is `https://localhost:5000`, so the default port here is 5000.
    pub bind_addr: String,
    /// Path of the SQLite job store.  `None` keeps job state in memory only.
    pub store_path: Option<PathBuf>,
    /// Directory where virtual-PDF jobs are spooled.
    pub spool_dir: PathBuf,
    pub erp: ErpConfig,
    pub limits: LimitsConfig,
    pub discovery: DiscoveryConfig,
    /// Statically configured printers, merged into the registry at startup.
    pub printers: Vec<PrinterSeed>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".into(),
            store_path: None,
            spool_dir: PathBuf::from("spool"),
            erp: ErpConfig::default(),
            limits: LimitsConfig::default(),
            discovery: DiscoveryConfig::default(),
            printers: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| AgentError::Config(e.to_string()))
    }
}

/// How to reach the ERP backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ErpConfig {
    /// Print-history logging endpoint (the ERP's `/printflow/log` route).
    /// When unset, terminal outcomes are logged locally only.
    pub log_url: Option<String>,
}

/// Bounds on intake, queuing, and delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum accepted payload size in bytes.
    pub max_payload_bytes: usize,
    /// Bounded capacity of each per-printer queue.
    pub queue_capacity: usize,
    /// Maximum transport delivery attempts per job.
    pub max_attempts: u32,
    /// Hard timeout for a single delivery attempt.
    pub delivery_timeout_secs: u64,
    /// Base delay for exponential retry backoff.
    pub retry_base_ms: u64,
    /// Cap on the retry backoff delay.
    pub retry_max_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 10 * 1024 * 1024,
            queue_capacity: 32,
            max_attempts: 3,
            delivery_timeout_secs: 30,
            retry_base_ms: 500,
            retry_max_ms: 10_000,
        }
    }
}

/// Printer discovery behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Interval between availability probe sweeps.
    pub interval_secs: u64,
    /// How long a drained queue outlives its offline printer.
    pub offline_grace_secs: u64,
    /// Whether to browse mDNS for raw network printers.
    pub mdns: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            offline_grace_secs: 300,
            mdns: true,
        }
    }
}

/// A statically configured printer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterSeed {
    pub name: String,
    #[serde(flatten)]
    pub transport: PrinterTransport,
    #[serde(default)]
    pub capabilities: PrinterCapabilities,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg = AgentConfig::from_toml("").expect("empty config");
        assert_eq!(cfg.bind_addr, "0.0.0.0:5000");
        assert_eq!(cfg.limits.max_attempts, 3);
        assert_eq!(cfg.limits.queue_capacity, 32);
        assert!(cfg.erp.log_url.is_none());
        assert!(cfg.printers.is_empty());
        assert!(cfg.discovery.mdns);
    }

    #[test]
    fn parses_full_config() {
        let text = r#"
            bind_addr = "127.0.0.1:5001"
            store_path = "jobs.db"

            [erp]
            log_url = "http://erp.local:8069/printflow/log"

            [limits]
            queue_capacity = 8
            max_attempts = 5

            [discovery]
            interval_secs = 30
            mdns = false

            [[printers]]
            name = "Kitchen1"
            kind = "network"
            host = "192.168.1.50"
            port = 9100

            [[printers]]
            name = "Labels"
            kind = "usb"
            device = "/dev/usb/lp0"
            capabilities = { raw = false, graphic = false, zpl = true }
        "#;
        let cfg = AgentConfig::from_toml(text).expect("full config");
        assert_eq!(cfg.bind_addr, "127.0.0.1:5001");
        assert_eq!(cfg.limits.queue_capacity, 8);
        assert_eq!(cfg.limits.max_attempts, 5);
        assert_eq!(cfg.printers.len(), 2);
        assert_eq!(
            cfg.printers[0].transport,
            PrinterTransport::Network {
                host: "192.168.1.50".into(),
                port: 9100
            }
        );
        assert!(cfg.printers[1].capabilities.zpl);
        assert!(!cfg.printers[1].capabilities.raw);
        assert!(!cfg.discovery.mdns);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let err = AgentConfig::from_toml("bind_addr = 5000").unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }
}
