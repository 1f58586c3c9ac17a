//! Node configuration
//!
//! Loaded from a YAML file at startup. Every section has serde defaults so
//! a minimal file (or none at all) yields a runnable single-node setup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GhostTalkError, Result};

/// Top-level node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node identifier; defaults to the hex of the public key when empty
    #[serde(default)]
    pub node_id: String,

    /// Long-term Ed25519 secret key file (created 0600 on first run)
    #[serde(default = "default_key_file")]
    pub private_key_file: PathBuf,

    /// Bind address for the HTTP surface
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Address advertised to peers ("host:port"); defaults to listen_address
    #[serde(default)]
    pub public_address: String,

    /// Peers contacted at startup for registration and bootstrap sets
    #[serde(default)]
    pub bootstrap_nodes: Vec<String>,

    #[serde(default)]
    pub tls: TlsSettings,

    #[serde(default)]
    pub mtls: MtlsSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub swarm: SwarmSettings,

    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    #[serde(default)]
    pub metrics: MetricsSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            private_key_file: default_key_file(),
            listen_address: default_listen_address(),
            public_address: String::new(),
            bootstrap_nodes: Vec::new(),
            tls: TlsSettings::default(),
            mtls: MtlsSettings::default(),
            storage: StorageSettings::default(),
            swarm: SwarmSettings::default(),
            rate_limit: RateLimitSettings::default(),
            metrics: MetricsSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

fn default_key_file() -> PathBuf {
    PathBuf::from("ghosttalk.key")
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

/// Server TLS settings (certificate provisioning is out of scope; the keys
/// are recognized and validated so operators can terminate TLS in front).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsSettings {
    #[serde(default)]
    pub cert_file: String,
    #[serde(default)]
    pub key_file: String,
}

/// Mutual-TLS settings for the inter-node surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MtlsSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub ca_file: String,
    #[serde(default)]
    pub cert_file: String,
    #[serde(default)]
    pub key_file: String,
}

/// Swarm store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    #[default]
    Memory,
    PersistentKv,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Data directory for the persistent backend
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,

    /// Total byte budget for stored messages, in gigabytes
    #[serde(default = "default_max_size_gb")]
    pub max_size_gb: u64,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("ghosttalk-data")
}

fn default_max_size_gb() -> u64 {
    10
}

impl StorageSettings {
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_gb * 1024 * 1024 * 1024
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: default_storage_path(),
            max_size_gb: default_max_size_gb(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmSettings {
    /// Number of nodes holding each recipient's messages (k)
    #[serde(default = "default_replication_factor")]
    pub replication_factor: usize,

    /// Message time-to-live, days
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u64,
}

fn default_replication_factor() -> usize {
    3
}

fn default_ttl_days() -> u64 {
    14
}

impl SwarmSettings {
    pub fn ttl_ms(&self) -> u64 {
        self.ttl_days * 24 * 60 * 60 * 1000
    }

    /// Replica acks required before a store reports success:
    /// ⌈k/2⌉ + 1, clamped to k so a single-node swarm can make progress.
    pub fn quorum(&self) -> usize {
        let k = self.replication_factor;
        usize::min(k, k.div_ceil(2) + 1)
    }
}

impl Default for SwarmSettings {
    fn default() -> Self {
        Self {
            replication_factor: default_replication_factor(),
            ttl_days: default_ttl_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_rps")]
    pub requests_per_second: f64,

    #[serde(default = "default_burst")]
    pub burst: f64,
}

fn default_true() -> bool {
    true
}

fn default_rps() -> f64 {
    50.0
}

fn default_burst() -> f64 {
    100.0
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: default_rps(),
            burst: default_burst(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_address")]
    pub listen_address: String,
}

fn default_metrics_address() -> String {
    "127.0.0.1:9100".to_string()
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_address: default_metrics_address(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// trace | debug | info | warn | error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// text | json
    #[serde(default = "default_log_format")]
    pub format: String,

    /// stderr | stdout | file path
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_output() -> String {
    "stderr".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            output: default_log_output(),
        }
    }
}

impl NodeConfig {
    /// Load from a YAML file, or return defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| GhostTalkError::Config(format!("read {}: {e}", path.display())))?;
        Self::parse(&content)
    }

    /// Parse from YAML text.
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)
            .map_err(|e| GhostTalkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// The address peers should dial.
    pub fn advertised_address(&self) -> &str {
        if self.public_address.is_empty() {
            &self.listen_address
        } else {
            &self.public_address
        }
    }

    fn validate(&self) -> Result<()> {
        if self.swarm.replication_factor == 0 {
            return Err(GhostTalkError::Config(
                "swarm.replication_factor must be at least 1".into(),
            ));
        }
        if self.swarm.ttl_days == 0 {
            return Err(GhostTalkError::Config("swarm.ttl_days must be at least 1".into()));
        }
        if self.rate_limit.enabled
            && (self.rate_limit.requests_per_second <= 0.0 || self.rate_limit.burst <= 0.0)
        {
            return Err(GhostTalkError::Config(
                "rate_limit requires positive requests_per_second and burst".into(),
            ));
        }
        if self.mtls.enabled && self.mtls.ca_file.is_empty() {
            return Err(GhostTalkError::Config("mtls.enabled requires mtls.ca_file".into()));
        }
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(GhostTalkError::Config(format!("unknown logging.level '{other}'")))
            }
        }
        Ok(())
    }
}
