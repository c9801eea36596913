//! Optional TOML configuration supplying defaults for the checker knobs.
//! Explicit command-line flags take precedence over anything loaded here.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_checksum_timeout_sec")]
    pub checksum_timeout_sec: u64,

    #[serde(default = "default_checksum_scan_concurrency")]
    pub checksum_scan_concurrency: usize,

    #[serde(default = "default_checksum_snapshot")]
    pub checksum_snapshot: bool,

    /// 0 resolves the snapshot timestamp at runtime.
    #[serde(default)]
    pub checksum_snapshot_timestamp: u64,

    #[serde(default = "default_fetch_replica_info_concurrency")]
    pub fetch_replica_info_concurrency: usize,
}

fn default_checksum_timeout_sec() -> u64 {
    3600
}

fn default_checksum_scan_concurrency() -> usize {
    4
}

fn default_checksum_snapshot() -> bool {
    true
}

fn default_fetch_replica_info_concurrency() -> usize {
    20
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            checksum_timeout_sec: default_checksum_timeout_sec(),
            checksum_scan_concurrency: default_checksum_scan_concurrency(),
            checksum_snapshot: default_checksum_snapshot(),
            checksum_snapshot_timestamp: 0,
            fetch_replica_info_concurrency: default_fetch_replica_info_concurrency(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, or built-in defaults when no file is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                let cfg = toml::from_str(&raw)
                    .with_context(|| format!("failed to parse config file {}", path.display()))?;
                Ok(cfg)
            }
            None => Ok(Self::default()),
        }
    }
}
