//! poolgrid.toml configuration parser.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::Pool;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolgridConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Pools upserted into the store when the daemon starts.
    #[serde(default)]
    pub pools: Vec<Pool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8460,
            data_dir: PathBuf::from("/var/lib/poolgrid"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Upper bound on instance tasks running at once.
    pub max_parallel_instances: usize,
    /// Wait bound for a single provider call.
    pub call_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_parallel_instances: 16,
            call_timeout_secs: 120,
            retry: RetrySettings::default(),
        }
    }
}

/// Retry budget for provider timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// In-process provider that keeps resources in memory.
    #[default]
    Simulated,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,
    /// Artificial latency added to every simulated provider call.
    #[serde(default)]
    pub latency_ms: u64,
}

impl PoolgridConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PoolgridConfig = toml::from_str(&content)?;
        for pool in &config.pools {
            pool.validate()
                .map_err(|e| anyhow::anyhow!("pool '{}' in {}: {e}", pool.id, path.display()))?;
        }
        Ok(config)
    }

    /// Read `path` when it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
