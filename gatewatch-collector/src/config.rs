//! Collector configuration
//!
//! Handles:
//! - Tick interval, clock tick rate and page size
//! - Kernel source paths (procfs, sysfs, tracking table, reservations)
//! - LAN ranges and the infrastructure table
//! - Per-family toggles
//!
//! Loaded from TOML. Every section is optional and falls back to defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gatewatch_contracts::DEFAULT_SNAPSHOT_PATH;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CollectError;
use crate::flows::{Classifier, LanRange};
use crate::identity::{default_infrastructure, InfrastructureEntry, InfrastructureRole};

/// Overrides the config file location
pub const CONFIG_ENV: &str = "GATEWATCH_COLLECTOR_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub collector: CollectorSettings,
    pub sources: SourcePaths,
    pub network: NetworkConfig,
    pub families: FamilyToggles,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorSettings {
    pub interval_secs: u64,
    /// USER_HZ of the kernel, used to turn CPU ticks into seconds
    pub clock_ticks_per_second: u64,
    /// Kernel page size, used to turn statm pages into bytes
    pub page_size_bytes: u64,
    pub snapshot_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcePaths {
    pub proc_root: PathBuf,
    pub sys_root: PathBuf,
    pub conntrack_path: PathBuf,
    /// Reservation file, or a directory of them
    pub reservations_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub lan_ranges: Vec<LanRange>,
    pub infrastructure: Vec<InfrastructureEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FamilyToggles {
    pub cpu: bool,
    pub memory: bool,
    pub temperature: bool,
    pub network: bool,
    pub flows: bool,
    pub processes: bool,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            interval_secs: 15,
            clock_ticks_per_second: 100,
            page_size_bytes: 4096,
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
        }
    }
}

impl Default for SourcePaths {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            sys_root: PathBuf::from("/sys"),
            conntrack_path: PathBuf::from("/proc/net/nf_conntrack"),
            reservations_path: PathBuf::from("/etc/gatewatch/reservations"),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            lan_ranges: vec![LanRange::HOME_LAN],
            infrastructure: default_infrastructure(),
        }
    }
}

impl Default for FamilyToggles {
    fn default() -> Self {
        Self {
            cpu: true,
            memory: true,
            temperature: true,
            network: true,
            flows: true,
            processes: true,
        }
    }
}

impl CollectorConfig {
    /// Load from `$GATEWATCH_COLLECTOR_CONFIG`, else the OS config directory.
    /// No file means defaults.
    pub async fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            Self::load_from(&path).await
        } else {
            info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: CollectorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn config_file_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        path.push("gatewatch");
        path.push("collector.toml");
        Ok(path)
    }

    pub fn validate(&self) -> Result<(), CollectError> {
        if self.collector.interval_secs == 0 {
            return Err(CollectError::Config("interval_secs must be positive".into()));
        }
        if self.collector.clock_ticks_per_second == 0 {
            return Err(CollectError::Config("clock_ticks_per_second must be positive".into()));
        }
        if self.collector.page_size_bytes == 0 {
            return Err(CollectError::Config("page_size_bytes must be positive".into()));
        }
        if self.network.lan_ranges.is_empty() {
            return Err(CollectError::Config("at least one LAN range is required".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for entry in &self.network.infrastructure {
            if !seen.insert(entry.ip) {
                return Err(CollectError::Config(format!(
                    "infrastructure address {} listed twice",
                    entry.ip
                )));
            }
        }
        Ok(())
    }

    /// Classifier built from the LAN ranges and the WAN NAT entries
    pub fn classifier(&self) -> Classifier {
        let wan_nat = self
            .network
            .infrastructure
            .iter()
            .filter(|entry| entry.role == InfrastructureRole::WanNat)
            .map(|entry| entry.ip);
        Classifier::new(self.network.lan_ranges.clone(), wan_nat)
    }
}
