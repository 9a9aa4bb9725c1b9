//! Device identity directory for LAN addresses
//!
//! This module handles:
//! - Loading address reservations (`ip hostname [user [category [os]]]`)
//! - The infrastructure table for the gateway's own addresses
//! - Resolving an address to its identity labels
//!
//! The directory is rebuilt from scratch every tick. Infrastructure entries
//! always win over reservations for the same address.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CollectError;

/// Value of every identity field nobody filled in
pub const UNKNOWN: &str = "unknown";

/// Identity labels of one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub ip: Ipv4Addr,
    pub hostname: String,
    pub user: String,
    pub category: String,
    pub os: String,
}

impl IdentityRecord {
    /// Record for an address no source knows about
    pub fn unknown(ip: Ipv4Addr) -> Self {
        Self {
            ip,
            hostname: UNKNOWN.to_string(),
            user: UNKNOWN.to_string(),
            category: UNKNOWN.to_string(),
            os: UNKNOWN.to_string(),
        }
    }

    /// Parse one reservation line. Tags after the hostname are positional:
    /// user, category, os. Missing tags default to "unknown", extra ones are
    /// ignored.
    pub fn from_reservation_line(line: &str) -> Result<Option<Self>, CollectError> {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            return Ok(None);
        }

        let mut fields = line.split_whitespace();
        let ip = fields
            .next()
            .and_then(|ip| ip.parse::<Ipv4Addr>().ok())
            .ok_or_else(|| CollectError::anomaly("reservation", line))?;
        let hostname = fields
            .next()
            .ok_or_else(|| CollectError::anomaly("reservation", line))?;
        let mut tag = || fields.next().unwrap_or(UNKNOWN).to_string();

        Ok(Some(Self {
            ip,
            hostname: hostname.to_string(),
            user: tag(),
            category: tag(),
            os: tag(),
        }))
    }
}

/// Part the gateway's own address plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfrastructureRole {
    /// LAN-facing address of the gateway
    Lan,
    /// WAN-facing address that masquerades LAN traffic
    WanNat,
}

/// Infrastructure table entry, from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfrastructureEntry {
    pub ip: Ipv4Addr,
    pub hostname: String,
    #[serde(default = "unknown_field")]
    pub user: String,
    #[serde(default = "unknown_field")]
    pub category: String,
    #[serde(default = "unknown_field")]
    pub os: String,
    pub role: InfrastructureRole,
}

fn unknown_field() -> String {
    UNKNOWN.to_string()
}

impl InfrastructureEntry {
    fn to_record(&self) -> IdentityRecord {
        IdentityRecord {
            ip: self.ip,
            hostname: self.hostname.clone(),
            user: self.user.clone(),
            category: self.category.clone(),
            os: self.os.clone(),
        }
    }
}

/// Three-entry default: the gateway's LAN address and its two WAN NAT endpoints
pub fn default_infrastructure() -> Vec<InfrastructureEntry> {
    let entry = |ip: [u8; 4], hostname: &str, role| InfrastructureEntry {
        ip: Ipv4Addr::from(ip),
        hostname: hostname.to_string(),
        user: "gateway".to_string(),
        category: "infrastructure".to_string(),
        os: "linux".to_string(),
        role,
    };
    vec![
        entry([192, 168, 1, 1], "gateway-lan", InfrastructureRole::Lan),
        entry([192, 168, 29, 2], "gateway-wan", InfrastructureRole::WanNat),
        entry([10, 0, 0, 2], "gateway-wan2", InfrastructureRole::WanNat),
    ]
}

/// Address -> identity map for one tick
#[derive(Debug, Clone, Default)]
pub struct IdentityDirectory {
    reservations: HashMap<Ipv4Addr, IdentityRecord>,
    infrastructure: HashMap<Ipv4Addr, IdentityRecord>,
}

impl IdentityDirectory {
    /// Load reservations from a file, or from every regular file of a
    /// directory. A missing source gives an empty directory. When the same
    /// address appears twice the last one read wins; across files that order
    /// is whatever the filesystem listing yields.
    pub fn build(reservations_path: &Path, infrastructure: &[InfrastructureEntry]) -> Self {
        let mut records = Vec::new();
        for file in reservation_files(reservations_path) {
            match fs::read_to_string(&file) {
                Ok(content) => records.extend(parse_reservations(&content)),
                Err(e) => warn!("{}", CollectError::unavailable(&file, e)),
            }
        }
        debug!(
            "Loaded {} reservations from {}",
            records.len(),
            reservations_path.display()
        );
        Self::from_records(records, infrastructure)
    }

    pub fn from_records(
        records: impl IntoIterator<Item = IdentityRecord>,
        infrastructure: &[InfrastructureEntry],
    ) -> Self {
        let reservations = records.into_iter().map(|r| (r.ip, r)).collect();
        let infrastructure = infrastructure
            .iter()
            .map(|entry| (entry.ip, entry.to_record()))
            .collect();
        Self {
            reservations,
            infrastructure,
        }
    }

    /// Identity of `ip`: infrastructure table, then reservations, then
    /// an all-"unknown" record
    pub fn lookup(&self, ip: Ipv4Addr) -> Cow<'_, IdentityRecord> {
        self.infrastructure
            .get(&ip)
            .or_else(|| self.reservations.get(&ip))
            .map(Cow::Borrowed)
            .unwrap_or_else(|| Cow::Owned(IdentityRecord::unknown(ip)))
    }

    /// Number of reserved addresses, infrastructure excluded
    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }
}

/// Valid records of a reservation file; bad lines are logged and skipped
pub fn parse_reservations(content: &str) -> Vec<IdentityRecord> {
    content
        .lines()
        .filter_map(|line| match IdentityRecord::from_reservation_line(line) {
            Ok(record) => record,
            Err(e) => {
                debug!("{}", e);
                None
            }
        })
        .collect()
}

fn reservation_files(path: &Path) -> Vec<std::path::PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    match fs::read_dir(path) {
        Ok(entries) => entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|p| p.is_file())
            .collect(),
        Err(e) => {
            warn!("{}", CollectError::unavailable(path, e));
            Vec::new()
        }
    }
}
