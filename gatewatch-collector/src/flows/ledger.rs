//! Attribution of connection bytes to LAN devices

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io::BufRead;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::parser::{parse_flow_line, ConnectionRecord, FlowTuple};
use crate::error::CollectError;

/// IPv4 network in CIDR notation, e.g. `192.168.1.0/24`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanRange {
    network: Ipv4Addr,
    prefix: u8,
}

impl LanRange {
    /// 192.168.1.0/24
    pub const HOME_LAN: LanRange = LanRange {
        network: Ipv4Addr::new(192, 168, 1, 0),
        prefix: 24,
    };

    pub fn new(network: Ipv4Addr, prefix: u8) -> Result<Self, CollectError> {
        if prefix > 32 {
            return Err(CollectError::Config(format!("prefix /{prefix} out of range")));
        }
        let mask = Self::mask(prefix);
        Ok(Self {
            network: Ipv4Addr::from(u32::from(network) & mask),
            prefix,
        })
    }

    fn mask(prefix: u8) -> u32 {
        match prefix {
            0 => 0,
            p => u32::MAX << (32 - u32::from(p)),
        }
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & Self::mask(self.prefix) == u32::from(self.network)
    }
}

impl FromStr for LanRange {
    type Err = CollectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CollectError::Config(format!("invalid LAN range {s:?}"));
        let (network, prefix) = s.trim().split_once('/').ok_or_else(invalid)?;
        let network = network.parse().map_err(|_| invalid())?;
        let prefix = prefix.parse().map_err(|_| invalid())?;
        Self::new(network, prefix)
    }
}

impl TryFrom<String> for LanRange {
    type Error = CollectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LanRange> for String {
    fn from(range: LanRange) -> Self {
        range.to_string()
    }
}

impl fmt::Display for LanRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// Decides which addresses are local and which are the gateway's WAN NAT
/// endpoints
#[derive(Debug, Clone)]
pub struct Classifier {
    lan_ranges: Vec<LanRange>,
    wan_nat: HashSet<Ipv4Addr>,
}

impl Classifier {
    pub fn new(lan_ranges: Vec<LanRange>, wan_nat: impl IntoIterator<Item = Ipv4Addr>) -> Self {
        Self {
            lan_ranges,
            wan_nat: wan_nat.into_iter().collect(),
        }
    }

    /// Inside a LAN range, loopback and unspecified excluded
    pub fn is_local(&self, ip: Ipv4Addr) -> bool {
        !ip.is_loopback()
            && !ip.is_unspecified()
            && self.lan_ranges.iter().any(|range| range.contains(ip))
    }

    pub fn is_wan_nat(&self, ip: Ipv4Addr) -> bool {
        self.wan_nat.contains(&ip)
    }

    /// Reply half of a masqueraded session: a local source whose reply comes
    /// back to a WAN NAT endpoint on the very port the device used
    pub fn is_nat_return(&self, record: &ConnectionRecord) -> bool {
        let Some(reply) = record.reply else {
            return false;
        };
        let forward = record.forward;
        self.is_local(forward.src)
            && self.is_wan_nat(reply.dst)
            && forward.sport.is_some()
            && forward.sport == reply.dport
    }
}

/// How a record was booked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    /// Both directions billed to the originating device
    NatReturn,
    /// Each direction booked on its own endpoints
    Direct,
}

/// tx/rx bytes of one device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCounter {
    pub tx_bytes: u64,
    pub rx_bytes: u64,
}

/// Lines fed to [`FlowLedger::ingest`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub parsed: usize,
    pub skipped: usize,
    pub nat_returns: usize,
}

/// Counters for one scan of the tracking table.
///
/// Built fresh every tick and handed to rendering; nothing carries over.
/// Ordered maps keep the rendered output stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowLedger {
    devices: BTreeMap<Ipv4Addr, DeviceCounter>,
    local_tx: BTreeMap<(Ipv4Addr, Ipv4Addr), u64>,
    local_rx: BTreeMap<(Ipv4Addr, Ipv4Addr), u64>,
}

impl FlowLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Book one record. NAT returns only touch the device aggregate; the
    /// local-pair maps are left alone.
    pub fn record(&mut self, record: &ConnectionRecord, classifier: &Classifier) -> Attribution {
        if classifier.is_nat_return(record) {
            let device = self.devices.entry(record.forward.src).or_default();
            device.tx_bytes = device.tx_bytes.saturating_add(record.forward.bytes);
            if let Some(reply) = record.reply {
                device.rx_bytes = device.rx_bytes.saturating_add(reply.bytes);
            }
            return Attribution::NatReturn;
        }

        self.book_direction(&record.forward, classifier);
        if let Some(reply) = &record.reply {
            self.book_direction(reply, classifier);
        }
        Attribution::Direct
    }

    fn book_direction(&mut self, tuple: &FlowTuple, classifier: &Classifier) {
        let src_local = classifier.is_local(tuple.src);
        let dst_local = classifier.is_local(tuple.dst);

        if src_local {
            let device = self.devices.entry(tuple.src).or_default();
            device.tx_bytes = device.tx_bytes.saturating_add(tuple.bytes);
            if dst_local {
                add(&mut self.local_tx, (tuple.src, tuple.dst), tuple.bytes);
            }
        }
        if dst_local {
            let device = self.devices.entry(tuple.dst).or_default();
            device.rx_bytes = device.rx_bytes.saturating_add(tuple.bytes);
            if src_local {
                add(&mut self.local_rx, (tuple.dst, tuple.src), tuple.bytes);
            }
        }
    }

    /// Feed every line of a tracking table. A line that isn't valid UTF-8
    /// is counted as skipped and the scan goes on; only a read error ends it.
    pub fn ingest<R: BufRead>(&mut self, mut reader: R, classifier: &Classifier) -> IngestStats {
        let mut stats = IngestStats::default();
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    // The table can shrink under us while reading
                    warn!("Stopped reading tracking table: {}", e);
                    break;
                }
            }
            match std::str::from_utf8(&buffer) {
                Ok(line) => self.ingest_line(line, classifier, &mut stats),
                Err(_) => {
                    stats.skipped += 1;
                    let line = String::from_utf8_lossy(&buffer);
                    debug!("{}", CollectError::anomaly("conntrack", line.trim_end()));
                }
            }
        }
        stats
    }

    fn ingest_line(&mut self, line: &str, classifier: &Classifier, stats: &mut IngestStats) {
        if line.trim().is_empty() {
            return;
        }
        match parse_flow_line(line) {
            Some(record) => {
                stats.parsed += 1;
                if self.record(&record, classifier) == Attribution::NatReturn {
                    stats.nat_returns += 1;
                }
            }
            None => {
                stats.skipped += 1;
                debug!("{}", CollectError::anomaly("conntrack", line.trim_end()));
            }
        }
    }

    /// Per-device aggregates, keyed by local address
    pub fn devices(&self) -> &BTreeMap<Ipv4Addr, DeviceCounter> {
        &self.devices
    }

    /// Bytes sent, keyed (src, dst)
    pub fn local_tx(&self) -> &BTreeMap<(Ipv4Addr, Ipv4Addr), u64> {
        &self.local_tx
    }

    /// Bytes received, keyed (dst, src)
    pub fn local_rx(&self) -> &BTreeMap<(Ipv4Addr, Ipv4Addr), u64> {
        &self.local_rx
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

fn add(map: &mut BTreeMap<(Ipv4Addr, Ipv4Addr), u64>, key: (Ipv4Addr, Ipv4Addr), bytes: u64) {
    let counter = map.entry(key).or_insert(0);
    *counter = counter.saturating_add(bytes);
}
