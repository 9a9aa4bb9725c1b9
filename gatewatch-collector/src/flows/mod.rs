//! Connection-tracking ingestion and per-device attribution
//!
//! Every tick the live tracking table is scanned once:
//! - [`parse_flow_line`] splits each line into its two directions
//! - [`FlowLedger`] classifies the record and books the bytes
//! - [`render_flows`] joins the counters with device identities
//!
//! Two views come out of it. Device aggregates hold everything a LAN device
//! sent or received, NAT returns included. Local-pair counters only hold
//! LAN-to-LAN traffic.

mod ledger;
mod parser;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use gatewatch_contracts::{families, SampleRegistry};
use tracing::{debug, warn};

use crate::error::CollectError;
use crate::identity::{IdentityDirectory, IdentityRecord};

pub use ledger::{Attribution, Classifier, DeviceCounter, FlowLedger, IngestStats, LanRange};
pub use parser::{parse_flow_line, ConnectionRecord, FlowTuple};

/// Scan the tracking table at `path`. A missing or unreadable table yields
/// an empty ledger.
pub fn collect_flows(path: &Path, classifier: &Classifier) -> FlowLedger {
    let mut ledger = FlowLedger::new();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            warn!("{}", CollectError::unavailable(path, e));
            return ledger;
        }
    };
    let stats = ledger.ingest(BufReader::new(file), classifier);
    debug!(
        "Tracking table: {} records ({} NAT returns), {} skipped, {} devices",
        stats.parsed,
        stats.nat_returns,
        stats.skipped,
        ledger.devices().len()
    );
    ledger
}

const DEVICE_LABELS: [&str; 5] = ["ip", "hostname", "user", "cat", "os"];

/// Values matching [`DEVICE_LABELS`]
fn device_values(identity: &IdentityRecord) -> Vec<String> {
    vec![
        identity.ip.to_string(),
        identity.hostname.clone(),
        identity.user.clone(),
        identity.category.clone(),
        identity.os.clone(),
    ]
}

/// Device values followed by the peer's address and hostname
fn pair_values(device: &IdentityRecord, peer: &IdentityRecord) -> Vec<String> {
    let mut values = device_values(device);
    values.push(peer.ip.to_string());
    values.push(peer.hostname.clone());
    values
}

fn as_strs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

/// Render the ledger, one sample per counter and direction. The same
/// ledger and directory always give the same text.
pub fn render_flows(
    ledger: &FlowLedger,
    directory: &IdentityDirectory,
) -> Result<String, CollectError> {
    let registry = SampleRegistry::new();
    let device_tx = registry.counter_vec(&families::DEVICE_TX, &DEVICE_LABELS)?;
    let device_rx = registry.counter_vec(&families::DEVICE_RX, &DEVICE_LABELS)?;
    let local_tx = registry.counter_vec(
        &families::LOCAL_TX,
        &[DEVICE_LABELS.as_slice(), ["dst_ip", "dst_hostname"].as_slice()].concat(),
    )?;
    let local_rx = registry.counter_vec(
        &families::LOCAL_RX,
        &[DEVICE_LABELS.as_slice(), ["src_ip", "src_hostname"].as_slice()].concat(),
    )?;

    for (ip, counter) in ledger.devices() {
        let values = device_values(&directory.lookup(*ip));
        let values = as_strs(&values);
        device_tx.with_label_values(&values).inc_by(counter.tx_bytes as f64);
        device_rx.with_label_values(&values).inc_by(counter.rx_bytes as f64);
    }
    for ((src, dst), bytes) in ledger.local_tx() {
        let values = pair_values(&directory.lookup(*src), &directory.lookup(*dst));
        local_tx.with_label_values(&as_strs(&values)).inc_by(*bytes as f64);
    }
    for ((dst, src), bytes) in ledger.local_rx() {
        let values = pair_values(&directory.lookup(*dst), &directory.lookup(*src));
        local_rx.with_label_values(&as_strs(&values)).inc_by(*bytes as f64);
    }

    Ok(registry.encode()?)
}
