//! Metric family declarations
//!
//! The exporter emits a HELP/TYPE pair for every entry of [`FAMILIES`] on each
//! request, whether or not the current snapshot carries samples for it. The
//! collector registers its metrics from the same constants so names can't
//! drift between the two processes.
//!
//! The block is written here rather than by the prometheus encoder: a
//! registry only encodes families that hold at least one sample.

use std::fmt::{self, Display, Write};

use prometheus::Opts;

/// Prometheus metric type of a family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

impl Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One metric family: name, help text and type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Family {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
}

impl Family {
    const fn counter(name: &'static str, help: &'static str) -> Self {
        Self { name, help, kind: MetricKind::Counter }
    }

    const fn gauge(name: &'static str, help: &'static str) -> Self {
        Self { name, help, kind: MetricKind::Gauge }
    }

    /// `# HELP` and `# TYPE` lines for this family
    pub fn declaration(&self) -> String {
        format!(
            "# HELP {name} {help}\n# TYPE {name} {kind}\n",
            name = self.name,
            help = self.help,
            kind = self.kind
        )
    }

    /// Registration options for a metric of this family
    pub fn opts(&self) -> Opts {
        Opts::new(self.name, self.help)
    }
}

// CPU
pub const CPU_SECONDS: Family = Family::counter(
    "gatewatch_cpu_seconds_total",
    "Seconds each core spent in each mode since boot",
);

// Memory
pub const MEMORY_TOTAL: Family =
    Family::gauge("gatewatch_memory_total_bytes", "Total physical memory in bytes");
pub const MEMORY_FREE: Family =
    Family::gauge("gatewatch_memory_free_bytes", "Free physical memory in bytes");
pub const MEMORY_AVAILABLE: Family = Family::gauge(
    "gatewatch_memory_available_bytes",
    "Available physical memory in bytes",
);
pub const MEMORY_USED: Family = Family::gauge(
    "gatewatch_memory_used_bytes",
    "Used physical memory in bytes (total - free - buffers - cached)",
);
pub const MEMORY_BUFFERS: Family =
    Family::gauge("gatewatch_memory_buffers_bytes", "Block device buffers in bytes");
pub const MEMORY_CACHED: Family =
    Family::gauge("gatewatch_memory_cached_bytes", "Page cache in bytes");

// Swap
pub const SWAP_TOTAL: Family = Family::gauge("gatewatch_swap_total_bytes", "Total swap in bytes");
pub const SWAP_FREE: Family = Family::gauge("gatewatch_swap_free_bytes", "Free swap in bytes");
pub const SWAP_USED: Family = Family::gauge("gatewatch_swap_used_bytes", "Used swap in bytes");

// Temperature
pub const TEMPERATURE: Family = Family::gauge(
    "gatewatch_temperature_celsius",
    "Sensor temperature in degrees Celsius",
);

// Network interfaces
pub const NET_RX_BYTES: Family = Family::counter(
    "gatewatch_network_receive_bytes_total",
    "Bytes received, per network interface",
);
pub const NET_TX_BYTES: Family = Family::counter(
    "gatewatch_network_transmit_bytes_total",
    "Bytes transmitted, per network interface",
);
pub const NET_RX_PACKETS: Family = Family::counter(
    "gatewatch_network_receive_packets_total",
    "Packets received, per network interface",
);
pub const NET_TX_PACKETS: Family = Family::counter(
    "gatewatch_network_transmit_packets_total",
    "Packets transmitted, per network interface",
);
pub const NET_RX_ERRORS: Family = Family::counter(
    "gatewatch_network_receive_errors_total",
    "Receive errors, per network interface",
);
pub const NET_TX_ERRORS: Family = Family::counter(
    "gatewatch_network_transmit_errors_total",
    "Transmit errors, per network interface",
);

// Devices
pub const DEVICE_TX: Family = Family::counter(
    "gatewatch_device_tx_bytes",
    "Bytes sent by a LAN device across its tracked connections",
);
pub const DEVICE_RX: Family = Family::counter(
    "gatewatch_device_rx_bytes",
    "Bytes received by a LAN device across its tracked connections",
);
pub const LOCAL_TX: Family = Family::counter(
    "gatewatch_local_tx_bytes",
    "Bytes sent from one LAN device to another",
);
pub const LOCAL_RX: Family = Family::counter(
    "gatewatch_local_rx_bytes",
    "Bytes received by one LAN device from another",
);

// Processes, aggregated by command name
pub const PROCESS_CPU_SECONDS: Family = Family::counter(
    "gatewatch_process_cpu_seconds_total",
    "User and system CPU seconds of every process sharing a name",
);
pub const PROCESS_RESIDENT_MEMORY: Family = Family::gauge(
    "gatewatch_process_resident_memory_bytes",
    "Resident memory of every process sharing a name, in bytes",
);
pub const PROCESS_VIRTUAL_MEMORY: Family = Family::gauge(
    "gatewatch_process_virtual_memory_bytes",
    "Virtual memory of every process sharing a name, in bytes",
);
pub const PROCESS_START_TIME: Family = Family::gauge(
    "gatewatch_process_start_time_seconds",
    "Start time of the oldest process with this name, in Unix seconds",
);
pub const PROCESS_RUNTIME: Family = Family::gauge(
    "gatewatch_process_runtime_seconds",
    "Seconds since the oldest process with this name started",
);
pub const PROCESS_DISK_READ: Family = Family::counter(
    "gatewatch_process_disk_read_bytes_total",
    "Bytes read from storage by every process sharing a name",
);
pub const PROCESS_DISK_WRITE: Family = Family::counter(
    "gatewatch_process_disk_write_bytes_total",
    "Bytes written to storage by every process sharing a name",
);

// Liveness
pub const UP: Family = Family::gauge(
    "gatewatch_up",
    "1 if a collector snapshot is published, 0 otherwise",
);
pub const EXPORTER_TIMESTAMP: Family = Family::gauge(
    "gatewatch_exporter_timestamp_seconds",
    "Exporter clock at response time, in Unix seconds",
);

/// Every family, in exposition order
pub const FAMILIES: &[Family] = &[
    CPU_SECONDS,
    MEMORY_TOTAL,
    MEMORY_FREE,
    MEMORY_AVAILABLE,
    MEMORY_USED,
    MEMORY_BUFFERS,
    MEMORY_CACHED,
    SWAP_TOTAL,
    SWAP_FREE,
    SWAP_USED,
    TEMPERATURE,
    NET_RX_BYTES,
    NET_TX_BYTES,
    NET_RX_PACKETS,
    NET_TX_PACKETS,
    NET_RX_ERRORS,
    NET_TX_ERRORS,
    DEVICE_TX,
    DEVICE_RX,
    LOCAL_TX,
    LOCAL_RX,
    PROCESS_CPU_SECONDS,
    PROCESS_RESIDENT_MEMORY,
    PROCESS_VIRTUAL_MEMORY,
    PROCESS_START_TIME,
    PROCESS_RUNTIME,
    PROCESS_DISK_READ,
    PROCESS_DISK_WRITE,
    UP,
    EXPORTER_TIMESTAMP,
];

/// Static declaration block served ahead of every snapshot
pub fn header_block() -> String {
    let mut out = String::new();
    for family in FAMILIES {
        // Writing into a String cannot fail
        let _ = write!(out, "{}", family.declaration());
    }
    out
}
