//! Kernel counter sampling for the gateway
//!
//! Reads raw counters straight from procfs and sysfs:
//! - Per-core CPU ticks (`/proc/stat`)
//! - Memory and swap (`/proc/meminfo`)
//! - Temperature sensors (`/sys/class/thermal`, `/sys/class/hwmon`)
//! - Network interface counters (`/proc/net/dev`)
//! - Per-process CPU, memory and disk figures (`/proc/<pid>`)
//!
//! Nothing here fails the tick: an unreadable source yields an empty result
//! and a warning, a malformed line is skipped.
//!
//! Counters are emitted as-is. Rates are left to the scraper, so no state is
//! kept between ticks.

mod process;
mod procfs;
mod thermal;

use std::path::Path;

use gatewatch_contracts::{encode_gauges, families, SampleRegistry};
use tracing::{debug, warn};

use crate::error::CollectError;

pub use process::{
    collect_processes, parse_io, parse_process_stat, parse_statm, ProcessGroup, ProcessStat,
    ProcessTable,
};
pub use procfs::{parse_boot_time, parse_meminfo, parse_net_dev, parse_stat, parse_uptime};
pub use thermal::{scale_reading, scan_sensors, sensor_id};

/// Cumulative tick counters of one core since boot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawCpuSample {
    pub core: u32,
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
}

impl RawCpuSample {
    /// Counters keyed by the `mode` label value
    pub fn modes(&self) -> [(&'static str, u64); 10] {
        [
            ("user", self.user),
            ("nice", self.nice),
            ("system", self.system),
            ("idle", self.idle),
            ("iowait", self.iowait),
            ("irq", self.irq),
            ("softirq", self.softirq),
            ("steal", self.steal),
            ("guest", self.guest),
            ("guest_nice", self.guest_nice),
        ]
    }
}

/// Memory and swap figures, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemorySample {
    pub total: u64,
    pub free: u64,
    pub available: u64,
    pub buffers: u64,
    pub cached: u64,
    pub swap_total: u64,
    pub swap_free: u64,
}

impl MemorySample {
    /// total - free - buffers - cached, clamped at zero when the kernel's
    /// figures don't add up
    pub fn used(&self) -> u64 {
        self.total
            .saturating_sub(self.free)
            .saturating_sub(self.buffers)
            .saturating_sub(self.cached)
    }

    pub fn swap_used(&self) -> u64 {
        self.swap_total.saturating_sub(self.swap_free)
    }
}

/// One temperature sensor reading
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureSample {
    pub sensor: String,
    pub celsius: f64,
}

/// Counters of one network interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceSample {
    pub name: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
}

/// Per-core samples, empty when `/proc/stat` can't be read
pub fn collect_cpu(proc_root: &Path) -> Vec<RawCpuSample> {
    match procfs::read_source(&proc_root.join("stat")) {
        Ok(content) => {
            let samples = parse_stat(&content);
            debug!("Sampled {} cores", samples.len());
            samples
        }
        Err(e) => {
            warn!("{}", e);
            Vec::new()
        }
    }
}

/// Memory figures, `None` when `/proc/meminfo` is missing or has no total
pub fn collect_memory(proc_root: &Path) -> Option<MemorySample> {
    match procfs::read_source(&proc_root.join("meminfo")) {
        Ok(content) => {
            let sample = parse_meminfo(&content);
            if sample.is_none() {
                warn!("meminfo has no MemTotal, skipping memory family");
            }
            sample
        }
        Err(e) => {
            warn!("{}", e);
            None
        }
    }
}

/// Every readable sensor; one failing sensor never hides the others
pub fn collect_temperature(sys_root: &Path) -> Vec<TemperatureSample> {
    let samples = scan_sensors(sys_root);
    debug!("Sampled {} temperature sensors", samples.len());
    samples
}

pub fn collect_interfaces(proc_root: &Path) -> Vec<InterfaceSample> {
    match procfs::read_source(&proc_root.join("net/dev")) {
        Ok(content) => parse_net_dev(&content),
        Err(e) => {
            warn!("{}", e);
            Vec::new()
        }
    }
}

pub fn render_cpu(
    samples: &[RawCpuSample],
    clock_ticks_per_second: u64,
) -> Result<String, CollectError> {
    let hz = clock_ticks_per_second.max(1) as f64;
    let registry = SampleRegistry::new();
    let seconds = registry.counter_vec(&families::CPU_SECONDS, &["core", "mode"])?;
    for sample in samples {
        let core = sample.core.to_string();
        for (mode, ticks) in sample.modes() {
            seconds.with_label_values(&[core.as_str(), mode]).inc_by(ticks as f64 / hz);
        }
    }
    Ok(registry.encode()?)
}

pub fn render_memory(sample: &MemorySample) -> Result<String, CollectError> {
    let gauges = [
        (families::MEMORY_TOTAL, sample.total),
        (families::MEMORY_FREE, sample.free),
        (families::MEMORY_AVAILABLE, sample.available),
        (families::MEMORY_USED, sample.used()),
        (families::MEMORY_BUFFERS, sample.buffers),
        (families::MEMORY_CACHED, sample.cached),
        (families::SWAP_TOTAL, sample.swap_total),
        (families::SWAP_FREE, sample.swap_free),
        (families::SWAP_USED, sample.swap_used()),
    ]
    .map(|(family, bytes)| (family, bytes as f64));
    Ok(encode_gauges(&gauges)?)
}

pub fn render_temperature(samples: &[TemperatureSample]) -> Result<String, CollectError> {
    let registry = SampleRegistry::new();
    let celsius = registry.gauge_vec(&families::TEMPERATURE, &["sensor"])?;
    for sample in samples {
        celsius
            .with_label_values(&[sample.sensor.as_str()])
            .set(round_celsius(sample.celsius));
    }
    Ok(registry.encode()?)
}

pub fn render_interfaces(samples: &[InterfaceSample]) -> Result<String, CollectError> {
    let registry = SampleRegistry::new();
    let columns: [(_, fn(&InterfaceSample) -> u64); 6] = [
        (families::NET_RX_BYTES, |s| s.rx_bytes),
        (families::NET_TX_BYTES, |s| s.tx_bytes),
        (families::NET_RX_PACKETS, |s| s.rx_packets),
        (families::NET_TX_PACKETS, |s| s.tx_packets),
        (families::NET_RX_ERRORS, |s| s.rx_errors),
        (families::NET_TX_ERRORS, |s| s.tx_errors),
    ];
    for (family, value) in columns {
        let counter = registry.counter_vec(&family, &["interface"])?;
        for sample in samples {
            counter
                .with_label_values(&[sample.name.as_str()])
                .inc_by(value(sample) as f64);
        }
    }
    Ok(registry.encode()?)
}

/// Process groups, one sample per name and family. Start time and runtime
/// are left out when `btime` or the uptime couldn't be read.
pub fn render_processes(
    table: &ProcessTable,
    clock_ticks_per_second: u64,
    page_size_bytes: u64,
) -> Result<String, CollectError> {
    let hz = clock_ticks_per_second.max(1) as f64;
    let registry = SampleRegistry::new();
    let cpu = registry.counter_vec(&families::PROCESS_CPU_SECONDS, &["name"])?;
    let resident = registry.gauge_vec(&families::PROCESS_RESIDENT_MEMORY, &["name"])?;
    let virtual_memory = registry.gauge_vec(&families::PROCESS_VIRTUAL_MEMORY, &["name"])?;
    let start_time = registry.gauge_vec(&families::PROCESS_START_TIME, &["name"])?;
    let runtime = registry.gauge_vec(&families::PROCESS_RUNTIME, &["name"])?;
    let disk_read = registry.counter_vec(&families::PROCESS_DISK_READ, &["name"])?;
    let disk_write = registry.counter_vec(&families::PROCESS_DISK_WRITE, &["name"])?;

    for group in &table.groups {
        let name = [group.name.as_str()];
        let started_after_boot = group.earliest_start_ticks as f64 / hz;

        cpu.with_label_values(&name).inc_by(group.cpu_ticks as f64 / hz);
        resident
            .with_label_values(&name)
            .set(group.resident_pages.saturating_mul(page_size_bytes) as f64);
        virtual_memory
            .with_label_values(&name)
            .set(group.virtual_pages.saturating_mul(page_size_bytes) as f64);
        if let Some(boot_time) = table.boot_time {
            start_time
                .with_label_values(&name)
                .set(boot_time as f64 + started_after_boot);
        }
        if let Some(uptime) = table.uptime_seconds {
            runtime
                .with_label_values(&name)
                .set((uptime - started_after_boot).max(0.0));
        }
        disk_read.with_label_values(&name).inc_by(group.read_bytes as f64);
        disk_write.with_label_values(&name).inc_by(group.write_bytes as f64);
    }
    Ok(registry.encode()?)
}

/// One decimal place
pub fn round_celsius(celsius: f64) -> f64 {
    (celsius * 10.0).round() / 10.0
}
