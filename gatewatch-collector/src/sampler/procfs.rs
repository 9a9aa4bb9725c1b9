//! Parsers for the procfs counter files: stat, meminfo, net/dev, uptime

use std::path::Path;

use tracing::debug;

use super::{InterfaceSample, MemorySample, RawCpuSample};
use crate::error::CollectError;

/// Per-core rows of `/proc/stat`. The aggregate `cpu` row is excluded.
pub fn parse_stat(content: &str) -> Vec<RawCpuSample> {
    content
        .lines()
        .filter(|line| line.starts_with("cpu"))
        .filter_map(|line| match parse_cpu_line(line) {
            Ok(sample) => sample,
            Err(e) => {
                debug!("{}", e);
                None
            }
        })
        .collect()
}

/// `btime` of `/proc/stat`: boot time in Unix seconds
pub fn parse_boot_time(content: &str) -> Option<u64> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("btime "))
        .and_then(|value| value.trim().parse().ok())
}

/// First field of `/proc/uptime`: seconds since boot
pub fn parse_uptime(content: &str) -> Option<f64> {
    content.split_whitespace().next()?.parse().ok()
}

/// `Ok(None)` for the aggregate row, `Err` for a malformed per-core row
fn parse_cpu_line(line: &str) -> Result<Option<RawCpuSample>, CollectError> {
    let mut fields = line.split_whitespace();
    let label = fields.next().unwrap_or_default();
    let core = &label["cpu".len()..];
    if core.is_empty() {
        return Ok(None);
    }
    let core: u32 = core.parse().map_err(|_| CollectError::anomaly("stat", line))?;

    let values = fields
        .map(|v| v.parse::<u64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| CollectError::anomaly("stat", line))?;
    // user nice system idle are present on every kernel; the rest came later
    if values.len() < 4 {
        return Err(CollectError::anomaly("stat", line));
    }
    let at = |i: usize| values.get(i).copied().unwrap_or(0);

    Ok(Some(RawCpuSample {
        core,
        user: at(0),
        nice: at(1),
        system: at(2),
        idle: at(3),
        iowait: at(4),
        irq: at(5),
        softirq: at(6),
        steal: at(7),
        guest: at(8),
        guest_nice: at(9),
    }))
}

/// Labeled fields of `/proc/meminfo`. `None` when `MemTotal` is missing.
pub fn parse_meminfo(content: &str) -> Option<MemorySample> {
    let mut total = None;
    let mut free = None;
    let mut available = None;
    let mut buffers = 0;
    let mut cached = 0;
    let mut swap_total = 0;
    let mut swap_free = 0;

    for line in content.lines() {
        let Some((label, rest)) = line.split_once(':') else {
            debug!("{}", CollectError::anomaly("meminfo", line));
            continue;
        };
        let Some(bytes) = parse_meminfo_value(rest) else {
            debug!("{}", CollectError::anomaly("meminfo", line));
            continue;
        };
        match label.trim() {
            "MemTotal" => total = Some(bytes),
            "MemFree" => free = Some(bytes),
            "MemAvailable" => available = Some(bytes),
            "Buffers" => buffers = bytes,
            "Cached" => cached = bytes,
            "SwapTotal" => swap_total = bytes,
            "SwapFree" => swap_free = bytes,
            _ => {}
        }
    }

    let total = total?;
    let free = free.unwrap_or(0);
    Some(MemorySample {
        total,
        free,
        available: available.unwrap_or(free),
        buffers,
        cached,
        swap_total,
        swap_free,
    })
}

/// `"  524288 kB"` -> bytes. A value too large to scale is rejected.
fn parse_meminfo_value(rest: &str) -> Option<u64> {
    let mut parts = rest.split_whitespace();
    let value: u64 = parts.next()?.parse().ok()?;
    match parts.next() {
        Some("kB") => value.checked_mul(1024),
        None => Some(value),
        Some(_) => None,
    }
}

/// Interface rows of `/proc/net/dev`, loopback excluded
pub fn parse_net_dev(content: &str) -> Vec<InterfaceSample> {
    let mut interfaces = Vec::new();
    // Two header lines, then "  name: rx... tx..."
    for line in content.lines().skip(2) {
        let Some((name, counters)) = line.split_once(':') else {
            debug!("{}", CollectError::anomaly("net/dev", line));
            continue;
        };
        let name = name.trim();
        if name == "lo" {
            continue;
        }
        let values: Vec<u64> = counters
            .split_whitespace()
            .filter_map(|v| v.parse().ok())
            .collect();
        if values.len() < 16 {
            debug!("{}", CollectError::anomaly("net/dev", line));
            continue;
        }
        interfaces.push(InterfaceSample {
            name: name.to_string(),
            rx_bytes: values[0],
            rx_packets: values[1],
            rx_errors: values[2],
            tx_bytes: values[8],
            tx_packets: values[9],
            tx_errors: values[10],
        });
    }
    interfaces
}

pub(super) fn read_source(path: &Path) -> Result<String, CollectError> {
    std::fs::read_to_string(path).map_err(|e| CollectError::unavailable(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "\
cpu  10132153 290696 3084719 46828483 16683 0 25195 0 175628 0
cpu0 1393280 32966 572056 13343292 6130 0 17875 0 23933 0
cpu1 1335 10 200 9000
cpu2 bogus 1 2 3
intr 199292 0 0 0
ctxt 3402958
";

    #[test]
    fn test_parse_stat_skips_aggregate_row() {
        let samples = parse_stat(STAT);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].core, 0);
        assert_eq!(samples[0].user, 1393280);
        assert_eq!(samples[0].guest, 23933);
    }

    #[test]
    fn test_parse_stat_pads_short_rows() {
        let samples = parse_stat(STAT);
        let cpu1 = &samples[1];
        assert_eq!(cpu1.core, 1);
        assert_eq!((cpu1.user, cpu1.nice, cpu1.system, cpu1.idle), (1335, 10, 200, 9000));
        assert_eq!((cpu1.iowait, cpu1.steal, cpu1.guest_nice), (0, 0, 0));
    }

    #[test]
    fn test_parse_meminfo_scales_kilobytes() {
        let sample = parse_meminfo("MemTotal: 524288 kB\nMemFree: 123456 kB\n").unwrap();
        assert_eq!(sample.total, 536870912);
        assert_eq!(sample.free, 126418944);
        // No MemAvailable line: falls back to free
        assert_eq!(sample.available, 126418944);
        assert_eq!(sample.buffers, 0);
        assert_eq!(sample.cached, 0);
        assert_eq!(sample.used(), 536870912 - 126418944);
    }

    #[test]
    fn test_parse_meminfo_reads_all_fields() {
        let content = "\
MemTotal:        8000 kB
MemFree:         1000 kB
MemAvailable:    5000 kB
Buffers:          500 kB
Cached:          2500 kB
SwapCached:         0 kB
SwapTotal:       4000 kB
SwapFree:        3000 kB
HugePages_Total:    0
";
        let sample = parse_meminfo(content).unwrap();
        assert_eq!(sample.available, 5000 * 1024);
        assert_eq!(sample.buffers, 500 * 1024);
        assert_eq!(sample.cached, 2500 * 1024);
        assert_eq!(sample.used(), 4000 * 1024);
        assert_eq!(sample.swap_used(), 1000 * 1024);
    }

    #[test]
    fn test_parse_meminfo_rejects_overflowing_value() {
        let content = "MemTotal: 18446744073709551615 kB\nMemTotal: 2048 kB\nMemFree: 18014398509481984 kB\n";
        let sample = parse_meminfo(content).unwrap();
        assert_eq!(sample.total, 2048 * 1024);
        // Overflowing MemFree line skipped like any other malformed line
        assert_eq!(sample.free, 0);
        assert_eq!(parse_meminfo_value(" 18014398509481983 kB"), Some(18014398509481983 * 1024));
        assert_eq!(parse_meminfo_value(" 18014398509481984 kB"), None);
    }

    #[test]
    fn test_boot_time_and_uptime() {
        assert_eq!(parse_boot_time("cpu  1 2 3 4\nbtime 1062191376\nprocesses 2915\n"), Some(1062191376));
        assert_eq!(parse_boot_time(STAT), None);
        assert_eq!(parse_uptime("350735.47 234388.90\n"), Some(350735.47));
        assert_eq!(parse_uptime(""), None);
    }

    #[test]
    fn test_parse_meminfo_without_total() {
        assert!(parse_meminfo("MemFree: 10 kB\n").is_none());
        assert!(parse_meminfo("").is_none());
    }

    #[test]
    fn test_parse_net_dev() {
        let content = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:  9000      90    0    0    0     0          0         0     9000      90    0    0    0     0       0          0
  eth0: 123456   1000    2    0    0     0          0         0   654321     900    1    0    0     0       0          0
 wlan0: truncated
";
        let interfaces = parse_net_dev(content);
        assert_eq!(interfaces.len(), 1);
        let eth0 = &interfaces[0];
        assert_eq!(eth0.name, "eth0");
        assert_eq!((eth0.rx_bytes, eth0.rx_packets, eth0.rx_errors), (123456, 1000, 2));
        assert_eq!((eth0.tx_bytes, eth0.tx_packets, eth0.tx_errors), (654321, 900, 1));
    }
}
