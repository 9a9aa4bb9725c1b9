//! Per-process figures from `/proc/<pid>`, aggregated by command name
//!
//! Sources per process:
//! - `stat` : command name, utime, stime, starttime (clock ticks)
//! - `statm`: virtual and resident size (pages)
//! - `io`   : read_bytes, write_bytes (often root-only; unreadable counts as 0)
//!
//! Processes come and go during the scan. One whose `stat` or `statm`
//! vanishes between listing and reading is left out of this tick.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::CollectError;

/// Every process sharing one command name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessGroup {
    pub name: String,
    pub count: usize,
    /// utime + stime, summed
    pub cpu_ticks: u64,
    pub virtual_pages: u64,
    pub resident_pages: u64,
    /// Start of the oldest member, in ticks after boot
    pub earliest_start_ticks: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// Groups plus the clock references needed to place start times
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessTable {
    pub groups: Vec<ProcessGroup>,
    /// `btime` of `/proc/stat`
    pub boot_time: Option<u64>,
    /// First field of `/proc/uptime`
    pub uptime_seconds: Option<f64>,
}

/// Fields of `/proc/<pid>/stat` this module uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessStat {
    pub comm: String,
    pub utime: u64,
    pub stime: u64,
    pub starttime: u64,
}

/// Parse `/proc/<pid>/stat`.
///
/// The command name sits between the first `(` and the last `)` and may
/// itself hold spaces or parentheses. Field positions below are counted
/// from the state letter that follows it.
pub fn parse_process_stat(content: &str) -> Option<ProcessStat> {
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    if close < open {
        return None;
    }
    let comm = content[open + 1..close].to_string();
    let fields: Vec<&str> = content[close + 1..].split_whitespace().collect();
    let field = |i: usize| fields.get(i).and_then(|v| v.parse::<u64>().ok());

    Some(ProcessStat {
        comm,
        utime: field(11)?,
        stime: field(12)?,
        starttime: field(19)?,
    })
}

/// `(size, resident)` in pages
pub fn parse_statm(content: &str) -> Option<(u64, u64)> {
    let mut fields = content.split_whitespace().map(|v| v.parse::<u64>().ok());
    let size = fields.next()??;
    let resident = fields.next()??;
    Some((size, resident))
}

/// `(read_bytes, write_bytes)`, missing keys as 0
pub fn parse_io(content: &str) -> (u64, u64) {
    let mut read = 0;
    let mut write = 0;
    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().parse().unwrap_or(0);
        match key {
            "read_bytes" => read = value,
            "write_bytes" => write = value,
            _ => {}
        }
    }
    (read, write)
}

/// Scan every numeric entry of `proc_root`
pub fn collect_processes(proc_root: &Path) -> ProcessTable {
    let entries = match fs::read_dir(proc_root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("{}", CollectError::unavailable(proc_root, e));
            return ProcessTable::default();
        }
    };

    let mut groups: BTreeMap<String, ProcessGroup> = BTreeMap::new();
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(pid) = file_name.to_str().filter(|name| name.parse::<u32>().is_ok()) else {
            continue;
        };
        let dir = entry.path();
        match read_process(&dir) {
            Some((stat, pages, io)) => add_process(&mut groups, stat, pages, io),
            None => debug!("Process {} gone or unreadable, skipped", pid),
        }
    }

    let boot_time = fs::read_to_string(proc_root.join("stat"))
        .ok()
        .and_then(|content| super::procfs::parse_boot_time(&content));
    let uptime_seconds = fs::read_to_string(proc_root.join("uptime"))
        .ok()
        .and_then(|content| super::procfs::parse_uptime(&content));

    debug!("Sampled {} process names", groups.len());
    ProcessTable {
        groups: groups.into_values().collect(),
        boot_time,
        uptime_seconds,
    }
}

fn read_process(dir: &Path) -> Option<(ProcessStat, (u64, u64), (u64, u64))> {
    let stat = fs::read_to_string(dir.join("stat")).ok()?;
    let stat = match parse_process_stat(&stat) {
        Some(stat) => stat,
        None => {
            debug!("{}", CollectError::anomaly("pid/stat", stat.trim_end()));
            return None;
        }
    };
    let pages = parse_statm(&fs::read_to_string(dir.join("statm")).ok()?)?;
    let io = fs::read_to_string(dir.join("io"))
        .map(|content| parse_io(&content))
        .unwrap_or((0, 0));
    Some((stat, pages, io))
}

fn add_process(
    groups: &mut BTreeMap<String, ProcessGroup>,
    stat: ProcessStat,
    (virtual_pages, resident_pages): (u64, u64),
    (read_bytes, write_bytes): (u64, u64),
) {
    let group = groups.entry(stat.comm.clone()).or_insert_with(|| ProcessGroup {
        name: stat.comm.clone(),
        earliest_start_ticks: stat.starttime,
        ..Default::default()
    });
    group.count += 1;
    group.cpu_ticks = group
        .cpu_ticks
        .saturating_add(stat.utime.saturating_add(stat.stime));
    group.virtual_pages = group.virtual_pages.saturating_add(virtual_pages);
    group.resident_pages = group.resident_pages.saturating_add(resident_pages);
    group.earliest_start_ticks = group.earliest_start_ticks.min(stat.starttime);
    group.read_bytes = group.read_bytes.saturating_add(read_bytes);
    group.write_bytes = group.write_bytes.saturating_add(write_bytes);
}
