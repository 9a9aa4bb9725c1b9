/*!
Throwaway kernel tree

Lays out, under a temporary directory:
- `proc/stat`, `proc/meminfo`, `proc/uptime`, `proc/net/dev`, `proc/net/nf_conntrack`
- `proc/<pid>/{stat,statm,io}` per fake process
- `sys/class/thermal/thermal_zoneN/temp`, `sys/class/hwmon/hwmonN/tempM_input`
- `reservations/` for identity files
- `run/metrics.prom` as the snapshot target (not created)

Point the collector's source paths at it and tick as usual.
*/

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;

use crate::conntrack::{self, ConntrackLine};
use crate::process::FakeProcess;

/// Two cores, a 2.6-era row without guest columns on cpu1
pub const STAT_TWO_CORES: &str = "\
cpu  4705 150 1120 16250 520 30 25 0 0 0
cpu0 2500 100 600 8000 300 20 15 0 0 0
cpu1 2205 50 520 8250 220 10 10
intr 114930548 113199788 3 0 5 263 0 4 [...]
ctxt 1990473
btime 1062191376
processes 2915
procs_running 1
procs_blocked 0
";

/// Small router: 512 MiB of RAM, no swap
pub const MEMINFO_ROUTER: &str = "\
MemTotal:         524288 kB
MemFree:          123456 kB
MemAvailable:     300000 kB
Buffers:           10240 kB
Cached:           102400 kB
SwapCached:            0 kB
SwapTotal:             0 kB
SwapFree:              0 kB
";

pub const NET_DEV_ROUTER: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:  123456     100    0    0    0     0          0         0   123456     100    0    0    0     0       0          0
  eth0: 9876543   12345    2    0    0     0          0         0  1234567    6789    1    0    0     0       0          0
  br-lan: 555000    4000    0    0    0     0          0         0   777000    5000    0    0    0     0       0          0
";

pub struct FakeKernel {
    root: TempDir,
}

impl FakeKernel {
    /// Empty tree: every source is missing until written
    pub fn new() -> Result<Self> {
        let root = tempfile::tempdir().context("Failed to create fake kernel root")?;
        Ok(Self { root })
    }

    /// Tree populated with the router fixtures above and one thermal zone
    pub fn router() -> Result<Self> {
        let kernel = Self::new()?;
        kernel.write_stat(STAT_TWO_CORES)?;
        kernel.write_meminfo(MEMINFO_ROUTER)?;
        kernel.write_net_dev(NET_DEV_ROUTER)?;
        kernel.add_thermal_zone(0, "45231")?;
        Ok(kernel)
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn proc_root(&self) -> PathBuf {
        self.root().join("proc")
    }

    pub fn sys_root(&self) -> PathBuf {
        self.root().join("sys")
    }

    pub fn conntrack_path(&self) -> PathBuf {
        self.proc_root().join("net/nf_conntrack")
    }

    pub fn reservations_dir(&self) -> PathBuf {
        self.root().join("reservations")
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.root().join("run/metrics.prom")
    }

    fn write(&self, path: PathBuf, content: impl AsRef<[u8]>) -> Result<&Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(self)
    }

    pub fn write_stat(&self, content: &str) -> Result<&Self> {
        self.write(self.proc_root().join("stat"), content)
    }

    pub fn write_meminfo(&self, content: &str) -> Result<&Self> {
        self.write(self.proc_root().join("meminfo"), content)
    }

    pub fn write_net_dev(&self, content: &str) -> Result<&Self> {
        self.write(self.proc_root().join("net/dev"), content)
    }

    /// Replace the tracking table
    pub fn write_conntrack(&self, lines: &[ConntrackLine]) -> Result<&Self> {
        self.write(self.conntrack_path(), &conntrack::table(lines))
    }

    /// Bytes written verbatim, invalid UTF-8 included
    pub fn write_conntrack_raw(&self, content: &[u8]) -> Result<&Self> {
        self.write(self.conntrack_path(), content)
    }

    pub fn write_uptime(&self, content: &str) -> Result<&Self> {
        self.write(self.proc_root().join("uptime"), content)
    }

    /// `proc/<pid>/` with stat, statm and, when set, io
    pub fn add_process(&self, process: &FakeProcess) -> Result<&Self> {
        let dir = self.proc_root().join(process.pid.to_string());
        self.write(dir.join("stat"), process.stat())?;
        self.write(dir.join("statm"), process.statm())?;
        if let Some(io) = process.io_file() {
            self.write(dir.join("io"), io)?;
        }
        Ok(self)
    }

    /// `raw` is written verbatim, so unparsable readings can be faked too
    pub fn add_thermal_zone(&self, zone: u32, raw: &str) -> Result<&Self> {
        let path = self
            .sys_root()
            .join(format!("class/thermal/thermal_zone{}/temp", zone));
        self.write(path, format!("{}\n", raw))
    }

    pub fn add_hwmon_sensor(&self, hwmon: u32, index: u32, raw: &str) -> Result<&Self> {
        let path = self
            .sys_root()
            .join(format!("class/hwmon/hwmon{}/temp{}_input", hwmon, index));
        self.write(path, format!("{}\n", raw))
    }

    /// Reservation file `name` under [`Self::reservations_dir`], one
    /// `ip hostname [user [category [os]]]` entry per line
    pub fn add_reservations(&self, name: &str, entries: &[&str]) -> Result<&Self> {
        let content: String = entries.iter().map(|entry| format!("{}\n", entry)).collect();
        self.write(self.reservations_dir().join(name), content)
    }

    pub fn remove(&self, relative: &str) -> Result<&Self> {
        let path = self.root().join(relative);
        fs::remove_file(&path).with_context(|| format!("Failed to remove {}", path.display()))?;
        Ok(self)
    }
}
