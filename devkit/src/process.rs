/*!
Builder for `/proc/<pid>` entries

Renders `stat`, `statm` and `io` in the kernel's layout so tests only name
the fields the collector reads.
*/

/// One fake process
#[derive(Debug, Clone)]
pub struct FakeProcess {
    pub pid: u32,
    comm: String,
    utime: u64,
    stime: u64,
    starttime: u64,
    size_pages: u64,
    resident_pages: u64,
    io: Option<(u64, u64)>,
}

impl FakeProcess {
    /// Idle process started at boot, 1 resident page out of 10, no io file
    pub fn new(pid: u32, comm: &str) -> Self {
        Self {
            pid,
            comm: comm.to_string(),
            utime: 0,
            stime: 0,
            starttime: 0,
            size_pages: 10,
            resident_pages: 1,
            io: None,
        }
    }

    /// User and system time, in clock ticks
    pub fn cpu(mut self, utime: u64, stime: u64) -> Self {
        self.utime = utime;
        self.stime = stime;
        self
    }

    /// Start, in clock ticks after boot
    pub fn started_at(mut self, ticks: u64) -> Self {
        self.starttime = ticks;
        self
    }

    pub fn pages(mut self, size: u64, resident: u64) -> Self {
        self.size_pages = size;
        self.resident_pages = resident;
        self
    }

    /// Readable io file with these storage counters
    pub fn io(mut self, read_bytes: u64, write_bytes: u64) -> Self {
        self.io = Some((read_bytes, write_bytes));
        self
    }

    pub fn stat(&self) -> String {
        format!(
            "{pid} ({comm}) S 1 {pid} {pid} 0 -1 4194560 100 0 0 0 {utime} {stime} 0 0 20 0 1 0 {start} {vsize} {rss} 18446744073709551615 1 1 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0\n",
            pid = self.pid,
            comm = self.comm,
            utime = self.utime,
            stime = self.stime,
            start = self.starttime,
            vsize = self.size_pages * 4096,
            rss = self.resident_pages,
        )
    }

    pub fn statm(&self) -> String {
        format!("{} {} 0 1 0 {} 0\n", self.size_pages, self.resident_pages, self.resident_pages)
    }

    pub fn io_file(&self) -> Option<String> {
        self.io.map(|(read, write)| {
            format!(
                "rchar: {read}\nwchar: {write}\nsyscr: 1\nsyscw: 1\nread_bytes: {read}\nwrite_bytes: {write}\ncancelled_write_bytes: 0\n"
            )
        })
    }
}
