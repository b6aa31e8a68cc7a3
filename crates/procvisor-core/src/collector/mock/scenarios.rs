//! Pre-built mock filesystem scenarios for testing.

use super::filesystem::MockFs;

/// PID of the fake supervised child in [`MockFs::typical_system`].
pub const CHILD_PID: u32 = 4242;

impl MockFs {
    /// Creates a typical system: the three system-wide metrics files plus one
    /// running child process with pid [`CHILD_PID`].
    pub fn typical_system() -> Self {
        let mut fs = Self::new();

        fs.add_file("/proc/loadavg", "0.15 0.10 0.05 1/150 1234\n");
        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:       16384000 kB
MemFree:         8192000 kB
MemAvailable:   12000000 kB
Buffers:          512000 kB
Cached:          2048000 kB
SwapCached:            0 kB
Active:          4096000 kB
Inactive:        2048000 kB
SwapTotal:       4096000 kB
SwapFree:        4096000 kB
Dirty:              1024 kB
Writeback:             0 kB
Slab:             512000 kB
SReclaimable:     256000 kB
",
        );
        fs.add_file(
            "/proc/stat",
            "\
cpu  10000 500 3000 80000 1000 200 100 0 0 0
cpu0 2500 125 750 20000 250 50 25 0 0 0
cpu1 2500 125 750 20000 250 50 25 0 0 0
cpu2 2500 125 750 20000 250 50 25 0 0 0
cpu3 2500 125 750 20000 250 50 25 0 0 0
intr 1000000 50 0 0 0 0 0 0 0 1 0 0 0 100 0 0 1000
ctxt 500000
btime 1700000000
processes 10000
procs_running 2
procs_blocked 0
",
        );

        fs.add_pid_stat(
            CHILD_PID,
            "4242 (node) S 1 4242 4242 0 -1 4194304 2500 0 3 0 150 40 0 0 20 0 7 0 100000 654311424 11520 18446744073709551615 0 0 0 0 0 0 0 4096 17922 0 0 0 17 1 0 0 0 0 0",
        );

        fs
    }

    /// Same as [`MockFs::typical_system`] but with a malformed `loadavg`.
    pub fn corrupt_loadavg() -> Self {
        let mut fs = Self::typical_system();
        fs.add_file("/proc/loadavg", "garbage\n");
        fs
    }
}
