//! Source readers for `/proc` files.
//!
//! Pure functions turning the text of one `/proc` file into one typed record.
//! They never touch the filesystem, so every format quirk is testable with a
//! string literal.

use serde::Serialize;
use std::str::FromStr;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parses a required whitespace-separated field.
fn field<T: FromStr>(fields: &[&str], idx: usize, name: &str) -> Result<T, ParseError> {
    fields
        .get(idx)
        .ok_or_else(|| ParseError::new(format!("missing field {}", name)))?
        .parse()
        .map_err(|_| ParseError::new(format!("invalid {}", name)))
}

/// Parses an optional field, falling back to the type's default.
fn field_or_default<T: FromStr + Default>(fields: &[&str], idx: usize) -> T {
    fields
        .get(idx)
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}

/// Parsed data from `/proc/[pid]/stat`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcStat {
    pub pid: u32,
    pub comm: String,
    pub state: char,
    pub ppid: u32,
    pub pgrp: i32,
    pub session: i32,
    pub tty_nr: i32,
    pub minflt: u64,
    pub majflt: u64,
    /// User time in clock ticks.
    pub utime: u64,
    /// System time in clock ticks.
    pub stime: u64,
    pub cutime: i64,
    pub cstime: i64,
    pub priority: i32,
    pub nice: i32,
    pub num_threads: i32,
    /// Start time after boot, in clock ticks.
    pub starttime: u64,
    /// Virtual memory size in bytes.
    pub vsize: u64,
    /// Resident set size in pages.
    pub rss: i64,
    pub processor: i32,
}

/// Number of fields after `(comm)` that every kernel since 2.6 emits.
const PROC_STAT_MIN_FIELDS: usize = 42;

/// Parses `/proc/[pid]/stat` content.
///
/// The comm field can contain spaces and parentheses, so it is delimited by the
/// first `(` and the *last* `)`.
/// Format: pid (comm) state ppid pgrp session tty_nr ...
pub fn parse_proc_stat(content: &str) -> Result<ProcStat, ParseError> {
    let content = content.trim();

    let open_paren = content
        .find('(')
        .ok_or_else(|| ParseError::new("missing '(' in stat"))?;
    let close_paren = content
        .rfind(')')
        .ok_or_else(|| ParseError::new("missing ')' in stat"))?;

    if close_paren <= open_paren {
        return Err(ParseError::new("invalid parentheses in stat"));
    }

    let pid: u32 = content[..open_paren]
        .trim()
        .parse()
        .map_err(|_| ParseError::new("invalid pid"))?;
    let comm = content[open_paren + 1..close_paren].to_string();

    let fields: Vec<&str> = content[close_paren + 1..].split_whitespace().collect();
    if fields.len() < PROC_STAT_MIN_FIELDS {
        return Err(ParseError::new(format!(
            "not enough fields in stat: expected {}+, got {}",
            PROC_STAT_MIN_FIELDS,
            fields.len()
        )));
    }

    Ok(ProcStat {
        pid,
        comm,
        state: fields[0].chars().next().unwrap_or('?'),
        ppid: field(&fields, 1, "ppid")?,
        pgrp: field(&fields, 2, "pgrp")?,
        session: field(&fields, 3, "session")?,
        tty_nr: field(&fields, 4, "tty_nr")?,
        minflt: field(&fields, 7, "minflt")?,
        majflt: field(&fields, 9, "majflt")?,
        utime: field(&fields, 11, "utime")?,
        stime: field(&fields, 12, "stime")?,
        cutime: field(&fields, 13, "cutime")?,
        cstime: field(&fields, 14, "cstime")?,
        priority: field(&fields, 15, "priority")?,
        nice: field(&fields, 16, "nice")?,
        num_threads: field(&fields, 17, "num_threads")?,
        starttime: field(&fields, 19, "starttime")?,
        vsize: field(&fields, 20, "vsize")?,
        rss: field(&fields, 21, "rss")?,
        processor: field_or_default(&fields, 36),
    })
}

/// Parsed data from `/proc/meminfo`. All values are in kB.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemInfo {
    pub mem_total: u64,
    pub mem_free: u64,
    pub mem_available: u64,
    pub buffers: u64,
    pub cached: u64,
    pub swap_cached: u64,
    pub active: u64,
    pub inactive: u64,
    pub swap_total: u64,
    pub swap_free: u64,
    pub dirty: u64,
    pub writeback: u64,
    pub slab: u64,
    pub s_reclaimable: u64,
}

/// Parses `/proc/meminfo` content.
///
/// Unknown keys are ignored. Content without a `MemTotal` line is rejected,
/// since every kernel emits it first and its absence means the input is not
/// a meminfo file at all.
pub fn parse_meminfo(content: &str) -> Result<MemInfo, ParseError> {
    let mut info = MemInfo::default();
    let mut seen_total = false;

    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let value: u64 = rest
            .split_whitespace()
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        match key.trim() {
            "MemTotal" => {
                info.mem_total = value;
                seen_total = true;
            }
            "MemFree" => info.mem_free = value,
            "MemAvailable" => info.mem_available = value,
            "Buffers" => info.buffers = value,
            "Cached" => info.cached = value,
            "SwapCached" => info.swap_cached = value,
            "Active" => info.active = value,
            "Inactive" => info.inactive = value,
            "SwapTotal" => info.swap_total = value,
            "SwapFree" => info.swap_free = value,
            "Dirty" => info.dirty = value,
            "Writeback" => info.writeback = value,
            "Slab" => info.slab = value,
            "SReclaimable" => info.s_reclaimable = value,
            _ => {}
        }
    }

    if !seen_total {
        return Err(ParseError::new("missing MemTotal in meminfo"));
    }

    Ok(info)
}

/// Single CPU line from `/proc/stat`, in clock ticks.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CpuStat {
    /// `None` for the aggregate `cpu` line.
    pub cpu_id: Option<u32>,
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

/// Global process-table and CPU stats from `/proc/stat`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GlobalStat {
    pub cpus: Vec<CpuStat>,
    pub ctxt: u64,
    pub btime: u64,
    pub processes: u64,
    pub procs_running: u32,
    pub procs_blocked: u32,
}

/// Parses `/proc/stat` content.
///
/// Content without any `cpu` line is rejected.
pub fn parse_global_stat(content: &str) -> Result<GlobalStat, ParseError> {
    let mut stat = GlobalStat::default();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&key) = parts.first() else {
            continue;
        };

        if let Some(id) = key.strip_prefix("cpu") {
            stat.cpus.push(CpuStat {
                cpu_id: id.parse().ok(),
                user: field_or_default(&parts, 1),
                nice: field_or_default(&parts, 2),
                system: field_or_default(&parts, 3),
                idle: field_or_default(&parts, 4),
                iowait: field_or_default(&parts, 5),
                irq: field_or_default(&parts, 6),
                softirq: field_or_default(&parts, 7),
                steal: field_or_default(&parts, 8),
                guest: field_or_default(&parts, 9),
                guest_nice: field_or_default(&parts, 10),
            });
            continue;
        }

        match key {
            "ctxt" => stat.ctxt = field_or_default(&parts, 1),
            "btime" => stat.btime = field_or_default(&parts, 1),
            "processes" => stat.processes = field_or_default(&parts, 1),
            "procs_running" => stat.procs_running = field_or_default(&parts, 1),
            "procs_blocked" => stat.procs_blocked = field_or_default(&parts, 1),
            _ => {}
        }
    }

    if stat.cpus.is_empty() {
        return Err(ParseError::new("no cpu lines in stat"));
    }

    Ok(stat)
}

/// Parsed data from `/proc/loadavg`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadAvg {
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
    /// Currently runnable scheduling entities.
    pub running: u32,
    /// Total scheduling entities.
    pub total: u32,
    pub last_pid: u32,
}

/// Parses `/proc/loadavg` content.
///
/// Format: `load1 load5 load15 running/total last_pid`.
pub fn parse_loadavg(content: &str) -> Result<LoadAvg, ParseError> {
    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.len() < 5 {
        return Err(ParseError::new("invalid loadavg format"));
    }

    let (running, total) = parts[3]
        .split_once('/')
        .map(|(r, t)| (r.parse().unwrap_or(0), t.parse().unwrap_or(0)))
        .unwrap_or((0, 0));

    Ok(LoadAvg {
        load1: field(&parts, 0, "load1")?,
        load5: field(&parts, 1, "load5")?,
        load15: field(&parts, 2, "load15")?,
        running,
        total,
        last_pid: field_or_default(&parts, 4),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_proc_stat_basic() {
        let content = "1234 (bash) S 1233 1234 1234 34816 1235 4194304 5000 50000 10 20 100 50 200 100 20 0 1 0 100000 25000000 2000 18446744073709551615 0 0 0 0 0 0 65536 3670020 1266777851 0 0 0 17 2 0 0 5 0 0 0 0 0 0 0 0 0 0";
        let stat = parse_proc_stat(content).unwrap();

        assert_eq!(stat.pid, 1234);
        assert_eq!(stat.comm, "bash");
        assert_eq!(stat.state, 'S');
        assert_eq!(stat.ppid, 1233);
        assert_eq!(stat.utime, 100);
        assert_eq!(stat.stime, 50);
        assert_eq!(stat.cutime, 200);
        assert_eq!(stat.nice, 0);
        assert_eq!(stat.priority, 20);
        assert_eq!(stat.minflt, 5000);
        assert_eq!(stat.majflt, 10);
        assert_eq!(stat.starttime, 100000);
        assert_eq!(stat.vsize, 25000000);
        assert_eq!(stat.rss, 2000);
        assert_eq!(stat.processor, 2);
    }

    #[test]
    fn test_parse_proc_stat_with_spaces_in_comm() {
        let content = "5000 (Web Content) S 4999 5000 4999 0 -1 4194304 100000 0 500 0 5000 1000 0 0 20 0 20 0 500000 2000000000 50000 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0";
        let stat = parse_proc_stat(content).unwrap();

        assert_eq!(stat.pid, 5000);
        assert_eq!(stat.comm, "Web Content");
        assert_eq!(stat.ppid, 4999);
        assert_eq!(stat.num_threads, 20);
    }

    #[test]
    fn test_parse_proc_stat_with_parentheses_in_comm() {
        let content = "5001 (test(1)) S 1 5001 5001 0 -1 4194304 1000 0 0 0 10 5 0 0 20 0 1 0 500100 10000000 1000 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0";
        let stat = parse_proc_stat(content).unwrap();

        assert_eq!(stat.pid, 5001);
        assert_eq!(stat.comm, "test(1)");
    }

    #[test]
    fn test_parse_proc_stat_zombie() {
        let content = "4000 (defunct) Z 1000 4000 1000 0 -1 4194308 0 0 0 0 0 0 0 0 20 0 1 0 400000 0 0 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 -1 0 0 0 0 0 0 0 0 0 0 0 0 0 0";
        let stat = parse_proc_stat(content).unwrap();

        assert_eq!(stat.state, 'Z');
        assert_eq!(stat.vsize, 0);
    }

    #[test]
    fn test_parse_proc_stat_truncated() {
        let err = parse_proc_stat("1 (init) S 0 1 1").unwrap_err();
        assert!(err.message.contains("not enough fields"));
    }

    #[test]
    fn test_parse_proc_stat_garbage() {
        assert!(parse_proc_stat("").is_err());
        assert!(parse_proc_stat("abc (x) S").is_err());
        assert!(parse_proc_stat("1 )x( S").is_err());
    }

    #[test]
    fn test_parse_meminfo() {
        let content = "\
MemTotal:       16384000 kB
MemFree:         8192000 kB
MemAvailable:   12000000 kB
Buffers:          512000 kB
Cached:          2048000 kB
SwapCached:         1000 kB
SwapTotal:       4096000 kB
SwapFree:        4096000 kB
Dirty:              1024 kB
Slab:             512000 kB
SReclaimable:     256000 kB
HugePages_Total:       0
";
        let info = parse_meminfo(content).unwrap();

        assert_eq!(info.mem_total, 16384000);
        assert_eq!(info.mem_free, 8192000);
        assert_eq!(info.mem_available, 12000000);
        assert_eq!(info.buffers, 512000);
        assert_eq!(info.cached, 2048000);
        assert_eq!(info.swap_cached, 1000);
        assert_eq!(info.swap_total, 4096000);
        assert_eq!(info.dirty, 1024);
        assert_eq!(info.slab, 512000);
        assert_eq!(info.s_reclaimable, 256000);
    }

    #[test]
    fn test_parse_meminfo_rejects_foreign_content() {
        assert!(parse_meminfo("").is_err());
        assert!(parse_meminfo("0.15 0.10 0.05 1/150 1234\n").is_err());
    }

    #[test]
    fn test_parse_global_stat() {
        let content = "\
cpu  10000 500 3000 80000 1000 200 100 0 0 0
cpu0 2500 125 750 20000 250 50 25 0 0 0
cpu1 2500 125 750 20000 250 50 25 0 0 0
intr 1000000 50 0 0
ctxt 500000
btime 1700000000
processes 10000
procs_running 2
procs_blocked 1
";
        let stat = parse_global_stat(content).unwrap();

        assert_eq!(stat.cpus.len(), 3);
        assert_eq!(stat.cpus[0].cpu_id, None);
        assert_eq!(stat.cpus[0].user, 10000);
        assert_eq!(stat.cpus[0].idle, 80000);
        assert_eq!(stat.cpus[1].cpu_id, Some(0));
        assert_eq!(stat.cpus[2].cpu_id, Some(1));
        assert_eq!(stat.ctxt, 500000);
        assert_eq!(stat.btime, 1700000000);
        assert_eq!(stat.processes, 10000);
        assert_eq!(stat.procs_running, 2);
        assert_eq!(stat.procs_blocked, 1);
    }

    #[test]
    fn test_parse_global_stat_without_cpus() {
        assert!(parse_global_stat("ctxt 1\nbtime 2\n").is_err());
    }

    #[test]
    fn test_parse_loadavg() {
        let load = parse_loadavg("0.15 0.10 0.05 1/150 1234\n").unwrap();

        assert!((load.load1 - 0.15).abs() < 0.001);
        assert!((load.load5 - 0.10).abs() < 0.001);
        assert!((load.load15 - 0.05).abs() < 0.001);
        assert_eq!(load.running, 1);
        assert_eq!(load.total, 150);
        assert_eq!(load.last_pid, 1234);
    }

    #[test]
    fn test_parse_loadavg_invalid() {
        assert!(parse_loadavg("0.15 0.10").is_err());
        assert!(parse_loadavg("high 0.10 0.05 1/150 1234").is_err());
    }

    #[test]
    fn test_records_serialize_with_field_names() {
        let load = parse_loadavg("1.00 2.00 3.00 4/50 99").unwrap();
        let json = serde_json::to_value(&load).unwrap();

        assert_eq!(json["load1"], 1.0);
        assert_eq!(json["running"], 4);
        assert_eq!(json["last_pid"], 99);
    }
}
