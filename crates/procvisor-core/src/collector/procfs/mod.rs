//! Source readers for the Linux `/proc` filesystem.
//!
//! Each parser turns the text of one `/proc` file into one typed record.

pub mod parser;

pub use parser::{
    CpuStat, GlobalStat, LoadAvg, MemInfo, ParseError, ProcStat, parse_global_stat,
    parse_loadavg, parse_meminfo, parse_proc_stat,
};
