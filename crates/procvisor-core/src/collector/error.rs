//! Error types for metric collection.

use std::fmt;

use crate::collector::procfs::ParseError;

/// Failure of a single source read.
#[derive(Debug)]
pub enum CollectError {
    /// I/O error opening or reading the source.
    Io(std::io::Error),
    /// The source was read but its content could not be parsed.
    Parse(String),
    /// An external command could not be run or exited unsuccessfully.
    Command(String),
}

impl fmt::Display for CollectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectError::Io(e) => write!(f, "I/O error: {}", e),
            CollectError::Parse(msg) => write!(f, "parse error: {}", msg),
            CollectError::Command(msg) => write!(f, "command error: {}", msg),
        }
    }
}

impl std::error::Error for CollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollectError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CollectError {
    fn from(e: std::io::Error) -> Self {
        CollectError::Io(e)
    }
}

impl From<ParseError> for CollectError {
    fn from(e: ParseError) -> Self {
        CollectError::Parse(e.message)
    }
}

/// Identifies one load step of the status aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStep {
    /// `<root>/meminfo`.
    Meminfo,
    /// `<root>/stat`.
    Stat,
    /// `<root>/loadavg`.
    LoadAvg,
    /// `lsof` open file enumeration.
    OpenFiles,
    /// `/proc/<pid>/stat` of the supervised child.
    ProcStat,
}

impl LoadStep {
    pub fn as_str(self) -> &'static str {
        match self {
            LoadStep::Meminfo => "meminfo",
            LoadStep::Stat => "stat",
            LoadStep::LoadAvg => "loadavg",
            LoadStep::OpenFiles => "open_files",
            LoadStep::ProcStat => "proc_stat",
        }
    }
}

impl fmt::Display for LoadStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed load step: which step, and why.
#[derive(Debug)]
pub struct SourceReadError {
    pub step: LoadStep,
    pub source: CollectError,
}

impl SourceReadError {
    pub fn new(step: LoadStep, source: CollectError) -> Self {
        Self { step, source }
    }

    /// Returns `true` if the source file simply did not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(&self.source, CollectError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

impl fmt::Display for SourceReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.source)
    }
}

impl std::error::Error for SourceReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
