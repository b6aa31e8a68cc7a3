//! Status snapshot and the aggregator that builds it.
//!
//! Every request gets a fresh [`Status`]. The [`StatusAggregator`] runs a fixed,
//! ordered list of load steps against a root directory; each step is isolated,
//! so one missing or malformed source only leaves its own field empty.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::collector::error::{CollectError, LoadStep, SourceReadError};
use crate::collector::lsof::{LsofCommand, OpenFiles};
use crate::collector::procfs::{
    GlobalStat, LoadAvg, MemInfo, ProcStat, parse_global_stat, parse_loadavg, parse_meminfo,
    parse_proc_stat,
};
use crate::collector::traits::FileSystem;

/// Real kernel metrics root.
pub const DEFAULT_ROOT: &str = "/proc";

/// Per-process files are always read from the kernel, never from fixtures.
pub(crate) const PID_ROOT: &str = "/proc";

/// System-wide load steps, in evaluation order.
const SYSTEM_STEPS: [LoadStep; 4] = [
    LoadStep::Meminfo,
    LoadStep::Stat,
    LoadStep::LoadAvg,
    LoadStep::OpenFiles,
];

/// Composite health snapshot.
///
/// A `None` field means the source failed or was not attempted, never zero.
/// Absent fields are left out of the JSON entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Status {
    #[serde(rename = "mem", skip_serializing_if = "Option::is_none")]
    pub meminfo: Option<MemInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proc_stat: Option<ProcStat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stat: Option<GlobalStat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<LoadAvg>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_files: Option<OpenFiles>,
}

impl Status {
    /// Returns `true` if the field filled by `step` is present.
    pub fn has(&self, step: LoadStep) -> bool {
        match step {
            LoadStep::Meminfo => self.meminfo.is_some(),
            LoadStep::Stat => self.stat.is_some(),
            LoadStep::LoadAvg => self.load.is_some(),
            LoadStep::OpenFiles => self.open_files.is_some(),
            LoadStep::ProcStat => self.proc_stat.is_some(),
        }
    }
}

/// Result of one aggregation run: the snapshot plus every step that failed.
#[derive(Debug, Default)]
pub struct Collection {
    pub status: Status,
    pub errors: Vec<SourceReadError>,
}

impl Collection {
    /// Returns the failure recorded for `step`, if any.
    pub fn error(&self, step: LoadStep) -> Option<&SourceReadError> {
        self.errors.iter().find(|e| e.step == step)
    }
}

/// Picks the metrics root.
///
/// An explicit root always wins. Otherwise the fixture directory is used when
/// it contains a `meminfo` file, and the real `/proc` when it does not.
pub fn resolve_root<F: FileSystem>(fs: &F, explicit: Option<&Path>, fixtures: &Path) -> PathBuf {
    if let Some(root) = explicit {
        return root.to_path_buf();
    }
    if fs.exists(&fixtures.join("meminfo")) {
        return fixtures.to_path_buf();
    }
    PathBuf::from(DEFAULT_ROOT)
}

/// Builds [`Status`] snapshots from a metrics root.
///
/// Holds no per-request state; `collect` takes `&self` and may run
/// concurrently from many request handlers.
pub struct StatusAggregator<F: FileSystem> {
    fs: F,
    root: PathBuf,
    open_files: Option<LsofCommand>,
}

impl<F: FileSystem> StatusAggregator<F> {
    /// Creates an aggregator reading system-wide files from `root`.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `root` - Directory holding `meminfo`, `stat` and `loadavg`
    pub fn new(fs: F, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
            open_files: None,
        }
    }

    /// Enables the open file load step using `command`.
    pub fn with_open_files(mut self, command: LsofCommand) -> Self {
        self.open_files = Some(command);
        self
    }

    /// Directory system-wide files are read from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn open_files_enabled(&self) -> bool {
        self.open_files.is_some()
    }

    /// Builds a snapshot, dropping the error details.
    pub fn status(&self, pid: Option<u32>) -> Status {
        self.collect(pid).status
    }

    /// Runs every load step and returns the snapshot with the failures.
    ///
    /// `pid` is the supervised child; `None` or `Some(0)` skips the
    /// per-process step.
    pub fn collect(&self, pid: Option<u32>) -> Collection {
        let mut collection = Collection::default();

        for step in SYSTEM_STEPS {
            if step == LoadStep::OpenFiles && self.open_files.is_none() {
                continue;
            }
            self.run_step(step, &mut collection, |status| {
                self.load_system(step, status)
            });
        }

        if let Some(pid) = pid.filter(|&p| p != 0) {
            self.run_step(LoadStep::ProcStat, &mut collection, |status| {
                status.proc_stat = Some(self.load_proc_stat(pid)?);
                Ok(())
            });
        }

        debug!(
            root = %self.root.display(),
            failed = collection.errors.len(),
            "status collected"
        );
        collection
    }

    fn run_step(
        &self,
        step: LoadStep,
        collection: &mut Collection,
        load: impl FnOnce(&mut Status) -> Result<(), CollectError>,
    ) {
        if let Err(e) = load(&mut collection.status) {
            let err = SourceReadError::new(step, e);
            warn!(step = %step, error = %err.source, "load step failed");
            collection.errors.push(err);
        }
    }

    fn load_system(&self, step: LoadStep, status: &mut Status) -> Result<(), CollectError> {
        match step {
            LoadStep::Meminfo => status.meminfo = Some(parse_meminfo(&self.read_root("meminfo")?)?),
            LoadStep::Stat => status.stat = Some(parse_global_stat(&self.read_root("stat")?)?),
            LoadStep::LoadAvg => status.load = Some(parse_loadavg(&self.read_root("loadavg")?)?),
            LoadStep::OpenFiles => {
                if let Some(command) = &self.open_files {
                    status.open_files = Some(command.run()?);
                }
            }
            LoadStep::ProcStat => {}
        }
        Ok(())
    }

    fn read_root(&self, name: &str) -> Result<String, CollectError> {
        Ok(self.fs.read_to_string(&self.root.join(name))?)
    }

    fn load_proc_stat(&self, pid: u32) -> Result<ProcStat, CollectError> {
        let path = Path::new(PID_ROOT).join(pid.to_string()).join("stat");
        let content = self.fs.read_to_string(&path)?;
        Ok(parse_proc_stat(&content)?)
    }
}
