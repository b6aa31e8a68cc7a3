//! Metrics roots held in memory.
//!
//! A `MockFs` stands in for `/proc` (or a fixture directory) so the aggregator
//! can be driven with any combination of present, missing and corrupt source
//! files, plus per-pid stat files for the supervised child.

use crate::collector::traits::FileSystem;
use crate::status::PID_ROOT;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

/// Source files keyed by absolute path. Directories exist implicitly as the
/// ancestors of a stored file.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    files: BTreeMap<PathBuf, String>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `content` at `path`, replacing any earlier content.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        self.files.insert(path.as_ref().to_path_buf(), content.into());
    }

    /// Makes a source vanish, as when a fixture is deleted between requests.
    pub fn remove_file(&mut self, path: impl AsRef<Path>) -> Option<String> {
        self.files.remove(path.as_ref())
    }

    /// Publishes `stat` as `/proc/<pid>/stat`, the per-process source that is
    /// never redirected to a fixture root.
    pub fn add_pid_stat(&mut self, pid: u32, stat: &str) {
        self.add_file(Path::new(PID_ROOT).join(pid.to_string()).join("stat"), stat);
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such metrics source: {}", path.display()),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.keys().any(|file| file.starts_with(path))
    }
}
