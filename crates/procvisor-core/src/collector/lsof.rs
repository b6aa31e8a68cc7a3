//! Open file enumeration through `lsof -F`.
//!
//! `lsof` field output is one field per line, each line starting with a
//! single-character field identifier:
//!
//! ```text
//! p1234        process set: pid
//! cnode        process set: command name
//! f3           file set: descriptor
//! tREG         file set: type
//! n/var/log/x  file set: name
//! ```
//!
//! A `p` line starts a new process set; an `f` line starts a new file set
//! inside the current process.

use std::process::{Command, Stdio};

use serde::Serialize;
use tracing::debug;

use crate::collector::error::CollectError;
use crate::collector::procfs::ParseError;

/// One open file reported by `lsof`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OpenFile {
    pub pid: u32,
    pub command: String,
    /// Descriptor, e.g. `3`, `cwd`, `txt`, `mem`.
    pub fd: String,
    /// File type, e.g. `REG`, `DIR`, `IPv4`.
    pub file_type: String,
    pub name: String,
}

/// All open files reported by one `lsof` run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OpenFiles {
    pub files: Vec<OpenFile>,
}

/// Parses `lsof -F` field output.
///
/// Unknown field identifiers are skipped. A file field appearing before any
/// process set is an error.
pub fn parse_lsof_fields(content: &str) -> Result<OpenFiles, ParseError> {
    let mut files = Vec::new();
    let mut pid: Option<u32> = None;
    let mut command = String::new();
    let mut current: Option<OpenFile> = None;

    for line in content.lines() {
        let mut chars = line.chars();
        let Some(tag) = chars.next() else {
            continue;
        };
        let value = chars.as_str();

        match tag {
            'p' => {
                files.extend(current.take());
                pid = Some(
                    value
                        .parse()
                        .map_err(|_| ParseError::new(format!("invalid pid field: {}", value)))?,
                );
                command.clear();
            }
            'c' => command = value.to_string(),
            'f' => {
                files.extend(current.take());
                let pid = pid.ok_or_else(|| ParseError::new("file set before process set"))?;
                current = Some(OpenFile {
                    pid,
                    command: command.clone(),
                    fd: value.to_string(),
                    ..Default::default()
                });
            }
            't' => {
                if let Some(file) = current.as_mut() {
                    file.file_type = value.to_string();
                }
            }
            'n' => {
                if let Some(file) = current.as_mut() {
                    file.name = value.to_string();
                }
            }
            _ => {}
        }
    }
    files.extend(current);

    Ok(OpenFiles { files })
}

/// The external command used to enumerate open files.
#[derive(Debug, Clone)]
pub struct LsofCommand {
    program: String,
    args: Vec<String>,
}

impl Default for LsofCommand {
    fn default() -> Self {
        Self::new("lsof", ["-F", "pcftn"])
    }
}

impl LsofCommand {
    /// Creates a command that runs `program` with `args` and expects `lsof -F`
    /// formatted output on stdout.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Runs the command and parses its output.
    ///
    /// `lsof` exits non-zero when some files could not be inspected, so a
    /// failing exit status is only an error when nothing was printed.
    pub fn run(&self) -> Result<OpenFiles, CollectError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| CollectError::Command(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() && output.stdout.is_empty() {
            return Err(CollectError::Command(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let files = parse_lsof_fields(&stdout)?;
        debug!(program = %self.program, files = files.files.len(), "enumerated open files");
        Ok(files)
    }
}
