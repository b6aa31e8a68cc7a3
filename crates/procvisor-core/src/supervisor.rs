//! Lifecycle of the single supervised child process.
//!
//! ```text
//! NotStarted ──start()──▶ Running ──stop()──▶ Stopped
//!                            │
//!                            └──(exit observed)──▶ Exited
//! ```
//!
//! The supervisor is shared between the startup code and every HTTP handler,
//! so all methods take `&self`. The recorded pid is an atomic; the child handle
//! is behind a mutex that is only held for non-blocking calls.
//!
//! Buffered output keeps only the most recent bytes of each stream, see
//! [`Supervisor::with_buffer_limit`].

use std::fmt;
use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Errors from starting or stopping the child.
#[derive(Debug)]
pub enum SupervisorError {
    /// The command could not be spawned (missing binary, permission denied).
    Launch { command: String, source: io::Error },
    /// `start()` was called on a supervisor that already launched its child.
    AlreadyStarted,
    /// The kill signal could not be delivered.
    Kill(io::Error),
}

impl fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorError::Launch { command, source } => {
                write!(f, "failed to launch {}: {}", command, source)
            }
            SupervisorError::AlreadyStarted => write!(f, "child process already started"),
            SupervisorError::Kill(e) => write!(f, "failed to kill child process: {}", e),
        }
    }
}

impl std::error::Error for SupervisorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SupervisorError::Launch { source, .. } => Some(source),
            SupervisorError::Kill(e) => Some(e),
            SupervisorError::AlreadyStarted => None,
        }
    }
}

/// Lifecycle state of the supervised child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    NotStarted,
    Running,
    /// The child exited on its own; its pid is no longer reported.
    Exited,
    /// `stop()` sent the kill signal.
    Stopped,
}

/// Bytes kept per output stream unless overridden.
pub const DEFAULT_BUFFER_LIMIT: usize = 1024 * 1024;

/// Child output captured when output buffering is enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Tail of one child stream, never longer than `limit`.
#[derive(Debug, Default)]
struct Tail {
    data: Vec<u8>,
    limit: usize,
    dropped: u64,
}

impl Tail {
    fn with_limit(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
            dropped: 0,
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        // A single chunk larger than the limit only contributes its end.
        let skipped = bytes.len().saturating_sub(self.limit);
        let bytes = &bytes[skipped..];
        let overflow = (self.data.len() + bytes.len()).saturating_sub(self.limit);
        self.data.drain(..overflow);
        self.data.extend_from_slice(bytes);
        self.dropped += (skipped + overflow) as u64;
    }
}

type OutputBuffer = Arc<Mutex<Tail>>;

struct Inner {
    state: SupervisorState,
    child: Option<Child>,
}

/// Owns one supervised child process.
pub struct Supervisor {
    command: String,
    args: Vec<String>,
    log_to_buffer: bool,
    buffer_limit: usize,
    pid: AtomicU32,
    inner: Mutex<Inner>,
    stdout: OutputBuffer,
    stderr: OutputBuffer,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Supervisor {
    /// Creates a supervisor for `command` with `args`. Nothing is launched yet.
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            log_to_buffer: false,
            buffer_limit: DEFAULT_BUFFER_LIMIT,
            pid: AtomicU32::new(0),
            inner: Mutex::new(Inner {
                state: SupervisorState::NotStarted,
                child: None,
            }),
            stdout: OutputBuffer::default(),
            stderr: OutputBuffer::default(),
        }
    }

    /// Captures child stdout/stderr in memory instead of inheriting ours.
    pub fn with_log_to_buffer(mut self, enabled: bool) -> Self {
        self.log_to_buffer = enabled;
        self
    }

    /// Caps each captured stream at the last `limit` bytes.
    /// Defaults to [`DEFAULT_BUFFER_LIMIT`].
    pub fn with_buffer_limit(mut self, limit: usize) -> Self {
        self.buffer_limit = limit;
        self
    }

    /// Launches the child.
    ///
    /// Must be called from within a Tokio runtime. Only one child is ever
    /// launched per supervisor; a second call fails with
    /// [`SupervisorError::AlreadyStarted`].
    pub fn start(&self) -> Result<u32, SupervisorError> {
        let mut inner = lock(&self.inner);
        if inner.state != SupervisorState::NotStarted {
            return Err(SupervisorError::AlreadyStarted);
        }

        let (stdout, stderr) = if self.log_to_buffer {
            (Stdio::piped(), Stdio::piped())
        } else {
            (Stdio::inherit(), Stdio::inherit())
        };

        let launch_error = |source: io::Error| SupervisorError::Launch {
            command: self.command.clone(),
            source,
        };

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
            .map_err(launch_error)?;

        let pid = child
            .id()
            .ok_or_else(|| launch_error(io::Error::other("child exited before its pid was read")))?;

        if let Some(out) = child.stdout.take() {
            *lock(&self.stdout) = Tail::with_limit(self.buffer_limit);
            tokio::spawn(drain(out, self.stdout.clone()));
        }
        if let Some(err) = child.stderr.take() {
            *lock(&self.stderr) = Tail::with_limit(self.buffer_limit);
            tokio::spawn(drain(err, self.stderr.clone()));
        }

        self.pid.store(pid, Ordering::SeqCst);
        inner.child = Some(child);
        inner.state = SupervisorState::Running;
        info!(pid, command = %self.command, args = ?self.args, "started child process");
        Ok(pid)
    }

    /// Sends a kill signal to the child.
    ///
    /// No-op when nothing was started or the child is already gone. Does not
    /// wait for the child to exit; a child that dies later is reaped by the
    /// next [`running_pid`](Self::running_pid) call.
    pub fn stop(&self) -> Result<(), SupervisorError> {
        let mut inner = lock(&self.inner);
        if inner.state != SupervisorState::Running {
            return Ok(());
        }
        let pid = self.pid();
        let Some(child) = inner.child.as_mut() else {
            return Ok(());
        };

        if let Ok(Some(status)) = child.try_wait() {
            info!(pid, %status, "child process already exited");
            inner.state = SupervisorState::Exited;
            return Ok(());
        }

        child.start_kill().map_err(SupervisorError::Kill)?;
        if let Ok(Some(status)) = child.try_wait() {
            debug!(pid, %status, "reaped killed child process");
            inner.child = None;
        }
        inner.state = SupervisorState::Stopped;
        info!(pid, "killed child process");
        Ok(())
    }

    /// Pid recorded at launch, `0` if never started.
    pub fn pid(&self) -> u32 {
        self.pid.load(Ordering::SeqCst)
    }

    /// Pid of the child while it is still running.
    ///
    /// Polls the child without blocking. Once its exit is observed the pid is
    /// never returned again, so a recycled pid cannot be mistaken for the
    /// child. Polling also reaps the exited child, including one killed by
    /// [`stop`](Self::stop).
    pub fn running_pid(&self) -> Option<u32> {
        let mut inner = lock(&self.inner);
        let pid = self.pid();
        let state = inner.state;
        match state {
            SupervisorState::Running => {}
            SupervisorState::Stopped => {
                if let Some(child) = inner.child.as_mut()
                    && let Ok(Some(status)) = child.try_wait()
                {
                    debug!(pid, %status, "reaped killed child process");
                    inner.child = None;
                }
                return None;
            }
            SupervisorState::NotStarted | SupervisorState::Exited => return None,
        }
        let child = inner.child.as_mut()?;

        match child.try_wait() {
            Ok(None) => Some(pid),
            Ok(Some(status)) => {
                info!(pid, %status, "child process exited");
                inner.state = SupervisorState::Exited;
                None
            }
            Err(e) => {
                warn!(pid, error = %e, "failed to poll child process");
                Some(pid)
            }
        }
    }

    pub fn state(&self) -> SupervisorState {
        lock(&self.inner).state
    }

    /// Copy of the most recent child output, when buffering.
    pub fn captured_output(&self) -> CapturedOutput {
        CapturedOutput {
            stdout: lock(&self.stdout).data.clone(),
            stderr: lock(&self.stderr).data.clone(),
        }
    }

    /// Bytes discarded from the front of (stdout, stderr) to honour the limit.
    pub fn dropped_output(&self) -> (u64, u64) {
        (lock(&self.stdout).dropped, lock(&self.stderr).dropped)
    }
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("command", &self.command)
            .field("args", &self.args)
            .field("log_to_buffer", &self.log_to_buffer)
            .field("buffer_limit", &self.buffer_limit)
            .field("pid", &self.pid())
            .finish_non_exhaustive()
    }
}

/// Copies a child stream into `buffer` until EOF, keeping only its tail.
async fn drain<R: AsyncRead + Unpin>(mut reader: R, buffer: OutputBuffer) {
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => lock(&buffer).push(&chunk[..n]),
            Err(e) => {
                debug!(error = %e, "child output stream closed");
                break;
            }
        }
    }
}
