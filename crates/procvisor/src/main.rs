//! procvisor - supervises one child process and serves host health as JSON.
//!
//! Launches the command given on the command line, then answers every HTTP
//! request on `/` with a fresh snapshot of memory, CPU, load and the child's
//! own `/proc/<pid>/stat`.

mod access_log;
mod handlers;
mod state;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use procvisor_core::collector::{LsofCommand, RealFs};
use procvisor_core::status::resolve_root;
use procvisor_core::{StatusAggregator, Supervisor};

use state::AppState;

/// Process supervisor with an HTTP health endpoint.
#[derive(Parser, Debug)]
#[command(name = "procvisor", about = "Process supervisor with an HTTP health endpoint", version = procvisor_core::VERSION)]
struct Args {
    /// Listen address.
    #[arg(long, default_value = "0.0.0.0:1235", env = "PROCVISOR_LISTEN")]
    listen: SocketAddr,

    /// Directory to read meminfo, stat and loadavg from.
    /// Overrides fixture detection when set.
    #[arg(long, env = "PROCVISOR_PROC_ROOT")]
    proc_root: Option<PathBuf>,

    /// Fixture directory used instead of /proc when it contains a meminfo file.
    #[arg(long, default_value = "fixtures")]
    fixtures: PathBuf,

    /// Capture the child's stdout/stderr in memory instead of inheriting them.
    #[arg(long)]
    log_to_buffer: bool,

    /// Bytes of stdout and of stderr kept when capturing child output.
    #[arg(long, default_value_t = procvisor_core::DEFAULT_BUFFER_LIMIT)]
    buffer_limit: usize,

    /// Include open files reported by `lsof` in every snapshot.
    #[arg(long)]
    open_files: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,

    /// Command to supervise.
    command: Option<String>,

    /// Arguments passed verbatim to the command.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

/// Initializes the tracing subscriber. `RUST_LOG` takes precedence when set.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(args))
}

async fn run(args: Args) -> ExitCode {
    info!("procvisor {} starting", procvisor_core::VERSION);

    let supervisor = args.command.as_ref().map(|command| {
        Arc::new(
            Supervisor::new(command, args.args.clone())
                .with_log_to_buffer(args.log_to_buffer)
                .with_buffer_limit(args.buffer_limit),
        )
    });

    match &supervisor {
        Some(sup) => {
            // The endpoint keeps serving system metrics even without a child.
            if let Err(e) = sup.start() {
                error!(error = %e, "supervised command did not start");
            }
        }
        None => info!("no command given, serving system metrics only"),
    }

    let fs = RealFs::new();
    let root = resolve_root(&fs, args.proc_root.as_deref(), &args.fixtures);

    let mut aggregator = StatusAggregator::new(fs, root);
    if args.open_files {
        aggregator = aggregator.with_open_files(LsofCommand::default());
    }
    info!(
        root = %aggregator.root().display(),
        open_files = aggregator.open_files_enabled(),
        "reading system metrics"
    );

    let app = handlers::router(AppState::new(supervisor.clone(), aggregator))
        .into_make_service_with_connect_info::<SocketAddr>();

    let listener = match TcpListener::bind(args.listen).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %args.listen, error = %e, "failed to bind");
            stop_child(supervisor.as_deref());
            return ExitCode::FAILURE;
        }
    };
    info!(addr = %args.listen, "listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    stop_child(supervisor.as_deref());

    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server error");
            ExitCode::FAILURE
        }
    }
}

fn stop_child(supervisor: Option<&Supervisor>) {
    let Some(sup) = supervisor else {
        return;
    };
    if let Err(e) = sup.stop() {
        warn!(error = %e, "failed to stop supervised command");
    }
    log_captured_output(sup);
}

/// Writes whatever the child left in the capture buffers to our log.
fn log_captured_output(sup: &Supervisor) {
    let output = sup.captured_output();
    let (stdout_dropped, stderr_dropped) = sup.dropped_output();
    for (stream, bytes, dropped) in [
        ("stdout", &output.stdout, stdout_dropped),
        ("stderr", &output.stderr, stderr_dropped),
    ] {
        if bytes.is_empty() {
            continue;
        }
        info!(
            stream,
            bytes = bytes.len(),
            dropped,
            "captured child output:\n{}",
            String::from_utf8_lossy(bytes).trim_end()
        );
    }
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("received shutdown signal");
}
