//! procvisor-core - supervisor and status aggregation for procvisor.
//!
//! Provides:
//! - `collector` - filesystem abstraction, `/proc` parsers, `lsof` enumeration
//! - `status` - the per-request status snapshot and its aggregator
//! - `supervisor` - lifecycle of the single supervised child process

pub mod collector;
pub mod status;
pub mod supervisor;

pub use status::{Collection, Status, StatusAggregator};
pub use supervisor::{DEFAULT_BUFFER_LIMIT, Supervisor, SupervisorError, SupervisorState};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
