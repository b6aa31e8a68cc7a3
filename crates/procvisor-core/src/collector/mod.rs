//! Metrics sources for the status snapshot.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    StatusAggregator                      │
//! │  ┌───────────────────────────┐  ┌─────────────────────┐  │
//! │  │  procfs parsers           │  │  LsofCommand        │  │
//! │  │  - <root>/meminfo         │  │  - lsof -F pcftn    │  │
//! │  │  - <root>/stat            │  │  (off by default)   │  │
//! │  │  - <root>/loadavg         │  └─────────────────────┘  │
//! │  │  - /proc/<pid>/stat       │                           │
//! │  └─────────────┬─────────────┘                           │
//! │         ┌──────▼──────┐                                  │
//! │         │  FileSystem │ (trait)                          │
//! │         └──────┬──────┘                                  │
//! └────────────────┼─────────────────────────────────────────┘
//!          ┌───────┴───────┐
//!   ┌──────▼──────┐ ┌──────▼──────┐
//!   │   RealFs    │ │   MockFs    │
//!   │ (/proc or   │ │ (Testing)   │
//!   │  fixtures)  │ │             │
//!   └─────────────┘ └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use procvisor_core::collector::MockFs;
//! use procvisor_core::status::StatusAggregator;
//!
//! let aggregator = StatusAggregator::new(MockFs::typical_system(), "/proc");
//! let status = aggregator.status(None);
//! assert!(status.meminfo.is_some());
//! assert!(status.proc_stat.is_none());
//! ```

pub mod error;
pub mod lsof;
pub mod mock;
pub mod procfs;
pub mod traits;

pub use error::{CollectError, LoadStep, SourceReadError};
pub use lsof::{LsofCommand, OpenFile, OpenFiles};
pub use mock::MockFs;
pub use traits::{FileSystem, RealFs};
