//! Mock filesystem used by tests and by callers without a Linux `/proc`.

mod filesystem;
mod scenarios;

pub use filesystem::MockFs;
pub use scenarios::CHILD_PID;
