//! Shared application state handed to every request handler.

use std::sync::Arc;

use procvisor_core::collector::RealFs;
use procvisor_core::{StatusAggregator, Supervisor};

#[derive(Clone)]
pub(crate) struct AppState {
    /// `None` when no command was given on the command line.
    pub(crate) supervisor: Option<Arc<Supervisor>>,
    pub(crate) aggregator: Arc<StatusAggregator<RealFs>>,
}

impl AppState {
    pub(crate) fn new(
        supervisor: Option<Arc<Supervisor>>,
        aggregator: StatusAggregator<RealFs>,
    ) -> Self {
        Self {
            supervisor,
            aggregator: Arc::new(aggregator),
        }
    }

    /// Pid of the supervised child, if it is still running.
    pub(crate) fn child_pid(&self) -> Option<u32> {
        self.supervisor.as_ref().and_then(|s| s.running_pid())
    }
}
