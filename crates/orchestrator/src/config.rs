use std::time::Duration;

/// Default number of probes in flight during one aggregation pass.
pub const DEFAULT_MAX_CONCURRENT_PROBES: usize = 8;

/// Default interval between watcher polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Tunables shared by the aggregator, lifecycles and watchers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ControllerConfig {
    /// Upper bound on concurrent probes.
    pub max_concurrent_probes: usize,

    /// Interval between watcher polls.
    pub poll_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_probes: DEFAULT_MAX_CONCURRENT_PROBES,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ControllerConfig {
    /// Probes to run at once for `node_count` nodes, never zero.
    #[must_use]
    pub fn probe_limit(&self, node_count: usize) -> usize {
        self.max_concurrent_probes.min(node_count).max(1)
    }
}
