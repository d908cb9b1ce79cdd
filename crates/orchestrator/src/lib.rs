//! Observes a fleet of data-cluster nodes and drives them through start,
//! stop, join, leave and append transitions.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod aggregator;
mod config;
mod error;
mod lifecycle;
mod model;
mod probe;
mod status;
mod watcher;

pub use aggregator::StatusAggregator;
pub use config::{ControllerConfig, DEFAULT_MAX_CONCURRENT_PROBES, DEFAULT_POLL_INTERVAL};
pub use error::{Error, Result};
pub use lifecycle::{ClusterLifecycle, NodeLifecycle};
pub use model::{Cluster, ClusterStatus, DEFAULT_SSH_PORT, Node};
pub use probe::NodeProbe;
pub use status::{ClusterState, CombinedStatus, NodeRole, NodeStatus, classify};
pub use watcher::{BoxWatcher, CompositeWatcher, NoopWatcher, StatusWatcher, WaitTimeout, Watcher};
