//! Node and cluster state machines.

mod cluster;
mod node;

pub use cluster::ClusterLifecycle;
pub use node::NodeLifecycle;
