use gridctl_node_api::{NodeApiError, NodeApiErrorKind, NodeIdentity, StarterError};
use thiserror::Error;

use crate::status::CombinedStatus;

/// The result type for orchestration operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while observing or driving a cluster.
#[derive(Debug, Error)]
pub enum Error {
    /// One or more probes failed during an aggregation pass.
    #[error("aggregation failed: {}", .0.join("; "))]
    Aggregation(Vec<String>),

    /// The live cluster disagrees with the declared topology.
    #[error("cluster '{0}' does not match its declared topology: {1}")]
    ConfigMismatch(String, String),

    /// The node could not be reached.
    #[error("{0} is unreachable: {1}")]
    Connectivity(NodeIdentity, String),

    /// Two declared nodes share an identity.
    #[error("node {0} is declared more than once")]
    DuplicateNode(NodeIdentity),

    /// A node already belongs to a differently named cluster.
    #[error("{node} belongs to cluster '{actual}', expected '{expected}'")]
    ForeignCluster {
        /// The node that reported the foreign name.
        node: NodeIdentity,
        /// The declared cluster name.
        expected: String,
        /// The name the node reported.
        actual: String,
    },

    /// Not enough nodes can be joined to reach the required count.
    #[error("{available} nodes can join but {required} are required")]
    InsufficientNodes {
        /// Nodes needed for the operation.
        required: usize,
        /// Nodes already joined plus nodes that can join.
        available: usize,
    },

    /// The caller passed an unusable argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation cannot run from the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A single-node cluster cannot grow.
    #[error("cluster mastered by {0} has a designated count of 1 and cannot be expanded")]
    NotExpandable(NodeIdentity),

    /// The node answered but the exchange failed.
    #[error("protocol error talking to {0}: {1}")]
    Protocol(NodeIdentity, String),

    /// The node could not be started.
    #[error("failed to start {0}: {1}")]
    Starter(NodeIdentity, String),

    /// A status was read before it was ever published.
    #[error("no status has been published for {0}")]
    StatusUnavailable(String),

    /// Leaving would make partition data unavailable.
    #[error("{node} cannot leave safely: partition {partition_id} {reason}")]
    UnsafeLeave {
        /// The node asked to leave.
        node: NodeIdentity,
        /// The partition that would be lost.
        partition_id: u32,
        /// Why the partition would be lost.
        reason: &'static str,
    },

    /// The master does not see every designated member.
    #[error("cluster is unstable: {active} of {designated} members active")]
    UnstableCluster {
        /// Members the master sees.
        active: u32,
        /// Members the cluster is designated to have.
        designated: u32,
    },
}

impl Error {
    /// Maps a node API error by its kind.
    pub fn from_node_api<E: NodeApiError>(node: &NodeIdentity, error: &E) -> Self {
        match error.kind() {
            NodeApiErrorKind::Connectivity => Self::Connectivity(node.clone(), error.to_string()),
            NodeApiErrorKind::Protocol => Self::Protocol(node.clone(), error.to_string()),
        }
    }

    /// Rejects `operation` because `node` is in `status`.
    #[must_use]
    pub fn invalid_state(node: &NodeIdentity, status: CombinedStatus, operation: &str) -> Self {
        Self::InvalidState(format!("cannot {operation} {node} while it is {status}"))
    }

    /// Wraps a starter error.
    pub fn from_starter<E: StarterError>(node: &NodeIdentity, error: &E) -> Self {
        Self::Starter(node.clone(), error.to_string())
    }

    /// Whether this error only means the node is down.
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(..))
    }
}
