//! Error types for the mock node API.

use gridctl_node_api::{NodeApiError, NodeApiErrorKind, NodeIdentity, StarterError};
use thiserror::Error;

/// Error type for the mock node API.
#[derive(Debug, Error)]
pub enum Error {
    /// A failure injected with `MockNodeApi::fail_with`.
    #[error("injected failure on {0}: {1}")]
    Injected(NodeIdentity, String),

    /// The node is unknown to the fleet or marked unreachable.
    #[error("connection refused: {0}")]
    Unreachable(NodeIdentity),
}

impl NodeApiError for Error {
    fn kind(&self) -> NodeApiErrorKind {
        match self {
            Self::Unreachable(_) => NodeApiErrorKind::Connectivity,
            Self::Injected(..) => NodeApiErrorKind::Protocol,
        }
    }
}

impl StarterError for Error {}
