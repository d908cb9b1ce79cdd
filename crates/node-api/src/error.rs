//! Marker traits for collaborator errors.

use std::error::Error;
use std::fmt::{self, Debug};

/// Marker trait for `NodeManagementApi` errors
pub trait NodeApiError: Debug + Error + Send + Sync + 'static {
    /// Returns the kind of this error
    fn kind(&self) -> NodeApiErrorKind;
}

/// The kind of node API error.
///
/// Callers treat `Connectivity` as "the node is down" rather than as a
/// failure of the operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeApiErrorKind {
    /// The endpoint could not be reached (refused, unresolvable or timed out).
    Connectivity,

    /// The endpoint answered but the exchange failed (bad status, bad payload).
    Protocol,
}

impl fmt::Display for NodeApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Marker trait for `RemoteProcessStarter` errors
pub trait StarterError: Debug + Error + Send + Sync + 'static {}
