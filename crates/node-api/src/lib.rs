//! Abstract interface for the management surface of a data-cluster node.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod types;

pub use error::{NodeApiError, NodeApiErrorKind, StarterError};
pub use types::*;

use std::time::Duration;

use async_trait::async_trait;

/// A client for one node's management API.
///
/// Every call is authenticated and addressed to a single endpoint. Implementations
/// must report an unreachable endpoint with [`NodeApiErrorKind::Connectivity`] so
/// that callers can treat the node as stopped instead of failing.
#[async_trait]
pub trait NodeManagementApi
where
    Self: Send + Sync + 'static,
{
    /// The error type for the API.
    type Error: NodeApiError;

    /// Reads process and membership status.
    async fn get_stat(
        &self,
        endpoint: &NodeEndpoint,
        credentials: &Credentials,
        address_type: AddressType,
    ) -> Result<NodeStat, Self::Error>;

    /// Reads the follower list tracked by a master.
    async fn get_host_config(
        &self,
        endpoint: &NodeEndpoint,
        credentials: &Credentials,
    ) -> Result<HostConfig, Self::Error>;

    /// Reads the node's partition ownership table.
    async fn get_partition_table(
        &self,
        endpoint: &NodeEndpoint,
        credentials: &Credentials,
    ) -> Result<Vec<PartitionEntry>, Self::Error>;

    /// Asks the node to join `cluster_name`. A `min_node_count` of 0 lets the
    /// cluster choose.
    async fn post_join(
        &self,
        endpoint: &NodeEndpoint,
        credentials: &Credentials,
        cluster_name: &str,
        min_node_count: u32,
    ) -> Result<(), Self::Error>;

    /// Asks the node to leave its cluster.
    async fn post_leave(
        &self,
        endpoint: &NodeEndpoint,
        credentials: &Credentials,
    ) -> Result<(), Self::Error>;

    /// Asks the node process to shut down.
    async fn post_shutdown(
        &self,
        endpoint: &NodeEndpoint,
        credentials: &Credentials,
        force: bool,
    ) -> Result<(), Self::Error>;

    /// Asks a master to grow its designated count by the node that just joined.
    async fn post_cluster_increase(
        &self,
        endpoint: &NodeEndpoint,
        credentials: &Credentials,
    ) -> Result<(), Self::Error>;

    /// Asks a master to stop the whole cluster.
    async fn post_cluster_stop(
        &self,
        endpoint: &NodeEndpoint,
        credentials: &Credentials,
    ) -> Result<(), Self::Error>;
}

/// Launches a node process out of band, used only when the node is fully down.
#[async_trait]
pub trait RemoteProcessStarter
where
    Self: Send + Sync + 'static,
{
    /// The error type for the starter.
    type Error: StarterError;

    /// Starts the process. With `wait`, blocks until the management port
    /// answers or the duration elapses.
    async fn start_process(
        &self,
        target: &StartTarget,
        wait: Option<Duration>,
    ) -> Result<(), Self::Error>;
}
