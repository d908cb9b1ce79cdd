use std::sync::Arc;

use gridctl_node_api::{AddressType, Credentials, NodeManagementApi};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::Node;
use crate::status::{NodeStatus, classify};

/// Reads and classifies the status of single nodes.
pub struct NodeProbe<A> {
    api: Arc<A>,
}

impl<A> Clone for NodeProbe<A> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
        }
    }
}

impl<A> NodeProbe<A>
where
    A: NodeManagementApi,
{
    /// Creates a probe over a management API client.
    pub const fn new(api: Arc<A>) -> Self {
        Self { api }
    }

    /// The management API client.
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Probes `node` and publishes the result to it.
    ///
    /// # Errors
    ///
    /// Returns `Connectivity` if the node cannot be reached and `Protocol`
    /// for any other failure.
    pub async fn probe(&self, node: &Node, credentials: &Credentials) -> Result<Arc<NodeStatus>> {
        self.probe_with(node, credentials, AddressType::System).await
    }

    /// Like [`probe`](Self::probe), reporting peer addresses in `address_type`.
    ///
    /// # Errors
    ///
    /// Returns `Connectivity` if the node cannot be reached and `Protocol`
    /// for any other failure.
    pub async fn probe_with(
        &self,
        node: &Node,
        credentials: &Credentials,
        address_type: AddressType,
    ) -> Result<Arc<NodeStatus>> {
        let raw = self
            .api
            .get_stat(&node.endpoint(), credentials, address_type)
            .await
            .map_err(|e| Error::from_node_api(node.identity(), &e))?;

        let status = Arc::new(classify(&raw));
        debug!(
            "{} is {} (role {}, cluster '{}')",
            node, status.combined_status, status.role, status.cluster_name
        );

        node.publish(status.clone());
        Ok(status)
    }

    /// Probes `node`, treating an unreachable node as stopped.
    ///
    /// # Errors
    ///
    /// Returns `Protocol` if the node answered but the exchange failed.
    pub async fn probe_or_stopped(
        &self,
        node: &Node,
        credentials: &Credentials,
    ) -> Result<Arc<NodeStatus>> {
        match self.probe(node, credentials).await {
            Err(Error::Connectivity(_, reason)) => {
                debug!("{} is unreachable, assuming stopped: {}", node, reason);
                let status = Arc::new(NodeStatus::stopped());
                node.publish(status.clone());
                Ok(status)
            }
            result => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use gridctl_node_api::NodeIdentity;
    use gridctl_node_api_mock::{MockNodeApi, stats};

    use super::*;
    use crate::status::{CombinedStatus, NodeRole};

    fn admin() -> Credentials {
        Credentials::new("admin", "admin")
    }

    #[tokio::test]
    async fn test_probe_publishes_status() {
        let api = MockNodeApi::new();
        let node = Node::new(NodeIdentity::new("10.0.0.1", 10040));
        api.add_node(node.identity(), stats::master("prod", 1, 1));

        let probe = NodeProbe::new(Arc::new(api));
        let status = probe.probe(&node, &admin()).await.unwrap();

        assert_eq!(status.role, NodeRole::Master);
        assert_eq!(node.status(), Some(status));
    }

    #[tokio::test]
    async fn test_unreachable_node_is_stopped() {
        let api = MockNodeApi::new();
        let node = Node::new(NodeIdentity::new("10.0.0.1", 10040));
        api.add_stopped_node(node.identity());

        let probe = NodeProbe::new(Arc::new(api));

        assert_matches!(
            probe.probe(&node, &admin()).await,
            Err(Error::Connectivity(..))
        );

        let status = probe.probe_or_stopped(&node, &admin()).await.unwrap();
        assert_eq!(status.combined_status, CombinedStatus::Stopped);
        assert_eq!(
            node.status().unwrap().combined_status,
            CombinedStatus::Stopped
        );
    }

    #[tokio::test]
    async fn test_protocol_failure_is_not_masked() {
        let api = MockNodeApi::new();
        let node = Node::new(NodeIdentity::new("10.0.0.1", 10040));
        api.add_node(node.identity(), stats::started());
        api.fail_with(node.identity(), "401 Unauthorized");

        let probe = NodeProbe::new(Arc::new(api));

        assert_matches!(
            probe.probe_or_stopped(&node, &admin()).await,
            Err(Error::Protocol(..))
        );
        assert!(node.status().is_none());
    }

    #[tokio::test]
    async fn test_address_type_is_forwarded() {
        let api = Arc::new(MockNodeApi::new());
        let node = Node::new(NodeIdentity::new("10.0.0.1", 10040));
        api.add_node(node.identity(), stats::started());

        let probe = NodeProbe::new(api.clone());
        probe
            .probe_with(&node, &admin(), AddressType::Cluster)
            .await
            .unwrap();

        assert_eq!(
            api.last_address_type(node.identity()),
            Some(AddressType::Cluster)
        );
    }
}
