//! Declared nodes and clusters, each carrying its latest published status.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use gridctl_node_api::{NodeEndpoint, NodeIdentity, OsCredential, StartTarget};

use crate::error::{Error, Result};
use crate::status::{ClusterState, NodeStatus};

/// Default port of the remote shell daemon.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// One cluster member.
///
/// Clones share the status cell, so a probe through any clone is visible
/// through all of them.
#[derive(Clone)]
pub struct Node {
    identity: NodeIdentity,
    ssh_port: u16,
    os_credential: Option<OsCredential>,
    tls: bool,
    status: Arc<ArcSwapOption<NodeStatus>>,
}

impl Node {
    /// Creates a node with default ssh port, no OS credential and plain HTTP.
    #[must_use]
    pub fn new(identity: NodeIdentity) -> Self {
        Self {
            identity,
            ssh_port: DEFAULT_SSH_PORT,
            os_credential: None,
            tls: false,
            status: Arc::new(ArcSwapOption::empty()),
        }
    }

    /// Sets the remote shell port.
    #[must_use]
    pub const fn with_ssh_port(mut self, ssh_port: u16) -> Self {
        self.ssh_port = ssh_port;
        self
    }

    /// Sets the OS login used to start the process.
    #[must_use]
    pub fn with_os_credential(mut self, os_credential: OsCredential) -> Self {
        self.os_credential = Some(os_credential);
        self
    }

    /// Selects HTTPS for the management API.
    #[must_use]
    pub const fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Management endpoint identity.
    #[must_use]
    pub const fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// Remote shell port.
    #[must_use]
    pub const fn ssh_port(&self) -> u16 {
        self.ssh_port
    }

    /// Whether the management API uses HTTPS.
    #[must_use]
    pub const fn tls(&self) -> bool {
        self.tls
    }

    /// Endpoint to address the management API with.
    #[must_use]
    pub fn endpoint(&self) -> NodeEndpoint {
        NodeEndpoint {
            identity: self.identity.clone(),
            tls: self.tls,
        }
    }

    /// What a process starter needs to launch this node.
    #[must_use]
    pub fn start_target(&self) -> StartTarget {
        StartTarget {
            identity: self.identity.clone(),
            ssh_port: self.ssh_port,
            os_credential: self.os_credential.clone(),
        }
    }

    /// Latest published status, if the node was ever probed.
    #[must_use]
    pub fn status(&self) -> Option<Arc<NodeStatus>> {
        self.status.load_full()
    }

    /// Replaces the published status.
    pub fn publish(&self, status: Arc<NodeStatus>) {
        self.status.store(Some(status));
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("identity", &self.identity)
            .field("ssh_port", &self.ssh_port)
            .field("tls", &self.tls)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identity)
    }
}

/// Result of one aggregation pass.
#[derive(Clone, Debug)]
pub struct ClusterStatus {
    /// Overall state.
    pub state: ClusterState,

    /// Agreeing members that serve.
    pub servicing_count: usize,

    /// Agreeing members joined but not serving.
    pub wait_count: usize,

    /// The node reporting itself master, declared or not.
    pub master_node: Option<Node>,

    /// Live members missing from the declared topology.
    pub undefined_nodes: Vec<Node>,
}

impl ClusterStatus {
    /// Members joined, serving or not.
    #[must_use]
    pub const fn joined_count(&self) -> usize {
        self.servicing_count + self.wait_count
    }
}

/// A named, declared set of nodes expected to operate together.
pub struct Cluster {
    name: String,
    nodes: Vec<Node>,
    tls: bool,
    status: ArcSwapOption<ClusterStatus>,
}

impl Cluster {
    /// Creates a cluster from its declared members.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateNode` if two nodes share an identity.
    pub fn new(name: impl Into<String>, nodes: Vec<Node>, tls: bool) -> Result<Self> {
        let mut seen = HashSet::with_capacity(nodes.len());
        for node in &nodes {
            if !seen.insert(node.identity()) {
                return Err(Error::DuplicateNode(node.identity().clone()));
            }
        }

        Ok(Self {
            name: name.into(),
            nodes,
            tls,
            status: ArcSwapOption::empty(),
        })
    }

    /// Declared cluster name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared members, in declaration order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of declared members.
    #[must_use]
    pub fn declared_topology_size(&self) -> usize {
        self.nodes.len()
    }

    /// Whether members use HTTPS.
    #[must_use]
    pub const fn tls(&self) -> bool {
        self.tls
    }

    /// Whether `identity` is declared.
    #[must_use]
    pub fn contains(&self, identity: &NodeIdentity) -> bool {
        self.node(identity).is_some()
    }

    /// The declared member with `identity`.
    #[must_use]
    pub fn node(&self, identity: &NodeIdentity) -> Option<&Node> {
        self.nodes.iter().find(|node| node.identity() == identity)
    }

    /// Latest published status, if the cluster was ever aggregated.
    #[must_use]
    pub fn status(&self) -> Option<Arc<ClusterStatus>> {
        self.status.load_full()
    }

    /// Replaces the published status.
    pub fn publish(&self, status: ClusterStatus) {
        self.status.store(Some(Arc::new(status)));
    }
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("name", &self.name)
            .field("nodes", &self.nodes)
            .field("tls", &self.tls)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::status::CombinedStatus;

    fn node(port: u16) -> Node {
        Node::new(NodeIdentity::new("10.0.0.1", port))
    }

    #[test]
    fn test_duplicate_identity_is_rejected() {
        let result = Cluster::new("prod", vec![node(10040), node(10040)], false);

        assert_matches!(result, Err(Error::DuplicateNode(identity)) if identity.port == 10040);
    }

    #[test]
    fn test_same_host_different_port_is_distinct() {
        let cluster = Cluster::new("prod", vec![node(10040), node(10041)], false).unwrap();

        assert_eq!(cluster.declared_topology_size(), 2);
        assert!(cluster.contains(&NodeIdentity::new("10.0.0.1", 10041)));
        assert!(!cluster.contains(&NodeIdentity::new("10.0.0.1", 10042)));
    }

    #[test]
    fn test_clones_share_published_status() {
        let original = node(10040);
        let copy = original.clone();
        assert!(original.status().is_none());

        copy.publish(Arc::new(NodeStatus::stopped()));

        assert_eq!(
            original.status().unwrap().combined_status,
            CombinedStatus::Stopped
        );
    }

    #[test]
    fn test_start_target_carries_login() {
        let credential = OsCredential {
            user: "gsadm".to_string(),
            identity_file: None,
        };
        let target = node(10040)
            .with_ssh_port(2222)
            .with_os_credential(credential.clone())
            .start_target();

        assert_eq!(target.ssh_port, 2222);
        assert_eq!(target.os_credential, Some(credential));
    }
}
