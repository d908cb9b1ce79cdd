use std::sync::Arc;

use futures::stream::{self, StreamExt};
use gridctl_node_api::{Credentials, NodeIdentity, NodeManagementApi};
use tracing::{debug, warn};

use crate::config::ControllerConfig;
use crate::error::{Error, Result};
use crate::model::{Cluster, ClusterStatus, Node};
use crate::probe::NodeProbe;
use crate::status::{ClusterState, CombinedStatus, NodeRole, NodeStatus};

/// Tally of joined members across one aggregation pass.
#[derive(Debug)]
struct Tally {
    servicing_count: usize,
    wait_count: usize,
    all_ever_joined: bool,
}

impl Tally {
    const fn new() -> Self {
        Self {
            servicing_count: 0,
            wait_count: 0,
            all_ever_joined: true,
        }
    }

    fn count(&mut self, status: &NodeStatus) {
        match status.combined_status {
            CombinedStatus::Servicing => self.servicing_count += 1,
            CombinedStatus::Wait => self.wait_count += 1,
            _ => return,
        }
        self.all_ever_joined &= status.ever_joined_cluster;
    }
}

/// Computes cluster-wide status from per-node probes.
pub struct StatusAggregator<A> {
    probe: NodeProbe<A>,
    config: ControllerConfig,
}

impl<A> Clone for StatusAggregator<A> {
    fn clone(&self) -> Self {
        Self {
            probe: self.probe.clone(),
            config: self.config.clone(),
        }
    }
}

impl<A> StatusAggregator<A>
where
    A: NodeManagementApi,
{
    /// Creates an aggregator.
    pub const fn new(probe: NodeProbe<A>, config: ControllerConfig) -> Self {
        Self { probe, config }
    }

    /// Probes every declared node, publishes the cluster status and
    /// returns whether the live cluster matches its declaration.
    ///
    /// An empty topology matches trivially and is left unprobed.
    ///
    /// # Errors
    ///
    /// Returns `Aggregation` listing every failure other than an unreachable
    /// node. Nothing is published in that case.
    pub async fn aggregate(&self, cluster: &Cluster, credentials: &Credentials) -> Result<bool> {
        let declared = cluster.nodes();
        if declared.is_empty() {
            return Ok(true);
        }

        let mut errors = Vec::new();
        let mut matches = true;
        let mut tally = Tally::new();

        let probed = self.probe_all(declared, credentials, &mut errors).await;

        for (node, status) in &probed {
            if !status.combined_status.is_joined() {
                continue;
            }

            if status.designated_count as usize != cluster.declared_topology_size()
                || status.cluster_name != cluster.name()
            {
                warn!(
                    "{} disagrees with the declaration of '{}': cluster '{}' of {} nodes, expected {}",
                    node,
                    cluster.name(),
                    status.cluster_name,
                    status.designated_count,
                    cluster.declared_topology_size()
                );
                matches = false;
                continue;
            }

            tally.count(status);
        }

        let undefined = self
            .find_undefined(cluster, &probed, credentials, &mut errors)
            .await;
        let undefined = self.probe_all(&undefined, credentials, &mut errors).await;

        for (node, status) in &undefined {
            warn!("{} is a live member of '{}' but not declared", node, cluster.name());
            matches = false;
            tally.count(status);
        }

        if !errors.is_empty() {
            return Err(Error::Aggregation(errors));
        }

        let master_node = probed
            .iter()
            .chain(undefined.iter())
            .find(|(_, status)| status.role == NodeRole::Master)
            .map(|(node, _)| node.clone());

        let all_servicing = probed.len() == declared.len()
            && probed
                .iter()
                .all(|(_, status)| status.combined_status == CombinedStatus::Servicing);

        let state = if all_servicing {
            ClusterState::ServiceStable
        } else if !tally.all_ever_joined
            && tally.servicing_count > cluster.declared_topology_size() / 2
        {
            ClusterState::ServiceUnstable
        } else if tally.servicing_count > 0 || tally.wait_count > 0 {
            if tally.all_ever_joined {
                ClusterState::InitWait
            } else {
                ClusterState::Wait
            }
        } else {
            ClusterState::Stop
        };

        debug!(
            "'{}' is {} ({} servicing, {} waiting, {} undefined, matches {})",
            cluster.name(),
            state,
            tally.servicing_count,
            tally.wait_count,
            undefined.len(),
            matches
        );

        cluster.publish(ClusterStatus {
            state,
            servicing_count: tally.servicing_count,
            wait_count: tally.wait_count,
            master_node,
            undefined_nodes: undefined.into_iter().map(|(node, _)| node).collect(),
        });

        Ok(matches)
    }

    /// Probes `nodes` with bounded concurrency, collecting failures.
    async fn probe_all(
        &self,
        nodes: &[Node],
        credentials: &Credentials,
        errors: &mut Vec<String>,
    ) -> Vec<(Node, Arc<NodeStatus>)> {
        let results: Vec<(&Node, Result<Arc<NodeStatus>>)> = if nodes.len() == 1 {
            let node = &nodes[0];
            vec![(node, self.probe.probe_or_stopped(node, credentials).await)]
        } else {
            stream::iter(nodes.iter().map(|node| async move {
                (node, self.probe.probe_or_stopped(node, credentials).await)
            }))
            .buffer_unordered(self.config.probe_limit(nodes.len()))
            .collect()
            .await
        };

        let mut probed = Vec::with_capacity(results.len());
        for (node, result) in results {
            match result {
                Ok(status) => probed.push((node.clone(), status)),
                Err(e) => {
                    warn!("Failed to probe {}: {}", node, e);
                    errors.push(e.to_string());
                }
            }
        }

        // Keep declaration order for master selection and reporting.
        probed.sort_by_key(|(node, _)| {
            nodes
                .iter()
                .position(|n| n.identity() == node.identity())
                .unwrap_or(usize::MAX)
        });

        probed
    }

    /// Followers reported by masters that the declaration does not know about.
    async fn find_undefined(
        &self,
        cluster: &Cluster,
        probed: &[(Node, Arc<NodeStatus>)],
        credentials: &Credentials,
        errors: &mut Vec<String>,
    ) -> Vec<Node> {
        let leaders: Vec<&Node> = probed
            .iter()
            .filter(|(_, status)| matches!(status.role, NodeRole::Master | NodeRole::SubMaster))
            .map(|(node, _)| node)
            .collect();

        let limit = self.config.probe_limit(leaders.len());
        let host_configs: Vec<_> = stream::iter(leaders.into_iter().map(|node| async move {
            let result = self
                .probe
                .api()
                .get_host_config(&node.endpoint(), credentials)
                .await
                .map_err(|e| Error::from_node_api(node.identity(), &e));
            (node, result)
        }))
        .buffer_unordered(limit)
        .collect()
        .await;

        let mut undefined: Vec<NodeIdentity> = Vec::new();
        for (node, result) in host_configs {
            match result {
                Ok(host_config) => {
                    for follower in host_config.followers {
                        if !cluster.contains(&follower) && !undefined.contains(&follower) {
                            undefined.push(follower);
                        }
                    }
                }
                Err(e) if e.is_connectivity() => {
                    debug!("{} went away before its followers were read: {}", node, e);
                }
                Err(e) => {
                    warn!("Failed to read followers of {}: {}", node, e);
                    errors.push(e.to_string());
                }
            }
        }

        undefined.sort();
        undefined
            .into_iter()
            .map(|identity| Node::new(identity).with_tls(cluster.tls()))
            .collect()
    }
}
