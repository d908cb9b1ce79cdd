use std::sync::Arc;

use gridctl_node_api::{AddressType, Credentials, NodeManagementApi, RemoteProcessStarter};
use tracing::{debug, info, warn};

use super::node::NodeLifecycle;
use crate::config::ControllerConfig;
use crate::error::{Error, Result};
use crate::model::{Cluster, Node};
use crate::status::{ClusterState, CombinedStatus, NodeRole};
use crate::watcher::{BoxWatcher, NoopWatcher};

/// Whole-cluster operations built on the node lifecycle.
pub struct ClusterLifecycle<A, S> {
    nodes: NodeLifecycle<A, S>,
}

impl<A, S> ClusterLifecycle<A, S>
where
    A: NodeManagementApi,
    S: RemoteProcessStarter,
{
    /// Creates a cluster lifecycle over a management API and a process starter.
    pub fn new(api: Arc<A>, starter: Arc<S>, config: ControllerConfig) -> Self {
        Self {
            nodes: NodeLifecycle::new(api, starter, config),
        }
    }

    /// The per-node operations.
    pub const fn nodes(&self) -> &NodeLifecycle<A, S> {
        &self.nodes
    }

    /// Joins enough started nodes to bring the cluster into service.
    ///
    /// Every declared node must be joined for a cluster that is stopped or
    /// still forming; a majority is enough to re-form.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty topology, `ConfigMismatch` if
    /// the live cluster disagrees with the declaration and
    /// `InsufficientNodes` if too few nodes can join.
    pub async fn start_cluster(
        &self,
        cluster: &Cluster,
        credentials: &Credentials,
    ) -> Result<Vec<BoxWatcher>> {
        if cluster.nodes().is_empty() {
            return Err(Error::InvalidArgument(format!(
                "'{}' declares no nodes",
                cluster.name()
            )));
        }

        if !self.nodes.aggregator().aggregate(cluster, credentials).await? {
            return Err(Error::ConfigMismatch(
                cluster.name().to_string(),
                "refusing to start".to_string(),
            ));
        }

        let status = cluster
            .status()
            .ok_or_else(|| Error::StatusUnavailable(cluster.name().to_string()))?;

        if status.state == ClusterState::ServiceStable {
            debug!("'{}' is already serving", cluster.name());
            return Ok(vec![Box::new(NoopWatcher)]);
        }

        let mut joined = 0;
        let mut targets = Vec::new();
        for node in cluster.nodes() {
            match node.status().map(|s| s.combined_status) {
                Some(CombinedStatus::Wait | CombinedStatus::Servicing) => joined += 1,
                Some(CombinedStatus::Started) => targets.push(node),
                other => debug!("Ignoring {} ({:?})", node, other),
            }
        }

        let declared = cluster.declared_topology_size();
        let required = match status.state {
            ClusterState::Stop | ClusterState::InitWait => declared,
            _ => declared / 2 + 1,
        };

        if joined + targets.len() < required {
            return Err(Error::InsufficientNodes {
                required,
                available: joined + targets.len(),
            });
        }

        let designated_count = u32::try_from(declared)
            .map_err(|_| Error::InvalidArgument("too many declared nodes".to_string()))?;

        info!(
            "Starting '{}': joining {} nodes ({} already joined, {} required)",
            cluster.name(),
            targets.len(),
            joined,
            required
        );

        let mut pending = Vec::with_capacity(targets.len());
        for node in targets {
            if self.nodes.check_join(node, credentials).await? {
                pending.push(node);
            }
        }

        let mut watchers = Vec::with_capacity(pending.len());
        for node in pending {
            watchers.push(
                self.nodes
                    .issue_join(node, cluster.name(), designated_count, credentials, true)
                    .await?,
            );
        }

        Ok(watchers)
    }

    /// Stops the cluster led by `master`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless the master serves.
    pub async fn stop_cluster(&self, master: &Node, credentials: &Credentials) -> Result<BoxWatcher> {
        let status = self.nodes.probe().probe_or_stopped(master, credentials).await?;

        if status.combined_status != CombinedStatus::Servicing {
            return Err(Error::invalid_state(
                master.identity(),
                status.combined_status,
                "stop the cluster through",
            ));
        }

        info!("Stopping cluster '{}' through {}", status.cluster_name, master);
        self.nodes
            .probe()
            .api()
            .post_cluster_stop(&master.endpoint(), credentials)
            .await
            .map_err(|e| Error::from_node_api(master.identity(), &e))?;

        Ok(self
            .nodes
            .watch(master, credentials, &[CombinedStatus::Started]))
    }

    /// Stops a declared cluster, best effort.
    ///
    /// Goes through the master when one answers, otherwise asks every joined
    /// declared node to leave once all of them passed the partition check.
    ///
    /// # Errors
    ///
    /// Propagates aggregation failures and the errors of the delegated
    /// operations.
    pub async fn stop_cluster_declared(
        &self,
        cluster: &Cluster,
        credentials: &Credentials,
    ) -> Result<Vec<BoxWatcher>> {
        if !self.nodes.aggregator().aggregate(cluster, credentials).await? {
            warn!("'{}' does not match its declaration, stopping anyway", cluster.name());
        }

        let master = cluster.status().and_then(|status| status.master_node.clone());
        if let Some(master) = master {
            return Ok(vec![self.stop_cluster(&master, credentials).await?]);
        }

        debug!("'{}' has no master, asking members to leave", cluster.name());

        let mut pending = Vec::new();
        for node in cluster.nodes() {
            if node.status().is_some_and(|s| s.combined_status.is_joined())
                && self.nodes.check_leave(node, credentials, false).await?
            {
                pending.push(node);
            }
        }

        let mut watchers = Vec::with_capacity(pending.len());
        for node in pending {
            watchers.push(self.nodes.issue_leave(node, credentials).await?);
        }

        Ok(watchers)
    }

    /// Locates the master of a declared cluster.
    ///
    /// Follows the master pointer of members that are not master themselves.
    /// Returns `None` when no master confirms, e.g. when the cluster is down.
    ///
    /// # Errors
    ///
    /// Returns `ForeignCluster` if a member reports a different cluster name.
    pub async fn find_master(
        &self,
        cluster: &Cluster,
        credentials: &Credentials,
    ) -> Result<Option<Node>> {
        let probe = self.nodes.probe();

        for node in cluster.nodes() {
            let status = match probe.probe_with(node, credentials, AddressType::System).await {
                Ok(status) => status,
                Err(e) if e.is_connectivity() => continue,
                Err(e) => return Err(e),
            };

            if status.cluster_name.is_empty() {
                continue;
            }

            if status.cluster_name != cluster.name() {
                return Err(Error::ForeignCluster {
                    node: node.identity().clone(),
                    expected: cluster.name().to_string(),
                    actual: status.cluster_name.clone(),
                });
            }

            if status.role == NodeRole::Master {
                return Ok(Some(node.clone()));
            }

            let Some(pointer) = &status.master else {
                continue;
            };

            let candidate = cluster
                .node(pointer)
                .cloned()
                .unwrap_or_else(|| Node::new(pointer.clone()).with_tls(cluster.tls()));

            match probe.probe_with(&candidate, credentials, AddressType::System).await {
                Ok(master) if master.role == NodeRole::Master => return Ok(Some(candidate)),
                Ok(_) => debug!("{} points at {} which is not master", node, candidate),
                Err(e) if e.is_connectivity() => {
                    debug!("{} points at unreachable {}", node, candidate);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(None)
    }
}
