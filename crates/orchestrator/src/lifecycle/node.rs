use std::sync::Arc;
use std::time::Duration;

use gridctl_node_api::{Credentials, NodeManagementApi, PartitionEntry, RemoteProcessStarter};
use tracing::{debug, info};

use crate::aggregator::StatusAggregator;
use crate::config::ControllerConfig;
use crate::error::{Error, Result};
use crate::model::{Cluster, Node};
use crate::probe::NodeProbe;
use crate::status::{ClusterState, CombinedStatus};
use crate::watcher::{BoxWatcher, NoopWatcher, StatusWatcher};

/// Guarded transitions of a single node.
///
/// Every operation probes the node first and rejects states it cannot start
/// from before issuing any request that changes the node.
pub struct NodeLifecycle<A, S> {
    probe: NodeProbe<A>,
    aggregator: StatusAggregator<A>,
    starter: Arc<S>,
    config: ControllerConfig,
}

impl<A, S> NodeLifecycle<A, S>
where
    A: NodeManagementApi,
    S: RemoteProcessStarter,
{
    /// Creates a node lifecycle over a management API and a process starter.
    pub fn new(api: Arc<A>, starter: Arc<S>, config: ControllerConfig) -> Self {
        let probe = NodeProbe::new(api);
        let aggregator = StatusAggregator::new(probe.clone(), config.clone());

        Self {
            probe,
            aggregator,
            starter,
            config,
        }
    }

    /// The probe used by every operation.
    pub const fn probe(&self) -> &NodeProbe<A> {
        &self.probe
    }

    /// The aggregator used by the declared-topology operations.
    pub const fn aggregator(&self) -> &StatusAggregator<A> {
        &self.aggregator
    }

    /// Watcher completing once `node` reaches any of `accepted`.
    pub(crate) fn watch(
        &self,
        node: &Node,
        credentials: &Credentials,
        accepted: &[CombinedStatus],
    ) -> BoxWatcher {
        Box::new(
            StatusWatcher::new(self.probe.clone(), node.clone(), credentials.clone(), accepted)
                .with_poll_interval(self.config.poll_interval),
        )
    }

    /// Starts the node process.
    ///
    /// With `wait`, the starter blocks until the management port answers or
    /// the duration elapses.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless the node is stopped, starting or already up.
    pub async fn start(
        &self,
        node: &Node,
        credentials: &Credentials,
        wait: Option<Duration>,
    ) -> Result<BoxWatcher> {
        let status = self.probe.probe_or_stopped(node, credentials).await?;

        match status.combined_status {
            CombinedStatus::Stopped => {
                info!("Starting {}", node);
                self.starter
                    .start_process(&node.start_target(), wait)
                    .await
                    .map_err(|e| Error::from_starter(node.identity(), &e))?;

                Ok(self.watch(node, credentials, &[CombinedStatus::Started]))
            }
            CombinedStatus::Starting => {
                debug!("{} is already starting", node);
                Ok(self.watch(node, credentials, &[CombinedStatus::Started]))
            }
            CombinedStatus::Started | CombinedStatus::Wait | CombinedStatus::Servicing => {
                Ok(Box::new(NoopWatcher))
            }
            other => Err(Error::invalid_state(node.identity(), other, "start")),
        }
    }

    /// Shuts the node process down.
    ///
    /// A joined or failed node is only stopped with `force`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` for a starting node, and for a joined or failed
    /// node without `force`.
    pub async fn stop(
        &self,
        node: &Node,
        credentials: &Credentials,
        force: bool,
    ) -> Result<BoxWatcher> {
        let status = self.probe.probe_or_stopped(node, credentials).await?;

        match status.combined_status {
            CombinedStatus::Stopped => return Ok(Box::new(NoopWatcher)),
            CombinedStatus::Stopping if !force => {
                return Ok(self.watch(node, credentials, &[CombinedStatus::Stopped]));
            }
            CombinedStatus::Starting => {
                return Err(Error::invalid_state(node.identity(), CombinedStatus::Starting, "stop"));
            }
            CombinedStatus::Started | CombinedStatus::Stopping => {}
            other if force => debug!("Forcing stop of {} while {}", node, other),
            other => return Err(Error::invalid_state(node.identity(), other, "stop")),
        }

        info!("Shutting down {} (force: {})", node, force);
        self.probe
            .api()
            .post_shutdown(&node.endpoint(), credentials, force)
            .await
            .map_err(|e| Error::from_node_api(node.identity(), &e))?;

        Ok(self.watch(node, credentials, &[CombinedStatus::Stopped]))
    }

    /// Joins the node to `cluster_name` of `designated_count` members.
    ///
    /// The watcher accepts WAIT as well as SERVICING unless
    /// `wait_for_servicing` is set.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless the node is started or already joined.
    pub async fn join(
        &self,
        node: &Node,
        cluster_name: &str,
        designated_count: u32,
        credentials: &Credentials,
        wait_for_servicing: bool,
    ) -> Result<BoxWatcher> {
        if !self.check_join(node, credentials).await? {
            return Ok(Box::new(NoopWatcher));
        }

        self.issue_join(
            node,
            cluster_name,
            designated_count,
            credentials,
            wait_for_servicing,
        )
        .await
    }

    /// Whether `node` still needs a join request.
    ///
    /// Started nodes need one; joined nodes do not.
    pub(crate) async fn check_join(&self, node: &Node, credentials: &Credentials) -> Result<bool> {
        let status = self.probe.probe_or_stopped(node, credentials).await?;

        match status.combined_status {
            CombinedStatus::Started => Ok(true),
            CombinedStatus::Wait | CombinedStatus::Servicing => Ok(false),
            other => Err(Error::invalid_state(node.identity(), other, "join")),
        }
    }

    /// Sends the join request to a node that passed [`check_join`](Self::check_join).
    pub(crate) async fn issue_join(
        &self,
        node: &Node,
        cluster_name: &str,
        designated_count: u32,
        credentials: &Credentials,
        wait_for_servicing: bool,
    ) -> Result<BoxWatcher> {
        info!(
            "Joining {} to '{}' of {} nodes",
            node, cluster_name, designated_count
        );
        self.probe
            .api()
            .post_join(&node.endpoint(), credentials, cluster_name, designated_count)
            .await
            .map_err(|e| Error::from_node_api(node.identity(), &e))?;

        let accepted: &[CombinedStatus] = if wait_for_servicing {
            &[CombinedStatus::Servicing]
        } else {
            &[CombinedStatus::Servicing, CombinedStatus::Wait]
        };

        Ok(self.watch(node, credentials, accepted))
    }

    /// Joins a declared node to its cluster.
    ///
    /// Waits for SERVICING when this join would complete the initial set,
    /// cross a majority or help an unstable cluster.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the node is not declared and
    /// `ConfigMismatch` if the live cluster disagrees with the declaration.
    pub async fn join_declared(
        &self,
        cluster: &Cluster,
        node: &Node,
        credentials: &Credentials,
    ) -> Result<BoxWatcher> {
        if !cluster.contains(node.identity()) {
            return Err(Error::InvalidState(format!(
                "{} is not declared in '{}'",
                node,
                cluster.name()
            )));
        }

        if !self.aggregator.aggregate(cluster, credentials).await? {
            return Err(Error::ConfigMismatch(
                cluster.name().to_string(),
                "refusing to join".to_string(),
            ));
        }

        let status = cluster
            .status()
            .ok_or_else(|| Error::StatusUnavailable(cluster.name().to_string()))?;

        let designated_count = cluster.declared_topology_size();
        let joined = status.joined_count();
        let wait_for_servicing = match status.state {
            ClusterState::ServiceUnstable => true,
            ClusterState::InitWait => designated_count - 1 == joined,
            ClusterState::Wait => designated_count / 2 <= joined,
            _ => false,
        };

        self.join(
            node,
            cluster.name(),
            u32::try_from(designated_count)
                .map_err(|_| Error::InvalidArgument("too many declared nodes".to_string()))?,
            credentials,
            wait_for_servicing,
        )
        .await
    }

    /// Takes the node out of its cluster.
    ///
    /// Without `force`, refuses when the node holds the only copy of a
    /// partition.
    ///
    /// # Errors
    ///
    /// Returns `UnsafeLeave` when data would become unavailable and
    /// `InvalidState` for a failed or unknown node.
    pub async fn leave(
        &self,
        node: &Node,
        credentials: &Credentials,
        force: bool,
    ) -> Result<BoxWatcher> {
        if !self.check_leave(node, credentials, force).await? {
            return Ok(Box::new(NoopWatcher));
        }

        self.issue_leave(node, credentials).await
    }

    /// Whether `node` still needs a leave request.
    ///
    /// Joined nodes need one, after the partition check unless `force` is set.
    pub(crate) async fn check_leave(
        &self,
        node: &Node,
        credentials: &Credentials,
        force: bool,
    ) -> Result<bool> {
        let status = self.probe.probe_or_stopped(node, credentials).await?;

        match status.combined_status {
            CombinedStatus::Wait | CombinedStatus::Servicing => {}
            CombinedStatus::Started
            | CombinedStatus::Stopped
            | CombinedStatus::Starting
            | CombinedStatus::Stopping => return Ok(false),
            other => return Err(Error::invalid_state(node.identity(), other, "leave")),
        }

        if !force {
            let partitions = self
                .probe
                .api()
                .get_partition_table(&node.endpoint(), credentials)
                .await
                .map_err(|e| Error::from_node_api(node.identity(), &e))?;

            check_leave_is_safe(node, &partitions)?;
        }

        Ok(true)
    }

    /// Sends the leave request to a node that passed [`check_leave`](Self::check_leave).
    pub(crate) async fn issue_leave(&self, node: &Node, credentials: &Credentials) -> Result<BoxWatcher> {
        info!("Removing {} from its cluster", node);
        self.probe
            .api()
            .post_leave(&node.endpoint(), credentials)
            .await
            .map_err(|e| Error::from_node_api(node.identity(), &e))?;

        Ok(self.watch(node, credentials, &[CombinedStatus::Started]))
    }

    /// Adds a started node to the serving cluster led by `master`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless the master serves and the node is
    /// started, `UnstableCluster` if the master does not see every designated
    /// member and `NotExpandable` for a single-node cluster.
    pub async fn append(
        &self,
        master: &Node,
        node: &Node,
        credentials: &Credentials,
    ) -> Result<BoxWatcher> {
        let master_status = self.probe.probe_or_stopped(master, credentials).await?;

        if master_status.combined_status != CombinedStatus::Servicing {
            return Err(Error::invalid_state(
                master.identity(),
                master_status.combined_status,
                "append through",
            ));
        }

        if master_status.active_count != master_status.designated_count {
            return Err(Error::UnstableCluster {
                active: master_status.active_count,
                designated: master_status.designated_count,
            });
        }

        if master_status.designated_count == 1 {
            return Err(Error::NotExpandable(master.identity().clone()));
        }

        let status = self.probe.probe_or_stopped(node, credentials).await?;
        if status.combined_status != CombinedStatus::Started {
            return Err(Error::invalid_state(
                node.identity(),
                status.combined_status,
                "append",
            ));
        }

        info!(
            "Appending {} to '{}' through {}",
            node, master_status.cluster_name, master
        );
        self.probe
            .api()
            .post_join(&node.endpoint(), credentials, &master_status.cluster_name, 0)
            .await
            .map_err(|e| Error::from_node_api(node.identity(), &e))?;

        self.probe
            .api()
            .post_cluster_increase(&master.endpoint(), credentials)
            .await
            .map_err(|e| Error::from_node_api(master.identity(), &e))?;

        Ok(self.watch(node, credentials, &[CombinedStatus::Servicing]))
    }

    /// Adds a node that is not declared to a stable declared cluster.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the node is already declared or no master
    /// answers, and `ConfigMismatch` unless the cluster matches its
    /// declaration and is stable.
    pub async fn append_declared(
        &self,
        cluster: &Cluster,
        node: &Node,
        credentials: &Credentials,
    ) -> Result<BoxWatcher> {
        if cluster.contains(node.identity()) {
            return Err(Error::InvalidState(format!(
                "{} is already declared in '{}'",
                node,
                cluster.name()
            )));
        }

        let matches = self.aggregator.aggregate(cluster, credentials).await?;
        let status = cluster
            .status()
            .ok_or_else(|| Error::StatusUnavailable(cluster.name().to_string()))?;

        if !matches || status.state != ClusterState::ServiceStable {
            return Err(Error::ConfigMismatch(
                cluster.name().to_string(),
                format!("cluster is {} (matches: {})", status.state, matches),
            ));
        }

        let master = status.master_node.as_ref().ok_or_else(|| {
            Error::InvalidState(format!("'{}' has no reachable master", cluster.name()))
        })?;

        self.append(master, node, credentials).await
    }
}

/// Fails if leaving would drop the last copy of any partition.
fn check_leave_is_safe(node: &Node, partitions: &[PartitionEntry]) -> Result<()> {
    for entry in partitions {
        let owns = entry.owner.as_ref() == Some(node.identity());

        if owns && entry.backups.is_empty() {
            return Err(Error::UnsafeLeave {
                node: node.identity().clone(),
                partition_id: entry.partition_id,
                reason: "has no backup",
            });
        }

        if entry.owner.is_none() && entry.backups.contains(node.identity()) {
            return Err(Error::UnsafeLeave {
                node: node.identity().clone(),
                partition_id: entry.partition_id,
                reason: "has no owner",
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use gridctl_node_api::NodeIdentity;

    use super::*;

    fn entry(owner: Option<u16>, backups: &[u16]) -> PartitionEntry {
        PartitionEntry {
            partition_id: 7,
            owner: owner.map(|port| NodeIdentity::new("10.0.0.1", port)),
            backups: backups
                .iter()
                .map(|port| NodeIdentity::new("10.0.0.1", *port))
                .collect(),
        }
    }

    #[test]
    fn test_sole_owner_cannot_leave() {
        let node = Node::new(NodeIdentity::new("10.0.0.1", 1));

        assert_matches!(
            check_leave_is_safe(&node, &[entry(Some(2), &[1]), entry(Some(1), &[])]),
            Err(Error::UnsafeLeave { partition_id: 7, reason: "has no backup", .. })
        );
    }

    #[test]
    fn test_backup_of_orphaned_partition_cannot_leave() {
        let node = Node::new(NodeIdentity::new("10.0.0.1", 1));

        assert_matches!(
            check_leave_is_safe(&node, &[entry(None, &[1])]),
            Err(Error::UnsafeLeave { reason: "has no owner", .. })
        );
    }

    #[test]
    fn test_replicated_partitions_allow_leave() {
        let node = Node::new(NodeIdentity::new("10.0.0.1", 1));

        check_leave_is_safe(&node, &[entry(Some(1), &[2]), entry(Some(2), &[1]), entry(None, &[3])])
            .unwrap();
    }
}
