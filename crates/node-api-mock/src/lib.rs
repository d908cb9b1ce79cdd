//! In-memory node fleet implementing the node API traits, for tests.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
pub mod stats;

pub use error::Error;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gridctl_node_api::{
    AddressType, Credentials, HostConfig, NodeEndpoint, NodeIdentity, NodeManagementApi,
    NodeStat, PartitionEntry, RemoteProcessStarter, StartTarget,
};
use parking_lot::Mutex;

/// The calls recorded by the mock.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Endpoint {
    /// `get_stat`
    Stat,
    /// `get_host_config`
    HostConfig,
    /// `get_partition_table`
    PartitionTable,
    /// `post_join`
    Join,
    /// `post_leave`
    Leave,
    /// `post_shutdown`
    Shutdown,
    /// `post_cluster_increase`
    ClusterIncrease,
    /// `post_cluster_stop`
    ClusterStop,
    /// `start_process`
    StartProcess,
}

impl Endpoint {
    /// Whether the call asks the node to change state.
    #[must_use]
    pub const fn is_mutation(self) -> bool {
        !matches!(self, Self::Stat | Self::HostConfig | Self::PartitionTable)
    }
}

#[derive(Clone, Debug)]
struct MockNode {
    stat: NodeStat,
    queued_stats: VecDeque<NodeStat>,
    host_config: HostConfig,
    partitions: Vec<PartitionEntry>,
    reachable: bool,
    failure: Option<String>,
}

#[derive(Debug, Default)]
struct Fleet {
    nodes: HashMap<NodeIdentity, MockNode>,
    calls: HashMap<(NodeIdentity, Endpoint), usize>,
    last_address_type: HashMap<NodeIdentity, AddressType>,
    stat_delay: Option<Duration>,
    stats_in_flight: usize,
    peak_stats_in_flight: usize,
}

impl Fleet {
    fn record(&mut self, identity: &NodeIdentity, endpoint: Endpoint) {
        *self.calls.entry((identity.clone(), endpoint)).or_default() += 1;
    }

    fn node_mut(&mut self, identity: &NodeIdentity) -> Result<&mut MockNode, Error> {
        match self.nodes.get_mut(identity) {
            Some(node) if node.reachable => match &node.failure {
                Some(message) => Err(Error::Injected(identity.clone(), message.clone())),
                None => Ok(node),
            },
            _ => Err(Error::Unreachable(identity.clone())),
        }
    }

    fn find_master(&self, cluster_name: &str, except: &NodeIdentity) -> Option<NodeIdentity> {
        self.nodes
            .iter()
            .find(|(identity, node)| {
                *identity != except
                    && node.reachable
                    && node.stat.cluster.cluster_name == cluster_name
                    && node.stat.cluster.cluster_status == "MASTER"
            })
            .map(|(identity, _)| identity.clone())
    }

    fn detach(&mut self, identity: &NodeIdentity) {
        for (other, node) in &mut self.nodes {
            if other == identity {
                continue;
            }

            let before = node.host_config.followers.len();
            node.host_config.followers.retain(|f| f != identity);
            if node.host_config.followers.len() != before {
                node.stat.cluster.active_count = node.stat.cluster.active_count.saturating_sub(1);
            }
        }

        if let Some(node) = self.nodes.get_mut(identity) {
            let cluster = &mut node.stat.cluster;
            cluster.node_status = "INACTIVE".to_string();
            cluster.cluster_status = "SUB_CLUSTER".to_string();
            cluster.cluster_name = String::new();
            cluster.designated_count = 0;
            cluster.active_count = 0;
            cluster.master = None;
            node.host_config.followers.clear();
        }
    }
}

/// Scriptable in-memory fleet of nodes.
///
/// Nodes that were never added behave like hosts with nothing listening.
/// Mutating calls apply a simplified version of their real effect so that
/// watchers converge.
#[derive(Clone, Debug, Default)]
pub struct MockNodeApi {
    fleet: Arc<Mutex<Fleet>>,
}

impl MockNodeApi {
    /// Creates an empty fleet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a reachable node reporting `stat`.
    pub fn add_node(&self, identity: &NodeIdentity, stat: NodeStat) {
        self.fleet.lock().nodes.insert(
            identity.clone(),
            MockNode {
                stat,
                queued_stats: VecDeque::new(),
                host_config: HostConfig::default(),
                partitions: Vec::new(),
                reachable: true,
                failure: None,
            },
        );
    }

    /// Adds a node whose process is down.
    pub fn add_stopped_node(&self, identity: &NodeIdentity) {
        self.add_node(identity, stats::started());
        self.set_reachable(identity, false);
    }

    /// Replaces the status a node reports.
    ///
    /// # Panics
    ///
    /// Panics if the node was never added.
    pub fn set_stat(&self, identity: &NodeIdentity, stat: NodeStat) {
        self.with_node(identity, |node| node.stat = stat);
    }

    /// Queues replies for the next status calls against a node.
    ///
    /// Once the queue is drained the node reports its current status again.
    ///
    /// # Panics
    ///
    /// Panics if the node was never added.
    pub fn queue_stats(&self, identity: &NodeIdentity, stats: Vec<NodeStat>) {
        self.with_node(identity, |node| node.queued_stats.extend(stats));
    }

    /// Delays every status call by `delay`.
    pub fn set_stat_delay(&self, delay: Duration) {
        self.fleet.lock().stat_delay = Some(delay);
    }

    /// Highest number of status calls in flight at once.
    #[must_use]
    pub fn peak_stats_in_flight(&self) -> usize {
        self.fleet.lock().peak_stats_in_flight
    }

    /// Replaces the follower list a node reports.
    ///
    /// # Panics
    ///
    /// Panics if the node was never added.
    pub fn set_followers(&self, identity: &NodeIdentity, followers: Vec<NodeIdentity>) {
        self.with_node(identity, |node| node.host_config = HostConfig { followers });
    }

    /// Replaces the partition table a node reports.
    ///
    /// # Panics
    ///
    /// Panics if the node was never added.
    pub fn set_partitions(&self, identity: &NodeIdentity, partitions: Vec<PartitionEntry>) {
        self.with_node(identity, |node| node.partitions = partitions);
    }

    /// Marks a node reachable or unreachable.
    ///
    /// # Panics
    ///
    /// Panics if the node was never added.
    pub fn set_reachable(&self, identity: &NodeIdentity, reachable: bool) {
        self.with_node(identity, |node| node.reachable = reachable);
    }

    /// Makes every call against a node fail with a protocol error.
    ///
    /// # Panics
    ///
    /// Panics if the node was never added.
    pub fn fail_with(&self, identity: &NodeIdentity, message: &str) {
        let message = message.to_string();
        self.with_node(identity, |node| node.failure = Some(message));
    }

    /// Current status of a node, if it exists.
    #[must_use]
    pub fn stat(&self, identity: &NodeIdentity) -> Option<NodeStat> {
        self.fleet
            .lock()
            .nodes
            .get(identity)
            .map(|node| node.stat.clone())
    }

    /// Whether a node currently answers.
    #[must_use]
    pub fn is_reachable(&self, identity: &NodeIdentity) -> bool {
        self.fleet
            .lock()
            .nodes
            .get(identity)
            .is_some_and(|node| node.reachable)
    }

    /// Number of calls of one kind made against one node.
    #[must_use]
    pub fn calls(&self, identity: &NodeIdentity, endpoint: Endpoint) -> usize {
        self.fleet
            .lock()
            .calls
            .get(&(identity.clone(), endpoint))
            .copied()
            .unwrap_or_default()
    }

    /// Number of calls of one kind across the fleet.
    #[must_use]
    pub fn total_calls(&self, endpoint: Endpoint) -> usize {
        self.fleet
            .lock()
            .calls
            .iter()
            .filter(|((_, e), _)| *e == endpoint)
            .map(|(_, count)| count)
            .sum()
    }

    /// Number of calls of any kind across the fleet.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.fleet.lock().calls.values().sum()
    }

    /// Number of state-changing calls across the fleet.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.fleet
            .lock()
            .calls
            .iter()
            .filter(|((_, endpoint), _)| endpoint.is_mutation())
            .map(|(_, count)| count)
            .sum()
    }

    /// Address type requested by the most recent status call against a node.
    #[must_use]
    pub fn last_address_type(&self, identity: &NodeIdentity) -> Option<AddressType> {
        self.fleet.lock().last_address_type.get(identity).copied()
    }

    fn with_node(&self, identity: &NodeIdentity, f: impl FnOnce(&mut MockNode)) {
        let mut fleet = self.fleet.lock();
        let node = fleet
            .nodes
            .get_mut(identity)
            .unwrap_or_else(|| panic!("node {identity} was never added"));
        f(node);
    }
}

#[async_trait]
impl NodeManagementApi for MockNodeApi {
    type Error = Error;

    async fn get_stat(
        &self,
        endpoint: &NodeEndpoint,
        _credentials: &Credentials,
        address_type: AddressType,
    ) -> Result<NodeStat, Self::Error> {
        let delay = {
            let mut fleet = self.fleet.lock();
            fleet.stats_in_flight += 1;
            fleet.peak_stats_in_flight = fleet.peak_stats_in_flight.max(fleet.stats_in_flight);
            fleet.stat_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut fleet = self.fleet.lock();
        fleet.stats_in_flight -= 1;
        fleet.record(&endpoint.identity, Endpoint::Stat);
        fleet
            .last_address_type
            .insert(endpoint.identity.clone(), address_type);

        fleet
            .node_mut(&endpoint.identity)
            .map(|node| node.queued_stats.pop_front().unwrap_or_else(|| node.stat.clone()))
    }

    async fn get_host_config(
        &self,
        endpoint: &NodeEndpoint,
        _credentials: &Credentials,
    ) -> Result<HostConfig, Self::Error> {
        let mut fleet = self.fleet.lock();
        fleet.record(&endpoint.identity, Endpoint::HostConfig);

        fleet
            .node_mut(&endpoint.identity)
            .map(|node| node.host_config.clone())
    }

    async fn get_partition_table(
        &self,
        endpoint: &NodeEndpoint,
        _credentials: &Credentials,
    ) -> Result<Vec<PartitionEntry>, Self::Error> {
        let mut fleet = self.fleet.lock();
        fleet.record(&endpoint.identity, Endpoint::PartitionTable);

        fleet
            .node_mut(&endpoint.identity)
            .map(|node| node.partitions.clone())
    }

    async fn post_join(
        &self,
        endpoint: &NodeEndpoint,
        _credentials: &Credentials,
        cluster_name: &str,
        min_node_count: u32,
    ) -> Result<(), Self::Error> {
        let identity = &endpoint.identity;
        let mut fleet = self.fleet.lock();
        fleet.record(identity, Endpoint::Join);
        fleet.node_mut(identity)?;

        let master = fleet.find_master(cluster_name, identity);
        let designated_count = match &master {
            Some(master) if min_node_count == 0 => fleet.nodes[master].stat.cluster.designated_count,
            _ => min_node_count,
        };

        if let Some(master_node) = master.as_ref().and_then(|m| fleet.nodes.get_mut(m)) {
            master_node.host_config.followers.push(identity.clone());
            master_node.stat.cluster.active_count += 1;
        }

        let node = fleet.node_mut(identity)?;
        let cluster = &mut node.stat.cluster;
        cluster.node_status = "ACTIVE".to_string();
        cluster.cluster_name = cluster_name.to_string();
        cluster.designated_count = designated_count;
        cluster.initial_cluster = Some(gridctl_node_api::InitialCluster {
            cluster_name: Some(cluster_name.to_string()),
            designated_count: Some(designated_count),
        });

        if master.is_some() {
            cluster.cluster_status = "FOLLOWER".to_string();
            cluster.active_count = 0;
            cluster.master = master;
        } else {
            cluster.cluster_status = "MASTER".to_string();
            cluster.active_count = 1;
            cluster.master = None;
        }

        Ok(())
    }

    async fn post_leave(
        &self,
        endpoint: &NodeEndpoint,
        _credentials: &Credentials,
    ) -> Result<(), Self::Error> {
        let mut fleet = self.fleet.lock();
        fleet.record(&endpoint.identity, Endpoint::Leave);
        fleet.node_mut(&endpoint.identity)?;
        fleet.detach(&endpoint.identity);

        Ok(())
    }

    async fn post_shutdown(
        &self,
        endpoint: &NodeEndpoint,
        _credentials: &Credentials,
        _force: bool,
    ) -> Result<(), Self::Error> {
        let mut fleet = self.fleet.lock();
        fleet.record(&endpoint.identity, Endpoint::Shutdown);
        fleet.node_mut(&endpoint.identity)?;
        fleet.detach(&endpoint.identity);
        fleet.node_mut(&endpoint.identity)?.reachable = false;

        Ok(())
    }

    async fn post_cluster_increase(
        &self,
        endpoint: &NodeEndpoint,
        _credentials: &Credentials,
    ) -> Result<(), Self::Error> {
        let mut fleet = self.fleet.lock();
        fleet.record(&endpoint.identity, Endpoint::ClusterIncrease);
        let cluster_name = fleet.node_mut(&endpoint.identity)?.stat.cluster.cluster_name.clone();

        for node in fleet.nodes.values_mut() {
            if node.stat.cluster.cluster_name == cluster_name {
                node.stat.cluster.designated_count += 1;
            }
        }

        Ok(())
    }

    async fn post_cluster_stop(
        &self,
        endpoint: &NodeEndpoint,
        _credentials: &Credentials,
    ) -> Result<(), Self::Error> {
        let mut fleet = self.fleet.lock();
        fleet.record(&endpoint.identity, Endpoint::ClusterStop);
        let cluster_name = fleet.node_mut(&endpoint.identity)?.stat.cluster.cluster_name.clone();

        let members: Vec<NodeIdentity> = fleet
            .nodes
            .iter()
            .filter(|(_, node)| node.stat.cluster.cluster_name == cluster_name)
            .map(|(identity, _)| identity.clone())
            .collect();

        for member in &members {
            fleet.detach(member);
        }

        Ok(())
    }
}

#[async_trait]
impl RemoteProcessStarter for MockNodeApi {
    type Error = Error;

    async fn start_process(
        &self,
        target: &StartTarget,
        _wait: Option<Duration>,
    ) -> Result<(), Self::Error> {
        let mut fleet = self.fleet.lock();
        fleet.record(&target.identity, Endpoint::StartProcess);

        let node = fleet
            .nodes
            .get_mut(&target.identity)
            .ok_or_else(|| Error::Unreachable(target.identity.clone()))?;

        if let Some(message) = &node.failure {
            return Err(Error::Injected(target.identity.clone(), message.clone()));
        }

        node.reachable = true;
        node.stat = stats::started();

        Ok(())
    }
}
