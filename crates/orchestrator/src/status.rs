//! Node and cluster status values and their derivation from raw replies.

use std::fmt;

use gridctl_node_api::{NodeIdentity, NodeStat};
use serde::Serialize;

/// Coarse lifecycle state of one node.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CombinedStatus {
    /// Process not running (or not answering).
    Stopped,
    /// Process up and still recovering its on-disk state.
    Starting,
    /// Process up and idle, not in any cluster.
    Started,
    /// Joined a cluster that is not yet serving.
    Wait,
    /// Member of a serving cluster.
    Servicing,
    /// Process failed.
    Abnormal,
    /// Process shutting down.
    Stopping,
    /// Anything else.
    Unknown,
}

impl CombinedStatus {
    /// Whether the node is a member of a cluster, formed or not.
    #[must_use]
    pub const fn is_joined(self) -> bool {
        matches!(self, Self::Wait | Self::Servicing)
    }
}

impl fmt::Display for CombinedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "STOPPED",
            Self::Starting => "STARTING",
            Self::Started => "STARTED",
            Self::Wait => "WAIT",
            Self::Servicing => "SERVICING",
            Self::Abnormal => "ABNORMAL",
            Self::Stopping => "STOPPING",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

/// Position of a node within its cluster.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeRole {
    /// Not part of any cluster.
    #[default]
    None,
    /// Leader of a formed cluster.
    Master,
    /// Provisional leader of a cluster still forming.
    SubMaster,
    /// Member of a formed cluster.
    Follower,
    /// Member of a cluster still forming.
    SubFollower,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "NONE",
            Self::Master => "MASTER",
            Self::SubMaster => "SUB_MASTER",
            Self::Follower => "FOLLOWER",
            Self::SubFollower => "SUB_FOLLOWER",
        };
        write!(f, "{s}")
    }
}

/// Classified status of one node, as of its latest probe.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    /// Lifecycle state.
    pub combined_status: CombinedStatus,

    /// Cluster role.
    pub role: NodeRole,

    /// Members the node sees active; meaningful for masters only.
    pub active_count: u32,

    /// Topology size the node believes it belongs to.
    pub designated_count: u32,

    /// Cluster the node believes it joined; empty when none.
    pub cluster_name: String,

    /// False until the node first became master or follower after boot.
    pub ever_joined_cluster: bool,

    /// Where the node believes the master is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master: Option<NodeIdentity>,
}

impl NodeStatus {
    /// Status of a node that cannot be reached.
    #[must_use]
    pub const fn stopped() -> Self {
        Self {
            combined_status: CombinedStatus::Stopped,
            role: NodeRole::None,
            active_count: 0,
            designated_count: 0,
            cluster_name: String::new(),
            ever_joined_cluster: false,
            master: None,
        }
    }
}

/// Derives a node status from a raw status reply.
#[must_use]
pub fn classify(raw: &NodeStat) -> NodeStatus {
    let cluster = &raw.cluster;

    let combined_status = match cluster.node_status.as_str() {
        "INACTIVE" | "DEACTIVATING" => {
            #[allow(clippy::float_cmp)]
            if raw.recovery_progress_rate() == 1.0 {
                CombinedStatus::Started
            } else {
                CombinedStatus::Starting
            }
        }
        "ACTIVE" | "ACTIVATING" => match cluster.cluster_status.as_str() {
            "MASTER" | "FOLLOWER" => CombinedStatus::Servicing,
            _ => CombinedStatus::Wait,
        },
        "ABNORMAL" => CombinedStatus::Abnormal,
        "NORMAL_SHUTDOWN" => CombinedStatus::Stopping,
        _ => CombinedStatus::Unknown,
    };

    let ever_joined_cluster = cluster.initial_cluster.is_some();

    let role = match cluster.cluster_status.as_str() {
        "MASTER" => NodeRole::Master,
        "FOLLOWER" => NodeRole::Follower,
        "SUB_FOLLOWER" => NodeRole::SubFollower,
        "SUB_CLUSTER" if combined_status == CombinedStatus::Wait && !ever_joined_cluster => {
            NodeRole::SubMaster
        }
        _ => NodeRole::None,
    };

    NodeStatus {
        combined_status,
        role,
        active_count: cluster.active_count,
        designated_count: cluster.designated_count,
        cluster_name: cluster.cluster_name.clone(),
        ever_joined_cluster,
        master: cluster.master.clone(),
    }
}

/// Overall state of a cluster.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterState {
    /// No member is joined.
    Stop,
    /// Members are joined and waiting for the initial formation.
    InitWait,
    /// Members are joined and waiting for a re-formation.
    Wait,
    /// A majority serves but not every declared node.
    ServiceUnstable,
    /// Every declared node serves.
    ServiceStable,
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stop => "STOP",
            Self::InitWait => "INIT_WAIT",
            Self::Wait => "WAIT",
            Self::ServiceUnstable => "SERVICE_UNSTABLE",
            Self::ServiceStable => "SERVICE_STABLE",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use gridctl_node_api::{InitialCluster, StatCluster, StatRecovery};

    use super::*;

    fn raw(node_status: &str, cluster_status: &str) -> NodeStat {
        NodeStat {
            cluster: StatCluster {
                node_status: node_status.to_string(),
                cluster_status: cluster_status.to_string(),
                ..StatCluster::default()
            },
            recovery: None,
        }
    }

    fn with_initial(mut stat: NodeStat) -> NodeStat {
        stat.cluster.initial_cluster = Some(InitialCluster::default());
        stat
    }

    #[test]
    fn test_active_master_is_servicing_master() {
        for node_status in ["ACTIVE", "ACTIVATING"] {
            let status = classify(&with_initial(raw(node_status, "MASTER")));

            assert_eq!(status.combined_status, CombinedStatus::Servicing);
            assert_eq!(status.role, NodeRole::Master);
            assert!(status.ever_joined_cluster);
        }
    }

    #[test]
    fn test_partial_recovery_is_starting() {
        let mut stat = raw("INACTIVE", "SUB_CLUSTER");
        stat.recovery = Some(StatRecovery {
            progress_rate: Some(0.5),
        });

        assert_eq!(classify(&stat).combined_status, CombinedStatus::Starting);
    }

    #[test]
    fn test_missing_recovery_rate_counts_as_done() {
        let mut stat = raw("DEACTIVATING", "SUB_CLUSTER");
        stat.recovery = Some(StatRecovery {
            progress_rate: None,
        });

        assert_eq!(classify(&stat).combined_status, CombinedStatus::Started);
    }

    #[test]
    fn test_active_without_formed_cluster_waits() {
        let status = classify(&raw("ACTIVE", "SUB_FOLLOWER"));

        assert_eq!(status.combined_status, CombinedStatus::Wait);
        assert_eq!(status.role, NodeRole::SubFollower);
    }

    #[test]
    fn test_sub_cluster_role_depends_on_history() {
        let fresh = classify(&raw("ACTIVE", "SUB_CLUSTER"));
        assert_eq!(fresh.role, NodeRole::SubMaster);

        let left = classify(&with_initial(raw("ACTIVE", "SUB_CLUSTER")));
        assert_eq!(left.role, NodeRole::None);

        let idle = classify(&raw("INACTIVE", "SUB_CLUSTER"));
        assert_eq!(idle.role, NodeRole::None);
    }

    #[test]
    fn test_terminal_states() {
        assert_eq!(
            classify(&raw("ABNORMAL", "")).combined_status,
            CombinedStatus::Abnormal
        );
        assert_eq!(
            classify(&raw("NORMAL_SHUTDOWN", "")).combined_status,
            CombinedStatus::Stopping
        );
        assert_eq!(
            classify(&raw("REBOOTING", "")).combined_status,
            CombinedStatus::Unknown
        );
    }

    #[test]
    fn test_status_serializes_in_wire_case() {
        let json = serde_json::to_value(NodeStatus::stopped()).unwrap();

        assert_eq!(json["combinedStatus"], "STOPPED");
        assert_eq!(json["role"], "NONE");
        assert!(json.get("master").is_none());
    }
}
