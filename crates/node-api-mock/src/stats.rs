//! Ready-made status replies for the states tests usually need.

use gridctl_node_api::{InitialCluster, NodeIdentity, NodeStat, StatCluster, StatRecovery};

fn initial(cluster_name: &str, designated_count: u32) -> Option<InitialCluster> {
    Some(InitialCluster {
        cluster_name: Some(cluster_name.to_string()),
        designated_count: Some(designated_count),
    })
}

/// Process up, recovery done, not in any cluster.
#[must_use]
pub fn started() -> NodeStat {
    NodeStat {
        cluster: StatCluster {
            node_status: "INACTIVE".to_string(),
            cluster_status: "SUB_CLUSTER".to_string(),
            ..StatCluster::default()
        },
        recovery: None,
    }
}

/// Process up, still replaying its on-disk state.
#[must_use]
pub fn starting(progress_rate: f64) -> NodeStat {
    NodeStat {
        recovery: Some(StatRecovery {
            progress_rate: Some(progress_rate),
        }),
        ..started()
    }
}

/// Active master of `cluster_name`.
#[must_use]
pub fn master(cluster_name: &str, designated_count: u32, active_count: u32) -> NodeStat {
    NodeStat {
        cluster: StatCluster {
            node_status: "ACTIVE".to_string(),
            cluster_status: "MASTER".to_string(),
            designated_count,
            active_count,
            cluster_name: cluster_name.to_string(),
            master: None,
            initial_cluster: initial(cluster_name, designated_count),
        },
        recovery: None,
    }
}

/// Active follower of `cluster_name` pointing at `master`.
#[must_use]
pub fn follower(cluster_name: &str, designated_count: u32, master: &NodeIdentity) -> NodeStat {
    NodeStat {
        cluster: StatCluster {
            node_status: "ACTIVE".to_string(),
            cluster_status: "FOLLOWER".to_string(),
            designated_count,
            active_count: 0,
            cluster_name: cluster_name.to_string(),
            master: Some(master.clone()),
            initial_cluster: initial(cluster_name, designated_count),
        },
        recovery: None,
    }
}

/// Joined `cluster_name` but the cluster has not formed yet.
///
/// With `ever_joined` false and `sub_master` true this is the provisional
/// leader of a sub-cluster.
#[must_use]
pub fn waiting(
    cluster_name: &str,
    designated_count: u32,
    ever_joined: bool,
    sub_master: bool,
) -> NodeStat {
    NodeStat {
        cluster: StatCluster {
            node_status: "ACTIVE".to_string(),
            cluster_status: if sub_master {
                "SUB_CLUSTER".to_string()
            } else {
                "SUB_FOLLOWER".to_string()
            },
            designated_count,
            active_count: 0,
            cluster_name: cluster_name.to_string(),
            master: None,
            initial_cluster: if ever_joined {
                initial(cluster_name, designated_count)
            } else {
                None
            },
        },
        recovery: None,
    }
}

/// Shutting down normally.
#[must_use]
pub fn stopping() -> NodeStat {
    NodeStat {
        cluster: StatCluster {
            node_status: "NORMAL_SHUTDOWN".to_string(),
            ..StatCluster::default()
        },
        recovery: None,
    }
}

/// Failed process.
#[must_use]
pub fn abnormal() -> NodeStat {
    NodeStat {
        cluster: StatCluster {
            node_status: "ABNORMAL".to_string(),
            ..StatCluster::default()
        },
        recovery: None,
    }
}
