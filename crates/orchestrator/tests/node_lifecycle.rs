mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use common::{admin, cluster, identity, lifecycle, node};
use gridctl_node_api::PartitionEntry;
use gridctl_node_api_mock::{Endpoint, MockNodeApi, stats};
use gridctl_orchestrator::{CombinedStatus, Error, WaitTimeout, Watcher};

const WAIT: WaitTimeout = WaitTimeout::After(Duration::from_secs(5));

#[tokio::test]
async fn test_join_on_stopped_node_is_rejected_without_mutation() {
    let api = MockNodeApi::new();
    api.add_stopped_node(&identity(1));

    let result = lifecycle(&api)
        .nodes()
        .join(&node(1), "prod", 1, &admin(), false)
        .await;

    assert_matches!(result, Err(Error::InvalidState(_)));
    assert_eq!(api.mutation_count(), 0);
}

#[tokio::test]
async fn test_join_started_node_converges() {
    let api = MockNodeApi::new();
    api.add_node(&identity(1), stats::started());
    let target = node(1);

    let watcher = lifecycle(&api)
        .nodes()
        .join(&target, "prod", 1, &admin(), true)
        .await
        .unwrap();

    assert!(watcher.wait_completion(WAIT).await.unwrap());
    assert_eq!(api.calls(&identity(1), Endpoint::Join), 1);
    assert_eq!(
        target.status().unwrap().combined_status,
        CombinedStatus::Servicing
    );
}

#[tokio::test]
async fn test_join_joined_node_is_noop() {
    let api = MockNodeApi::new();
    api.add_node(&identity(1), stats::master("prod", 1, 1));

    let watcher = lifecycle(&api)
        .nodes()
        .join(&node(1), "prod", 1, &admin(), false)
        .await
        .unwrap();

    assert!(watcher.is_completed().await.unwrap());
    assert_eq!(api.mutation_count(), 0);
}

#[tokio::test]
async fn test_start_stopped_node() {
    let api = MockNodeApi::new();
    api.add_stopped_node(&identity(1));

    let watcher = lifecycle(&api)
        .nodes()
        .start(&node(1), &admin(), None)
        .await
        .unwrap();

    assert!(watcher.wait_completion(WAIT).await.unwrap());
    assert_eq!(api.calls(&identity(1), Endpoint::StartProcess), 1);
}

#[tokio::test]
async fn test_start_while_starting_issues_nothing() {
    let api = MockNodeApi::new();
    api.add_node(&identity(1), stats::starting(0.3));

    let watcher = lifecycle(&api)
        .nodes()
        .start(&node(1), &admin(), None)
        .await
        .unwrap();

    assert!(!watcher.is_completed().await.unwrap());
    api.set_stat(&identity(1), stats::started());
    assert!(watcher.is_completed().await.unwrap());
    assert_eq!(api.mutation_count(), 0);
}

#[tokio::test]
async fn test_start_failed_node_is_rejected() {
    let api = MockNodeApi::new();
    api.add_node(&identity(1), stats::abnormal());

    let result = lifecycle(&api).nodes().start(&node(1), &admin(), None).await;

    assert_matches!(result, Err(Error::InvalidState(_)));
    assert_eq!(api.mutation_count(), 0);
}

#[tokio::test]
async fn test_start_failure_is_reported() {
    let api = MockNodeApi::new();
    api.add_stopped_node(&identity(1));
    api.fail_with(&identity(1), "permission denied");

    let result = lifecycle(&api).nodes().start(&node(1), &admin(), None).await;

    assert_matches!(result, Err(Error::Starter(..)));
}

#[tokio::test]
async fn test_stop_started_node() {
    let api = MockNodeApi::new();
    api.add_node(&identity(1), stats::started());

    let watcher = lifecycle(&api)
        .nodes()
        .stop(&node(1), &admin(), false)
        .await
        .unwrap();

    assert!(watcher.wait_completion(WAIT).await.unwrap());
    assert_eq!(api.calls(&identity(1), Endpoint::Shutdown), 1);
}

#[tokio::test]
async fn test_stop_joined_node_requires_force() {
    let api = MockNodeApi::new();
    api.add_node(&identity(1), stats::master("prod", 1, 1));
    let lifecycle = lifecycle(&api);

    assert_matches!(
        lifecycle.nodes().stop(&node(1), &admin(), false).await,
        Err(Error::InvalidState(_))
    );
    assert_eq!(api.mutation_count(), 0);

    let watcher = lifecycle.nodes().stop(&node(1), &admin(), true).await.unwrap();
    assert!(watcher.wait_completion(WAIT).await.unwrap());
    assert_eq!(api.calls(&identity(1), Endpoint::Shutdown), 1);
}

#[tokio::test]
async fn test_stop_starting_node_is_rejected_even_with_force() {
    let api = MockNodeApi::new();
    api.add_node(&identity(1), stats::starting(0.1));

    let result = lifecycle(&api).nodes().stop(&node(1), &admin(), true).await;

    assert_matches!(result, Err(Error::InvalidState(_)));
    assert_eq!(api.mutation_count(), 0);
}

#[tokio::test]
async fn test_stop_stopping_node_only_repeats_with_force() {
    let api = MockNodeApi::new();
    api.add_node(&identity(1), stats::stopping());
    let lifecycle = lifecycle(&api);

    let watcher = lifecycle.nodes().stop(&node(1), &admin(), false).await.unwrap();
    assert!(!watcher.is_completed().await.unwrap());
    assert_eq!(api.mutation_count(), 0);

    lifecycle.nodes().stop(&node(1), &admin(), true).await.unwrap();
    assert_eq!(api.calls(&identity(1), Endpoint::Shutdown), 1);
}

#[tokio::test]
async fn test_stop_stopped_node_is_noop() {
    let api = MockNodeApi::new();
    api.add_stopped_node(&identity(1));

    let watcher = lifecycle(&api)
        .nodes()
        .stop(&node(1), &admin(), false)
        .await
        .unwrap();

    assert!(watcher.is_completed().await.unwrap());
    assert_eq!(api.mutation_count(), 0);
}

#[tokio::test]
async fn test_unsafe_leave_is_refused_without_mutation() {
    let api = MockNodeApi::new();
    api.add_node(&identity(1), stats::master("prod", 2, 2));
    api.set_partitions(
        &identity(1),
        vec![PartitionEntry {
            partition_id: 3,
            owner: Some(identity(1)),
            backups: Vec::new(),
        }],
    );

    let result = lifecycle(&api).nodes().leave(&node(1), &admin(), false).await;

    assert_matches!(result, Err(Error::UnsafeLeave { partition_id: 3, .. }));
    assert_eq!(api.calls(&identity(1), Endpoint::Leave), 0);
    assert_eq!(api.mutation_count(), 0);
}

#[tokio::test]
async fn test_forced_leave_skips_partition_check() {
    let api = MockNodeApi::new();
    api.add_node(&identity(1), stats::master("prod", 2, 2));
    api.set_partitions(
        &identity(1),
        vec![PartitionEntry {
            partition_id: 3,
            owner: Some(identity(1)),
            backups: Vec::new(),
        }],
    );

    let watcher = lifecycle(&api)
        .nodes()
        .leave(&node(1), &admin(), true)
        .await
        .unwrap();

    assert!(watcher.wait_completion(WAIT).await.unwrap());
    assert_eq!(api.calls(&identity(1), Endpoint::PartitionTable), 0);
    assert_eq!(api.calls(&identity(1), Endpoint::Leave), 1);
}

#[tokio::test]
async fn test_leave_idle_node_is_noop() {
    let api = MockNodeApi::new();
    api.add_node(&identity(1), stats::started());

    let watcher = lifecycle(&api)
        .nodes()
        .leave(&node(1), &admin(), false)
        .await
        .unwrap();

    assert!(watcher.is_completed().await.unwrap());
    assert_eq!(api.call_count(), 1);
}

#[tokio::test]
async fn test_leave_failed_node_is_rejected() {
    let api = MockNodeApi::new();
    api.add_node(&identity(1), stats::abnormal());

    let result = lifecycle(&api).nodes().leave(&node(1), &admin(), true).await;

    assert_matches!(result, Err(Error::InvalidState(_)));
}

fn serving_pair(api: &MockNodeApi) {
    api.add_node(&identity(1), stats::master("prod", 2, 2));
    api.add_node(&identity(2), stats::follower("prod", 2, &identity(1)));
    api.set_followers(&identity(1), vec![identity(2)]);
}

#[tokio::test]
async fn test_append_grows_the_cluster() {
    let api = MockNodeApi::new();
    serving_pair(&api);
    api.add_node(&identity(9), stats::started());

    let watcher = lifecycle(&api)
        .nodes()
        .append(&node(1), &node(9), &admin())
        .await
        .unwrap();

    assert!(watcher.wait_completion(WAIT).await.unwrap());
    assert_eq!(api.calls(&identity(9), Endpoint::Join), 1);
    assert_eq!(api.calls(&identity(1), Endpoint::ClusterIncrease), 1);
    assert_eq!(api.stat(&identity(9)).unwrap().cluster.designated_count, 3);
}

#[tokio::test]
async fn test_append_to_unstable_cluster_is_refused() {
    let api = MockNodeApi::new();
    api.add_node(&identity(1), stats::master("prod", 3, 2));
    api.add_node(&identity(9), stats::started());

    let result = lifecycle(&api)
        .nodes()
        .append(&node(1), &node(9), &admin())
        .await;

    assert_matches!(
        result,
        Err(Error::UnstableCluster {
            active: 2,
            designated: 3
        })
    );
    assert_eq!(api.mutation_count(), 0);
}

#[tokio::test]
async fn test_append_to_single_node_cluster_is_refused() {
    let api = MockNodeApi::new();
    api.add_node(&identity(1), stats::master("prod", 1, 1));
    api.add_node(&identity(9), stats::started());

    let result = lifecycle(&api)
        .nodes()
        .append(&node(1), &node(9), &admin())
        .await;

    assert_matches!(result, Err(Error::NotExpandable(master)) if master == identity(1));
    assert_eq!(api.mutation_count(), 0);
}

#[tokio::test]
async fn test_append_requires_started_target() {
    let api = MockNodeApi::new();
    serving_pair(&api);
    api.add_stopped_node(&identity(9));

    let result = lifecycle(&api)
        .nodes()
        .append(&node(1), &node(9), &admin())
        .await;

    assert_matches!(result, Err(Error::InvalidState(_)));
    assert_eq!(api.mutation_count(), 0);
}

#[tokio::test]
async fn test_append_declared_rejects_declared_node() {
    let api = MockNodeApi::new();
    serving_pair(&api);
    let cluster = cluster("prod", &[1, 2]);

    let result = lifecycle(&api)
        .nodes()
        .append_declared(&cluster, &node(2), &admin())
        .await;

    assert_matches!(result, Err(Error::InvalidState(_)));
    assert_eq!(api.call_count(), 0);
}

#[tokio::test]
async fn test_append_declared_requires_stable_cluster() {
    let api = MockNodeApi::new();
    api.add_node(&identity(1), stats::master("prod", 2, 1));
    api.add_node(&identity(2), stats::started());
    api.add_node(&identity(9), stats::started());
    let cluster = cluster("prod", &[1, 2]);

    let result = lifecycle(&api)
        .nodes()
        .append_declared(&cluster, &node(9), &admin())
        .await;

    assert_matches!(result, Err(Error::ConfigMismatch(..)));
    assert_eq!(api.mutation_count(), 0);
}

#[tokio::test]
async fn test_append_declared_goes_through_master() {
    let api = MockNodeApi::new();
    serving_pair(&api);
    api.add_node(&identity(9), stats::started());
    let cluster = cluster("prod", &[1, 2]);

    let watcher = lifecycle(&api)
        .nodes()
        .append_declared(&cluster, &node(9), &admin())
        .await
        .unwrap();

    assert!(watcher.wait_completion(WAIT).await.unwrap());
    assert_eq!(api.calls(&identity(1), Endpoint::ClusterIncrease), 1);
}

#[tokio::test]
async fn test_join_declared_rejects_unknown_node() {
    let api = MockNodeApi::new();
    api.add_node(&identity(9), stats::started());
    let cluster = cluster("prod", &[1, 2]);

    let result = lifecycle(&api)
        .nodes()
        .join_declared(&cluster, &node(9), &admin())
        .await;

    assert_matches!(result, Err(Error::InvalidState(_)));
    assert_eq!(api.call_count(), 0);
}

#[tokio::test]
async fn test_join_declared_refuses_mismatched_cluster() {
    let api = MockNodeApi::new();
    api.add_node(&identity(1), stats::waiting("staging", 2, true, false));
    api.add_node(&identity(2), stats::started());
    let cluster = cluster("prod", &[1, 2]);

    let result = lifecycle(&api)
        .nodes()
        .join_declared(&cluster, &node(2), &admin())
        .await;

    assert_matches!(result, Err(Error::ConfigMismatch(..)));
    assert_eq!(api.mutation_count(), 0);
}

#[tokio::test]
async fn test_join_declared_completing_the_set_waits_for_service() {
    let api = MockNodeApi::new();
    api.add_node(&identity(1), stats::waiting("prod", 3, true, false));
    api.add_node(&identity(2), stats::waiting("prod", 3, true, false));
    api.add_node(&identity(3), stats::started());
    let cluster = cluster("prod", &[1, 2, 3]);

    let watcher = lifecycle(&api)
        .nodes()
        .join_declared(&cluster, &node(3), &admin())
        .await
        .unwrap();

    assert_eq!(api.calls(&identity(3), Endpoint::Join), 1);
    assert_eq!(api.stat(&identity(3)).unwrap().cluster.designated_count, 3);

    api.set_stat(&identity(3), stats::waiting("prod", 3, true, false));
    assert!(!watcher.is_completed().await.unwrap());
}

#[tokio::test]
async fn test_join_declared_into_stopped_cluster_accepts_wait() {
    let api = MockNodeApi::new();
    api.add_node(&identity(1), stats::started());
    api.add_stopped_node(&identity(2));
    api.add_stopped_node(&identity(3));
    let cluster = cluster("prod", &[1, 2, 3]);

    let watcher = lifecycle(&api)
        .nodes()
        .join_declared(&cluster, &node(1), &admin())
        .await
        .unwrap();

    api.set_stat(&identity(1), stats::waiting("prod", 3, true, false));
    assert!(watcher.is_completed().await.unwrap());
}
