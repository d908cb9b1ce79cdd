#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use gridctl_node_api::{Credentials, NodeIdentity};
use gridctl_node_api_mock::MockNodeApi;
use gridctl_orchestrator::{Cluster, ClusterLifecycle, ControllerConfig, Node};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn identity(port: u16) -> NodeIdentity {
    NodeIdentity::new("10.0.0.1", port)
}

pub fn admin() -> Credentials {
    Credentials::new("admin", "admin")
}

pub fn node(port: u16) -> Node {
    Node::new(identity(port))
}

pub fn cluster(name: &str, ports: &[u16]) -> Cluster {
    Cluster::new(name, ports.iter().map(|port| node(*port)).collect(), false).unwrap()
}

pub fn lifecycle(api: &MockNodeApi) -> ClusterLifecycle<MockNodeApi, MockNodeApi> {
    ClusterLifecycle::new(
        Arc::new(api.clone()),
        Arc::new(api.clone()),
        ControllerConfig {
            poll_interval: Duration::from_millis(10),
            ..ControllerConfig::default()
        },
    )
}
