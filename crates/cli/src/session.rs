//! Runs one subcommand against a declared cluster.

use std::io::Write;
use std::time::Duration;

use gridctl_node_api::{Credentials, NodeIdentity, NodeManagementApi, RemoteProcessStarter};
use gridctl_orchestrator::{
    BoxWatcher, Cluster, ClusterLifecycle, ClusterState, CompositeWatcher, Node, NodeStatus,
    WaitTimeout, Watcher,
};
use serde::Serialize;
use tokio::time::Instant;
use tracing::info;

use crate::Command;
use crate::error::Error;

/// How a command ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// Accepted, and converged if asked to wait.
    Done,

    /// Accepted, but did not converge within the wait.
    TimedOut,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeReport {
    node: String,
    status: Option<NodeStatus>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClusterReport {
    name: String,
    matches: bool,
    state: Option<ClusterState>,
    servicing_count: usize,
    wait_count: usize,
    master: Option<String>,
    undefined_nodes: Vec<String>,
    nodes: Vec<NodeReport>,
}

/// A declared cluster together with the means to drive it.
pub struct Session<A, S> {
    lifecycle: ClusterLifecycle<A, S>,
    cluster: Cluster,
    credentials: Credentials,
    poll_interval: Duration,
}

impl<A, S> Session<A, S>
where
    A: NodeManagementApi,
    S: RemoteProcessStarter,
{
    /// Creates a session.
    pub const fn new(
        lifecycle: ClusterLifecycle<A, S>,
        cluster: Cluster,
        credentials: Credentials,
        poll_interval: Duration,
    ) -> Self {
        Self {
            lifecycle,
            cluster,
            credentials,
            poll_interval,
        }
    }

    /// Runs `command`, printing results to `out`, and waits for the returned
    /// watchers when `wait` is set.
    ///
    /// `wait` bounds the whole command, time spent by the starter included.
    pub async fn execute(
        &self,
        command: Command,
        wait: Option<WaitTimeout>,
        out: &mut impl Write,
    ) -> Result<Outcome, Error> {
        let started = Instant::now();
        let nodes = self.lifecycle.nodes();
        let credentials = &self.credentials;

        let watchers: Vec<BoxWatcher> = match command {
            Command::Stat { json } => {
                self.stat(json, out).await?;
                return Ok(Outcome::Done);
            }
            Command::FindMaster => {
                match self.lifecycle.find_master(&self.cluster, credentials).await? {
                    Some(master) => writeln!(out, "{master}")?,
                    None => writeln!(out, "no master")?,
                }
                return Ok(Outcome::Done);
            }
            Command::StartNode { node } => {
                let starter_wait = match wait {
                    Some(WaitTimeout::After(duration)) => Some(duration),
                    _ => None,
                };
                vec![nodes.start(&self.node(node), credentials, starter_wait).await?]
            }
            Command::StopNode { node, force } => {
                vec![nodes.stop(&self.node(node), credentials, force).await?]
            }
            Command::Join { node } => {
                vec![
                    nodes
                        .join_declared(&self.cluster, &self.node(node), credentials)
                        .await?,
                ]
            }
            Command::Leave { node, force } => {
                vec![nodes.leave(&self.node(node), credentials, force).await?]
            }
            Command::Append { node } => {
                vec![
                    nodes
                        .append_declared(&self.cluster, &self.node(node), credentials)
                        .await?,
                ]
            }
            Command::StartCluster => {
                self.lifecycle
                    .start_cluster(&self.cluster, credentials)
                    .await?
            }
            Command::StopCluster => {
                self.lifecycle
                    .stop_cluster_declared(&self.cluster, credentials)
                    .await?
            }
        };

        writeln!(out, "accepted ({} pending)", watchers.len())?;

        let Some(timeout) = wait else {
            return Ok(Outcome::Done);
        };
        let timeout = remaining(timeout, started.elapsed());

        info!("Waiting for {} transitions", watchers.len());
        let completed = CompositeWatcher::new(watchers)
            .with_poll_interval(self.poll_interval)
            .wait_completion(timeout)
            .await?;

        if completed {
            writeln!(out, "completed")?;
            Ok(Outcome::Done)
        } else {
            writeln!(out, "timed out")?;
            Ok(Outcome::TimedOut)
        }
    }

    /// The declared node with `identity`, or a bare node outside the declaration.
    fn node(&self, identity: NodeIdentity) -> Node {
        self.cluster
            .node(&identity)
            .cloned()
            .unwrap_or_else(|| Node::new(identity).with_tls(self.cluster.tls()))
    }

    async fn stat(&self, json: bool, out: &mut impl Write) -> Result<(), Error> {
        let matches = self
            .lifecycle
            .nodes()
            .aggregator()
            .aggregate(&self.cluster, &self.credentials)
            .await?;

        let (state, servicing_count, wait_count, master, undefined_nodes) =
            match self.cluster.status() {
                Some(status) => (
                    Some(status.state),
                    status.servicing_count,
                    status.wait_count,
                    status.master_node.as_ref().map(ToString::to_string),
                    status.undefined_nodes.iter().map(ToString::to_string).collect(),
                ),
                None => (None, 0, 0, None, Vec::new()),
            };

        let report = ClusterReport {
            name: self.cluster.name().to_string(),
            matches,
            state,
            servicing_count,
            wait_count,
            master,
            undefined_nodes,
            nodes: self
                .cluster
                .nodes()
                .iter()
                .map(|node| NodeReport {
                    node: node.to_string(),
                    status: node.status().map(|status| (*status).clone()),
                })
                .collect(),
        };

        if json {
            writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
            return Ok(());
        }

        let Some(state) = report.state else {
            writeln!(out, "cluster {}: status unset", report.name)?;
            return Ok(());
        };

        writeln!(
            out,
            "cluster {}: {} (servicing {}, waiting {}, matches {})",
            report.name, state, report.servicing_count, report.wait_count, report.matches
        )?;
        writeln!(
            out,
            "master: {}",
            report.master.as_deref().unwrap_or("none")
        )?;

        for node in &report.nodes {
            match &node.status {
                Some(status) => writeln!(
                    out,
                    "  {} {} {} '{}' {}/{}",
                    node.node,
                    status.combined_status,
                    status.role,
                    status.cluster_name,
                    status.active_count,
                    status.designated_count
                )?,
                None => writeln!(out, "  {} -", node.node)?,
            }
        }

        for undefined in &report.undefined_nodes {
            writeln!(out, "  {undefined} (not declared)")?;
        }

        Ok(())
    }
}

/// What is left of `wait` after `spent`.
fn remaining(wait: WaitTimeout, spent: Duration) -> WaitTimeout {
    match wait {
        WaitTimeout::Forever => WaitTimeout::Forever,
        WaitTimeout::After(duration) => WaitTimeout::After(duration.saturating_sub(spent)),
    }
}
