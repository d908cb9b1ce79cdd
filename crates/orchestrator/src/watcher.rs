//! Polling handles for waiting until a requested transition lands.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use gridctl_node_api::{Credentials, NodeManagementApi};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::DEFAULT_POLL_INTERVAL;
use crate::error::Result;
use crate::model::Node;
use crate::probe::NodeProbe;
use crate::status::CombinedStatus;

/// How long [`Watcher::wait_completion`] may block.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WaitTimeout {
    /// No deadline.
    Forever,

    /// Give up after the duration.
    After(Duration),
}

/// A boxed watcher, as returned by lifecycle operations.
pub type BoxWatcher = Box<dyn Watcher>;

/// Observes whether an awaited condition holds.
#[async_trait]
pub trait Watcher: Send + Sync {
    /// Whether the condition holds now.
    async fn is_completed(&self) -> Result<bool>;

    /// Interval between polls in [`wait_completion`](Self::wait_completion).
    fn poll_interval(&self) -> Duration {
        DEFAULT_POLL_INTERVAL
    }

    /// Polls until the condition holds or `timeout` passes.
    ///
    /// Returns `Ok(false)` on timeout; a timeout is not an error.
    async fn wait_completion(&self, timeout: WaitTimeout) -> Result<bool> {
        let deadline = match timeout {
            WaitTimeout::Forever => None,
            WaitTimeout::After(duration) => Some(Instant::now() + duration),
        };

        loop {
            if self.is_completed().await? {
                return Ok(true);
            }

            let pause = match deadline {
                None => self.poll_interval(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    self.poll_interval().min(deadline - now)
                }
            };

            tokio::time::sleep(pause).await;
        }
    }
}

impl fmt::Debug for dyn Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("poll_interval", &self.poll_interval())
            .finish_non_exhaustive()
    }
}

/// A watcher for a transition that needs no waiting.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopWatcher;

#[async_trait]
impl Watcher for NoopWatcher {
    async fn is_completed(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Completes once a node reaches one of the accepted statuses.
pub struct StatusWatcher<A> {
    probe: NodeProbe<A>,
    node: Node,
    credentials: Credentials,
    accepted: Vec<CombinedStatus>,
    poll_interval: Duration,
}

impl<A> StatusWatcher<A>
where
    A: NodeManagementApi,
{
    /// Creates a watcher for `node` reaching any status in `accepted`.
    pub fn new(
        probe: NodeProbe<A>,
        node: Node,
        credentials: Credentials,
        accepted: &[CombinedStatus],
    ) -> Self {
        Self {
            probe,
            node,
            credentials,
            accepted: accepted.to_vec(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[async_trait]
impl<A> Watcher for StatusWatcher<A>
where
    A: NodeManagementApi,
{
    async fn is_completed(&self) -> Result<bool> {
        let status = self
            .probe
            .probe_or_stopped(&self.node, &self.credentials)
            .await?;

        Ok(self.accepted.contains(&status.combined_status))
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

/// Completes once every child completed.
///
/// Completed children are dropped and never asked again.
pub struct CompositeWatcher {
    remaining: Mutex<Vec<BoxWatcher>>,
    poll_interval: Duration,
}

impl CompositeWatcher {
    /// Creates a composite over `watchers`.
    #[must_use]
    pub fn new(watchers: Vec<BoxWatcher>) -> Self {
        Self {
            remaining: Mutex::new(watchers),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Children not yet seen completed.
    pub async fn remaining(&self) -> usize {
        self.remaining.lock().await.len()
    }
}

#[async_trait]
impl Watcher for CompositeWatcher {
    async fn is_completed(&self) -> Result<bool> {
        let mut remaining = self.remaining.lock().await;

        let mut i = 0;
        while i < remaining.len() {
            if remaining[i].is_completed().await? {
                remaining.remove(i);
            } else {
                i += 1;
            }
        }

        debug!("{} watchers still pending", remaining.len());
        Ok(remaining.is_empty())
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
