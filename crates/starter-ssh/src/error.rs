use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use gridctl_node_api::{NodeIdentity, StarterError};
use thiserror::Error;

/// Error type for the ssh starter.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error while driving the remote shell.
    #[error("io error ({0}): {1}")]
    Io(&'static str, #[source] io::Error),

    /// The remote start command failed.
    #[error("start command for {0} exited with non-zero status: {1}")]
    NonZeroExitCode(NodeIdentity, ExitStatus),

    /// The management port did not answer in time.
    #[error("{0} did not answer within {1:?}")]
    NotReady(NodeIdentity, Duration),

    /// The remote shell could not be spawned.
    #[error("failed to spawn ssh: {0}")]
    Spawn(#[source] io::Error),
}

impl StarterError for Error {}
