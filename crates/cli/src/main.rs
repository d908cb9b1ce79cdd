//! CLI binary to observe and operate a data cluster.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod config;
mod error;
mod session;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use gridctl_node_api::NodeIdentity;
use gridctl_node_api_http::HttpNodeApi;
use gridctl_orchestrator::{ClusterLifecycle, WaitTimeout};
use gridctl_starter_ssh::SshProcessStarter;
use tracing::{Level, error, warn};

use crate::config::ConfigFile;
use crate::error::Error;
use crate::session::{Outcome, Session};

/// Exit code when a `--wait` elapsed before the cluster converged.
const EXIT_TIMED_OUT: u8 = 2;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Topology file
    #[arg(
        long,
        short,
        global = true,
        default_value = "gridctl.toml",
        env = "GRIDCTL_CONFIG"
    )]
    config: PathBuf,

    /// Management API user, overriding the file
    #[arg(long, global = true, env = "GRIDCTL_USER")]
    user: Option<String>,

    /// Management API password, overriding the file
    #[arg(long, global = true, env = "GRIDCTL_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Seconds the command may wait for the requested transitions, -1 waits forever
    #[arg(long, global = true, allow_negative_numbers = true, env = "GRIDCTL_WAIT")]
    wait: Option<i64>,

    /// Log at debug level
    #[arg(long, short, global = true, env = "GRIDCTL_VERBOSE")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Operations on the declared cluster.
#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Show cluster and node status
    Stat {
        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Start a node process
    StartNode {
        /// Node as address:port
        node: NodeIdentity,
    },

    /// Stop a node process
    StopNode {
        /// Node as address:port
        node: NodeIdentity,

        /// Stop even if the node is joined or failed
        #[arg(long)]
        force: bool,
    },

    /// Join a declared node to the cluster
    Join {
        /// Node as address:port
        node: NodeIdentity,
    },

    /// Take a node out of the cluster
    Leave {
        /// Node as address:port
        node: NodeIdentity,

        /// Skip the partition safety check
        #[arg(long)]
        force: bool,
    },

    /// Add a node outside the declaration to the serving cluster
    Append {
        /// Node as address:port
        node: NodeIdentity,
    },

    /// Bring the declared cluster into service
    StartCluster,

    /// Stop the declared cluster
    StopCluster,

    /// Print the current master
    FindMaster,
}

fn wait_timeout(wait: Option<i64>) -> Result<Option<WaitTimeout>, Error> {
    match wait {
        None => Ok(None),
        Some(-1) => Ok(Some(WaitTimeout::Forever)),
        Some(seconds) => u64::try_from(seconds)
            .map(|seconds| Some(WaitTimeout::After(Duration::from_secs(seconds))))
            .map_err(|_| Error::InvalidWait(seconds)),
    }
}

async fn run(args: Args) -> Result<Outcome, Error> {
    let wait = wait_timeout(args.wait)?;

    let config = ConfigFile::load(&args.config)?;
    let cluster = config.cluster()?;
    let credentials = config.credentials(args.user, args.password)?;
    let controller = config.controller_config();

    let api = Arc::new(HttpNodeApi::new(config.http_options())?);
    let starter = Arc::new(SshProcessStarter::new(config.starter_options()));
    let poll_interval = controller.poll_interval;

    let session = Session::new(
        ClusterLifecycle::new(api, starter, controller),
        cluster,
        credentials,
        poll_interval,
    );

    session
        .execute(args.command, wait, &mut std::io::stdout())
        .await
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(Outcome::Done) => ExitCode::SUCCESS,
        Ok(Outcome::TimedOut) => {
            warn!("Timed out before the cluster converged");
            ExitCode::from(EXIT_TIMED_OUT)
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
