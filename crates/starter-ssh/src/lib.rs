//! Starts node processes over `ssh`.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use gridctl_node_api::{NodeIdentity, RemoteProcessStarter, StartTarget};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Default interval between management port checks.
pub const DEFAULT_READY_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Options for configuring an `SshProcessStarter`.
#[derive(Clone, Debug)]
pub struct SshProcessStarterOptions {
    /// Path to the ssh client, `ssh` from the PATH by default.
    pub ssh_bin: PathBuf,

    /// OS user used when a node has no credential of its own.
    pub default_user: String,

    /// Command run on the remote host to launch the node process.
    pub start_command: String,

    /// Interval between management port checks while waiting.
    pub ready_check_interval: Duration,
}

impl Default for SshProcessStarterOptions {
    fn default() -> Self {
        Self {
            ssh_bin: PathBuf::from("ssh"),
            default_user: "gsadm".to_string(),
            start_command: "gs_startnode".to_string(),
            ready_check_interval: DEFAULT_READY_CHECK_INTERVAL,
        }
    }
}

/// Launches node processes by running a start command through `ssh`.
#[derive(Clone, Debug)]
pub struct SshProcessStarter {
    options: SshProcessStarterOptions,
}

impl SshProcessStarter {
    /// Creates a new `SshProcessStarter`.
    #[must_use]
    pub const fn new(options: SshProcessStarterOptions) -> Self {
        Self { options }
    }

    fn args(&self, target: &StartTarget) -> Vec<String> {
        let user = target
            .os_credential
            .as_ref()
            .map_or(self.options.default_user.as_str(), |c| c.user.as_str());

        let mut args = vec![
            "-p".to_string(),
            target.ssh_port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
        ];

        if let Some(identity_file) = target
            .os_credential
            .as_ref()
            .and_then(|c| c.identity_file.as_ref())
        {
            args.push("-i".to_string());
            args.push(identity_file.to_string_lossy().to_string());
        }

        args.push(format!("{user}@{}", target.identity.address));
        args.push(self.options.start_command.clone());

        args
    }

    async fn wait_until_ready(&self, identity: &NodeIdentity, wait: Duration) -> Result<(), Error> {
        let ready = poll_until(wait, self.options.ready_check_interval, || {
            TcpStream::connect((identity.address.as_str(), identity.port))
        })
        .await;

        if ready {
            debug!("{} is answering", identity);
            Ok(())
        } else {
            Err(Error::NotReady(identity.clone(), wait))
        }
    }
}

/// Retries `connect` until it succeeds or `wait` elapses.
///
/// Every attempt is cut off at the deadline.
async fn poll_until<F, Fut, T, E>(wait: Duration, interval: Duration, connect: F) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let deadline = Instant::now() + wait;

    loop {
        if let Ok(Ok(_)) = tokio::time::timeout_at(deadline, connect()).await {
            return true;
        }

        let now = Instant::now();
        if now >= deadline {
            return false;
        }

        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

#[async_trait]
impl RemoteProcessStarter for SshProcessStarter {
    type Error = Error;

    async fn start_process(
        &self,
        target: &StartTarget,
        wait: Option<Duration>,
    ) -> Result<(), Self::Error> {
        let mut cmd = Command::new(&self.options.ssh_bin);
        cmd.args(self.args(target))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("Spawning remote start: {:?}", cmd);

        let mut child = cmd.spawn().map_err(Error::Spawn)?;

        let stdout_task = child.stdout.take().map(|stdout| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!(target: "gridctl-ssh", "{}", line);
                }
            })
        });

        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    error!(target: "gridctl-ssh", "{}", line);
                }
            })
        });

        let status = child
            .wait()
            .await
            .map_err(|e| Error::Io("failed to wait for ssh", e))?;

        for task in [stdout_task, stderr_task].into_iter().flatten() {
            let _ = task.await;
        }

        if !status.success() {
            return Err(Error::NonZeroExitCode(target.identity.clone(), status));
        }

        info!("Start command issued for {}", target.identity);

        if let Some(wait) = wait {
            self.wait_until_ready(&target.identity, wait).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use gridctl_node_api::OsCredential;

    use super::*;

    fn target(port: u16, os_credential: Option<OsCredential>) -> StartTarget {
        StartTarget {
            identity: NodeIdentity::new("127.0.0.1", port),
            ssh_port: 2222,
            os_credential,
        }
    }

    fn starter(ssh_bin: &str) -> SshProcessStarter {
        SshProcessStarter::new(SshProcessStarterOptions {
            ssh_bin: PathBuf::from(ssh_bin),
            ready_check_interval: Duration::from_millis(20),
            ..SshProcessStarterOptions::default()
        })
    }

    #[test]
    fn test_args_use_default_user() {
        let args = starter("ssh").args(&target(10040, None));

        assert_eq!(
            args,
            vec![
                "-p",
                "2222",
                "-o",
                "BatchMode=yes",
                "gsadm@127.0.0.1",
                "gs_startnode"
            ]
        );
    }

    #[test]
    fn test_args_use_node_credential() {
        let credential = OsCredential {
            user: "db".to_string(),
            identity_file: Some(PathBuf::from("/keys/id_ed25519")),
        };

        let args = starter("ssh").args(&target(10040, Some(credential)));

        assert!(args.contains(&"-i".to_string()));
        assert!(args.contains(&"/keys/id_ed25519".to_string()));
        assert!(args.contains(&"db@127.0.0.1".to_string()));
    }

    #[tokio::test]
    async fn test_failed_command_is_reported() {
        let error = starter("false")
            .start_process(&target(10040, None), None)
            .await
            .unwrap_err();

        assert_matches!(error, Error::NonZeroExitCode(..));
    }

    #[tokio::test]
    async fn test_waits_for_management_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        starter("true")
            .start_process(&target(port, None), Some(Duration::from_secs(2)))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_connect_is_cut_off_at_deadline() {
        let started = Instant::now();

        let ready = poll_until(Duration::from_secs(3), Duration::from_millis(500), || {
            std::future::pending::<Result<(), ()>>()
        })
        .await;

        assert!(!ready);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_connect_succeeds() {
        let attempts = std::sync::atomic::AtomicUsize::new(0);

        let ready = poll_until(Duration::from_secs(3), Duration::from_millis(500), || {
            let attempt = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            std::future::ready(if attempt < 2 { Err(()) } else { Ok(()) })
        })
        .await;

        assert!(ready);
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_when_port_stays_closed() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let error = starter("true")
            .start_process(&target(port, None), Some(Duration::from_millis(100)))
            .await
            .unwrap_err();

        assert_matches!(error, Error::NotReady(..));
    }
}
