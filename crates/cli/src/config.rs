//! Topology file loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use gridctl_node_api::{Credentials, NodeIdentity, OsCredential};
use gridctl_node_api_http::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, HttpNodeApiOptions};
use gridctl_orchestrator::{
    Cluster, ControllerConfig, DEFAULT_MAX_CONCURRENT_PROBES, DEFAULT_POLL_INTERVAL,
    DEFAULT_SSH_PORT, Node,
};
use gridctl_starter_ssh::{DEFAULT_READY_CHECK_INTERVAL, SshProcessStarterOptions};
use serde::Deserialize;

use crate::error::Error;

/// Contents of a `gridctl.toml` file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Declared cluster.
    pub cluster: ClusterSection,

    /// Management API login.
    #[serde(default)]
    pub credentials: Option<CredentialsSection>,

    /// Remote process start settings.
    #[serde(default)]
    pub ssh: SshSection,

    /// Management API client settings.
    #[serde(default)]
    pub http: HttpSection,

    /// Probe and poll tuning.
    #[serde(default)]
    pub controller: ControllerSection,
}

/// `[cluster]`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterSection {
    /// Cluster name.
    pub name: String,

    /// Whether members serve their management API over HTTPS.
    #[serde(default)]
    pub tls: bool,

    /// Declared members.
    #[serde(default)]
    pub nodes: Vec<NodeSection>,
}

/// `[[cluster.nodes]]`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSection {
    /// Host name or IP address.
    pub address: String,

    /// Management port.
    pub port: u16,

    /// Remote shell port.
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,

    /// OS user owning the process, overriding `[ssh] user`.
    #[serde(default)]
    pub os_user: Option<String>,

    /// Private key for the remote login.
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
}

/// `[credentials]`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsSection {
    /// Management user.
    pub user: String,

    /// Management password.
    pub password: String,
}

/// `[ssh]`
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SshSection {
    /// ssh client binary.
    pub bin: PathBuf,

    /// Default OS user.
    pub user: String,

    /// Command launching the node process.
    pub start_command: String,
}

impl Default for SshSection {
    fn default() -> Self {
        let defaults = SshProcessStarterOptions::default();

        Self {
            bin: defaults.ssh_bin,
            user: defaults.default_user,
            start_command: defaults.start_command,
        }
    }
}

/// `[http]`
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpSection {
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT.as_secs(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

/// `[controller]`
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerSection {
    /// Upper bound on concurrent probes.
    pub max_concurrent_probes: usize,

    /// Watcher poll interval in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            max_concurrent_probes: DEFAULT_MAX_CONCURRENT_PROBES,
            poll_interval_ms: u64::try_from(DEFAULT_POLL_INTERVAL.as_millis()).unwrap_or(1000),
        }
    }
}

const fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

impl ConfigFile {
    /// Reads and parses a config file.
    ///
    /// # Errors
    ///
    /// Returns `ReadConfig` or `ParseConfig`.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::ReadConfig(path.to_path_buf(), e))?;

        toml::from_str(&contents).map_err(|e| Error::ParseConfig(path.to_path_buf(), e))
    }

    /// Builds the declared cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if two nodes share an address and port.
    pub fn cluster(&self) -> Result<Cluster, Error> {
        let nodes = self
            .cluster
            .nodes
            .iter()
            .map(|section| {
                let node = Node::new(NodeIdentity::new(&section.address, section.port))
                    .with_ssh_port(section.ssh_port)
                    .with_tls(self.cluster.tls);

                if section.os_user.is_none() && section.identity_file.is_none() {
                    return node;
                }

                node.with_os_credential(OsCredential {
                    user: section
                        .os_user
                        .clone()
                        .unwrap_or_else(|| self.ssh.user.clone()),
                    identity_file: section.identity_file.clone(),
                })
            })
            .collect();

        Ok(Cluster::new(&self.cluster.name, nodes, self.cluster.tls)?)
    }

    /// Management credentials, flags taking precedence over the file.
    ///
    /// # Errors
    ///
    /// Returns `MissingCredentials` if neither supplies a user and password.
    pub fn credentials(
        &self,
        user: Option<String>,
        password: Option<String>,
    ) -> Result<Credentials, Error> {
        let file = self.credentials.as_ref();

        let user = user
            .or_else(|| file.map(|c| c.user.clone()))
            .ok_or(Error::MissingCredentials)?;
        let password = password
            .or_else(|| file.map(|c| c.password.clone()))
            .ok_or(Error::MissingCredentials)?;

        Ok(Credentials::new(user, password))
    }

    /// Aggregator and watcher tuning.
    #[must_use]
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            max_concurrent_probes: self.controller.max_concurrent_probes,
            poll_interval: Duration::from_millis(self.controller.poll_interval_ms),
        }
    }

    /// Management API client options.
    #[must_use]
    pub const fn http_options(&self) -> HttpNodeApiOptions {
        HttpNodeApiOptions {
            connect_timeout: Duration::from_secs(self.http.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.http.request_timeout_secs),
        }
    }

    /// Remote process starter options.
    #[must_use]
    pub fn starter_options(&self) -> SshProcessStarterOptions {
        SshProcessStarterOptions {
            ssh_bin: self.ssh.bin.clone(),
            default_user: self.ssh.user.clone(),
            start_command: self.ssh.start_command.clone(),
            ready_check_interval: DEFAULT_READY_CHECK_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;

    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const FULL: &str = r#"
        [cluster]
        name = "prod"
        tls = true

        [[cluster.nodes]]
        address = "10.0.0.1"
        port = 10040

        [[cluster.nodes]]
        address = "10.0.0.2"
        port = 10040
        ssh_port = 2222
        os_user = "db"

        [credentials]
        user = "admin"
        password = "secret"

        [ssh]
        user = "gsadm"
        start_command = "/opt/grid/bin/start"

        [controller]
        max_concurrent_probes = 2
        poll_interval_ms = 250
    "#;

    #[test]
    fn test_full_config() {
        let file = write_config(FULL);
        let config = ConfigFile::load(file.path()).unwrap();

        let cluster = config.cluster().unwrap();
        assert_eq!(cluster.name(), "prod");
        assert_eq!(cluster.declared_topology_size(), 2);
        assert!(cluster.nodes().iter().all(Node::tls));

        let second = cluster.nodes()[1].start_target();
        assert_eq!(second.ssh_port, 2222);
        assert_eq!(second.os_credential.map(|c| c.user), Some("db".to_string()));
        assert_eq!(cluster.nodes()[0].start_target().os_credential, None);

        assert_eq!(config.controller_config().max_concurrent_probes, 2);
        assert_eq!(
            config.controller_config().poll_interval,
            Duration::from_millis(250)
        );
        assert_eq!(config.starter_options().start_command, "/opt/grid/bin/start");
        assert_eq!(config.http_options().connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    fn test_flags_override_file_credentials() {
        let file = write_config(FULL);
        let config = ConfigFile::load(file.path()).unwrap();

        let credentials = config
            .credentials(Some("operator".to_string()), None)
            .unwrap();

        assert_eq!(credentials, Credentials::new("operator", "secret"));
    }

    #[test]
    fn test_missing_credentials() {
        let file = write_config("[cluster]\nname = \"prod\"\n");
        let config = ConfigFile::load(file.path()).unwrap();

        assert_matches!(
            config.credentials(None, None),
            Err(Error::MissingCredentials)
        );
        assert_eq!(config.controller_config(), ControllerConfig::default());
    }

    #[test]
    fn test_duplicate_node_is_rejected() {
        let file = write_config(
            r#"
            [cluster]
            name = "prod"

            [[cluster.nodes]]
            address = "10.0.0.1"
            port = 10040

            [[cluster.nodes]]
            address = "10.0.0.1"
            port = 10040
            "#,
        );
        let config = ConfigFile::load(file.path()).unwrap();

        assert_matches!(
            config.cluster(),
            Err(Error::Orchestrator(
                gridctl_orchestrator::Error::DuplicateNode(_)
            ))
        );
    }

    #[test]
    fn test_unknown_key_is_a_parse_error() {
        let file = write_config("[cluster]\nname = \"prod\"\nsize = 3\n");

        assert_matches!(
            ConfigFile::load(file.path()),
            Err(Error::ParseConfig(..))
        );
    }

    #[test]
    fn test_missing_file() {
        assert_matches!(
            ConfigFile::load(Path::new("/nonexistent/gridctl.toml")),
            Err(Error::ReadConfig(..))
        );
    }
}
