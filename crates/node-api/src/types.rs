//! Wire and addressing types shared by every node API implementation.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Address and port of a node's management endpoint.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Host name or IP address.
    pub address: String,

    /// Management (system) port.
    pub port: u16,
}

impl NodeIdentity {
    /// Creates a new identity.
    #[must_use]
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Error returned when a `host:port` string cannot be parsed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParseIdentityError(String);

impl fmt::Display for ParseIdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid node identity '{}', expected host:port", self.0)
    }
}

impl std::error::Error for ParseIdentityError {}

impl FromStr for NodeIdentity {
    type Err = ParseIdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ParseIdentityError(s.to_string()))?;

        if address.is_empty() {
            return Err(ParseIdentityError(s.to_string()));
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| ParseIdentityError(s.to_string()))?;

        Ok(Self::new(address, port))
    }
}

/// A management endpoint together with its transport selection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeEndpoint {
    /// Where the endpoint lives.
    pub identity: NodeIdentity,

    /// Whether to speak HTTPS instead of plain HTTP.
    pub tls: bool,
}

/// User and password for the management API.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    /// Management user.
    pub user: String,

    /// Management password.
    pub password: String,
}

impl Credentials {
    /// Creates a new set of credentials.
    #[must_use]
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Operating system login used to start a node process out of band.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct OsCredential {
    /// OS user owning the node process.
    pub user: String,

    /// Private key used for the remote login, if not the agent default.
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
}

/// Everything a `RemoteProcessStarter` needs to launch one node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StartTarget {
    /// Management endpoint of the node to start.
    pub identity: NodeIdentity,

    /// Port of the remote shell daemon.
    pub ssh_port: u16,

    /// OS login, falling back to the starter's default when absent.
    pub os_credential: Option<OsCredential>,
}

/// Selects the address space in which a node reports peer addresses.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum AddressType {
    /// Management (system) addresses.
    #[default]
    System,

    /// Cluster heartbeat addresses.
    Cluster,

    /// Transaction service addresses.
    Transaction,

    /// SQL service addresses.
    Sql,
}

impl AddressType {
    /// Query-string value understood by the node.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Cluster => "cluster",
            Self::Transaction => "transaction",
            Self::Sql => "sql",
        }
    }
}

/// Raw reply of the node status endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeStat {
    /// Process and membership section.
    pub cluster: StatCluster,

    /// Recovery section, absent once the node finished loading.
    pub recovery: Option<StatRecovery>,
}

impl NodeStat {
    /// Recovery progress in `[0, 1]`, defaulting to 1 when unreported.
    #[must_use]
    pub fn recovery_progress_rate(&self) -> f64 {
        self.recovery
            .as_ref()
            .and_then(|recovery| recovery.progress_rate)
            .unwrap_or(1.0)
    }
}

/// Process and membership fields of a status reply.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StatCluster {
    /// Raw process state (`ACTIVE`, `INACTIVE`, `NORMAL_SHUTDOWN`, ...).
    pub node_status: String,

    /// Raw membership state (`MASTER`, `FOLLOWER`, `SUB_CLUSTER`, ...).
    pub cluster_status: String,

    /// Topology size the node believes it belongs to.
    pub designated_count: u32,

    /// Active members as seen by a master.
    pub active_count: u32,

    /// Name of the cluster the node believes it joined; empty when none.
    pub cluster_name: String,

    /// The node's view of the current master.
    pub master: Option<NodeIdentity>,

    /// Present once the node has formed or joined a cluster since boot.
    pub initial_cluster: Option<InitialCluster>,
}

/// Marker block describing the first cluster a node formed after boot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InitialCluster {
    /// Name of the cluster at formation time.
    pub cluster_name: Option<String>,

    /// Designated count at formation time.
    pub designated_count: Option<u32>,
}

/// Recovery fields of a status reply.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StatRecovery {
    /// Fraction of the on-disk state replayed so far.
    pub progress_rate: Option<f64>,
}

/// Membership view of a master (or provisional sub-master).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Followers the node currently tracks.
    #[serde(rename = "follower")]
    pub followers: Vec<NodeIdentity>,
}

/// One row of a node's partition ownership table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionEntry {
    /// Partition number.
    #[serde(rename = "pId")]
    pub partition_id: u32,

    /// Current owner, if any node holds it.
    #[serde(default)]
    pub owner: Option<NodeIdentity>,

    /// Nodes holding backups.
    #[serde(default, rename = "backup")]
    pub backups: Vec<NodeIdentity>,
}
