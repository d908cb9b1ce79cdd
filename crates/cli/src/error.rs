use std::path::PathBuf;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Management API client could not be built
    #[error("http client error: {0}")]
    Http(#[from] gridctl_node_api_http::Error),

    /// Invalid `--wait` value
    #[error("invalid wait of {0} seconds, expected -1 or a non-negative number")]
    InvalidWait(i64),

    /// JSON output could not be encoded
    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),

    /// No management credentials in flags, environment or file
    #[error("no management credentials, pass --user and --password or add a [credentials] section")]
    MissingCredentials,

    /// Orchestration error
    #[error(transparent)]
    Orchestrator(#[from] gridctl_orchestrator::Error),

    /// Output could not be written
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),

    /// Config file could not be parsed
    #[error("failed to parse {0}: {1}")]
    ParseConfig(PathBuf, #[source] toml::de::Error),

    /// Config file could not be read
    #[error("failed to read {0}: {1}")]
    ReadConfig(PathBuf, #[source] std::io::Error),
}
