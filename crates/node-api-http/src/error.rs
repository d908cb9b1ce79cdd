use gridctl_node_api::{NodeApiError, NodeApiErrorKind};
use reqwest::StatusCode;
use thiserror::Error;

/// Error type for the HTTP node API client.
#[derive(Debug, Error)]
pub enum Error {
    /// The HTTP client could not be constructed.
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    /// The endpoint refused or could not establish the connection.
    #[error("failed to connect to {0}: {1}")]
    Connect(String, #[source] reqwest::Error),

    /// The response body could not be decoded.
    #[error("failed to decode response from {0}: {1}")]
    Decode(String, #[source] reqwest::Error),

    /// Any other transport failure.
    #[error("request to {0} failed: {1}")]
    Request(String, #[source] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("{url} returned {status}: {body}")]
    Status {
        /// Requested URL.
        url: String,

        /// Returned status.
        status: StatusCode,

        /// Response body, for diagnostics.
        body: String,
    },

    /// The request did not complete in time.
    #[error("request to {0} timed out: {1}")]
    Timeout(String, #[source] reqwest::Error),
}

impl Error {
    pub(crate) fn from_transport(url: &str, error: reqwest::Error) -> Self {
        if error.is_connect() {
            Self::Connect(url.to_string(), error)
        } else if error.is_timeout() {
            Self::Timeout(url.to_string(), error)
        } else if error.is_decode() {
            Self::Decode(url.to_string(), error)
        } else {
            Self::Request(url.to_string(), error)
        }
    }
}

impl NodeApiError for Error {
    fn kind(&self) -> NodeApiErrorKind {
        match self {
            Self::Connect(..) | Self::Timeout(..) => NodeApiErrorKind::Connectivity,
            Self::Client(_) | Self::Decode(..) | Self::Request(..) | Self::Status { .. } => {
                NodeApiErrorKind::Protocol
            }
        }
    }
}
