//! `NodeManagementApi` implementation speaking HTTP/JSON to a node's management port.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::time::Duration;

use async_trait::async_trait;
use gridctl_node_api::{
    AddressType, Credentials, HostConfig, NodeEndpoint, NodeManagementApi, NodeStat,
    PartitionEntry,
};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Default time allowed to establish a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time allowed for a whole request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Options for configuring an `HttpNodeApi`.
#[derive(Clone, Debug)]
pub struct HttpNodeApiOptions {
    /// Time allowed to establish a connection before the node counts as down.
    pub connect_timeout: Duration,

    /// Time allowed for a whole request.
    pub request_timeout: Duration,
}

impl Default for HttpNodeApiOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// HTTP client for node management endpoints.
#[derive(Clone, Debug)]
pub struct HttpNodeApi {
    client: Client,
}

impl HttpNodeApi {
    /// Creates a new `HttpNodeApi`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(options: HttpNodeApiOptions) -> Result<Self, Error> {
        let client = Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout)
            .build()
            .map_err(Error::Client)?;

        Ok(Self { client })
    }

    fn url(endpoint: &NodeEndpoint, path: &str) -> String {
        let scheme = if endpoint.tls { "https" } else { "http" };
        let address = &endpoint.identity.address;

        if address.contains(':') {
            format!("{scheme}://[{address}]:{}{path}", endpoint.identity.port)
        } else {
            format!("{scheme}://{address}:{}{path}", endpoint.identity.port)
        }
    }

    async fn send(url: &str, request: RequestBuilder) -> Result<Response, Error> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::from_transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "could not read response body".to_string());

            warn!("{} returned {}: {}", url, status, body);

            return Err(Error::Status {
                url: url.to_string(),
                status,
                body,
            });
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &NodeEndpoint,
        credentials: &Credentials,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, Error> {
        let url = Self::url(endpoint, path);
        debug!("GET {}", url);

        let request = self
            .client
            .get(&url)
            .basic_auth(&credentials.user, Some(&credentials.password))
            .query(query);

        Self::send(&url, request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| Error::from_transport(&url, e))
    }

    async fn post_form(
        &self,
        endpoint: &NodeEndpoint,
        credentials: &Credentials,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<(), Error> {
        let url = Self::url(endpoint, path);
        debug!("POST {}", url);

        let request = self
            .client
            .post(&url)
            .basic_auth(&credentials.user, Some(&credentials.password))
            .form(form);

        Self::send(&url, request).await?;

        Ok(())
    }
}

#[async_trait]
impl NodeManagementApi for HttpNodeApi {
    type Error = Error;

    async fn get_stat(
        &self,
        endpoint: &NodeEndpoint,
        credentials: &Credentials,
        address_type: AddressType,
    ) -> Result<NodeStat, Self::Error> {
        self.get_json(
            endpoint,
            credentials,
            "/node/stat",
            &[("addressType", address_type.as_str())],
        )
        .await
    }

    async fn get_host_config(
        &self,
        endpoint: &NodeEndpoint,
        credentials: &Credentials,
    ) -> Result<HostConfig, Self::Error> {
        self.get_json(endpoint, credentials, "/node/host", &[]).await
    }

    async fn get_partition_table(
        &self,
        endpoint: &NodeEndpoint,
        credentials: &Credentials,
    ) -> Result<Vec<PartitionEntry>, Self::Error> {
        self.get_json(
            endpoint,
            credentials,
            "/node/partition",
            &[("addressType", AddressType::System.as_str())],
        )
        .await
    }

    async fn post_join(
        &self,
        endpoint: &NodeEndpoint,
        credentials: &Credentials,
        cluster_name: &str,
        min_node_count: u32,
    ) -> Result<(), Self::Error> {
        self.post_form(
            endpoint,
            credentials,
            "/node/join",
            &[
                ("clusterName", cluster_name.to_string()),
                ("minNodeNum", min_node_count.to_string()),
            ],
        )
        .await
    }

    async fn post_leave(
        &self,
        endpoint: &NodeEndpoint,
        credentials: &Credentials,
    ) -> Result<(), Self::Error> {
        self.post_form(endpoint, credentials, "/node/leave", &[])
            .await
    }

    async fn post_shutdown(
        &self,
        endpoint: &NodeEndpoint,
        credentials: &Credentials,
        force: bool,
    ) -> Result<(), Self::Error> {
        self.post_form(
            endpoint,
            credentials,
            "/node/shutdown",
            &[("force", force.to_string())],
        )
        .await
    }

    async fn post_cluster_increase(
        &self,
        endpoint: &NodeEndpoint,
        credentials: &Credentials,
    ) -> Result<(), Self::Error> {
        self.post_form(endpoint, credentials, "/node/increase", &[])
            .await
    }

    async fn post_cluster_stop(
        &self,
        endpoint: &NodeEndpoint,
        credentials: &Credentials,
    ) -> Result<(), Self::Error> {
        self.post_form(endpoint, credentials, "/cluster/stop", &[])
            .await
    }
}
