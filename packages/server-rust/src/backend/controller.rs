//! Overlay controller adapter speaking the controller's local JSON API.
//!
//! The controller has no notion of tenants, so the owning organization is
//! folded into the network name as `"<org>/<name>"` and recovered on read.
//!
//! Every operation first asks `/status` for the controller address and fails
//! with `InvalidArgument` unless it is exactly ten characters.

use async_trait::async_trait;
use futures_util::future::join_all;
use netplane_core::{ControllerBackend, ErrorKind, Network, ServiceError, ServiceResult};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::http::{endpoint, endpoint_segments, send_empty, send_json};

const AUTH_HEADER: &str = "X-ZT1-Auth";
const CONTROLLER_ADDRESS_LEN: usize = 10;

#[derive(Debug, Deserialize)]
struct StatusResponse {
    address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ControllerNetwork {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    creation_time: i64,
}

impl ControllerNetwork {
    fn into_network(self) -> Network {
        let (organization_id, name) = split_qualified_name(&self.name);
        Network {
            organization_id: organization_id.to_string(),
            network_id: self.id,
            name: name.to_string(),
            creation_timestamp: self.creation_time,
        }
    }
}

/// Folds the organization into the controller-side network name.
#[must_use]
pub fn qualified_name(organization_id: &str, name: &str) -> String {
    format!("{organization_id}/{name}")
}

/// Splits a controller-side name into `(organization, name)`.
/// Names created outside this service have no organization.
#[must_use]
pub fn split_qualified_name(qualified: &str) -> (&str, &str) {
    qualified.split_once('/').unwrap_or(("", qualified))
}

/// [`ControllerBackend`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpController {
    client: Client,
    base_url: Url,
    token: String,
}

impl HttpController {
    #[must_use]
    pub fn new(client: Client, base_url: Url, token: impl Into<String>) -> Self {
        Self {
            client,
            base_url,
            token: token.into(),
        }
    }

    async fn controller_address(&self) -> ServiceResult<String> {
        let url = endpoint(&self.base_url, "status")?;
        let status: StatusResponse = send_json(
            self.client.get(url).header(AUTH_HEADER, &self.token),
            "GET /status",
        )
        .await?;
        if status.address.len() != CONTROLLER_ADDRESS_LEN {
            return Err(ServiceError::invalid_argument(format!(
                "controller address {:?} is not {CONTROLLER_ADDRESS_LEN} characters",
                status.address
            )));
        }
        Ok(status.address)
    }

    async fn fetch(&self, network_id: &str) -> ServiceResult<ControllerNetwork> {
        let url = endpoint_segments(&self.base_url, &["controller", "network", network_id])?;
        send_json(
            self.client.get(url).header(AUTH_HEADER, &self.token),
            &format!("GET network {network_id}"),
        )
        .await
    }
}

#[async_trait]
impl ControllerBackend for HttpController {
    async fn add(&self, name: &str, organization_id: &str) -> ServiceResult<Network> {
        let address = self.controller_address().await?;
        // A "______" suffix asks the controller to pick a free network number.
        let url = endpoint_segments(
            &self.base_url,
            &["controller", "network", &format!("{address}______")],
        )?;
        let created: ControllerNetwork = send_json(
            self.client
                .post(url)
                .header(AUTH_HEADER, &self.token)
                .json(&json!({ "name": qualified_name(organization_id, name) })),
            "POST network",
        )
        .await?;
        info!(network_id = %created.id, organization_id, "overlay network created");
        Ok(created.into_network())
    }

    async fn get(&self, network_id: &str) -> ServiceResult<Network> {
        self.controller_address().await?;
        self.fetch(network_id).await.map(ControllerNetwork::into_network)
    }

    async fn delete(&self, network_id: &str, organization_id: &str) -> ServiceResult<()> {
        self.controller_address().await?;
        let network = self.fetch(network_id).await?.into_network();
        if network.organization_id != organization_id {
            return Err(ServiceError::not_found(format!(
                "network {network_id} of organization {organization_id}"
            )));
        }
        let url = endpoint_segments(&self.base_url, &["controller", "network", network_id])?;
        send_empty(
            self.client.delete(url).header(AUTH_HEADER, &self.token),
            &format!("DELETE network {network_id}"),
        )
        .await?;
        info!(network_id, organization_id, "overlay network deleted");
        Ok(())
    }

    async fn authorize(&self, network_id: &str, member_id: &str) -> ServiceResult<()> {
        self.controller_address().await?;
        let url = endpoint_segments(
            &self.base_url,
            &["controller", "network", network_id, "member", member_id],
        )?;
        send_empty(
            self.client
                .post(url)
                .header(AUTH_HEADER, &self.token)
                .json(&json!({ "authorized": true })),
            &format!("POST member {member_id} of {network_id}"),
        )
        .await?;
        debug!(network_id, member_id, "member authorized");
        Ok(())
    }

    async fn list(&self, organization_id: &str) -> ServiceResult<Vec<Network>> {
        self.controller_address().await?;
        let url = endpoint(&self.base_url, "controller/network")?;
        let ids: Vec<String> = send_json(
            self.client.get(url).header(AUTH_HEADER, &self.token),
            "GET networks",
        )
        .await?;

        let fetched = join_all(ids.iter().map(|id| self.fetch(id))).await;
        let mut networks = Vec::new();
        for result in fetched {
            match result {
                Ok(n) => {
                    let network = n.into_network();
                    if network.organization_id == organization_id {
                        networks.push(network);
                    }
                }
                // Deleted between listing and fetching.
                Err(e) if e.is(ErrorKind::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(networks)
    }
}
