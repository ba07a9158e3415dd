//! Service-catalog adapter speaking the Consul-style HTTP API.
//!
//! Registrations go through the catalog endpoint on a fixed node. Tag-based
//! deletion runs in two phases: collect every matching instance from the
//! catalog, then deregister each one through the agent of the node hosting
//! it, over a short-lived client.

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::future::try_join_all;
use netplane_core::{
    tags_superset, CatalogBackend, CatalogEntry, CatalogRegistration, ServiceError, ServiceKind,
    ServiceResult,
};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::http::{endpoint, endpoint_segments, parse_base_url, send_empty, send_json};

const KIND_META_KEY: &str = "kind";

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    #[serde(rename = "Node")]
    node: &'a str,
    #[serde(rename = "Address")]
    address: &'a str,
    #[serde(rename = "Service")]
    service: ServiceDefinition<'a>,
}

#[derive(Debug, Serialize)]
struct ServiceDefinition<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    #[serde(rename = "Service")]
    service: &'a str,
    #[serde(rename = "Address")]
    address: &'a str,
    #[serde(rename = "Tags")]
    tags: &'a [String],
    #[serde(rename = "Meta")]
    meta: HashMap<&'static str, &'static str>,
}

#[derive(Debug, Serialize)]
struct DeregisterRequest<'a> {
    #[serde(rename = "Node")]
    node: &'a str,
    #[serde(rename = "ServiceID")]
    service_id: &'a str,
}

/// One instance as returned by `GET /v1/catalog/service/{name}`.
#[derive(Debug, Clone, Deserialize)]
struct CatalogService {
    #[serde(rename = "Node", default)]
    node: String,
    #[serde(rename = "Address", default)]
    node_address: String,
    #[serde(rename = "ServiceID")]
    service_id: String,
    #[serde(rename = "ServiceName")]
    service_name: String,
    #[serde(rename = "ServiceAddress", default)]
    service_address: String,
    #[serde(rename = "ServiceTags", default)]
    service_tags: Option<Vec<String>>,
    #[serde(rename = "ServiceMeta", default)]
    service_meta: Option<HashMap<String, String>>,
}

impl CatalogService {
    fn kind(&self) -> Option<ServiceKind> {
        self.service_meta
            .as_ref()
            .and_then(|m| m.get(KIND_META_KEY))
            .and_then(|k| ServiceKind::parse(k))
    }

    fn into_entry(self) -> CatalogEntry {
        let kind = self.kind();
        CatalogEntry {
            id: self.service_id,
            name: self.service_name,
            address: self.service_address,
            tags: self.service_tags.unwrap_or_default(),
            kind,
            node: self.node,
            node_address: self.node_address,
        }
    }
}

/// Client for one node agent, opened for a single deletion sweep.
#[derive(Debug)]
struct NodeAgentClient {
    client: Client,
    base_url: Url,
}

impl NodeAgentClient {
    fn open(scheme: &str, node_address: &str, port: u16) -> ServiceResult<Self> {
        let base_url = parse_base_url(&format!("{scheme}://{node_address}:{port}"))?;
        let client = Client::builder()
            .build()
            .map_err(|e| ServiceError::internal(format!("agent client for {node_address}: {e}")))?;
        Ok(Self { client, base_url })
    }

    async fn deregister(&self, service_id: &str) -> ServiceResult<()> {
        let url = endpoint_segments(
            &self.base_url,
            &["v1", "agent", "service", "deregister", service_id],
        )?;
        send_empty(
            self.client.put(url),
            &format!("agent deregister {service_id}"),
        )
        .await
    }

    /// Releases the client. The release is the drop of `self`, which closes
    /// the pooled connections to the agent.
    fn close(self) {
        debug!(agent = %self.base_url, "closing node agent client");
    }
}

/// [`CatalogBackend`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    client: Client,
    base_url: Url,
    node: String,
    node_address: String,
    agent_port: u16,
}

impl HttpCatalog {
    /// `node` is the catalog node registrations are attached to; its address
    /// is taken from the catalog URL host.
    #[must_use]
    pub fn new(client: Client, base_url: Url, node: impl Into<String>, agent_port: u16) -> Self {
        let node_address = base_url.host_str().unwrap_or("127.0.0.1").to_string();
        Self {
            client,
            base_url,
            node: node.into(),
            node_address,
            agent_port,
        }
    }

    async fn service_names(&self) -> ServiceResult<HashMap<String, Vec<String>>> {
        let url = endpoint(&self.base_url, "v1/catalog/services")?;
        send_json(self.client.get(url), "GET catalog services").await
    }

    async fn instances(&self, name: &str) -> ServiceResult<Vec<CatalogService>> {
        let url = endpoint_segments(&self.base_url, &["v1", "catalog", "service", name])?;
        send_json(self.client.get(url), &format!("GET catalog service {name}")).await
    }

    /// Instances of every service whose name matches `keep`.
    async fn collect_instances(
        &self,
        keep: impl Fn(&[String]) -> bool,
    ) -> ServiceResult<Vec<CatalogService>> {
        let names = self.service_names().await?;
        let wanted: Vec<&String> = names
            .iter()
            .filter(|(_, tags)| keep(tags))
            .map(|(name, _)| name)
            .collect();
        let per_name = try_join_all(wanted.into_iter().map(|n| self.instances(n))).await?;
        Ok(per_name.into_iter().flatten().collect())
    }

    async fn delete_by_tags(&self, tags: &[String]) -> ServiceResult<usize> {
        // The per-name tag list is the union over its instances, so it is a
        // sound prefilter before checking each instance.
        let matching: Vec<CatalogService> = self
            .collect_instances(|union| tags_superset(union, tags))
            .await?
            .into_iter()
            .filter(|s| tags_superset(s.service_tags.as_deref().unwrap_or_default(), tags))
            .collect();

        let scheme = self.base_url.scheme().to_string();
        let mut removed = 0;
        for instance in &matching {
            let agent = NodeAgentClient::open(&scheme, &instance.node_address, self.agent_port)?;
            let result = agent.deregister(&instance.service_id).await;
            agent.close();
            result?;
            removed += 1;
        }
        info!(removed, ?tags, "catalog instances deregistered by tags");
        Ok(removed)
    }
}

#[async_trait]
impl CatalogBackend for HttpCatalog {
    async fn add(&self, registration: CatalogRegistration) -> ServiceResult<()> {
        let url = endpoint(&self.base_url, "v1/catalog/register")?;
        let body = RegisterRequest {
            node: &self.node,
            address: &self.node_address,
            service: ServiceDefinition {
                id: &registration.id,
                service: &registration.name,
                address: &registration.address,
                tags: &registration.tags,
                meta: HashMap::from([(KIND_META_KEY, registration.kind.as_str())]),
            },
        };
        send_empty(
            self.client.put(url).json(&body),
            &format!("register {}", registration.id),
        )
        .await?;
        debug!(id = %registration.id, kind = registration.kind.as_str(), "catalog instance registered");
        Ok(())
    }

    async fn delete(&self, id: Option<&str>, tags: &[String]) -> ServiceResult<usize> {
        if !tags.is_empty() {
            return self.delete_by_tags(tags).await;
        }
        let id = id
            .ok_or_else(|| ServiceError::invalid_argument("catalog delete needs an id or tags"))?;
        let url = endpoint(&self.base_url, "v1/catalog/deregister")?;
        send_empty(
            self.client.put(url).json(&DeregisterRequest {
                node: &self.node,
                service_id: id,
            }),
            &format!("deregister {id}"),
        )
        .await?;
        debug!(id, "catalog instance deregistered");
        Ok(1)
    }

    async fn list(&self, kind: ServiceKind) -> ServiceResult<Vec<CatalogEntry>> {
        Ok(self
            .collect_instances(|_| true)
            .await?
            .into_iter()
            .filter(|s| s.kind() == Some(kind))
            .map(CatalogService::into_entry)
            .collect())
    }
}
