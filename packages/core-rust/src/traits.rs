use async_trait::async_trait;

use crate::error::ServiceResult;
use crate::types::{
    CatalogEntry, CatalogRegistration, ClusterInfo, ConnectionRecord, InboundProxyRecord,
    Network, ServiceKind,
};
use crate::messages::ServiceStatusUpdate;

/// Overlay-network controller contract.
/// Implementations: HTTP controller client, in-memory (tests).
#[async_trait]
pub trait ControllerBackend: Send + Sync {
    /// Create a network owned by `organization_id`.
    async fn add(&self, name: &str, organization_id: &str) -> ServiceResult<Network>;

    /// Fetch a network by its controller id. Unknown ids yield `NotFound`.
    async fn get(&self, network_id: &str) -> ServiceResult<Network>;

    /// Delete a network. Networks owned by another organization yield `NotFound`.
    async fn delete(&self, network_id: &str, organization_id: &str) -> ServiceResult<()>;

    /// Authorize a member to join a network.
    async fn authorize(&self, network_id: &str, member_id: &str) -> ServiceResult<()>;

    /// All networks owned by an organization. Empty, never `NotFound`.
    async fn list(&self, organization_id: &str) -> ServiceResult<Vec<Network>>;
}

/// Service catalog contract.
/// Implementations: HTTP catalog client, in-memory (tests).
#[async_trait]
pub trait CatalogBackend: Send + Sync {
    /// Register (or overwrite) a catalog instance.
    async fn add(&self, registration: CatalogRegistration) -> ServiceResult<()>;

    /// Delete by id when `tags` is empty, otherwise every instance whose tag
    /// set is a superset of `tags`. Returns how many instances were removed.
    async fn delete(&self, id: Option<&str>, tags: &[String]) -> ServiceResult<usize>;

    /// All instances of the given kind.
    async fn list(&self, kind: ServiceKind) -> ServiceResult<Vec<CatalogEntry>>;
}

/// System-model directory: organizations, clusters, and app-network records.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn organization_exists(&self, organization_id: &str) -> ServiceResult<bool>;

    /// All clusters of an organization, whatever their state.
    async fn list_clusters(&self, organization_id: &str) -> ServiceResult<Vec<ClusterInfo>>;

    async fn add_inbound_proxy(&self, record: InboundProxyRecord) -> ServiceResult<()>;

    async fn register_connection(&self, record: ConnectionRecord) -> ServiceResult<()>;

    /// Removes a connection and returns the record that was stored.
    async fn remove_connection(
        &self,
        organization_id: &str,
        source_instance_id: &str,
        target_instance_id: &str,
        inbound_name: &str,
        outbound_name: &str,
    ) -> ServiceResult<ConnectionRecord>;

    async fn update_service_status(&self, update: ServiceStatusUpdate) -> ServiceResult<()>;
}
