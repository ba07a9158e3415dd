//! In-memory providers for tests and local development.
//!
//! Each provider keeps its whole state behind one exclusive lock. Contention
//! is low in tests, so the coarse lock keeps reasoning simple.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use netplane_core::messages::ServiceStatusUpdate;
use netplane_core::{
    tags_superset, CatalogBackend, CatalogEntry, CatalogRegistration, ClusterInfo,
    ConnectionRecord, ControllerBackend, Directory, InboundProxyRecord, Network, ServiceError,
    ServiceKind, ServiceResult,
};
use parking_lot::Mutex;
use rand::Rng;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

// ---------------------------------------------------------------------------
// MemoryController
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ControllerState {
    networks: BTreeMap<String, Network>,
    members: HashMap<String, HashSet<String>>,
    calls: u64,
}

/// Overlay controller keeping networks in a map.
///
/// Network ids follow the controller convention: the 10-character controller
/// address followed by a 6-hex-digit suffix.
#[derive(Debug)]
pub struct MemoryController {
    address: String,
    state: Mutex<ControllerState>,
}

impl MemoryController {
    #[must_use]
    pub fn new() -> Self {
        Self::with_address("8056c2e21c")
    }

    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            state: Mutex::new(ControllerState::default()),
        }
    }

    /// Number of backend calls received, successful or not.
    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.state.lock().calls
    }

    #[must_use]
    pub fn is_authorized(&self, network_id: &str, member_id: &str) -> bool {
        self.state
            .lock()
            .members
            .get(network_id)
            .is_some_and(|m| m.contains(member_id))
    }
}

impl Default for MemoryController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControllerBackend for MemoryController {
    async fn add(&self, name: &str, organization_id: &str) -> ServiceResult<Network> {
        let mut state = self.state.lock();
        state.calls += 1;
        let mut rng = rand::rng();
        let network_id = loop {
            let candidate = format!("{}{:06x}", self.address, rng.random::<u32>() & 0x00ff_ffff);
            if !state.networks.contains_key(&candidate) {
                break candidate;
            }
        };
        let network = Network {
            organization_id: organization_id.to_string(),
            network_id: network_id.clone(),
            name: name.to_string(),
            creation_timestamp: now_millis(),
        };
        state.networks.insert(network_id, network.clone());
        Ok(network)
    }

    async fn get(&self, network_id: &str) -> ServiceResult<Network> {
        let mut state = self.state.lock();
        state.calls += 1;
        state
            .networks
            .get(network_id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("network {network_id}")))
    }

    async fn delete(&self, network_id: &str, organization_id: &str) -> ServiceResult<()> {
        let mut state = self.state.lock();
        state.calls += 1;
        match state.networks.get(network_id) {
            Some(n) if n.organization_id == organization_id => {
                state.networks.remove(network_id);
                state.members.remove(network_id);
                Ok(())
            }
            _ => Err(ServiceError::not_found(format!(
                "network {network_id} of organization {organization_id}"
            ))),
        }
    }

    async fn authorize(&self, network_id: &str, member_id: &str) -> ServiceResult<()> {
        let mut state = self.state.lock();
        state.calls += 1;
        if !state.networks.contains_key(network_id) {
            return Err(ServiceError::not_found(format!("network {network_id}")));
        }
        state
            .members
            .entry(network_id.to_string())
            .or_default()
            .insert(member_id.to_string());
        Ok(())
    }

    async fn list(&self, organization_id: &str) -> ServiceResult<Vec<Network>> {
        let mut state = self.state.lock();
        state.calls += 1;
        Ok(state
            .networks
            .values()
            .filter(|n| n.organization_id == organization_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryCatalog
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CatalogState {
    entries: BTreeMap<String, CatalogEntry>,
    calls: u64,
}

/// Catalog keeping registrations in an ordered map.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: Mutex<CatalogState>,
}

impl MemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.state.lock().calls
    }

    /// Every registered entry, ordered by id.
    #[must_use]
    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.state.lock().entries.values().cloned().collect()
    }
}

#[async_trait]
impl CatalogBackend for MemoryCatalog {
    async fn add(&self, registration: CatalogRegistration) -> ServiceResult<()> {
        let mut state = self.state.lock();
        state.calls += 1;
        state.entries.insert(
            registration.id.clone(),
            CatalogEntry {
                id: registration.id,
                name: registration.name,
                address: registration.address,
                tags: registration.tags,
                kind: Some(registration.kind),
                node: "memory".to_string(),
                node_address: "127.0.0.1".to_string(),
            },
        );
        Ok(())
    }

    async fn delete(&self, id: Option<&str>, tags: &[String]) -> ServiceResult<usize> {
        let mut state = self.state.lock();
        state.calls += 1;
        if tags.is_empty() {
            let id = id.ok_or_else(|| {
                ServiceError::invalid_argument("catalog delete needs an id or tags")
            })?;
            return Ok(usize::from(state.entries.remove(id).is_some()));
        }
        let before = state.entries.len();
        state
            .entries
            .retain(|_, entry| !tags_superset(&entry.tags, tags));
        Ok(before - state.entries.len())
    }

    async fn list(&self, kind: ServiceKind) -> ServiceResult<Vec<CatalogEntry>> {
        let mut state = self.state.lock();
        state.calls += 1;
        Ok(state
            .entries
            .values()
            .filter(|e| e.kind == Some(kind))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryDirectory
// ---------------------------------------------------------------------------

type ConnectionId = (String, String, String, String, String);

#[derive(Debug, Default)]
struct DirectoryState {
    organizations: HashSet<String>,
    clusters: HashMap<String, Vec<ClusterInfo>>,
    fail_cluster_listing: bool,
    inbound_proxies: Vec<InboundProxyRecord>,
    connections: BTreeMap<ConnectionId, ConnectionRecord>,
    status_updates: Vec<ServiceStatusUpdate>,
}

/// Directory holding organizations, clusters, and app-network records.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    state: Mutex<DirectoryState>,
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_organization(&self, organization_id: &str) {
        self.state
            .lock()
            .organizations
            .insert(organization_id.to_string());
    }

    pub fn set_clusters(&self, organization_id: &str, clusters: Vec<ClusterInfo>) {
        self.state
            .lock()
            .clusters
            .insert(organization_id.to_string(), clusters);
    }

    /// Makes `list_clusters` fail until reset.
    pub fn fail_cluster_listing(&self, fail: bool) {
        self.state.lock().fail_cluster_listing = fail;
    }

    #[must_use]
    pub fn inbound_proxies(&self) -> Vec<InboundProxyRecord> {
        self.state.lock().inbound_proxies.clone()
    }

    #[must_use]
    pub fn connections(&self) -> Vec<ConnectionRecord> {
        self.state.lock().connections.values().cloned().collect()
    }

    #[must_use]
    pub fn status_updates(&self) -> Vec<ServiceStatusUpdate> {
        self.state.lock().status_updates.clone()
    }
}

fn connection_id(
    organization_id: &str,
    source: &str,
    target: &str,
    inbound: &str,
    outbound: &str,
) -> ConnectionId {
    (
        organization_id.to_string(),
        source.to_string(),
        target.to_string(),
        inbound.to_string(),
        outbound.to_string(),
    )
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn organization_exists(&self, organization_id: &str) -> ServiceResult<bool> {
        Ok(self.state.lock().organizations.contains(organization_id))
    }

    async fn list_clusters(&self, organization_id: &str) -> ServiceResult<Vec<ClusterInfo>> {
        let state = self.state.lock();
        if state.fail_cluster_listing {
            return Err(ServiceError::internal("directory unavailable"));
        }
        Ok(state
            .clusters
            .get(organization_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_inbound_proxy(&self, record: InboundProxyRecord) -> ServiceResult<()> {
        self.state.lock().inbound_proxies.push(record);
        Ok(())
    }

    async fn register_connection(&self, record: ConnectionRecord) -> ServiceResult<()> {
        let id = connection_id(
            &record.organization_id,
            &record.source_instance_id,
            &record.target_instance_id,
            &record.inbound_name,
            &record.outbound_name,
        );
        let mut state = self.state.lock();
        if state.connections.contains_key(&id) {
            return Err(ServiceError::already_exists(format!(
                "connection {} -> {}",
                record.source_instance_id, record.target_instance_id
            )));
        }
        state.connections.insert(id, record);
        Ok(())
    }

    async fn remove_connection(
        &self,
        organization_id: &str,
        source_instance_id: &str,
        target_instance_id: &str,
        inbound_name: &str,
        outbound_name: &str,
    ) -> ServiceResult<ConnectionRecord> {
        let id = connection_id(
            organization_id,
            source_instance_id,
            target_instance_id,
            inbound_name,
            outbound_name,
        );
        self.state.lock().connections.remove(&id).ok_or_else(|| {
            ServiceError::not_found(format!(
                "connection {source_instance_id} -> {target_instance_id}"
            ))
        })
    }

    async fn update_service_status(&self, update: ServiceStatusUpdate) -> ServiceResult<()> {
        self.state.lock().status_updates.push(update);
        Ok(())
    }
}
