use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// An overlay network owned by an organization.
///
/// Identity is the pair (`organization_id`, `network_id`). The controller is
/// the only source of truth; nothing here is cached locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub organization_id: String,
    pub network_id: String,
    pub name: String,
    /// Creation time reported by the controller, in milliseconds since epoch.
    pub creation_timestamp: i64,
}

/// A per-tenant name record in the service catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsEntry {
    pub organization_id: String,
    pub fqdn: String,
    pub ip: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Discriminates catalog records created by different managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Dns,
    InboundProxy,
}

impl ServiceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dns => "dns",
            Self::InboundProxy => "inbound_proxy",
        }
    }

    /// Parses the value stored in catalog metadata.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "dns" => Some(Self::Dns),
            "inbound_proxy" => Some(Self::InboundProxy),
            _ => None,
        }
    }
}

/// Registration request handed to a catalog backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRegistration {
    /// Catalog service id. Tenant entries use [`catalog_service_id`].
    pub id: String,
    /// Service name, i.e. the fqdn.
    pub name: String,
    pub address: String,
    pub tags: Vec<String>,
    pub kind: ServiceKind,
}

/// A registered catalog instance as reported by a catalog backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub address: String,
    pub tags: Vec<String>,
    pub kind: Option<ServiceKind>,
    /// Catalog node hosting the instance.
    pub node: String,
    /// Address of that node's agent.
    pub node_address: String,
}

/// Derives the catalog id of a tenant-scoped entry as
/// `"<kind>:<organization>:<fqdn>"`.
///
/// Kinds and fqdns never contain `:`, so the id splits back unambiguously
/// and entries of different kinds or organizations never share an id.
#[must_use]
pub fn catalog_service_id(kind: ServiceKind, organization_id: &str, fqdn: &str) -> String {
    format!("{}:{organization_id}:{fqdn}", kind.as_str())
}

/// Returns `true` when `entry_tags` contains every tag in `requested`.
///
/// An empty request matches everything; callers must guard against that
/// when a tag filter is meant to narrow a deletion.
#[must_use]
pub fn tags_superset<S: AsRef<str>>(entry_tags: &[S], requested: &[S]) -> bool {
    let have: HashSet<&str> = entry_tags.iter().map(AsRef::as_ref).collect();
    requested.iter().all(|t| have.contains(t.as_ref()))
}

/// Lifecycle status of a cluster as reported by the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    Online,
    OnlineCordon,
    Offline,
    Unknown,
}

/// Directory view of one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    pub organization_id: String,
    pub cluster_id: String,
    pub hostname: String,
    pub status: ClusterStatus,
    #[serde(default)]
    pub cordon: bool,
}

impl ClusterInfo {
    /// Online clusters are candidates for the cluster map.
    #[must_use]
    pub fn is_online(&self) -> bool {
        matches!(self.status, ClusterStatus::Online | ClusterStatus::OnlineCordon)
    }

    #[must_use]
    pub fn is_cordoned(&self) -> bool {
        self.cordon || self.status == ClusterStatus::OnlineCordon
    }
}

/// Proxy record stored in the directory when an inbound proxy registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundProxyRecord {
    pub organization_id: String,
    pub app_instance_id: String,
    pub service_group_id: String,
    pub service_id: String,
    pub cluster_id: String,
    pub fqdn: String,
    pub ip: String,
}

/// An application-network connection as recorded in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub organization_id: String,
    pub source_instance_id: String,
    pub target_instance_id: String,
    pub inbound_name: String,
    pub outbound_name: String,
    /// Overlay network carrying the connection's traffic.
    pub network_id: String,
    /// Clusters hosting either end of the connection.
    #[serde(default)]
    pub cluster_ids: Vec<String>,
}

/// Deployment status of a service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Scheduled,
    Waiting,
    Deploying,
    Running,
    Error,
    Terminating,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superset_matching() {
        let entry = ["o1", "app-1", "svc"];
        assert!(tags_superset(&entry, &["o1"]));
        assert!(tags_superset(&entry, &["svc", "o1"]));
        assert!(!tags_superset(&entry, &["o1", "other"]));
        assert!(tags_superset(&entry, &[]));
        assert!(!tags_superset::<&str>(&[], &["o1"]));
    }

    #[test]
    fn catalog_id_is_qualified_by_kind_and_organization() {
        assert_eq!(
            catalog_service_id(ServiceKind::Dns, "o1", "svc.local"),
            "dns:o1:svc.local"
        );
        assert_ne!(
            catalog_service_id(ServiceKind::Dns, "o1", "svc.local"),
            catalog_service_id(ServiceKind::Dns, "o2", "svc.local")
        );
        assert_ne!(
            catalog_service_id(ServiceKind::Dns, "o1", "svc.local"),
            catalog_service_id(ServiceKind::InboundProxy, "o1", "svc.local")
        );
    }

    #[test]
    fn catalog_ids_do_not_collide_across_organizations() {
        assert_ne!(
            catalog_service_id(ServiceKind::Dns, "o1", "a-b.local"),
            catalog_service_id(ServiceKind::Dns, "o1-a", "b.local")
        );
        assert_ne!(
            catalog_service_id(ServiceKind::Dns, "o1", "a.b.local"),
            catalog_service_id(ServiceKind::Dns, "o1.a", "b.local")
        );
    }

    #[test]
    fn service_kind_round_trips_through_metadata_string() {
        for kind in [ServiceKind::Dns, ServiceKind::InboundProxy] {
            assert_eq!(ServiceKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ServiceKind::parse("gateway"), None);
    }

    #[test]
    fn cordon_is_read_from_flag_or_status() {
        let mut cluster = ClusterInfo {
            organization_id: "o1".to_string(),
            cluster_id: "c1".to_string(),
            hostname: "c1.example.com".to_string(),
            status: ClusterStatus::Online,
            cordon: false,
        };
        assert!(cluster.is_online());
        assert!(!cluster.is_cordoned());

        cluster.cordon = true;
        assert!(cluster.is_cordoned());

        cluster.cordon = false;
        cluster.status = ClusterStatus::OnlineCordon;
        assert!(cluster.is_online());
        assert!(cluster.is_cordoned());

        cluster.status = ClusterStatus::Offline;
        assert!(!cluster.is_online());
    }

    #[test]
    fn cluster_info_deserializes_without_cordon_field() {
        let cluster: ClusterInfo = serde_json::from_str(
            r#"{"organizationId":"o1","clusterId":"c1","hostname":"h","status":"online"}"#,
        )
        .unwrap();
        assert!(!cluster.cordon);
    }
}
