//! Request payloads and the message-bus envelopes that carry them.
//!
//! The same request structs are used by the RPC surface and by the
//! asynchronous topics, so a bus message always carries everything the
//! matching manager call needs. All structs use camelCase on the wire.

use serde::{Deserialize, Serialize};

use crate::types::{InboundProxyRecord, ServiceStatus};

// ---------------------------------------------------------------------------
// Network requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddNetworkRequest {
    pub organization_id: String,
    pub name: String,
}

/// Addresses one network of one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkKey {
    pub organization_id: String,
    pub network_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationKey {
    pub organization_id: String,
}

/// Member (dis)authorization and join requests share this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRequest {
    pub organization_id: String,
    pub network_id: String,
    pub member_id: String,
}

// ---------------------------------------------------------------------------
// Naming requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDnsEntryRequest {
    pub organization_id: String,
    pub fqdn: String,
    pub ip: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Deletes by fqdn when one is given, otherwise by tag set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteDnsEntryRequest {
    pub organization_id: String,
    #[serde(default)]
    pub fqdn: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

// ---------------------------------------------------------------------------
// Application network requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundServiceProxyRequest {
    pub organization_id: String,
    pub app_instance_id: String,
    pub service_group_id: String,
    pub service_id: String,
    pub cluster_id: String,
    pub fqdn: String,
    pub ip: String,
}

impl InboundServiceProxyRequest {
    #[must_use]
    pub fn to_record(&self) -> InboundProxyRecord {
        InboundProxyRecord {
            organization_id: self.organization_id.clone(),
            app_instance_id: self.app_instance_id.clone(),
            service_group_id: self.service_group_id.clone(),
            service_id: self.service_id.clone(),
            cluster_id: self.cluster_id.clone(),
            fqdn: self.fqdn.clone(),
            ip: self.ip.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundServiceRequest {
    pub organization_id: String,
    pub app_instance_id: String,
    pub service_id: String,
    pub outbound_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddConnectionRequest {
    pub organization_id: String,
    pub source_instance_id: String,
    pub target_instance_id: String,
    pub inbound_name: String,
    pub outbound_name: String,
    /// Clusters hosting either end; each is told to join the connection network.
    #[serde(default)]
    pub cluster_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveConnectionRequest {
    pub organization_id: String,
    pub source_instance_id: String,
    pub target_instance_id: String,
    pub inbound_name: String,
    pub outbound_name: String,
}

/// Authorizes or registers a member on an application connection network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZtConnectionRequest {
    pub organization_id: String,
    pub app_instance_id: String,
    pub network_id: String,
    pub member_id: String,
    #[serde(default)]
    pub cluster_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatusUpdate {
    pub organization_id: String,
    pub app_instance_id: String,
    pub service_group_instance_id: String,
    pub service_instance_id: String,
    pub cluster_id: String,
    pub status: ServiceStatus,
}

// ---------------------------------------------------------------------------
// Bus envelopes
// ---------------------------------------------------------------------------

/// A message whose variants are routed to dedicated processing loops.
pub trait KindedMessage: Send + 'static {
    /// Every kind this message type can carry, in a stable order.
    const KINDS: &'static [&'static str];

    /// The kind of this particular message.
    fn kind(&self) -> &'static str;
}

/// Operations published on the network-operations topic.
///
/// Encoded as `{"kind": "...", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum NetworkOperation {
    AuthorizeMember(MemberRequest),
    DisauthorizeMember(MemberRequest),
    AddDnsEntry(AddDnsEntryRequest),
    DeleteDnsEntry(DeleteDnsEntryRequest),
    InboundServiceProxy(InboundServiceProxyRequest),
    OutboundService(OutboundServiceRequest),
    AddConnection(AddConnectionRequest),
    RemoveConnection(RemoveConnectionRequest),
    AuthorizeZtConnection(ZtConnectionRequest),
}

impl KindedMessage for NetworkOperation {
    const KINDS: &'static [&'static str] = &[
        "authorize_member",
        "disauthorize_member",
        "add_dns_entry",
        "delete_dns_entry",
        "inbound_service_proxy",
        "outbound_service",
        "add_connection",
        "remove_connection",
        "authorize_zt_connection",
    ];

    fn kind(&self) -> &'static str {
        match self {
            Self::AuthorizeMember(_) => "authorize_member",
            Self::DisauthorizeMember(_) => "disauthorize_member",
            Self::AddDnsEntry(_) => "add_dns_entry",
            Self::DeleteDnsEntry(_) => "delete_dns_entry",
            Self::InboundServiceProxy(_) => "inbound_service_proxy",
            Self::OutboundService(_) => "outbound_service",
            Self::AddConnection(_) => "add_connection",
            Self::RemoveConnection(_) => "remove_connection",
            Self::AuthorizeZtConnection(_) => "authorize_zt_connection",
        }
    }
}

/// Events published on the application-events topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ApplicationEvent {
    DeploymentServiceStatusUpdate(ServiceStatusUpdate),
}

impl KindedMessage for ApplicationEvent {
    const KINDS: &'static [&'static str] = &["deployment_service_status_update"];

    fn kind(&self) -> &'static str {
        match self {
            Self::DeploymentServiceStatusUpdate(_) => "deployment_service_status_update",
        }
    }
}
