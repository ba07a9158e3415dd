//! Application networking: service proxies and app-to-app connections.
//!
//! A connection gets its own overlay network. The directory keeps the
//! connection record, and every cluster hosting an end of the connection is
//! told to join (or leave) that network through the cluster pool.

use std::fmt;
use std::sync::Arc;

use netplane_core::messages::{
    AddConnectionRequest, InboundServiceProxyRequest, OutboundServiceRequest,
    RemoveConnectionRequest, ServiceStatusUpdate, ZtConnectionRequest,
};
use netplane_core::{
    catalog_service_id, CatalogBackend, CatalogRegistration, ConnectionRecord,
    ControllerBackend, Directory, ErrorKind, ResultExt, ServiceError, ServiceKind, ServiceResult,
    Validate,
};
use serde_json::json;
use tracing::{debug, info, warn};

use super::{ensure_organization, owned_network};
use crate::pool::ClusterGateway;

/// Cluster API path telling a cluster to join a connection network.
pub const JOIN_PATH: &str = "api/v1/appnet/join";
/// Cluster API path telling a cluster to leave a connection network.
pub const LEAVE_PATH: &str = "api/v1/appnet/leave";

fn connection_network_name(source: &str, target: &str, outbound: &str) -> String {
    format!("appnet-{source}-{target}-{outbound}")
}

pub struct AppNetworkManager {
    controller: Arc<dyn ControllerBackend>,
    catalog: Arc<dyn CatalogBackend>,
    directory: Arc<dyn Directory>,
    clusters: Arc<dyn ClusterGateway>,
}

impl fmt::Debug for AppNetworkManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppNetworkManager").finish_non_exhaustive()
    }
}

impl AppNetworkManager {
    #[must_use]
    pub fn new(
        controller: Arc<dyn ControllerBackend>,
        catalog: Arc<dyn CatalogBackend>,
        directory: Arc<dyn Directory>,
        clusters: Arc<dyn ClusterGateway>,
    ) -> Self {
        Self {
            controller,
            catalog,
            directory,
            clusters,
        }
    }

    /// Publishes the proxy in the catalog, then records it in the directory.
    ///
    /// # Errors
    ///
    /// `InvalidArgument`, `NotFound` for an unknown organization, or the
    /// catalog or directory error.
    pub async fn register_inbound_service_proxy(
        &self,
        request: &InboundServiceProxyRequest,
    ) -> ServiceResult<()> {
        request.validate()?;
        ensure_organization(self.directory.as_ref(), &request.organization_id).await?;
        let registration = CatalogRegistration {
            id: catalog_service_id(
                ServiceKind::InboundProxy,
                &request.organization_id,
                &request.fqdn,
            ),
            name: request.fqdn.clone(),
            address: request.ip.clone(),
            tags: vec![
                request.organization_id.clone(),
                request.app_instance_id.clone(),
                request.cluster_id.clone(),
            ],
            kind: ServiceKind::InboundProxy,
        };
        self.catalog
            .add(registration)
            .await
            .with_context(|| format!("registering inbound proxy {}", request.fqdn))?;
        self.directory
            .add_inbound_proxy(request.to_record())
            .await
            .with_context(|| format!("recording inbound proxy {}", request.fqdn))?;
        info!(
            organization_id = %request.organization_id,
            app_instance_id = %request.app_instance_id,
            service_id = %request.service_id,
            fqdn = %request.fqdn,
            "inbound service proxy registered"
        );
        Ok(())
    }

    /// Accepted and validated; outbound proxies need no registration yet.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` or `NotFound` for an unknown organization.
    pub async fn register_outbound_proxy(
        &self,
        request: &OutboundServiceRequest,
    ) -> ServiceResult<()> {
        request.validate()?;
        ensure_organization(self.directory.as_ref(), &request.organization_id).await?;
        debug!(
            organization_id = %request.organization_id,
            app_instance_id = %request.app_instance_id,
            outbound_name = %request.outbound_name,
            "outbound proxy registration accepted without action"
        );
        Ok(())
    }

    /// Creates the connection network, records the connection, and tells
    /// each involved cluster to join.
    ///
    /// Every cluster is attempted even when one fails; the first failure is
    /// returned. The connection stays recorded in that case.
    ///
    /// # Errors
    ///
    /// `InvalidArgument`, `NotFound` for an unknown organization,
    /// `AlreadyExists` for a duplicate connection, or the backend error.
    pub async fn add_connection(
        &self,
        request: &AddConnectionRequest,
    ) -> ServiceResult<ConnectionRecord> {
        request.validate()?;
        let org = &request.organization_id;
        ensure_organization(self.directory.as_ref(), org).await?;

        let name = connection_network_name(
            &request.source_instance_id,
            &request.target_instance_id,
            &request.outbound_name,
        );
        let network = self
            .controller
            .add(&name, org)
            .await
            .with_context(|| format!("creating connection network {name}"))?;

        let record = ConnectionRecord {
            organization_id: org.clone(),
            source_instance_id: request.source_instance_id.clone(),
            target_instance_id: request.target_instance_id.clone(),
            inbound_name: request.inbound_name.clone(),
            outbound_name: request.outbound_name.clone(),
            network_id: network.network_id.clone(),
            cluster_ids: request.cluster_ids.clone(),
        };
        if let Err(e) = self.directory.register_connection(record.clone()).await {
            // Do not leave an orphan network behind.
            if let Err(cleanup) = self.controller.delete(&network.network_id, org).await {
                warn!(
                    network_id = %network.network_id,
                    error = %cleanup,
                    "failed to remove network of unrecorded connection"
                );
            }
            return Err(e.context("recording connection"));
        }

        self.notify_clusters(&record, JOIN_PATH).await?;
        info!(
            organization_id = %org,
            source = %record.source_instance_id,
            target = %record.target_instance_id,
            network_id = %record.network_id,
            clusters = record.cluster_ids.len(),
            "connection added"
        );
        Ok(record)
    }

    /// Reverse of [`add_connection`](Self::add_connection).
    ///
    /// # Errors
    ///
    /// `InvalidArgument`, `NotFound` for an unknown organization or
    /// connection, or the backend error.
    pub async fn remove_connection(&self, request: &RemoveConnectionRequest) -> ServiceResult<()> {
        request.validate()?;
        let org = &request.organization_id;
        ensure_organization(self.directory.as_ref(), org).await?;

        let record = self
            .directory
            .remove_connection(
                org,
                &request.source_instance_id,
                &request.target_instance_id,
                &request.inbound_name,
                &request.outbound_name,
            )
            .await
            .with_context(|| {
                format!(
                    "removing connection {} -> {}",
                    request.source_instance_id, request.target_instance_id
                )
            })?;

        let notified = self.notify_clusters(&record, LEAVE_PATH).await;
        match self.controller.delete(&record.network_id, org).await {
            Ok(()) => {}
            Err(e) if e.is(ErrorKind::NotFound) => {
                debug!(network_id = %record.network_id, "connection network already gone");
            }
            Err(e) => return Err(e.context("deleting connection network")),
        }
        notified?;
        info!(
            organization_id = %org,
            source = %record.source_instance_id,
            target = %record.target_instance_id,
            "connection removed"
        );
        Ok(())
    }

    /// Authorizes a member on an application connection network of the
    /// requesting organization.
    ///
    /// # Errors
    ///
    /// `InvalidArgument`, `NotFound` when the organization or its network
    /// does not exist, or the controller error.
    pub async fn authorize_zt_connection(&self, request: &ZtConnectionRequest) -> ServiceResult<()> {
        request.validate()?;
        ensure_organization(self.directory.as_ref(), &request.organization_id).await?;
        owned_network(
            self.controller.as_ref(),
            &request.organization_id,
            &request.network_id,
        )
        .await?;
        self.controller
            .authorize(&request.network_id, &request.member_id)
            .await
            .with_context(|| {
                format!(
                    "authorizing member {} on connection network {}",
                    request.member_id, request.network_id
                )
            })?;
        info!(
            app_instance_id = %request.app_instance_id,
            network_id = %request.network_id,
            member_id = %request.member_id,
            cluster_id = request.cluster_id.as_deref().unwrap_or("-"),
            "connection member authorized"
        );
        Ok(())
    }

    /// # Errors
    ///
    /// `InvalidArgument` for a malformed request, otherwise always
    /// `Unimplemented`.
    pub async fn register_zt_connection(&self, request: &ZtConnectionRequest) -> ServiceResult<()> {
        request.validate()?;
        Err(ServiceError::unimplemented("connection member registration"))
    }

    /// Forwards a deployment status change to the directory.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` or the directory error.
    pub async fn handle_service_status_update(
        &self,
        update: &ServiceStatusUpdate,
    ) -> ServiceResult<()> {
        update.validate()?;
        self.directory
            .update_service_status(update.clone())
            .await
            .with_context(|| format!("updating status of {}", update.service_instance_id))?;
        debug!(
            service_instance_id = %update.service_instance_id,
            status = ?update.status,
            "service status forwarded"
        );
        Ok(())
    }

    async fn notify_clusters(&self, record: &ConnectionRecord, path: &str) -> ServiceResult<()> {
        let body = json!({
            "organizationId": record.organization_id,
            "networkId": record.network_id,
            "sourceInstanceId": record.source_instance_id,
            "targetInstanceId": record.target_instance_id,
            "inboundName": record.inbound_name,
            "outboundName": record.outbound_name,
        });
        let mut first_error = None;
        for cluster_id in &record.cluster_ids {
            if let Err(e) = self.clusters.notify(cluster_id, path, &body).await {
                warn!(cluster_id = %cluster_id, path, error = %e, "cluster notification failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
