//! Topic handlers mapping bus messages onto manager calls.

use std::sync::Arc;

use async_trait::async_trait;
use netplane_core::{ApplicationEvent, NetworkOperation, ServiceResult};

use super::MessageHandler;
use crate::manager::{AppNetworkManager, NamingManager, NetworkManager};

pub const NETWORK_OPS_TOPIC: &str = "network-ops";
pub const APPLICATION_EVENTS_TOPIC: &str = "application-events";

/// Handler of the network-operations topic.
#[derive(Debug, Clone)]
pub struct NetworkOpsHandler {
    network: Arc<NetworkManager>,
    naming: Arc<NamingManager>,
    appnet: Arc<AppNetworkManager>,
}

impl NetworkOpsHandler {
    #[must_use]
    pub fn new(
        network: Arc<NetworkManager>,
        naming: Arc<NamingManager>,
        appnet: Arc<AppNetworkManager>,
    ) -> Self {
        Self {
            network,
            naming,
            appnet,
        }
    }
}

#[async_trait]
impl MessageHandler for NetworkOpsHandler {
    type Message = NetworkOperation;

    fn topic(&self) -> &'static str {
        NETWORK_OPS_TOPIC
    }

    async fn handle(&self, message: NetworkOperation) -> ServiceResult<()> {
        match message {
            NetworkOperation::AuthorizeMember(r) => self.network.authorize_member(&r).await,
            NetworkOperation::DisauthorizeMember(r) => self.network.disauthorize_member(&r).await,
            NetworkOperation::AddDnsEntry(r) => self.naming.add_entry(&r).await,
            NetworkOperation::DeleteDnsEntry(r) => self.naming.delete_entry(&r).await.map(drop),
            NetworkOperation::InboundServiceProxy(r) => {
                self.appnet.register_inbound_service_proxy(&r).await
            }
            NetworkOperation::OutboundService(r) => self.appnet.register_outbound_proxy(&r).await,
            NetworkOperation::AddConnection(r) => self.appnet.add_connection(&r).await.map(drop),
            NetworkOperation::RemoveConnection(r) => self.appnet.remove_connection(&r).await,
            NetworkOperation::AuthorizeZtConnection(r) => {
                self.appnet.authorize_zt_connection(&r).await
            }
        }
    }
}

/// Handler of the application-events topic.
#[derive(Debug, Clone)]
pub struct ApplicationEventsHandler {
    appnet: Arc<AppNetworkManager>,
}

impl ApplicationEventsHandler {
    #[must_use]
    pub fn new(appnet: Arc<AppNetworkManager>) -> Self {
        Self { appnet }
    }
}

#[async_trait]
impl MessageHandler for ApplicationEventsHandler {
    type Message = ApplicationEvent;

    fn topic(&self) -> &'static str {
        APPLICATION_EVENTS_TOPIC
    }

    async fn handle(&self, message: ApplicationEvent) -> ServiceResult<()> {
        match message {
            ApplicationEvent::DeploymentServiceStatusUpdate(update) => {
                self.appnet.handle_service_status_update(&update).await
            }
        }
    }
}
