//! Process assembly: backends, pool, managers, dispatchers, and the RPC
//! listener, started and stopped in order.

use std::future::Future;
use std::sync::Arc;

use netplane_core::{CatalogBackend, ControllerBackend, Directory};
use tracing::info;

use crate::backend::{HttpCatalog, HttpController, HttpDirectory};
use crate::config::{BackendConfig, BusConfig, PoolConfig};
use crate::dispatcher::handlers::{APPLICATION_EVENTS_TOPIC, NETWORK_OPS_TOPIC};
use crate::dispatcher::{
    channel, ApplicationEventsHandler, Dispatcher, DispatcherHandle, NetworkOpsHandler,
};
use crate::manager::{AppNetworkManager, NamingManager, NetworkManager};
use crate::network::{HttpConfig, NetworkModule, Services};
use crate::pool::{ClusterGateway, ClusterPool, ConnectionPool, HttpConnectionFactory};
use crate::worker::{BackgroundWorker, ClusterRefresher};

/// The three systems of record every manager talks to.
#[derive(Clone)]
pub struct Backends {
    pub controller: Arc<dyn ControllerBackend>,
    pub catalog: Arc<dyn CatalogBackend>,
    pub directory: Arc<dyn Directory>,
}

impl Backends {
    /// HTTP adapters sharing one client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn http(config: &BackendConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            controller: Arc::new(HttpController::new(
                client.clone(),
                config.controller_url.clone(),
                config.controller_token.clone(),
            )),
            catalog: Arc::new(HttpCatalog::new(
                client.clone(),
                config.catalog_url.clone(),
                config.catalog_node.clone(),
                config.catalog_agent_port,
            )),
            directory: Arc::new(HttpDirectory::new(client, config.directory_url.clone())),
        })
    }
}

/// The production cluster pool.
#[must_use]
pub fn cluster_pool(config: &PoolConfig) -> ClusterPool {
    ConnectionPool::new(
        HttpConnectionFactory::new(config.tls.clone(), config.connect_timeout),
        config.cluster_api_port,
    )
}

/// A fully wired service, not yet listening.
pub struct Application {
    network: NetworkModule,
    dispatchers: Vec<DispatcherHandle>,
    refresher: Option<BackgroundWorker<ClusterRefresher>>,
}

impl Application {
    /// Wires managers and dispatchers over `backends` and `pool`.
    ///
    /// With an organization configured the cluster map is refreshed once
    /// before returning and then on `pool_config.refresh_interval`. A failed
    /// first refresh is logged and retried on schedule.
    pub async fn assemble(
        backends: Backends,
        pool: Arc<dyn ClusterGateway>,
        http: HttpConfig,
        pool_config: &PoolConfig,
        bus: &BusConfig,
    ) -> Self {
        let Backends {
            controller,
            catalog,
            directory,
        } = backends;

        let refresher = match &pool_config.organization_id {
            Some(organization_id) => {
                let refresher =
                    ClusterRefresher::new(organization_id.clone(), pool.clone(), directory.clone());
                refresher.refresh().await;
                Some(BackgroundWorker::start(refresher, pool_config.refresh_interval))
            }
            None => {
                info!("no organization configured, cluster refresh disabled");
                None
            }
        };

        let network = Arc::new(NetworkManager::new(controller.clone(), directory.clone()));
        let naming = Arc::new(NamingManager::new(catalog.clone(), directory.clone()));
        let appnet = Arc::new(AppNetworkManager::new(
            controller,
            catalog,
            directory,
            pool.clone(),
        ));

        let (network_ops, ops_source) = channel(NETWORK_OPS_TOPIC, bus.capacity, bus.batch_size);
        let (application_events, events_source) =
            channel(APPLICATION_EVENTS_TOPIC, bus.capacity, bus.batch_size);

        let dispatchers = vec![
            Dispatcher::new(
                Arc::new(NetworkOpsHandler::new(
                    network.clone(),
                    naming.clone(),
                    appnet.clone(),
                )),
                bus.dispatcher.clone(),
            )
            .start(ops_source),
            Dispatcher::new(
                Arc::new(ApplicationEventsHandler::new(appnet.clone())),
                bus.dispatcher.clone(),
            )
            .start(events_source),
        ];

        let services = Services {
            network,
            naming,
            appnet,
            network_ops,
            application_events,
            pool,
        };

        Self {
            network: NetworkModule::new(http, services),
            dispatchers,
            refresher,
        }
    }

    /// Binds the RPC listener; returns the bound port.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        self.network.start().await
    }

    /// Serves until `shutdown` resolves, then drains HTTP, stops the
    /// dispatchers, and stops the refresher.
    ///
    /// # Errors
    ///
    /// Returns the server error. Dispatchers and the refresher are stopped
    /// in either case.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let Self {
            network,
            dispatchers,
            refresher,
        } = self;

        let served = network.serve(shutdown).await;

        for dispatcher in dispatchers {
            dispatcher.shutdown().await;
        }
        if let Some(mut refresher) = refresher {
            refresher.stop().await;
        }
        served
    }
}
