//! RPC handlers and the shared state they extract.
//!
//! Handlers are thin: decode, call one manager operation, encode. All
//! validation and backend access lives in the managers.

pub mod appnet;
pub mod bus;
pub mod error;
pub mod health;
pub mod naming;
pub mod networks;

pub use error::{ApiError, ApiResult};
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use super::{HttpConfig, ShutdownController};
use crate::dispatcher::ChannelPublisher;
use crate::manager::{AppNetworkManager, NamingManager, NetworkManager};
use crate::pool::ClusterGateway;

/// Everything the RPC surface calls into.
#[derive(Clone)]
pub struct Services {
    pub network: Arc<NetworkManager>,
    pub naming: Arc<NamingManager>,
    pub appnet: Arc<AppNetworkManager>,
    /// Feeds the network-operations dispatcher.
    pub network_ops: ChannelPublisher,
    /// Feeds the application-events dispatcher.
    pub application_events: ChannelPublisher,
    pub pool: Arc<dyn ClusterGateway>,
}

/// Shared application state passed to all axum handlers via `State`.
///
/// Holds `Arc`s only, so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    pub services: Arc<Services>,
    pub shutdown: Arc<ShutdownController>,
    pub config: Arc<HttpConfig>,
    /// Process start time, used for uptime.
    pub start_time: Instant,
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Instant;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use axum::Router;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::{AppState, Services};
    use crate::backend::memory::{MemoryCatalog, MemoryController, MemoryDirectory};
    use crate::dispatcher::{channel, ChannelSource};
    use crate::manager::{AppNetworkManager, NamingManager, NetworkManager};
    use crate::network::module::build_router;
    use crate::network::{HttpConfig, ShutdownController};
    use crate::pool::gateway::recording::RecordingFactory;
    use crate::pool::ConnectionPool;

    /// A router over in-memory backends, with handles to inspect them.
    pub(crate) struct TestApi {
        pub(crate) router: Router,
        pub(crate) state: AppState,
        pub(crate) controller: Arc<MemoryController>,
        pub(crate) catalog: Arc<MemoryCatalog>,
        pub(crate) directory: Arc<MemoryDirectory>,
        pub(crate) network_ops: ChannelSource,
        pub(crate) application_events: ChannelSource,
    }

    impl TestApi {
        pub(crate) fn new() -> Self {
            let controller = Arc::new(MemoryController::new());
            let catalog = Arc::new(MemoryCatalog::new());
            let directory = Arc::new(MemoryDirectory::new());
            directory.add_organization("o1");
            let pool = Arc::new(ConnectionPool::new(RecordingFactory::default(), 443));
            let (ops_publisher, network_ops) = channel("network-ops", 16, 16);
            let (events_publisher, application_events) = channel("application-events", 16, 16);

            let services = Services {
                network: Arc::new(NetworkManager::new(controller.clone(), directory.clone())),
                naming: Arc::new(NamingManager::new(catalog.clone(), directory.clone())),
                appnet: Arc::new(AppNetworkManager::new(
                    controller.clone(),
                    catalog.clone(),
                    directory.clone(),
                    pool.clone(),
                )),
                network_ops: ops_publisher,
                application_events: events_publisher,
                pool,
            };
            let state = AppState {
                services: Arc::new(services),
                shutdown: Arc::new(ShutdownController::new()),
                config: Arc::new(HttpConfig::default()),
                start_time: Instant::now(),
            };
            state.shutdown.set_ready();

            Self {
                router: build_router(state.clone()),
                state,
                controller,
                catalog,
                directory,
                network_ops,
                application_events,
            }
        }

        /// Sends one request and returns the status and decoded JSON body.
        ///
        /// An empty response body decodes as `Value::Null`.
        pub(crate) async fn call(
            &self,
            method: Method,
            uri: &str,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let request = Request::builder().method(method).uri(uri);
            let request = match body {
                Some(json) => request
                    .header("content-type", "application/json")
                    .body(Body::from(json.to_string())),
                None => request.body(Body::empty()),
            }
            .unwrap();

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let json = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, json)
        }

        pub(crate) async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
            self.call(Method::POST, uri, Some(body)).await
        }

        pub(crate) async fn get(&self, uri: &str) -> (StatusCode, Value) {
            self.call(Method::GET, uri, None).await
        }
    }
}
