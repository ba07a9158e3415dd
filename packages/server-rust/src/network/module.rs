//! RPC listener with deferred startup.
//!
//! `new()` allocates shared state, `start()` binds the TCP listener, and
//! `serve()` accepts connections until shutdown. The split lets `main` wire
//! the dispatchers between binding and serving.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::HttpConfig;
use super::handlers::{
    appnet, bus, health_handler, liveness_handler, naming, networks, readiness_handler, AppState,
    Services,
};
use super::middleware::{build_http_layers, track_in_flight};
use super::shutdown::ShutdownController;

/// Assembles every route and the middleware stack over `state`.
///
/// Health routes stay outside the in-flight tracking so health checks answer
/// while the server drains.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/api/v1/networks",
            post(networks::add_network).get(networks::list_networks),
        )
        .route(
            "/api/v1/networks/{organization_id}/{network_id}",
            get(networks::get_network).delete(networks::delete_network),
        )
        .route("/api/v1/networks/authorize", post(networks::authorize_member))
        .route(
            "/api/v1/networks/disauthorize",
            post(networks::disauthorize_member),
        )
        .route("/api/v1/networks/join", post(networks::join_network))
        .route(
            "/api/v1/networks/zt-connection/authorize",
            post(networks::authorize_zt_connection),
        )
        .route("/api/v1/dns", post(naming::add_entry))
        .route("/api/v1/dns/delete", post(naming::delete_entry))
        .route("/api/v1/dns/{organization_id}", get(naming::list_entries))
        .route("/api/v1/appnet/inbound", post(appnet::register_inbound))
        .route("/api/v1/appnet/outbound", post(appnet::register_outbound))
        .route("/api/v1/appnet/connections", post(appnet::add_connection))
        .route(
            "/api/v1/appnet/connections/remove",
            post(appnet::remove_connection),
        )
        .route(
            "/api/v1/appnet/zt-connection/register",
            post(appnet::register_zt_connection),
        )
        .route("/api/v1/bus/network-ops", post(bus::publish_network_op))
        .route(
            "/api/v1/bus/application-events",
            post(bus::publish_application_event),
        )
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state.shutdown),
            track_in_flight,
        ));

    let layers = build_http_layers(&state.config);

    Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .merge(api)
        .layer(layers)
        .with_state(state)
}

/// Owns the listener and the state shared with the handlers.
pub struct NetworkModule {
    config: HttpConfig,
    listener: Option<TcpListener>,
    services: Arc<Services>,
    shutdown: Arc<ShutdownController>,
    start_time: Instant,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(config: HttpConfig, services: Services) -> Self {
        Self {
            config,
            listener: None,
            services: Arc::new(services),
            shutdown: Arc::new(ShutdownController::new()),
            start_time: Instant::now(),
        }
    }

    /// Shared with `main`, which triggers shutdown on Ctrl-C.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    #[must_use]
    pub fn state(&self) -> AppState {
        AppState {
            services: Arc::clone(&self.services),
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::new(self.config.clone()),
            start_time: self.start_time,
        }
    }

    /// Binds the listener and returns the bound port, which differs from
    /// the configured one when that is 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let listener = TcpListener::bind(self.config.bind_address()).await?;
        let port = listener.local_addr()?.port();
        info!(host = %self.config.host, port, "RPC listener bound");
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then drains in-flight requests for
    /// at most the configured drain timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called or the server hits a
    /// fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let Some(listener) = self.listener.take() else {
            anyhow::bail!("start() must be called before serve()");
        };
        let router = build_router(self.state());
        let controller = Arc::clone(&self.shutdown);

        controller.set_ready();
        info!("serving RPC requests");

        let graceful = {
            let controller = Arc::clone(&controller);
            async move {
                shutdown.await;
                controller.trigger_shutdown();
            }
        };
        axum::serve(listener, router)
            .with_graceful_shutdown(graceful)
            .await?;

        if controller.wait_for_drain(self.config.drain_timeout).await {
            info!("in-flight requests drained");
        } else {
            warn!(
                in_flight = controller.in_flight_count(),
                "drain timeout expired with requests outstanding"
            );
        }
        Ok(())
    }
}
