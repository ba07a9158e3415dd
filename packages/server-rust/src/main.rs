//! `netplane` binary: parses configuration, wires the service, and serves
//! until Ctrl-C.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use netplane_server::app::{cluster_pool, Application, Backends};
use netplane_server::config::ServiceConfig;
use netplane_server::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::parse();
    telemetry::init(config.log_format)?;

    let backends = Backends::http(&config.backends()?)?;
    let pool_config = config.pool();
    let pool = Arc::new(cluster_pool(&pool_config));

    let mut app =
        Application::assemble(backends, pool, config.http(), &pool_config, &config.bus()).await;
    let port = app.start().await?;
    info!(port, version = env!("CARGO_PKG_VERSION"), "netplane started");

    app.serve(shutdown_signal()).await?;
    info!("netplane stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => {
            // Without a signal handler the process runs until killed.
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}
