//! Command-line and environment configuration of the `netplane` binary.
//!
//! [`ServiceConfig`] is what clap parses; the accessor methods split it into
//! the plain structs each component takes.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use reqwest::Url;

use crate::backend::http::parse_base_url;
use crate::dispatcher::DispatcherConfig;
use crate::network::HttpConfig;
use crate::pool::TlsParams;
use crate::telemetry::LogFormat;

#[derive(Debug, Clone, Parser)]
#[command(name = "netplane", version, about = "Overlay network and naming control plane")]
pub struct ServiceConfig {
    /// Address the RPC listener binds to.
    #[arg(long, env = "NETPLANE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "NETPLANE_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Base URL of the system-model directory.
    #[arg(long, env = "NETPLANE_DIRECTORY_URL")]
    pub directory_url: String,

    /// Base URL of the overlay network controller.
    #[arg(long, env = "NETPLANE_CONTROLLER_URL")]
    pub controller_url: String,

    #[arg(long, env = "NETPLANE_CONTROLLER_TOKEN", hide_env_values = true)]
    pub controller_token: String,

    /// Base URL of the service catalog.
    #[arg(long, env = "NETPLANE_CATALOG_URL")]
    pub catalog_url: String,

    /// Catalog node name under which entries are registered.
    #[arg(long, env = "NETPLANE_CATALOG_NODE", default_value = "netplane")]
    pub catalog_node: String,

    /// Port of the catalog agent on every node.
    #[arg(long, env = "NETPLANE_CATALOG_AGENT_PORT", default_value_t = 8500)]
    pub catalog_agent_port: u16,

    /// Port of the cluster API on every cluster host.
    #[arg(long, env = "NETPLANE_CLUSTER_API_PORT", default_value_t = 443)]
    pub cluster_api_port: u16,

    /// Organization whose clusters are kept in the pool. Without it the
    /// cluster map stays empty.
    #[arg(long, env = "NETPLANE_ORGANIZATION_ID")]
    pub organization_id: Option<String>,

    #[arg(long, env = "NETPLANE_CLUSTER_REFRESH_SECS", default_value_t = 300)]
    pub cluster_refresh_secs: u64,

    /// Use HTTPS for cluster connections.
    #[arg(long, env = "NETPLANE_USE_TLS")]
    pub use_tls: bool,

    #[arg(long, env = "NETPLANE_CA_CERT_PATH")]
    pub ca_cert_path: Option<PathBuf>,

    /// PEM file with the client certificate and key for mutual TLS.
    #[arg(long, env = "NETPLANE_CLIENT_CERT_PATH")]
    pub client_cert_path: Option<PathBuf>,

    #[arg(long, env = "NETPLANE_SKIP_SERVER_CERT_VALIDATION")]
    pub skip_server_cert_validation: bool,

    #[arg(long, env = "NETPLANE_BUS_RECEIVE_TIMEOUT_SECS", default_value_t = 3600)]
    pub bus_receive_timeout_secs: u64,

    /// Most messages handed to a dispatcher per receive.
    #[arg(long, env = "NETPLANE_BUS_BATCH_SIZE", default_value_t = 32)]
    pub bus_batch_size: usize,

    /// Messages buffered per topic before publishers wait.
    #[arg(long, env = "NETPLANE_BUS_CAPACITY", default_value_t = 1024)]
    pub bus_capacity: usize,

    /// Applies to RPC requests and to outbound backend calls.
    #[arg(long, env = "NETPLANE_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    #[arg(long, env = "NETPLANE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Locations and credentials of the external systems of record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub directory_url: Url,
    pub controller_url: Url,
    pub controller_token: String,
    pub catalog_url: Url,
    pub catalog_node: String,
    pub catalog_agent_port: u16,
    pub request_timeout: Duration,
}

/// Settings of the cluster connection pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub cluster_api_port: u16,
    pub tls: TlsParams,
    pub connect_timeout: Duration,
    /// `None` disables the directory refresh.
    pub organization_id: Option<String>,
    pub refresh_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            cluster_api_port: 443,
            tls: TlsParams::default(),
            connect_timeout: Duration::from_secs(30),
            organization_id: None,
            refresh_interval: Duration::from_secs(300),
        }
    }
}

/// Settings of the in-process bus feeding both dispatchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    pub capacity: usize,
    pub batch_size: usize,
    pub dispatcher: DispatcherConfig,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            batch_size: 32,
            dispatcher: DispatcherConfig::default(),
        }
    }
}

impl ServiceConfig {
    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn http(&self) -> HttpConfig {
        HttpConfig {
            host: self.host.clone(),
            port: self.port,
            request_timeout: self.request_timeout(),
            ..HttpConfig::default()
        }
    }

    /// # Errors
    ///
    /// Returns an error naming the flag whose URL does not parse.
    pub fn backends(&self) -> anyhow::Result<BackendConfig> {
        let url = |flag: &str, raw: &str| {
            parse_base_url(raw).map_err(|e| anyhow::anyhow!("--{flag}: {e}"))
        };
        Ok(BackendConfig {
            directory_url: url("directory-url", &self.directory_url)?,
            controller_url: url("controller-url", &self.controller_url)?,
            controller_token: self.controller_token.clone(),
            catalog_url: url("catalog-url", &self.catalog_url)?,
            catalog_node: self.catalog_node.clone(),
            catalog_agent_port: self.catalog_agent_port,
            request_timeout: self.request_timeout(),
        })
    }

    #[must_use]
    pub fn pool(&self) -> PoolConfig {
        PoolConfig {
            cluster_api_port: self.cluster_api_port,
            tls: TlsParams {
                use_tls: self.use_tls,
                client_cert_path: self.client_cert_path.clone(),
                ca_cert_path: self.ca_cert_path.clone(),
                skip_validation: self.skip_server_cert_validation,
            },
            connect_timeout: self.request_timeout(),
            organization_id: self.organization_id.clone(),
            refresh_interval: Duration::from_secs(self.cluster_refresh_secs.max(1)),
        }
    }

    #[must_use]
    pub fn bus(&self) -> BusConfig {
        BusConfig {
            capacity: self.bus_capacity,
            batch_size: self.bus_batch_size,
            dispatcher: DispatcherConfig {
                receive_timeout: Duration::from_secs(self.bus_receive_timeout_secs),
                ..DispatcherConfig::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 9] = [
        "netplane",
        "--directory-url",
        "http://directory:8080",
        "--controller-url",
        "http://controller:9993",
        "--controller-token",
        "secret",
        "--catalog-url",
        "http://catalog:8500",
    ];

    fn parse(extra: &[&str]) -> ServiceConfig {
        ServiceConfig::try_parse_from(REQUIRED.iter().chain(extra)).unwrap()
    }

    #[test]
    fn defaults_apply() {
        let config = parse(&[]);
        assert_eq!(config.port, 8000);
        assert_eq!(config.catalog_node, "netplane");
        assert_eq!(config.log_format, LogFormat::Text);

        let pool = config.pool();
        assert_eq!(pool.cluster_api_port, 443);
        assert_eq!(pool.tls, TlsParams::default());
        assert_eq!(pool.organization_id, None);
        assert_eq!(pool.refresh_interval, Duration::from_secs(300));

        let bus = config.bus();
        assert_eq!(bus.batch_size, 32);
        assert_eq!(bus.dispatcher.receive_timeout, Duration::from_secs(3600));
        assert_eq!(config.http().bind_address(), "0.0.0.0:8000");
    }

    #[test]
    fn tls_flags_map_onto_tls_params() {
        let config = parse(&[
            "--use-tls",
            "--ca-cert-path",
            "/etc/netplane/ca.pem",
            "--skip-server-cert-validation",
        ]);
        let tls = config.pool().tls;
        assert!(tls.use_tls);
        assert!(tls.skip_validation);
        assert_eq!(tls.ca_cert_path, Some(PathBuf::from("/etc/netplane/ca.pem")));
        assert_eq!(tls.client_cert_path, None);
    }

    #[test]
    fn backend_urls_gain_a_trailing_slash() {
        let backends = parse(&["--catalog-agent-port", "8600"]).backends().unwrap();
        assert_eq!(backends.controller_url.as_str(), "http://controller:9993/");
        assert_eq!(backends.catalog_agent_port, 8600);
    }

    #[test]
    fn invalid_backend_url_names_the_flag() {
        let mut config = parse(&[]);
        config.catalog_url = "not a url".to_string();
        let err = config.backends().unwrap_err();
        assert!(err.to_string().contains("--catalog-url"));
    }

    #[test]
    fn missing_required_flag_is_an_error() {
        assert!(ServiceConfig::try_parse_from(["netplane", "--port", "1"]).is_err());
    }

    #[test]
    fn json_log_format_parses() {
        assert_eq!(parse(&["--log-format", "json"]).log_format, LogFormat::Json);
    }
}
