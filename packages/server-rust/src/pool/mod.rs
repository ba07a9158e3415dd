//! Pooled outbound connections to remote cluster endpoints.
//!
//! - `connection`: keyed cache with single-flight creation and the cluster map refresh
//! - `directory`: atomically replaced cluster map snapshot
//! - `gateway`: cluster-addressed calls used by the managers
//! - `http`: TLS-aware `reqwest` connections used in production

pub mod connection;
pub mod directory;
pub mod gateway;
pub mod http;

pub use connection::{ConnectionFactory, ConnectionKey, ConnectionPool, PoolError};
pub use directory::{ClusterDirectory, ClusterEntry, ClusterMap};
pub use gateway::{ClusterClient, ClusterGateway, PoolStats};
pub use http::{build_client, ClusterConnection, HttpConnectionFactory, TlsParams};

/// The pool as wired in the server binary.
pub type ClusterPool = ConnectionPool<HttpConnectionFactory>;
