//! Cluster-addressed calls on top of the connection pool.

use async_trait::async_trait;
use netplane_core::{Directory, ResultExt, ServiceResult};
use serde::Serialize;
use serde_json::Value;

use super::connection::{ConnectionFactory, ConnectionPool};
use super::http::ClusterConnection;

/// A pooled connection able to deliver a JSON request to its cluster.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn post(&self, path: &str, body: &Value) -> ServiceResult<()>;
}

#[async_trait]
impl ClusterClient for ClusterConnection {
    async fn post(&self, path: &str, body: &Value) -> ServiceResult<()> {
        self.post_json(path, body).await
    }
}

/// Point-in-time counters reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Online clusters in the current map, cordoned ones included.
    pub clusters: usize,
    pub cordoned: usize,
    /// Ready pooled connections.
    pub connections: usize,
}

/// Calls into remote clusters by cluster id.
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// Sends `body` to `path` on the cluster API of `cluster_id`.
    async fn notify(&self, cluster_id: &str, path: &str, body: &Value) -> ServiceResult<()>;

    /// Rebuilds the cluster map of `organization_id`; returns its size.
    async fn refresh(&self, organization_id: &str, directory: &dyn Directory)
        -> ServiceResult<usize>;

    fn stats(&self) -> PoolStats;
}

#[async_trait]
impl<F> ClusterGateway for ConnectionPool<F>
where
    F: ConnectionFactory,
    F::Connection: ClusterClient,
{
    async fn notify(&self, cluster_id: &str, path: &str, body: &Value) -> ServiceResult<()> {
        let connection = self.cluster_connection(cluster_id).await?;
        connection
            .post(path, body)
            .await
            .with_context(|| format!("cluster {cluster_id}"))
    }

    async fn refresh(
        &self,
        organization_id: &str,
        directory: &dyn Directory,
    ) -> ServiceResult<usize> {
        self.refresh_cluster_directory(organization_id, directory).await
    }

    fn stats(&self) -> PoolStats {
        let clusters = self.clusters();
        PoolStats {
            clusters: clusters.len(),
            cordoned: clusters.values().filter(|e| e.cordoned).count(),
            connections: self.connection_count(),
        }
    }
}
