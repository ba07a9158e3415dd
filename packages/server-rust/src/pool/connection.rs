//! Keyed connection cache with single-flight creation.
//!
//! Ready connections live in a `DashMap` for lock-free lookups. Creations in
//! progress are tracked as shared futures behind a short-lived mutex, so
//! concurrent callers for the same key await one factory invocation and all
//! observe its outcome. Successful connections are kept for the lifetime of
//! the pool; failures are dropped and the next caller starts a new attempt.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::{join_all, BoxFuture, FutureExt, Shared};
use netplane_core::{ClusterInfo, Directory, ResultExt, ServiceError, ServiceResult};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::directory::{ClusterDirectory, ClusterEntry, ClusterMap};

/// Cache key of a pooled connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub hostname: String,
    pub port: u16,
}

impl ConnectionKey {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

/// Errors produced while creating or resolving pooled connections.
///
/// `Clone` because one failed creation is reported to every caller that was
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("failed to load {what} from {path}: {reason}")]
    Certificate {
        what: &'static str,
        path: String,
        reason: String,
    },
    #[error("failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },
    #[error("unknown cluster {0}")]
    UnknownCluster(String),
    #[error("cluster {0} is cordoned")]
    Cordoned(String),
}

impl From<PoolError> for ServiceError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::InvalidEndpoint { .. } => Self::invalid_argument(err.to_string()),
            PoolError::UnknownCluster(_) => Self::not_found(err.to_string()),
            PoolError::Cordoned(_) => Self::unavailable(err.to_string()),
            PoolError::Certificate { .. } | PoolError::Connect { .. } => {
                Self::internal(err.to_string())
            }
        }
    }
}

/// Creates the connection stored under a [`ConnectionKey`].
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: Clone + Send + Sync + 'static;

    async fn connect(&self, key: &ConnectionKey) -> Result<Self::Connection, PoolError>;
}

type PendingConnection<C> = Shared<BoxFuture<'static, Result<C, PoolError>>>;

/// Outbound connections to remote cluster endpoints.
///
/// Constructed once at startup and shared through `Arc`.
pub struct ConnectionPool<F: ConnectionFactory> {
    factory: Arc<F>,
    connections: DashMap<ConnectionKey, F::Connection>,
    in_flight: Mutex<HashMap<ConnectionKey, PendingConnection<F::Connection>>>,
    clusters: ClusterDirectory,
    cluster_port: u16,
}

impl<F: ConnectionFactory> fmt::Debug for ConnectionPool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("connections", &self.connections.len())
            .field("in_flight", &self.in_flight.lock().len())
            .field("clusters", &self.clusters)
            .field("cluster_port", &self.cluster_port)
            .finish()
    }
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// `cluster_port` is the port of the cluster API on every cluster host.
    pub fn new(factory: F, cluster_port: u16) -> Self {
        Self {
            factory: Arc::new(factory),
            connections: DashMap::new(),
            in_flight: Mutex::new(HashMap::new()),
            clusters: ClusterDirectory::new(),
            cluster_port,
        }
    }

    /// Returns the connection for `(hostname, port)`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns the factory's error. The failure is not cached.
    pub async fn get_connection(
        &self,
        hostname: &str,
        port: u16,
    ) -> Result<F::Connection, PoolError> {
        let key = ConnectionKey::new(hostname, port);
        if let Some(conn) = self.connections.get(&key) {
            return Ok(conn.clone());
        }

        let pending = {
            let mut in_flight = self.in_flight.lock();
            // A creator may have finished between the fast path and the lock.
            if let Some(conn) = self.connections.get(&key) {
                return Ok(conn.clone());
            }
            in_flight
                .entry(key.clone())
                .or_insert_with(|| {
                    debug!(endpoint = %key, "creating pooled connection");
                    let factory = Arc::clone(&self.factory);
                    let key = key.clone();
                    async move { factory.connect(&key).await }.boxed().shared()
                })
                .clone()
        };

        let result = pending.clone().await;

        let mut in_flight = self.in_flight.lock();
        if let Ok(conn) = &result {
            self.connections
                .entry(key.clone())
                .or_insert_with(|| conn.clone());
        }
        if in_flight.get(&key).is_some_and(|p| p.ptr_eq(&pending)) {
            in_flight.remove(&key);
        }
        drop(in_flight);

        if let Err(e) = &result {
            warn!(endpoint = %key, error = %e, "pooled connection creation failed");
        }
        result
    }

    /// Resolves `cluster_id` through the cluster map and returns its connection.
    ///
    /// # Errors
    ///
    /// `UnknownCluster` when the cluster is not in the current map, `Cordoned`
    /// when it is cordoned, or the factory's error.
    pub async fn cluster_connection(&self, cluster_id: &str) -> Result<F::Connection, PoolError> {
        let entry = self
            .clusters
            .get(cluster_id)
            .ok_or_else(|| PoolError::UnknownCluster(cluster_id.to_string()))?;
        if entry.cordoned {
            return Err(PoolError::Cordoned(cluster_id.to_string()));
        }
        self.get_connection(&entry.hostname, self.cluster_port).await
    }

    /// Rebuilds the cluster map of `organization_id` from the directory.
    ///
    /// The new map holds every online cluster; non-cordoned ones get a warmed
    /// connection. A directory failure leaves the previous map untouched.
    /// Returns the number of clusters in the new map.
    ///
    /// # Errors
    ///
    /// Returns the directory error, with context.
    pub async fn refresh_cluster_directory(
        &self,
        organization_id: &str,
        directory: &dyn Directory,
    ) -> ServiceResult<usize> {
        let clusters = directory
            .list_clusters(organization_id)
            .await
            .with_context(|| format!("refreshing clusters of organization {organization_id}"))?;

        let map: ClusterMap = clusters
            .iter()
            .filter(|c| c.is_online())
            .map(|c: &ClusterInfo| (c.cluster_id.clone(), ClusterEntry::from(c)))
            .collect();

        let warm = map.values().filter(|e| !e.cordoned).map(|entry| async move {
            if let Err(e) = self.get_connection(&entry.hostname, self.cluster_port).await {
                warn!(
                    cluster_id = %entry.cluster_id,
                    hostname = %entry.hostname,
                    error = %e,
                    "failed to warm cluster connection"
                );
            }
        });
        join_all(warm).await;

        let count = map.len();
        self.clusters.replace(map);
        info!(
            organization_id,
            listed = clusters.len(),
            available = count,
            "cluster directory refreshed"
        );
        Ok(count)
    }

    /// Current cluster map snapshot.
    #[must_use]
    pub fn clusters(&self) -> Arc<ClusterMap> {
        self.clusters.snapshot()
    }

    /// Number of cached ready connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn cluster_port(&self) -> u16 {
        self.cluster_port
    }

    #[must_use]
    pub fn factory(&self) -> &F {
        &self.factory
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use netplane_core::{ClusterStatus, ErrorKind};

    use super::*;
    use crate::backend::memory::MemoryDirectory;

    /// Counts invocations; fails while `failures_left` is positive.
    struct CountingFactory {
        calls: Arc<AtomicU32>,
        failures_left: AtomicU32,
        delay: Duration,
    }

    impl CountingFactory {
        fn new(calls: Arc<AtomicU32>) -> Self {
            Self {
                calls,
                failures_left: AtomicU32::new(0),
                delay: Duration::from_millis(20),
            }
        }

        fn failing(calls: Arc<AtomicU32>, failures: u32) -> Self {
            Self {
                failures_left: AtomicU32::new(failures),
                ..Self::new(calls)
            }
        }
    }

    #[async_trait]
    impl ConnectionFactory for CountingFactory {
        type Connection = String;

        async fn connect(&self, key: &ConnectionKey) -> Result<String, PoolError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            let fail = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if fail {
                return Err(PoolError::Connect {
                    endpoint: key.to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            Ok(format!("{key}#{n}"))
        }
    }

    fn cluster(id: &str, status: ClusterStatus, cordon: bool) -> ClusterInfo {
        ClusterInfo {
            organization_id: "o1".to_string(),
            cluster_id: id.to_string(),
            hostname: format!("{id}.example.com"),
            status,
            cordon,
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_creation() {
        let calls = Arc::new(AtomicU32::new(0));
        let pool = Arc::new(ConnectionPool::new(CountingFactory::new(calls.clone()), 443));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move {
                pool.get_connection("c1.example.com", 443).await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|c| c == "c1.example.com:443#1"));
        assert_eq!(pool.connection_count(), 1);
    }

    #[tokio::test]
    async fn successful_connection_is_reused() {
        let calls = Arc::new(AtomicU32::new(0));
        let pool = ConnectionPool::new(CountingFactory::new(calls.clone()), 443);

        let first = pool.get_connection("c1", 443).await.unwrap();
        let second = pool.get_connection("c1", 443).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_get_distinct_connections() {
        let calls = Arc::new(AtomicU32::new(0));
        let pool = ConnectionPool::new(CountingFactory::new(calls.clone()), 443);

        pool.get_connection("c1", 443).await.unwrap();
        pool.get_connection("c1", 8443).await.unwrap();
        pool.get_connection("c2", 443).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(pool.connection_count(), 3);
    }

    #[tokio::test]
    async fn failure_is_not_cached() {
        let calls = Arc::new(AtomicU32::new(0));
        let pool = ConnectionPool::new(CountingFactory::failing(calls.clone(), 1), 443);

        let err = pool.get_connection("c1", 443).await.unwrap_err();
        assert!(matches!(err, PoolError::Connect { .. }));
        assert_eq!(pool.connection_count(), 0);

        let conn = pool.get_connection("c1", 443).await.unwrap();
        assert_eq!(conn, "c1:443#2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_waiters_share_a_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let pool = Arc::new(ConnectionPool::new(
            CountingFactory::failing(calls.clone(), 1),
            443,
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move { pool.get_connection("c1", 443).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_err());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_keeps_online_clusters_and_warms_available_ones() {
        let calls = Arc::new(AtomicU32::new(0));
        let pool = ConnectionPool::new(CountingFactory::new(calls.clone()), 443);
        let directory = MemoryDirectory::new();
        directory.add_organization("o1");
        directory.set_clusters(
            "o1",
            vec![
                cluster("c1", ClusterStatus::Online, false),
                cluster("c2", ClusterStatus::Online, true),
                cluster("c3", ClusterStatus::Offline, false),
            ],
        );

        let count = pool.refresh_cluster_directory("o1", &directory).await.unwrap();

        assert_eq!(count, 2);
        let clusters = pool.clusters();
        assert!(!clusters["c1"].cordoned);
        assert!(clusters["c2"].cordoned);
        assert!(!clusters.contains_key("c3"));
        // Only the non-cordoned cluster is warmed.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(pool.connection_count(), 1);
    }

    #[tokio::test]
    async fn failed_refresh_leaves_previous_map_intact() {
        let calls = Arc::new(AtomicU32::new(0));
        let pool = ConnectionPool::new(CountingFactory::new(calls), 443);
        let directory = MemoryDirectory::new();
        directory.add_organization("o1");
        directory.set_clusters(
            "o1",
            vec![
                cluster("c1", ClusterStatus::Online, false),
                cluster("c2", ClusterStatus::OnlineCordon, false),
            ],
        );
        pool.refresh_cluster_directory("o1", &directory).await.unwrap();
        let before = pool.clusters();

        directory.set_clusters("o1", vec![cluster("c9", ClusterStatus::Online, false)]);
        directory.fail_cluster_listing(true);
        let err = pool
            .refresh_cluster_directory("o1", &directory)
            .await
            .unwrap_err();

        assert!(err.is(ErrorKind::Internal));
        assert_eq!(*pool.clusters(), *before);
    }

    #[tokio::test]
    async fn warm_failures_do_not_abort_refresh() {
        let calls = Arc::new(AtomicU32::new(0));
        let pool = ConnectionPool::new(CountingFactory::failing(calls, 1), 443);
        let directory = MemoryDirectory::new();
        directory.add_organization("o1");
        directory.set_clusters("o1", vec![cluster("c1", ClusterStatus::Online, false)]);

        let count = pool.refresh_cluster_directory("o1", &directory).await.unwrap();

        assert_eq!(count, 1);
        assert_eq!(pool.connection_count(), 0);
        // The next lookup retries creation.
        assert!(pool.cluster_connection("c1").await.is_ok());
    }

    #[tokio::test]
    async fn cluster_connection_resolves_through_map() {
        let calls = Arc::new(AtomicU32::new(0));
        let pool = ConnectionPool::new(CountingFactory::new(calls), 6443);
        let directory = MemoryDirectory::new();
        directory.add_organization("o1");
        directory.set_clusters(
            "o1",
            vec![
                cluster("c1", ClusterStatus::Online, false),
                cluster("c2", ClusterStatus::Online, true),
            ],
        );
        pool.refresh_cluster_directory("o1", &directory).await.unwrap();

        let conn = pool.cluster_connection("c1").await.unwrap();
        assert!(conn.starts_with("c1.example.com:6443#"));

        assert_eq!(
            pool.cluster_connection("c2").await.unwrap_err(),
            PoolError::Cordoned("c2".to_string())
        );
        assert_eq!(
            pool.cluster_connection("nope").await.unwrap_err(),
            PoolError::UnknownCluster("nope".to_string())
        );
    }

    #[test]
    fn pool_errors_map_to_service_kinds() {
        let cases = [
            (PoolError::UnknownCluster("c".into()), ErrorKind::NotFound),
            (PoolError::Cordoned("c".into()), ErrorKind::Unavailable),
            (
                PoolError::InvalidEndpoint {
                    endpoint: ":1".into(),
                    reason: "empty host".into(),
                },
                ErrorKind::InvalidArgument,
            ),
            (
                PoolError::Connect {
                    endpoint: "c:1".into(),
                    reason: "refused".into(),
                },
                ErrorKind::Internal,
            ),
        ];
        for (err, kind) in cases {
            assert_eq!(ServiceError::from(err).kind, kind);
        }
    }
}
