//! Cluster directory snapshot held by the connection pool.
//!
//! The map is only ever replaced wholesale: readers load an `Arc` to a
//! complete snapshot and never observe a half-built refresh.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use netplane_core::ClusterInfo;

/// Pool-side view of one reachable cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEntry {
    pub cluster_id: String,
    pub hostname: String,
    /// Cordoned clusters stay reachable but get no new work.
    pub cordoned: bool,
}

impl From<&ClusterInfo> for ClusterEntry {
    fn from(info: &ClusterInfo) -> Self {
        Self {
            cluster_id: info.cluster_id.clone(),
            hostname: info.hostname.clone(),
            cordoned: info.is_cordoned(),
        }
    }
}

/// Immutable cluster-id keyed snapshot.
pub type ClusterMap = HashMap<String, ClusterEntry>;

/// Lock-free holder of the current [`ClusterMap`].
pub struct ClusterDirectory {
    current: ArcSwap<ClusterMap>,
}

impl fmt::Debug for ClusterDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterDirectory")
            .field("clusters", &self.current.load().len())
            .finish()
    }
}

impl ClusterDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Returns the current snapshot. Cheap: clones an `Arc`.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ClusterMap> {
        self.current.load_full()
    }

    #[must_use]
    pub fn get(&self, cluster_id: &str) -> Option<ClusterEntry> {
        self.current.load().get(cluster_id).cloned()
    }

    /// Publishes a fully built map, replacing the previous one.
    pub fn replace(&self, clusters: ClusterMap) {
        self.current.store(Arc::new(clusters));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }
}

impl Default for ClusterDirectory {
    fn default() -> Self {
        Self::new()
    }
}
