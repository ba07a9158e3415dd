//! Background worker for periodic and on-demand tasks, and the cluster map
//! refresher that runs on it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netplane_core::Directory;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pool::ClusterGateway;

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Task handler driven by a [`BackgroundWorker`].
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    type Task: Send + 'static;

    async fn run(&mut self, task: Self::Task);

    /// Called on every tick. Default is a no-op.
    async fn on_tick(&mut self) {}

    /// Called once after the loop exits. Default is a no-op.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Runs a [`BackgroundRunnable`] on its own task.
///
/// Submitted tasks and ticks are handled one at a time, so the runnable
/// never sees concurrent calls. The first tick fires one full interval
/// after start. Tasks already queued when [`stop`](Self::stop) is called
/// still run.
pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: Option<mpsc::Sender<R::Task>>,
    cancel: CancellationToken,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl<R: BackgroundRunnable> fmt::Debug for BackgroundWorker<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundWorker")
            .field("running", &self.handle.is_some())
            .finish()
    }
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Queue capacity of submitted tasks.
    pub const CAPACITY: usize = 16;

    #[must_use]
    pub fn start(mut runnable: R, tick: Duration) -> Self {
        let (tx, mut rx) = mpsc::channel::<R::Task>(Self::CAPACITY);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + tick, tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                // Queued tasks go first, so `stop` runs what was submitted.
                tokio::select! {
                    biased;
                    task = rx.recv() => match task {
                        Some(task) => runnable.run(task).await,
                        None => break,
                    },
                    _ = interval.tick() => runnable.on_tick().await,
                    () = token.cancelled() => break,
                }
            }

            runnable.shutdown().await;
        });

        Self {
            tx: Some(tx),
            cancel,
            handle: Some(handle),
        }
    }

    /// # Errors
    ///
    /// Returns an error once the worker has been stopped.
    pub async fn submit(&self, task: R::Task) -> anyhow::Result<()> {
        match &self.tx {
            Some(tx) => tx
                .send(task)
                .await
                .map_err(|_| anyhow::anyhow!("worker channel closed")),
            None => Err(anyhow::anyhow!("worker not running")),
        }
    }

    /// Stops the loop and waits for the runnable's `shutdown` to finish.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "background worker task failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ClusterRefresher
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum RefreshTask {
    /// Refresh immediately, outside the schedule.
    Now,
}

/// Keeps the pool's cluster map of one organization current.
///
/// Failures are logged; the previous map stays in place until the next
/// successful refresh.
pub struct ClusterRefresher {
    organization_id: String,
    pool: Arc<dyn ClusterGateway>,
    directory: Arc<dyn Directory>,
}

impl fmt::Debug for ClusterRefresher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterRefresher")
            .field("organization_id", &self.organization_id)
            .finish_non_exhaustive()
    }
}

impl ClusterRefresher {
    #[must_use]
    pub fn new(
        organization_id: impl Into<String>,
        pool: Arc<dyn ClusterGateway>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            pool,
            directory,
        }
    }

    /// Runs one refresh, logging instead of returning the outcome.
    pub async fn refresh(&self) {
        match self
            .pool
            .refresh(&self.organization_id, self.directory.as_ref())
            .await
        {
            Ok(clusters) => debug!(
                organization_id = %self.organization_id,
                clusters,
                "cluster refresh done"
            ),
            Err(e) => warn!(
                organization_id = %self.organization_id,
                error = %e,
                "cluster refresh failed, keeping previous map"
            ),
        }
    }
}

#[async_trait]
impl BackgroundRunnable for ClusterRefresher {
    type Task = RefreshTask;

    async fn run(&mut self, task: RefreshTask) {
        match task {
            RefreshTask::Now => self.refresh().await,
        }
    }

    async fn on_tick(&mut self) {
        self.refresh().await;
    }

    async fn shutdown(&mut self) {
        info!(organization_id = %self.organization_id, "cluster refresher stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use netplane_core::{ClusterInfo, ClusterStatus};

    use super::*;
    use crate::backend::memory::MemoryDirectory;
    use crate::pool::gateway::recording::RecordingFactory;
    use crate::pool::ConnectionPool;

    #[derive(Default, Clone)]
    struct Counters {
        runs: Arc<AtomicU32>,
        ticks: Arc<AtomicU32>,
        shutdowns: Arc<AtomicU32>,
    }

    #[async_trait]
    impl BackgroundRunnable for Counters {
        type Task = ();

        async fn run(&mut self, _task: ()) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_tick(&mut self) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }

        async fn shutdown(&mut self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn online(id: &str) -> ClusterInfo {
        ClusterInfo {
            organization_id: "o1".to_string(),
            cluster_id: id.to_string(),
            hostname: format!("{id}.example.com"),
            status: ClusterStatus::Online,
            cordon: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_follow_the_interval() {
        let counters = Counters::default();
        let mut worker = BackgroundWorker::start(counters.clone(), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counters.ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(counters.ticks.load(Ordering::SeqCst), 2);

        worker.stop().await;
        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn submitted_tasks_run_and_stop_rejects_more() {
        let counters = Counters::default();
        let mut worker = BackgroundWorker::start(counters.clone(), Duration::from_secs(3600));

        worker.submit(()).await.unwrap();
        worker.submit(()).await.unwrap();
        worker.stop().await;

        assert_eq!(counters.runs.load(Ordering::SeqCst), 2);
        assert!(worker.submit(()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn refresher_picks_up_directory_changes() {
        let pool = Arc::new(ConnectionPool::new(RecordingFactory::default(), 443));
        let directory = Arc::new(MemoryDirectory::new());
        directory.set_clusters("o1", vec![online("c1")]);

        let refresher = ClusterRefresher::new("o1", pool.clone(), directory.clone());
        let mut worker = BackgroundWorker::start(refresher, Duration::from_secs(60));

        worker.submit(RefreshTask::Now).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(pool.stats().clusters, 1);

        directory.set_clusters("o1", vec![online("c1"), online("c2")]);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(pool.stats().clusters, 2);

        worker.stop().await;
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_map() {
        let pool = Arc::new(ConnectionPool::new(RecordingFactory::default(), 443));
        let directory = Arc::new(MemoryDirectory::new());
        directory.set_clusters("o1", vec![online("c1")]);
        let refresher = ClusterRefresher::new("o1", pool.clone(), directory.clone());

        refresher.refresh().await;
        directory.fail_cluster_listing(true);
        refresher.refresh().await;

        assert_eq!(pool.stats().clusters, 1);
    }
}
