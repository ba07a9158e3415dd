//! Health state and graceful shutdown coordination.
//!
//! Health transitions are lock-free (`ArcSwap`). In-flight requests are
//! counted with RAII guards; the last guard to drop wakes a pending drain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{watch, Notify};

/// Server health: Starting -> Ready -> Draining -> Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Starting,
    Ready,
    Draining,
    Stopped,
}

impl HealthState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Default)]
struct InFlight {
    count: AtomicU64,
    drained: Notify,
}

/// Shared by the HTTP layer, the health handlers, and `main`.
#[derive(Debug)]
pub struct ShutdownController {
    signal: watch::Sender<bool>,
    in_flight: Arc<InFlight>,
    health: ArcSwap<HealthState>,
}

impl ShutdownController {
    #[must_use]
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            signal,
            in_flight: Arc::new(InFlight::default()),
            health: ArcSwap::from_pointee(HealthState::Starting),
        }
    }

    pub fn set_ready(&self) {
        self.health.store(Arc::new(HealthState::Ready));
    }

    /// Moves to `Draining` and wakes every [`wait_for_shutdown`](Self::wait_for_shutdown).
    pub fn trigger_shutdown(&self) {
        self.health.store(Arc::new(HealthState::Draining));
        self.signal.send_replace(true);
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.health.load()
    }

    #[must_use]
    pub fn is_draining(&self) -> bool {
        matches!(
            self.health_state(),
            HealthState::Draining | HealthState::Stopped
        )
    }

    /// Resolves once shutdown has been triggered, immediately if it already was.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.signal.subscribe();
        // An error means the sender is gone, which only happens on drop.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }

    /// Counts one request as in flight until the guard drops.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.count.load(Ordering::Acquire)
    }

    /// Waits up to `timeout` for in-flight requests to finish.
    ///
    /// On success the state becomes `Stopped` and `true` is returned; on
    /// timeout the state stays `Draining`.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let drained = tokio::time::timeout(timeout, async {
            loop {
                let notified = self.in_flight.drained.notified();
                if self.in_flight_count() == 0 {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok();
        if drained {
            self.health.store(Arc::new(HealthState::Stopped));
        }
        drained
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight count on drop, also during unwinding.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.in_flight.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.in_flight.drained.notify_waiters();
        }
    }
}
