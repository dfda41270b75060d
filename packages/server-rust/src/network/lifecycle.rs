//! Gateway lifecycle: serving state for the probes and the count of GraphQL
//! requests still being relayed.
//!
//! The state sits in an `ArcSwap` so health probes never lock. Each relayed
//! request holds a [`RequestGuard`]; the last guard to drop wakes whoever is
//! waiting in [`Lifecycle::drained`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

/// Where the gateway is in its life.
///
/// Starting -> Serving -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    /// Schema composed, listener not accepting yet.
    Starting,
    Serving,
    /// Shutdown signalled; relayed requests are finishing.
    Draining,
    /// No request left in flight after draining.
    Stopped,
}

impl GatewayState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Serving => "serving",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }

    /// Only a serving gateway takes traffic from a load balancer.
    #[must_use]
    pub fn is_ready(self) -> bool {
        self == Self::Serving
    }
}

#[derive(Debug, Default)]
struct ActiveRequests {
    count: AtomicU64,
    idle: Notify,
}

/// Shared between the router state and the serve loop.
#[derive(Debug)]
pub struct Lifecycle {
    state: ArcSwap<GatewayState>,
    requests: Arc<ActiveRequests>,
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ArcSwap::from_pointee(GatewayState::Starting),
            requests: Arc::new(ActiveRequests::default()),
        }
    }

    #[must_use]
    pub fn state(&self) -> GatewayState {
        **self.state.load()
    }

    pub fn mark_serving(&self) {
        self.state.store(Arc::new(GatewayState::Serving));
    }

    pub fn begin_drain(&self) {
        self.state.store(Arc::new(GatewayState::Draining));
    }

    /// Counts one relayed request until the guard drops.
    #[must_use]
    pub fn track_request(&self) -> RequestGuard {
        self.requests.count.fetch_add(1, Ordering::AcqRel);
        RequestGuard {
            requests: Arc::clone(&self.requests),
        }
    }

    #[must_use]
    pub fn active_requests(&self) -> u64 {
        self.requests.count.load(Ordering::Acquire)
    }

    /// Waits until no relayed request is left, up to `timeout`.
    ///
    /// Returns `true` and moves to `Stopped` once idle. On timeout the state
    /// is left as it was and `false` is returned.
    pub async fn drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            let mut idle = std::pin::pin!(self.requests.idle.notified());
            // Register before checking the count so a release in between
            // still wakes us.
            idle.as_mut().enable();

            if self.active_requests() == 0 {
                self.state.store(Arc::new(GatewayState::Stopped));
                return true;
            }
            if timeout_at(deadline, idle.as_mut()).await.is_err() {
                return false;
            }
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps one request counted; released on drop, including during unwinding.
#[derive(Debug)]
pub struct RequestGuard {
    requests: Arc<ActiveRequests>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        if self.requests.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.requests.idle.notify_waiters();
        }
    }
}
