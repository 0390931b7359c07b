//! Virtual-clock context implementing `ReplayContext` for headless replays.

use async_trait::async_trait;
use crane_env::ReplayContext;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Context backed by a manually advanced clock.
///
/// Ticks are driven by the runner, so a ten-minute history replays in
/// however long the CPU needs. Background tasks still run on tokio.
pub struct VirtualContext {
    /// Current virtual time (nanoseconds since replay start)
    virtual_time_ns: Arc<AtomicU64>,

    /// Virtual time 0 maps to this wall-clock time
    epoch: SystemTime,
}

impl VirtualContext {
    pub fn new() -> Self {
        Self::with_epoch(UNIX_EPOCH + Duration::from_secs(1_704_067_200)) // 2024-01-01 00:00:00 UTC
    }

    /// A context whose virtual time 0 is `epoch`.
    pub fn with_epoch(epoch: SystemTime) -> Self {
        Self {
            virtual_time_ns: Arc::new(AtomicU64::new(0)),
            epoch,
        }
    }

    /// Anchors virtual time 0 at the first record of a history.
    pub fn starting_at_millis(epoch_millis: i64) -> Self {
        let offset = Duration::from_millis(epoch_millis.max(0) as u64);
        Self::with_epoch(UNIX_EPOCH + offset)
    }

    pub fn advance_time(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.virtual_time_ns.fetch_add(nanos, Ordering::SeqCst);
    }

    pub fn time_ns(&self) -> u64 {
        self.virtual_time_ns.load(Ordering::SeqCst)
    }
}

impl Default for VirtualContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for VirtualContext {
    fn clone(&self) -> Self {
        Self {
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            epoch: self.epoch,
        }
    }
}

#[async_trait]
impl ReplayContext for VirtualContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    fn system_time(&self) -> SystemTime {
        self.epoch + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        // Sleeping on a virtual clock just moves it forward
        self.advance_time(duration);
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!(task = name, virtual_ms = self.now().as_millis() as u64, "spawning task");
        tokio::spawn(future);
    }
}
