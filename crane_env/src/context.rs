//! Core environment context trait for replay sessions.

use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, SystemTime};

/// The central interface for environment interaction.
///
/// This trait abstracts the "real world" so that replay sessions can run
/// against a wall clock (interactive playback) or a virtual clock
/// (headless replays, tests).
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time` and `tokio::spawn`
/// - **Headless**: `VirtualContext` (in `crane_replay`) - manually advanced clock
#[async_trait]
pub trait ReplayContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// The path recorder throttles on this value, so it must never go
    /// backwards.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time (used for export metadata).
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// On a virtual clock: advances virtual time
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task.
    ///
    /// Used for the fire-and-forget zone classification request; playback
    /// must keep ticking while the task is outstanding.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
