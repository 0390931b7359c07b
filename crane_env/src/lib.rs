//! Crane Replay Environment Abstraction Layer
//!
//! This crate provides the seams between the replay engine and the outside
//! world, so that the same session code runs against the real clock (tokio)
//! and against a virtual clock in headless replays and tests.
//!
//! Everything the engine does not own is intercepted here:
//! - Time (`now()`, `sleep()`)
//! - Background work (`spawn()`)
//! - Zone classification (`ZoneClassifier::classify()`)
//!
//! # Example
//!
//! ```ignore
//! use crane_env::{ReplayContext, ZoneClassifier};
//!
//! async fn render_loop<Ctx: ReplayContext>(ctx: &Ctx, session: &mut ReplaySession) {
//!     let mut last = ctx.now();
//!     loop {
//!         ctx.sleep(Duration::from_millis(16)).await;
//!         let now = ctx.now();
//!         session.tick((now - last).as_secs_f64(), now);
//!         last = now;
//!     }
//! }
//! ```

mod classifier;
mod context;
mod error;
mod tokio_impl;
mod types;

pub use classifier::{CannedClassifier, ClassifierPoint, ZoneClassifier};
pub use context::ReplayContext;
pub use error::EnvError;
pub use tokio_impl::TokioContext;
pub use types::SessionId;
