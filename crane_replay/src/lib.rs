//! Crane Replay Headless Driver
//!
//! This crate runs a `ReplaySession` end to end without a renderer: it
//! loads a history (from a file or the synthetic site generator), drives
//! the playback clock from a virtual render loop, fires scripted controls,
//! runs zone analytics in the background, and exports what a renderer
//! would have drawn.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐
//! │   ingest /   │   │ ControlScript│
//! │    synth     │   └──────┬───────┘
//! └──────┬───────┘          │ due(t)
//!        │ RecordSequence   ▼
//!        │           ┌──────────────┐  spawn   ┌───────────────┐
//!        └──────────►│ReplaySession │─────────►│ZoneClassifier │
//!                    │ (crane_core) │◄─────────│  (background) │
//!                    └──────┬───────┘ channel  └───────────────┘
//!                           │ tick(dt, now)
//!                    ┌──────┴───────┐
//!                    │ ReplayRunner │──► ReplayExport (JSON)
//!                    │VirtualContext│
//!                    └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use crane_replay::{synth, ReplayRunner, RunnerConfig};
//!
//! let records = RecordSequence::new(synth::generate(SynthConfig::default()))?;
//! let summary = ReplayRunner::new(RunnerConfig::default(), SessionConfig::default())
//!     .with_speed(20.0)
//!     .run(records, None)
//!     .await;
//! ```

pub mod config;
pub mod context;
pub mod controls;
pub mod exporter;
pub mod ingest;
pub mod runner;
pub mod synth;

pub use config::{ClassifierKind, ConfigError, ReplayConfig};
pub use context::VirtualContext;
pub use controls::{ControlCommand, ControlScript, ScheduledCommand};
pub use exporter::{ExportFrame, ReplayExport};
pub use ingest::{IngestError, Ingested};
pub use runner::{ReplayRunner, ReplaySummary, RunnerConfig};
pub use synth::{SiteGenerator, SynthConfig};
