//! Crane Replay CLI
//!
//! Replays a recorded (or synthetic) tower crane history headlessly.

use anyhow::{bail, Context, Result};
use clap::Parser;
use crane_core::RecordSequence;
use crane_replay::{ingest, synth, ClassifierKind, ControlScript, ReplayConfig, ReplayExport, ReplayRunner};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "crane-replay")]
#[command(about = "Replay a tower crane history and analyse its load zones", long_about = None)]
struct Args {
    /// History file (JSON array, JSON lines or a CSV crane log); a synthetic day is generated if omitted
    input: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed for the synthetic history
    #[arg(short, long)]
    seed: Option<u64>,

    /// Lift cycles in the synthetic history
    #[arg(long)]
    cycles: Option<usize>,

    /// Playback speed multiplier
    #[arg(long)]
    speed: Option<f64>,

    /// Render-loop rate in Hz
    #[arg(long)]
    tick_rate: Option<u32>,

    /// Maximum replay duration in (virtual) seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// Scripted controls, e.g. "2.5:speed=4, 4:reverse, 6:toggle, 8:seek=120"
    #[arg(long)]
    script: Option<String>,

    /// Zone classifier (heuristic, none, canned:<response.json>)
    #[arg(long)]
    classifier: Option<ClassifierKind>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON summary on stdout
    #[arg(long)]
    json: bool,

    /// Export sampled frames, the hook trail and analytics to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,
}

impl Args {
    /// Command-line flags override the config file.
    fn apply_to(&self, config: &mut ReplayConfig) {
        if let Some(seed) = self.seed {
            config.synth.seed = seed;
        }
        if let Some(cycles) = self.cycles {
            config.synth.cycles = cycles;
        }
        if let Some(speed) = self.speed {
            config.runner.speed = speed;
        }
        if let Some(hz) = self.tick_rate {
            config.runner.tick_rate_hz = hz;
        }
        if let Some(duration) = self.duration {
            config.runner.max_duration_secs = duration;
        }
        if let Some(classifier) = &self.classifier {
            config.classifier = classifier.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let mut config = match &args.config {
        Some(path) => ReplayConfig::load(path)?,
        None => ReplayConfig::default(),
    };
    args.apply_to(&mut config);

    let script: ControlScript = match &args.script {
        Some(text) => match text.parse() {
            Ok(script) => script,
            Err(e) => bail!("Invalid control script: {}", e),
        },
        None => ControlScript::default(),
    };

    let (records, source, seed) = match &args.input {
        Some(path) => {
            let ingested = ingest::load_file(path)
                .with_context(|| format!("Failed to ingest {}", path.display()))?;
            if ingested.skipped > 0 {
                info!(skipped = ingested.skipped, "some rows were unusable");
            }
            (ingested.records, path.display().to_string(), None)
        }
        None => {
            let records = RecordSequence::new(synth::generate(config.synth))?;
            (records, "synthetic".to_string(), Some(config.synth.seed))
        }
    };

    if !args.json {
        info!("Crane Replay v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("Source: {} ({} records)", source, records.len());
    }

    let mut runner = ReplayRunner::new(config.runner, config.session).with_script(script);
    if let Some(classifier) = config.classifier.build(config.cluster, config.session.heuristic)? {
        runner = runner.with_classifier(classifier);
    }

    let mut export = args.export.as_ref().map(|_| ReplayExport::new(&source, seed));
    let summary = runner.run(records, export.as_mut()).await;

    if let (Some(export), Some(path)) = (&export, &args.export) {
        export
            .write_to_file(path)
            .with_context(|| format!("Failed to write export {}", path.display()))?;
        info!("Exported replay to {}", path.display());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if summary.finished {
            info!(
                "✓ Replayed {} records in {} ticks ({:.1}s virtual)",
                summary.records, summary.ticks, summary.virtual_secs
            );
        } else {
            error!(
                "✗ Replay stopped at index {} after {:.1}s (time cap)",
                summary.final_index, summary.virtual_secs
            );
        }
        match &summary.analytics {
            Some(status) => info!(
                "Analytics {:?}: {} loading zones, {} unloading zones, {} concrete pours",
                status,
                summary.loading_zones,
                summary.unloading_zones,
                summary.concrete_operations
            ),
            None => info!("Analytics disabled"),
        }
    }

    Ok(())
}
