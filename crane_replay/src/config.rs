//! Replay configuration loaded from TOML.
//!
//! Every section is optional and falls back to the component defaults:
//!
//! ```toml
//! classifier = "heuristic"        # or "none", or "canned:response.json"
//!
//! [runner]
//! tick_rate_hz = 30
//!
//! [cluster]
//! cluster_radius = 8.0
//!
//! [session.path]
//! min_distance = 0.25
//!
//! [session.analytics]
//! timeout_millis = 5000
//!
//! [synth]
//! seed = 7
//! cycles = 40
//! ```

use crane_core::{CargoHeuristic, ClusterConfig, HeuristicClassifier, SessionConfig};
use crane_env::{CannedClassifier, EnvError, ZoneClassifier};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::runner::RunnerConfig;
use crate::synth::SynthConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to load canned classifier response {path}: {reason}")]
    Classifier { path: PathBuf, reason: String },
}

// ============================================================================
// CLASSIFIER SELECTION
// ============================================================================

/// Which zone classifier a replay uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ClassifierKind {
    /// Local clustering classifier
    #[default]
    Heuristic,

    /// Replays a stored response document
    Canned(PathBuf),

    /// No analytics
    Disabled,
}

impl ClassifierKind {
    /// Instantiates the classifier, or `None` when analytics are disabled.
    pub fn build(
        &self,
        cluster: ClusterConfig,
        heuristic: CargoHeuristic,
    ) -> Result<Option<Arc<dyn ZoneClassifier>>, ConfigError> {
        match self {
            ClassifierKind::Heuristic => {
                let classifier: Arc<dyn ZoneClassifier> =
                    Arc::new(HeuristicClassifier::new(cluster, heuristic));
                Ok(Some(classifier))
            }
            ClassifierKind::Canned(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Classifier {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
                let classifier: Arc<dyn ZoneClassifier> =
                    Arc::new(CannedClassifier::from_json(&text).map_err(|e: EnvError| {
                        ConfigError::Classifier {
                            path: path.clone(),
                            reason: e.to_string(),
                        }
                    })?);
                Ok(Some(classifier))
            }
            ClassifierKind::Disabled => Ok(None),
        }
    }
}

impl std::fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifierKind::Heuristic => write!(f, "heuristic"),
            ClassifierKind::Canned(path) => write!(f, "canned:{}", path.display()),
            ClassifierKind::Disabled => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for ClassifierKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(path) = s.strip_prefix("canned:") {
            if path.trim().is_empty() {
                return Err("canned classifier needs a response file".to_string());
            }
            return Ok(ClassifierKind::Canned(PathBuf::from(path.trim())));
        }
        match s.to_lowercase().as_str() {
            "heuristic" | "local" => Ok(ClassifierKind::Heuristic),
            "none" | "off" | "disabled" => Ok(ClassifierKind::Disabled),
            _ => Err(format!("Unknown classifier: {}", s)),
        }
    }
}

impl TryFrom<String> for ClassifierKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClassifierKind> for String {
    fn from(kind: ClassifierKind) -> Self {
        kind.to_string()
    }
}

// ============================================================================
// REPLAY CONFIG
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub classifier: ClassifierKind,
    pub cluster: ClusterConfig,
    pub session: SessionConfig,
    pub runner: RunnerConfig,
    pub synth: SynthConfig,
}

impl ReplayConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
