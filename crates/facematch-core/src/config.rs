//! Layered configuration.
//!
//! Built-in defaults, then a TOML file, then `FACEMATCH_*` environment variables.
//! Front-ends apply their own command-line overrides on top.

use crate::types::DistanceMetric;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File looked up in the working directory when no config path is given.
pub const DEFAULT_CONFIG_FILE: &str = "facematch.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Runtime configuration shared by the CLI and the web server.
///
/// Layered: built-in defaults, then a TOML file, then `FACEMATCH_*`
/// environment variables. Binaries apply their command-line flags last.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// SCRFD model file name inside `model_dir`.
    pub detector_model: String,
    /// ArcFace model file name inside `model_dir`.
    pub recognizer_model: String,
    pub metric: DistanceMetric,
    /// Distance threshold; `None` uses the metric's default.
    pub threshold: Option<f32>,
    /// Minimum SCRFD score for a detection to count as a face.
    pub detection_confidence: f32,
    /// Fail verification when no face is found instead of embedding the whole image.
    pub enforce_detection: bool,
    /// Database folder used when none is given explicitly.
    pub database_dir: PathBuf,
    /// Listen address for the web UI.
    pub bind_addr: String,
    /// Largest accepted upload, in bytes.
    pub max_upload_bytes: usize,
}

/// On-disk shape of the TOML file; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    model_dir: Option<PathBuf>,
    detector_model: Option<String>,
    recognizer_model: Option<String>,
    metric: Option<DistanceMetric>,
    threshold: Option<f32>,
    detection_confidence: Option<f32>,
    enforce_detection: Option<bool>,
    database_dir: Option<PathBuf>,
    bind_addr: Option<String>,
    max_upload_bytes: Option<usize>,
}

impl Config {
    /// Load from the process environment and the config file.
    ///
    /// The file is `explicit` if given, else `$FACEMATCH_CONFIG`, else
    /// `./facematch.toml` when it exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok();

        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| env("FACEMATCH_CONFIG").map(PathBuf::from))
            .or_else(|| {
                let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                local.exists().then_some(local)
            });

        let contents = match &path {
            Some(p) => {
                tracing::debug!(path = %p.display(), "reading config file");
                Some(std::fs::read_to_string(p).map_err(|source| ConfigError::Read {
                    path: p.display().to_string(),
                    source,
                })?)
            }
            None => None,
        };

        let source_name = path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        Self::from_sources(contents.as_deref().map(|c| (source_name.as_str(), c)), env)
    }

    /// Build a config from optional `(name, toml)` file contents and an env lookup.
    pub fn from_sources(
        file: Option<(&str, &str)>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut cfg = Self::defaults(&env);

        if let Some((name, contents)) = file {
            let parsed: FileConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
                path: name.to_string(),
                source,
            })?;
            cfg.apply_file(parsed);
        }

        cfg.apply_env(&env);
        Ok(cfg)
    }

    fn defaults(env: &impl Fn(&str) -> Option<String>) -> Self {
        Self {
            model_dir: default_model_dir(env),
            detector_model: "det_10g.onnx".to_string(),
            recognizer_model: "w600k_r50.onnx".to_string(),
            metric: DistanceMetric::Cosine,
            threshold: None,
            detection_confidence: crate::detector::DEFAULT_CONFIDENCE_THRESHOLD,
            enforce_detection: true,
            database_dir: PathBuf::from("database"),
            bind_addr: "127.0.0.1:8501".to_string(),
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.model_dir {
            self.model_dir = v;
        }
        if let Some(v) = file.detector_model {
            self.detector_model = v;
        }
        if let Some(v) = file.recognizer_model {
            self.recognizer_model = v;
        }
        if let Some(v) = file.metric {
            self.metric = v;
        }
        if file.threshold.is_some() {
            self.threshold = file.threshold;
        }
        if let Some(v) = file.detection_confidence {
            self.detection_confidence = v;
        }
        if let Some(v) = file.enforce_detection {
            self.enforce_detection = v;
        }
        if let Some(v) = file.database_dir {
            self.database_dir = v;
        }
        if let Some(v) = file.bind_addr {
            self.bind_addr = v;
        }
        if let Some(v) = file.max_upload_bytes {
            self.max_upload_bytes = v;
        }
    }

    /// Environment overrides. Unparseable values keep the lower layer.
    fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("FACEMATCH_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = env("FACEMATCH_DETECTOR_MODEL") {
            self.detector_model = v;
        }
        if let Some(v) = env("FACEMATCH_RECOGNIZER_MODEL") {
            self.recognizer_model = v;
        }
        self.metric = parsed(env, "FACEMATCH_METRIC").unwrap_or(self.metric);
        if let Some(v) = parsed(env, "FACEMATCH_THRESHOLD") {
            self.threshold = Some(v);
        }
        self.detection_confidence =
            parsed(env, "FACEMATCH_DETECTION_CONFIDENCE").unwrap_or(self.detection_confidence);
        if let Some(v) = env("FACEMATCH_ENFORCE_DETECTION") {
            self.enforce_detection = v != "0" && !v.eq_ignore_ascii_case("false");
        }
        if let Some(v) = env("FACEMATCH_DATABASE_DIR") {
            self.database_dir = PathBuf::from(v);
        }
        if let Some(v) = env("FACEMATCH_BIND_ADDR") {
            self.bind_addr = v;
        }
        self.max_upload_bytes =
            parsed(env, "FACEMATCH_MAX_UPLOAD_BYTES").unwrap_or(self.max_upload_bytes);
    }

    /// Distance threshold in effect for the configured metric.
    pub fn effective_threshold(&self) -> f32 {
        self.threshold.unwrap_or_else(|| self.metric.default_threshold())
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.detector_model)
    }

    /// Path to the ArcFace recognition model.
    pub fn recognizer_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.recognizer_model)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults(&|key: &str| std::env::var(key).ok())
    }
}

fn parsed<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment value");
            None
        }
    }
}

/// `$XDG_DATA_HOME/facematch/models`, falling back to `~/.local/share/facematch/models`.
fn default_model_dir(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    env("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facematch")
        .join("models")
}
