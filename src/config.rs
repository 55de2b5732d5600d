//! Application configuration: JSON file, then `CITYEYE_*` environment
//! overrides, then CLI flags (applied by the binary).

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::counter::CounterConfig;
use crate::error::ConfigError;
use crate::pipeline::PipelineConfig;
use crate::sync::SyncConfig;
use crate::tracker::TrackerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Synthetic frames, for replaying precomputed detections
    Blank,
    /// Packed RGB24 frames read from a file
    Raw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub path: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    /// Frame count for [`SourceKind::Blank`]
    pub frames: u64,
    /// Read pacing for [`SourceKind::Raw`]; unpaced when absent
    pub fps: Option<f64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Blank,
            path: None,
            width: 1280,
            height: 720,
            frames: 300,
            fps: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device_id: String,
    pub solution_id: String,
    pub xlines_path: PathBuf,
    pub db_path: PathBuf,
    pub outbox_dir: PathBuf,
    pub capture_dir: PathBuf,
    pub inbox_dir: PathBuf,
    /// JSON Lines detections replayed instead of running a model
    pub detections_path: Option<PathBuf>,
    pub inbox_poll_ms: u64,
    pub source: SourceConfig,
    pub tracker: TrackerConfig,
    pub counter: CounterConfig,
    pub sync: SyncConfig,
    pub pipeline: PipelineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device_id: "cityeye-dev".to_string(),
            solution_id: "city-eye".to_string(),
            xlines_path: PathBuf::from("xlines.json"),
            db_path: PathBuf::from("cityeye.db"),
            outbox_dir: PathBuf::from("outbox"),
            capture_dir: PathBuf::from("captures"),
            inbox_dir: PathBuf::from("inbox"),
            detections_path: None,
            inbox_poll_ms: 500,
            source: SourceConfig::default(),
            tracker: TrackerConfig::default(),
            counter: CounterConfig::default(),
            sync: SyncConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Defaults, or the given JSON file with missing fields defaulted.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::parse(&content)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Apply `CITYEYE_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|key| env::var(key).ok())
    }

    /// Apply overrides from any key lookup.
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = lookup("CITYEYE_DEVICE_ID") {
            self.device_id = v;
        }
        if let Some(v) = lookup("CITYEYE_SOLUTION_ID") {
            self.solution_id = v;
        }
        if let Some(v) = lookup("CITYEYE_XLINES_PATH") {
            self.xlines_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("CITYEYE_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("CITYEYE_SYNC_INTERVAL_SECS") {
            self.sync.interval_secs = parse_var("CITYEYE_SYNC_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("CITYEYE_SYNC_BATCH_SIZE") {
            self.sync.batch_size = parse_var("CITYEYE_SYNC_BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("CITYEYE_MAX_RETRIES") {
            self.sync.max_retries = parse_var("CITYEYE_MAX_RETRIES", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_id.trim().is_empty() {
            return Err(ConfigError::invalid("device_id must not be empty"));
        }
        if self.solution_id.trim().is_empty() {
            return Err(ConfigError::invalid("solution_id must not be empty"));
        }
        if self.sync.batch_size == 0 {
            return Err(ConfigError::invalid("sync.batch_size must be at least 1"));
        }
        if self.pipeline.inference_batch_size == 0 {
            return Err(ConfigError::invalid("pipeline.inference_batch_size must be at least 1"));
        }
        if self.pipeline.frame_queue_capacity == 0 || self.pipeline.command_queue_capacity == 0 {
            return Err(ConfigError::invalid("pipeline queue capacities must be at least 1"));
        }
        if self.counter.vote_window == 0 || self.counter.history_limit == 0 {
            return Err(ConfigError::invalid("counter windows must be at least 1"));
        }
        if self.source.kind == SourceKind::Raw && self.source.path.is_none() {
            return Err(ConfigError::invalid("source.path is required for a raw source"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(ConfigError::invalid("source geometry must be non-zero"));
        }
        debug!(device = %self.device_id, "Configuration validated");
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::invalid(format!("{}={:?}: {}", key, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.sync.batch_size, 100);
        assert_eq!(config.pipeline.frame_queue_capacity, 100);
        assert_eq!(config.counter.buffer_size, 30);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::parse(r#"{"device_id": "cam-7", "sync": {"batch_size": 10}}"#).unwrap();
        assert_eq!(config.device_id, "cam-7");
        assert_eq!(config.sync.batch_size, 10);
        assert_eq!(config.sync.max_retries, 5);
        assert_eq!(config.tracker.min_hits, 3);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CITYEYE_DEVICE_ID", "cam-9"),
            ("CITYEYE_SYNC_BATCH_SIZE", "25"),
            ("CITYEYE_MAX_RETRIES", " 2 "),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::default();
        config
            .apply_vars(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.device_id, "cam-9");
        assert_eq!(config.sync.batch_size, 25);
        assert_eq!(config.sync.max_retries, 2);
    }

    #[test]
    fn test_bad_env_value_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_vars(|k| (k == "CITYEYE_SYNC_INTERVAL_SECS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_validation_failures() {
        let mut config = AppConfig::default();
        config.device_id = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.sync.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.source.kind = SourceKind::Raw;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/cityeye.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
