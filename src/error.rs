//! Error types, one enum per component.

use std::path::PathBuf;

use thiserror::Error;

/// Startup / reload configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to install log subscriber: {0}")]
    Logging(String),
}

impl ConfigError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Zone (xline) configuration errors.
#[derive(Debug, Error)]
pub enum ZoneError {
    #[error("Failed to read zone file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed zone configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Zone configuration contains no polygons")]
    Empty,

    #[error("Zone {index} has {points} points, at least 3 are required")]
    TooFewPoints { index: usize, points: usize },

    #[error("Zone {index} is degenerate (non-finite coordinates or zero area)")]
    Degenerate { index: usize },
}

/// Tracking errors. A failed update leaves the track table untouched.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("Assignment failed: {0}")]
    Assignment(String),

    #[error("Cost matrix contains non-finite values")]
    NonFiniteCost,

    #[error("Innovation covariance is singular")]
    SingularCovariance,
}

/// Frame source (camera / file / stream) errors.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Source not opened")]
    NotOpened,

    #[error("Frame decode failed: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Whether a bounded retry is worthwhile.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Unavailable(_))
    }
}

/// Inference stage errors.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Inference backend failed: {0}")]
    Backend(String),

    #[error("Detector returned {got} results for a batch of {expected} frames")]
    BatchMismatch { expected: usize, got: usize },

    #[error("Malformed detection record at line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Local durable store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Store connection lock poisoned")]
    Poisoned,

    #[error("Unrecognized count label: {0}")]
    InvalidLabel(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Cloud channel / object store errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel disconnected")]
    Disconnected,

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Object upload failed: {0}")]
    Upload(String),

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("No frame available for capture")]
    NoFrame,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ChannelResult<T> = Result<T, ChannelError>;

/// Pipeline controller errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid state transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: crate::pipeline::PipelineState,
        to: crate::pipeline::PipelineState,
    },

    #[error("Pipeline is missing its {0}")]
    MissingStage(&'static str),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Failed to spawn thread: {0}")]
    Spawn(#[source] std::io::Error),
}
