//! Outbound status payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Successful,
    Failed,
}

/// Reported state after a zone configuration update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneUpdateStatus {
    pub status: Outcome,
    pub message_id: Option<String>,
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ZoneUpdateStatus {
    pub fn successful(message_id: Option<String>, version: Option<u64>) -> Self {
        Self {
            status: Outcome::Successful,
            message_id,
            version,
            error: None,
        }
    }

    pub fn failed(message_id: Option<String>, version: Option<u64>, error: impl ToString) -> Self {
        Self {
            status: Outcome::Failed,
            message_id,
            version,
            error: Some(error.to_string()),
        }
    }
}

/// Response to a `capture_image` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResponse {
    pub message_id: String,
    pub status: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl CaptureResponse {
    pub fn uploaded(message_id: String, filename: String, path: String) -> Self {
        Self {
            message_id,
            status: Outcome::Successful,
            filename: Some(filename),
            path: Some(path),
            error_message: None,
        }
    }

    pub fn failed(message_id: String, error: impl ToString) -> Self {
        Self {
            message_id,
            status: Outcome::Failed,
            filename: None,
            path: None,
            error_message: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    Offline,
}

/// Application heartbeat, published on start and on graceful shutdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppStatus {
    pub device_id: String,
    pub status: Presence,
    pub timestamp: DateTime<Utc>,
}

impl AppStatus {
    pub fn new(device_id: impl Into<String>, status: Presence) -> Self {
        Self {
            device_id: device_id.into(),
            status,
            timestamp: Utc::now(),
        }
    }
}
