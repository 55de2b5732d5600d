//! Filesystem-backed channel and object store.
//!
//! The spool writes every published message as one JSON file so a separate
//! bridge process (or an operator) can forward it to the broker later.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::channel::cloud::{CloudChannel, ObjectStore};
use crate::error::{ChannelError, ChannelResult};

/// One spooled message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpooledMessage {
    pub topic: String,
    pub payload: Value,
    pub published_at: DateTime<Utc>,
}

pub struct SpoolChannel {
    dir: PathBuf,
    seq: AtomicU64,
}

impl SpoolChannel {
    pub fn open(dir: impl Into<PathBuf>) -> ChannelResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            seq: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Spooled messages in publish order.
    pub fn read_all(&self) -> ChannelResult<Vec<SpooledMessage>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        let mut messages = Vec::with_capacity(paths.len());
        for path in paths {
            messages.push(serde_json::from_slice(&fs::read(&path)?)?);
        }
        Ok(messages)
    }
}

impl CloudChannel for SpoolChannel {
    fn publish(&self, topic: &str, payload: &[u8]) -> ChannelResult<()> {
        let payload = serde_json::from_slice(payload)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(payload).into_owned()));
        let message = SpooledMessage {
            topic: topic.to_string(),
            payload,
            published_at: Utc::now(),
        };
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{:06}.json", message.published_at.timestamp_millis(), seq);
        write_atomic(&self.dir.join(&name), &serde_json::to_vec(&message)?)
            .map_err(|e| ChannelError::Publish(e.to_string()))?;
        debug!(topic, file = %name, "Message spooled");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.dir.is_dir()
    }
}

/// Objects stored as files below a root directory.
pub struct DirObjectStore {
    root: PathBuf,
}

impl DirObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ObjectStore for DirObjectStore {
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> ChannelResult<String> {
        if key.split('/').any(|part| part.is_empty() || part == "..") {
            return Err(ChannelError::Upload(format!("invalid object key: {}", key)));
        }
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_atomic(&path, bytes).map_err(|e| ChannelError::Upload(e.to_string()))?;
        debug!(key, content_type, bytes = bytes.len(), "Object stored");
        Ok(path.display().to_string())
    }
}

/// Write to a sibling temp file, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_spool_publish_order() {
        let dir = tempfile::tempdir().unwrap();
        let spool = SpoolChannel::open(dir.path().join("outbox")).unwrap();
        assert!(spool.is_connected());
        spool.publish("a", br#"{"n": 1}"#).unwrap();
        spool.publish("b", b"plain text").unwrap();

        let messages = spool.read_all().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].topic, "a");
        assert_eq!(messages[0].payload, json!({"n": 1}));
        assert_eq!(messages[1].payload, json!("plain text"));
    }

    #[test]
    fn test_object_store_put() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirObjectStore::new(dir.path());
        let location = store
            .put("captures/city_eye/dev/capture.jpg", b"jpeg", "image/jpeg")
            .unwrap();
        assert_eq!(std::fs::read(&location).unwrap(), b"jpeg");
        assert!(store.put("../escape.jpg", b"x", "image/jpeg").is_err());
    }
}
