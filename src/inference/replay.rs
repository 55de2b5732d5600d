//! Detector that replays recorded detections from a JSON Lines file.
//!
//! One line per frame: `{"frame": 3, "detections": [{"class_id": 2,
//! "confidence": 0.9, "bbox": [x1, y1, x2, y2]}]}`. Frames without a line
//! have no detections.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::detection::Detection;
use crate::error::InferenceError;
use crate::inference::detector::{DetectionRecord, Detector};
use crate::source::Frame;

#[derive(Debug, Deserialize)]
struct FrameRecord {
    frame: u64,
    #[serde(default)]
    detections: Vec<DetectionRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayDetector {
    frames: HashMap<u64, Vec<DetectionRecord>>,
}

impl ReplayDetector {
    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        let content = std::fs::read_to_string(path)?;
        let detector = Self::parse(&content)?;
        info!(path = %path.display(), frames = detector.frames.len(), "Loaded recorded detections");
        Ok(detector)
    }

    pub fn parse(content: &str) -> Result<Self, InferenceError> {
        let mut frames: HashMap<u64, Vec<DetectionRecord>> = HashMap::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: FrameRecord = serde_json::from_str(line).map_err(|source| {
                InferenceError::Parse {
                    line: idx + 1,
                    source,
                }
            })?;
            frames.entry(record.frame).or_default().extend(record.detections);
        }
        Ok(Self { frames })
    }

    /// Set the detections for one frame.
    pub fn insert(&mut self, frame: u64, records: Vec<DetectionRecord>) {
        self.frames.insert(frame, records);
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl Detector for ReplayDetector {
    fn detect_batch(&mut self, frames: &[Frame]) -> Result<Vec<Vec<Detection>>, InferenceError> {
        Ok(frames
            .iter()
            .map(|frame| {
                self.frames
                    .get(&frame.index)
                    .map(|records| records.iter().cloned().map(DetectionRecord::into_detection).collect())
                    .unwrap_or_default()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{BlankSource, FrameSource};

    #[test]
    fn test_replay_by_frame_index() {
        let jsonl = r#"
{"frame": 1, "detections": [{"class_id": 2, "confidence": 0.9, "bbox": [0, 0, 10, 10]}]}
{"frame": 3, "detections": []}
"#;
        let mut detector = ReplayDetector::parse(jsonl).unwrap();
        let mut source = BlankSource::new(2, 2, 3);
        source.open().unwrap();
        let frames: Vec<Frame> = (0..3).map(|_| source.next_frame().unwrap().unwrap()).collect();

        let out = detector.detect_batch(&frames).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].len(), 1);
        assert_eq!(out[0][0].class_id, 2);
        assert!(out[1].is_empty() && out[2].is_empty());
    }

    #[test]
    fn test_parse_error_reports_line() {
        let err = ReplayDetector::parse("{\"frame\": 1}\n{oops").unwrap_err();
        assert!(matches!(err, InferenceError::Parse { line: 2, .. }));
    }
}
