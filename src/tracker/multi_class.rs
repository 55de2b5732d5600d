//! Multi-class tracking: one independent [`ClassTracker`] per class id.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::detection::{Detection, ObjectClass};
use crate::tracker::class_tracker::ClassTracker;
use crate::tracker::rect::Rect;

/// Configuration for the multi-class tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Maximum accepted `1 - IoU` cost for a track/detection pair
    pub match_thresh: f32,
    /// Frames a confirmed track survives without a match
    pub max_age: u32,
    /// Matches needed before a track is reported
    pub min_hits: u32,
    /// Reported boxes smaller than this (px²) are discarded
    pub min_box_area: f32,
    /// Class ids that are tracked; everything else is dropped
    pub tracked_classes: Vec<u32>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            match_thresh: 0.7,
            max_age: 30,
            min_hits: 3,
            min_box_area: 10.0,
            tracked_classes: ObjectClass::ALL.iter().map(|c| c.class_id()).collect(),
        }
    }
}

/// One tracked object in the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedObject {
    /// Globally unique id, `"{class_id}_{raw_track_id}"`
    pub track_id: String,
    pub bbox: Rect,
    pub score: f32,
    pub class_id: u32,
    /// Index of the source detection in the (filtered) frame detection list
    pub detection_index: usize,
}

pub fn namespaced_track_id(class_id: u32, raw_id: u64) -> String {
    format!("{}_{}", class_id, raw_id)
}

pub struct MultiClassTracker {
    trackers: BTreeMap<u32, ClassTracker>,
    config: TrackerConfig,
}

impl MultiClassTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            trackers: BTreeMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Number of class partitions created so far.
    pub fn class_count(&self) -> usize {
        self.trackers.len()
    }

    /// Track one frame of detections.
    ///
    /// Detections of classes outside the allow-list, or with degenerate
    /// geometry, are removed from `detections`. Every surviving detection
    /// that is matched to a reported track gets its `track_id` set. A class
    /// whose update fails keeps its previous state and reports nothing for
    /// this frame.
    pub fn update(&mut self, frame_idx: u64, detections: &mut Vec<Detection>) -> Vec<TrackedObject> {
        let before = detections.len();
        detections.retain(|d| {
            self.config.tracked_classes.contains(&d.class_id)
                && d.bbox.is_valid()
                && d.confidence.is_finite()
        });
        if detections.len() != before {
            trace!(
                frame = frame_idx,
                dropped = before - detections.len(),
                "Dropped untracked or malformed detections"
            );
        }

        let mut groups: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (idx, det) in detections.iter().enumerate() {
            groups.entry(det.class_id).or_default().push(idx);
        }
        for class_id in groups.keys() {
            if !self.trackers.contains_key(class_id) {
                self.trackers
                    .insert(*class_id, ClassTracker::new(&self.config));
            }
        }

        let mut output = Vec::new();
        for (class_id, tracker) in self.trackers.iter_mut() {
            let indices = groups.get(class_id).map(Vec::as_slice).unwrap_or(&[]);
            let inputs: Vec<(Rect, f32)> = indices
                .iter()
                .map(|&i| (detections[i].bbox, detections[i].confidence))
                .collect();

            let matches = match tracker.update(&inputs) {
                Ok(matches) => matches,
                Err(e) => {
                    warn!(frame = frame_idx, class_id, "Tracking update skipped: {}", e);
                    continue;
                }
            };

            for m in matches {
                if m.bbox.area() < self.config.min_box_area {
                    continue;
                }
                let detection_index = indices[m.detection_index];
                let track_id = namespaced_track_id(*class_id, m.track_id);
                detections[detection_index].track_id = Some(track_id.clone());
                output.push(TrackedObject {
                    track_id,
                    bbox: m.bbox,
                    score: m.score,
                    class_id: *class_id,
                    detection_index,
                });
            }
        }

        output.sort_by_key(|t| t.detection_index);
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class_id: u32, x: f32) -> Detection {
        Detection::new(class_id, 0.9, Rect::new(x, 100.0, 60.0, 120.0))
    }

    #[test]
    fn test_untracked_classes_are_removed() {
        let mut tracker = MultiClassTracker::new(TrackerConfig::default());
        // 16 = dog in COCO, not on the allow-list
        let mut dets = vec![det(16, 0.0), det(2, 200.0)];
        let out = tracker.update(1, &mut dets);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 2);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].detection_index, 0);
        assert_eq!(dets[0].track_id.as_deref(), Some("2_1"));
    }

    #[test]
    fn test_ids_namespaced_per_class() {
        let mut tracker = MultiClassTracker::new(TrackerConfig::default());
        let mut dets = vec![det(0, 100.0), det(2, 100.0)];
        let out = tracker.update(1, &mut dets);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].track_id, "0_1");
        assert_eq!(out[1].track_id, "2_1");
        assert_eq!(tracker.class_count(), 2);
    }

    #[test]
    fn test_tiny_boxes_filtered_from_output() {
        let config = TrackerConfig {
            min_box_area: 100.0,
            ..TrackerConfig::default()
        };
        let mut tracker = MultiClassTracker::new(config);
        let mut dets = vec![Detection::new(2, 0.9, Rect::new(0.0, 0.0, 5.0, 5.0))];
        assert!(tracker.update(1, &mut dets).is_empty());
        assert!(dets[0].track_id.is_none());
    }

    #[test]
    fn test_empty_and_malformed_batches() {
        let mut tracker = MultiClassTracker::new(TrackerConfig::default());
        let mut empty = Vec::new();
        assert!(tracker.update(1, &mut empty).is_empty());

        let mut bad = vec![Detection::new(2, 0.9, Rect::new(f32::NAN, 0.0, 10.0, 10.0))];
        assert!(tracker.update(2, &mut bad).is_empty());
        assert!(bad.is_empty());
    }
}
