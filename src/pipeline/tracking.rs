//! Per-frame detection and tracking, run on the media thread.

use crate::detection::Detection;
use crate::inference::InferenceStage;
use crate::pipeline::solution::FrameMeta;
use crate::source::Frame;
use crate::tracker::MultiClassTracker;

/// Bundles the inference stage with the multi-class tracker.
pub struct TrackingStage {
    inference: InferenceStage,
    tracker: MultiClassTracker,
}

impl TrackingStage {
    pub fn new(inference: InferenceStage, tracker: MultiClassTracker) -> Self {
        Self { inference, tracker }
    }

    /// Feed one frame; returns the frames whose batch completed.
    pub fn process_frame(&mut self, frame: Frame) -> Vec<FrameMeta> {
        let batch = self.inference.push(frame);
        self.track(batch)
    }

    /// Process a trailing partial batch.
    pub fn flush(&mut self) -> Vec<FrameMeta> {
        let batch = self.inference.flush();
        self.track(batch)
    }

    pub fn tracker(&self) -> &MultiClassTracker {
        &self.tracker
    }

    fn track(&mut self, batch: Vec<(Frame, Vec<Detection>)>) -> Vec<FrameMeta> {
        batch
            .into_iter()
            .map(|(frame, mut detections)| {
                let tracked = self.tracker.update(frame.index, &mut detections);
                FrameMeta {
                    frame,
                    detections,
                    tracked,
                }
            })
            .collect()
    }
}
