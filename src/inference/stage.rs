//! Batching inference stage.

use tracing::{debug, warn};

use crate::detection::{Detection, ObjectClass};
use crate::error::InferenceError;
use crate::inference::detector::{AttributeClassifier, Detector};
use crate::source::Frame;

/// Collects frames into fixed-size batches and runs detection and
/// attribute classification on them.
pub struct InferenceStage {
    detector: Box<dyn Detector>,
    classifier: Box<dyn AttributeClassifier>,
    batch_size: usize,
    confidence_threshold: f32,
    pending: Vec<Frame>,
}

impl InferenceStage {
    pub fn new(
        detector: Box<dyn Detector>,
        classifier: Box<dyn AttributeClassifier>,
        batch_size: usize,
        confidence_threshold: f32,
    ) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            detector,
            classifier,
            batch_size,
            confidence_threshold,
            pending: Vec::with_capacity(batch_size),
        }
    }

    /// Queue a frame; returns the processed batch once it is full.
    pub fn push(&mut self, frame: Frame) -> Vec<(Frame, Vec<Detection>)> {
        self.pending.push(frame);
        if self.pending.len() >= self.batch_size {
            self.run_batch()
        } else {
            Vec::new()
        }
    }

    /// Process whatever is queued, even a partial batch.
    pub fn flush(&mut self) -> Vec<(Frame, Vec<Detection>)> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        self.run_batch()
    }

    fn run_batch(&mut self) -> Vec<(Frame, Vec<Detection>)> {
        let frames = std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_size));
        let results = match self.detector.detect_batch(&frames) {
            Ok(results) if results.len() == frames.len() => results,
            Ok(results) => {
                let e = InferenceError::BatchMismatch {
                    expected: frames.len(),
                    got: results.len(),
                };
                warn!(first_frame = frames[0].index, "Skipping batch: {}", e);
                vec![Vec::new(); frames.len()]
            }
            Err(e) => {
                warn!(first_frame = frames[0].index, "Skipping batch: {}", e);
                vec![Vec::new(); frames.len()]
            }
        };

        frames
            .into_iter()
            .zip(results)
            .map(|(frame, detections)| {
                let detections = self.refine(&frame, detections);
                (frame, detections)
            })
            .collect()
    }

    /// Drop low-confidence or malformed detections and attach person attributes.
    fn refine(&mut self, frame: &Frame, detections: Vec<Detection>) -> Vec<Detection> {
        let before = detections.len();
        let mut kept: Vec<Detection> = detections
            .into_iter()
            .filter(|d| {
                d.confidence.is_finite() && d.confidence >= self.confidence_threshold && d.bbox.is_valid()
            })
            .collect();
        if kept.len() != before {
            debug!(frame = frame.index, dropped = before - kept.len(), "Filtered detections");
        }

        for det in kept.iter_mut() {
            if det.object_class() != Some(ObjectClass::Person) || !det.attributes.is_empty() {
                continue;
            }
            match self.classifier.classify(frame, &det.bbox) {
                Ok(attributes) => det.attributes = attributes,
                Err(e) => warn!(frame = frame.index, "Attribute classification failed: {}", e),
            }
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Attribute;
    use crate::inference::detector::NullClassifier;
    use crate::source::{BlankSource, FrameSource};
    use crate::tracker::Rect;

    struct Fixed(Vec<Detection>);

    impl Detector for Fixed {
        fn detect_batch(&mut self, frames: &[Frame]) -> Result<Vec<Vec<Detection>>, InferenceError> {
            Ok(frames.iter().map(|_| self.0.clone()).collect())
        }
    }

    struct Broken;

    impl Detector for Broken {
        fn detect_batch(&mut self, _frames: &[Frame]) -> Result<Vec<Vec<Detection>>, InferenceError> {
            Err(InferenceError::Backend("device lost".into()))
        }
    }

    struct AlwaysFemale;

    impl AttributeClassifier for AlwaysFemale {
        fn classify(&mut self, _frame: &Frame, _bbox: &Rect) -> Result<Vec<Attribute>, InferenceError> {
            Ok(vec![Attribute::new("gender::female", 0.9), Attribute::new("age::65_plus", 0.8)])
        }
    }

    fn frames(n: u64) -> Vec<Frame> {
        let mut source = BlankSource::new(2, 2, n);
        source.open().unwrap();
        (0..n).map(|_| source.next_frame().unwrap().unwrap()).collect()
    }

    #[test]
    fn test_batches_and_flush() {
        let car = Detection::new(2, 0.9, Rect::new(0.0, 0.0, 10.0, 10.0));
        let mut stage = InferenceStage::new(Box::new(Fixed(vec![car])), Box::new(NullClassifier), 2, 0.3);
        let mut frames = frames(3).into_iter();

        assert!(stage.push(frames.next().unwrap()).is_empty());
        let batch = stage.push(frames.next().unwrap());
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].0.index, 2);
        assert!(stage.push(frames.next().unwrap()).is_empty());
        assert_eq!(stage.flush().len(), 1);
        assert!(stage.flush().is_empty());
    }

    #[test]
    fn test_filters_and_classifies() {
        let dets = vec![
            Detection::new(2, 0.1, Rect::new(0.0, 0.0, 10.0, 10.0)),
            Detection::new(2, 0.9, Rect::new(0.0, 0.0, -1.0, 10.0)),
            Detection::new(0, 0.9, Rect::new(0.0, 0.0, 10.0, 30.0)),
        ];
        let mut stage = InferenceStage::new(Box::new(Fixed(dets)), Box::new(AlwaysFemale), 1, 0.3);
        let out = stage.push(frames(1).remove(0));
        let detections = &out[0].1;
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].attributes.len(), 2);
    }

    #[test]
    fn test_backend_failure_yields_empty_frames() {
        let mut stage = InferenceStage::new(Box::new(Broken), Box::new(NullClassifier), 1, 0.3);
        let out = stage.push(frames(1).remove(0));
        assert_eq!(out.len(), 1);
        assert!(out[0].1.is_empty());
    }
}
