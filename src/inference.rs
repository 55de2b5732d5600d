//! Inference stage: detection backends, attribute classification, batching.

mod detector;
mod replay;
mod stage;

pub use detector::{AttributeClassifier, DetectionRecord, Detector, NullClassifier};
pub use replay::ReplayDetector;
pub use stage::InferenceStage;
