//! Traits for detection and attribute inference backends.

use serde::{Deserialize, Serialize};

use crate::detection::{Attribute, Detection};
use crate::error::InferenceError;
use crate::source::Frame;
use crate::tracker::Rect;

/// Object detection backend.
///
/// Implement this trait to connect any detection model to the pipeline.
///
/// # Example
///
/// ```ignore
/// use cityeye::inference::Detector;
///
/// struct MyDetector {
///     // Your model here
/// }
///
/// impl Detector for MyDetector {
///     fn detect_batch(&mut self, frames: &[Frame]) -> Result<Vec<Vec<Detection>>, InferenceError> {
///         // One detection list per input frame, in order
///         Ok(frames.iter().map(|_| Vec::new()).collect())
///     }
/// }
/// ```
pub trait Detector: Send {
    /// Run inference on a batch of frames.
    ///
    /// # Returns
    /// One detection list per frame, in input order.
    fn detect_batch(&mut self, frames: &[Frame]) -> Result<Vec<Vec<Detection>>, InferenceError>;
}

/// Secondary classifier run on person crops (gender, age group).
pub trait AttributeClassifier: Send {
    fn classify(&mut self, frame: &Frame, bbox: &Rect) -> Result<Vec<Attribute>, InferenceError>;
}

/// Classifier that never produces attributes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullClassifier;

impl AttributeClassifier for NullClassifier {
    fn classify(&mut self, _frame: &Frame, _bbox: &Rect) -> Result<Vec<Attribute>, InferenceError> {
        Ok(Vec::new())
    }
}

/// Model-agnostic detection record: box in TLBR pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub class_id: u32,
    pub confidence: f32,
    /// `[x1, y1, x2, y2]`
    pub bbox: [f32; 4],
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl DetectionRecord {
    pub fn into_detection(self) -> Detection {
        let [x1, y1, x2, y2] = self.bbox;
        Detection::new(self.class_id, self.confidence, Rect::from_tlbr(x1, y1, x2, y2))
            .with_attributes(self.attributes)
    }
}
