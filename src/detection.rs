//! Per-frame detections and the counting label vocabulary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::tracker::Rect;

/// Classes the tracker follows, with their COCO class ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectClass {
    Person,
    Bicycle,
    Car,
    Motorcycle,
    Bus,
    Truck,
}

impl ObjectClass {
    pub const ALL: [ObjectClass; 6] = [
        ObjectClass::Person,
        ObjectClass::Bicycle,
        ObjectClass::Car,
        ObjectClass::Motorcycle,
        ObjectClass::Bus,
        ObjectClass::Truck,
    ];

    pub fn class_id(self) -> u32 {
        match self {
            ObjectClass::Person => 0,
            ObjectClass::Bicycle => 1,
            ObjectClass::Car => 2,
            ObjectClass::Motorcycle => 3,
            ObjectClass::Bus => 5,
            ObjectClass::Truck => 7,
        }
    }

    pub fn from_class_id(class_id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.class_id() == class_id)
    }

    pub fn name(self) -> &'static str {
        match self {
            ObjectClass::Person => "person",
            ObjectClass::Bicycle => "bicycle",
            ObjectClass::Car => "car",
            ObjectClass::Motorcycle => "motorcycle",
            ObjectClass::Bus => "bus",
            ObjectClass::Truck => "truck",
        }
    }

    pub fn is_vehicle(self) -> bool {
        self != ObjectClass::Person
    }
}

/// Secondary classifier output, e.g. `("gender::male", 0.83)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub label: String,
    pub confidence: f32,
}

impl Attribute {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// One object observed in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    pub label: String,
    pub confidence: f32,
    /// Box in frame pixel coordinates
    pub bbox: Rect,
    pub attributes: Vec<Attribute>,
    /// Set once the tracker has matched this detection
    pub track_id: Option<String>,
}

impl Detection {
    pub fn new(class_id: u32, confidence: f32, bbox: Rect) -> Self {
        let label = ObjectClass::from_class_id(class_id)
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| format!("class_{}", class_id));
        Self {
            class_id,
            label,
            confidence,
            bbox,
            attributes: Vec::new(),
            track_id: None,
        }
    }

    pub fn with_attributes(mut self, attributes: Vec<Attribute>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_track_id(mut self, track_id: impl Into<String>) -> Self {
        self.track_id = Some(track_id.into());
        self
    }

    pub fn object_class(&self) -> Option<ObjectClass> {
        ObjectClass::from_class_id(self.class_id)
    }

    /// Highest-confidence attribute value under `prefix` (`"gender"`, `"age"`).
    fn best_attribute(&self, prefix: &str) -> Option<&str> {
        self.attributes
            .iter()
            .filter_map(|a| {
                a.label
                    .strip_prefix(prefix)
                    .and_then(|rest| rest.strip_prefix("::"))
                    .map(|value| (value, a.confidence))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(value, _)| value)
    }
}

pub const GENDERS: [&str; 2] = ["male", "female"];
pub const AGE_GROUPS: [&str; 5] = ["under_18", "18_to_29", "30_to_49", "50_to_64", "65_plus"];
pub const VEHICLE_PREFIX: &str = "vehicle";

/// Ordered vocabulary of counting labels; a label's position is the vote
/// index used while accumulating per-track votes.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl Default for LabelTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl LabelTable {
    /// `{gender}::{age}` for every pair, then `vehicle::{type}`.
    pub fn standard() -> Self {
        let mut labels = Vec::new();
        for gender in GENDERS {
            for age in AGE_GROUPS {
                labels.push(format!("{}::{}", gender, age));
            }
        }
        for class in ObjectClass::ALL.into_iter().filter(|c| c.is_vehicle()) {
            labels.push(format!("{}::{}", VEHICLE_PREFIX, class.name()));
        }
        Self { labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Vote index for one detection: vehicles by class, persons by their
    /// best gender and age attributes. `None` when nothing can be resolved.
    pub fn label_for(&self, detection: &Detection) -> Option<usize> {
        match detection.object_class()? {
            ObjectClass::Person => {
                let gender = detection.best_attribute("gender")?;
                let age = detection.best_attribute("age")?;
                self.index_of(&format!("{}::{}", gender, age))
            }
            vehicle => self.index_of(&format!("{}::{}", VEHICLE_PREFIX, vehicle.name())),
        }
    }
}

/// A finalized count label split into the fields the store persists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountLabel {
    Human { gender: String, age: String },
    Traffic { vehicle_type: String },
}

impl FromStr for CountLabel {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (head, tail) = s
            .split_once("::")
            .filter(|(h, t)| !h.is_empty() && !t.is_empty())
            .ok_or_else(|| StoreError::InvalidLabel(s.to_string()))?;
        if head == VEHICLE_PREFIX {
            Ok(CountLabel::Traffic {
                vehicle_type: tail.to_string(),
            })
        } else if GENDERS.contains(&head) {
            Ok(CountLabel::Human {
                gender: head.to_string(),
                age: tail.to_string(),
            })
        } else {
            Err(StoreError::InvalidLabel(s.to_string()))
        }
    }
}

impl fmt::Display for CountLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountLabel::Human { gender, age } => write!(f, "{}::{}", gender, age),
            CountLabel::Traffic { vehicle_type } => write!(f, "{}::{}", VEHICLE_PREFIX, vehicle_type),
        }
    }
}
