//! Edge video analytics: per-class multi-object tracking, zone-crossing
//! counts, a durable local result store and batched cloud sync.

pub mod channel;
pub mod config;
pub mod counter;
pub mod detection;
pub mod error;
pub mod inference;
pub mod lifecycle;
pub mod pipeline;
pub mod source;
pub mod store;
pub mod sync;
pub mod telemetry;
pub mod tracker;

pub use config::AppConfig;
pub use counter::{CountEvent, ZoneCounter, ZoneSet};
pub use detection::{Detection, LabelTable, ObjectClass};
pub use pipeline::{CityEyeSolution, PipelineController, PipelineState, RunOutcome};
pub use store::LocalStore;
pub use sync::BatchSyncHandler;
pub use tracker::{MultiClassTracker, Rect, TrackerConfig};
