//! Pipeline orchestration: state machine, media/worker threads and the
//! solution hook.

mod city_eye;
mod controller;
mod latest_frame;
mod solution;
mod state;
mod tracking;

pub use city_eye::{CityEyeSolution, SolutionContext};
pub use controller::{BusMessage, PipelineConfig, PipelineController, RunOutcome};
pub use latest_frame::LatestFrame;
pub use solution::{FrameMeta, Solution};
pub use state::PipelineState;
pub use tracking::TrackingStage;
