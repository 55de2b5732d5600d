mod class_tracker;
mod kalman_filter;
mod matching;
mod multi_class;
mod rect;
mod track_state;

pub use class_tracker::{ClassTracker, RawTrack, TrackMatch};
pub use kalman_filter::KalmanFilter;
pub use matching::{AssignmentResult, iou_distance, linear_assignment};
pub use multi_class::{MultiClassTracker, TrackedObject, TrackerConfig, namespaced_track_id};
pub use rect::Rect;
pub use track_state::TrackState;
