use crate::channel::Command;
use crate::detection::Detection;
use crate::source::Frame;
use crate::tracker::TrackedObject;

/// Everything the worker thread needs to know about one processed frame.
#[derive(Debug, Clone)]
pub struct FrameMeta {
    pub frame: Frame,
    /// Allow-listed detections; tracked ones carry their track id
    pub detections: Vec<Detection>,
    pub tracked: Vec<TrackedObject>,
}

/// Application logic driven by the pipeline worker thread.
///
/// All methods run on the worker thread, in order. `cleanup` is called
/// exactly once, when the worker stops.
pub trait Solution: Send {
    fn name(&self) -> &str;

    fn on_start(&mut self) {}

    fn on_frame(&mut self, meta: FrameMeta);

    fn on_command(&mut self, command: Command);

    /// Called when no frame or command arrived within the poll timeout.
    fn on_idle(&mut self) {}

    fn cleanup(&mut self);
}
