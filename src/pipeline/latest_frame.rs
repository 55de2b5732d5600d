use std::sync::{Arc, Mutex, PoisonError};

use crate::source::Frame;

/// Single-slot holder for the most recent frame.
#[derive(Debug, Clone, Default)]
pub struct LatestFrame {
    slot: Arc<Mutex<Option<Frame>>>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, frame: Frame) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
    }

    pub fn get(&self) -> Option<Frame> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
