//! Frame source adapters.

mod frame;
mod raw;
mod retrying;

pub use frame::{Frame, PixelFormat, frame_len};
pub use raw::{BlankSource, RawVideoSource};
pub use retrying::RetryingSource;

use crate::error::SourceError;

/// A stream of decoded frames.
pub trait FrameSource: Send {
    fn open(&mut self) -> Result<(), SourceError>;

    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    fn close(&mut self) {}

    fn describe(&self) -> String {
        "source".to_string()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn open(&mut self) -> Result<(), SourceError> {
        (**self).open()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        (**self).next_frame()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
