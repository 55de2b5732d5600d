use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::SourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 8-bit RGB
    Rgb24,
    /// 8-bit luminance
    Gray8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb24 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// One decoded video frame. The pixel buffer is shared, never copied,
/// between the inference stage and the latest-frame slot.
#[derive(Debug, Clone)]
pub struct Frame {
    /// 1-based position in the stream
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Arc<[u8]>,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(
        index: u64,
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Arc<[u8]>,
    ) -> Result<Self, SourceError> {
        let expected = frame_len(width, height, format);
        if data.len() != expected {
            return Err(SourceError::Decode(format!(
                "frame {} has {} bytes, expected {} for {}x{} {:?}",
                index,
                data.len(),
                expected,
                width,
                height,
                format
            )));
        }
        Ok(Self {
            index,
            width,
            height,
            format,
            data,
            captured_at: Utc::now(),
        })
    }
}

pub fn frame_len(width: u32, height: u32, format: PixelFormat) -> usize {
    width as usize * height as usize * format.bytes_per_pixel()
}
