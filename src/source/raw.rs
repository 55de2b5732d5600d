//! Raw video file source and synthetic blank source.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::SourceError;
use crate::source::frame::{Frame, PixelFormat, frame_len};
use crate::source::FrameSource;

/// Headerless file of back-to-back packed frames with fixed geometry.
pub struct RawVideoSource {
    path: PathBuf,
    width: u32,
    height: u32,
    format: PixelFormat,
    frame_interval: Option<Duration>,
    reader: Option<BufReader<File>>,
    next_index: u64,
    last_emit: Option<Instant>,
}

impl RawVideoSource {
    pub fn new(path: impl Into<PathBuf>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            path: path.into(),
            width,
            height,
            format,
            frame_interval: None,
            reader: None,
            next_index: 1,
            last_emit: None,
        }
    }

    /// Pace output to `fps` frames per second instead of reading flat out.
    pub fn with_fps(mut self, fps: f64) -> Self {
        self.frame_interval = (fps > 0.0).then(|| Duration::from_secs_f64(1.0 / fps));
        self
    }

    fn pace(&mut self) {
        if let (Some(interval), Some(last)) = (self.frame_interval, self.last_emit) {
            if let Some(wait) = interval.checked_sub(last.elapsed()) {
                thread::sleep(wait);
            }
        }
        self.last_emit = Some(Instant::now());
    }
}

impl FrameSource for RawVideoSource {
    fn open(&mut self) -> Result<(), SourceError> {
        if self.width == 0 || self.height == 0 {
            return Err(SourceError::Unavailable(format!(
                "invalid geometry {}x{}",
                self.width, self.height
            )));
        }
        let file = File::open(&self.path)?;
        self.reader = Some(BufReader::new(file));
        self.next_index = 1;
        info!(path = %self.path.display(), width = self.width, height = self.height, "Raw video opened");
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let len = frame_len(self.width, self.height, self.format);
        let reader = self.reader.as_mut().ok_or(SourceError::NotOpened)?;

        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if filled == 0 {
            debug!(frames = self.next_index - 1, "End of raw video");
            return Ok(None);
        }
        if filled < len {
            return Err(SourceError::Decode(format!(
                "truncated frame {}: {} of {} bytes",
                self.next_index, filled, len
            )));
        }

        self.pace();
        let frame = Frame::new(self.next_index, self.width, self.height, self.format, buf.into())?;
        self.next_index += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.reader = None;
    }

    fn describe(&self) -> String {
        format!("raw:{}", self.path.display())
    }
}

/// A fixed number of black frames. Useful for replaying recorded
/// detections without the original video.
pub struct BlankSource {
    width: u32,
    height: u32,
    total: u64,
    emitted: u64,
    opened: bool,
    data: Arc<[u8]>,
}

impl BlankSource {
    pub fn new(width: u32, height: u32, total: u64) -> Self {
        Self {
            width,
            height,
            total,
            emitted: 0,
            opened: false,
            data: vec![0u8; frame_len(width, height, PixelFormat::Rgb24)].into(),
        }
    }
}

impl FrameSource for BlankSource {
    fn open(&mut self) -> Result<(), SourceError> {
        self.opened = true;
        self.emitted = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if !self.opened {
            return Err(SourceError::NotOpened);
        }
        if self.emitted >= self.total {
            return Ok(None);
        }
        self.emitted += 1;
        Frame::new(
            self.emitted,
            self.width,
            self.height,
            PixelFormat::Rgb24,
            self.data.clone(),
        )
        .map(Some)
    }

    fn close(&mut self) {
        self.opened = false;
    }

    fn describe(&self) -> String {
        format!("blank:{}x{}x{}", self.width, self.height, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_source_reads_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.rgb");
        // two full 2x2 RGB frames and a truncated third
        let mut bytes = vec![1u8; 12];
        bytes.extend(vec![2u8; 12]);
        bytes.extend(vec![3u8; 5]);
        std::fs::write(&path, bytes).unwrap();

        let mut source = RawVideoSource::new(&path, 2, 2, PixelFormat::Rgb24);
        assert!(matches!(source.next_frame(), Err(SourceError::NotOpened)));
        source.open().unwrap();
        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.index, 1);
        assert_eq!(first.data[0], 1);
        assert_eq!(source.next_frame().unwrap().unwrap().index, 2);
        assert!(matches!(source.next_frame(), Err(SourceError::Decode(_))));
    }

    #[test]
    fn test_raw_source_end_of_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.gray");
        std::fs::write(&path, vec![0u8; 4]).unwrap();
        let mut source = RawVideoSource::new(&path, 2, 2, PixelFormat::Gray8);
        source.open().unwrap();
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_missing_file_is_transient() {
        let mut source = RawVideoSource::new("/nonexistent/clip.rgb", 2, 2, PixelFormat::Rgb24);
        assert!(source.open().unwrap_err().is_transient());
    }

    #[test]
    fn test_blank_source_shares_buffer() {
        let mut source = BlankSource::new(4, 4, 2);
        source.open().unwrap();
        let a = source.next_frame().unwrap().unwrap();
        let b = source.next_frame().unwrap().unwrap();
        assert!(Arc::ptr_eq(&a.data, &b.data));
        assert_eq!((a.index, b.index), (1, 2));
        assert!(source.next_frame().unwrap().is_none());
    }
}
