use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::error::SourceError;
use crate::source::FrameSource;
use crate::source::frame::Frame;

/// Retries transient open/read failures a bounded number of times.
pub struct RetryingSource<S> {
    inner: S,
    max_retries: u32,
    delay: Duration,
}

impl<S: FrameSource> RetryingSource<S> {
    pub fn new(inner: S, max_retries: u32, delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            delay,
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn with_retries<T>(
        &mut self,
        what: &str,
        mut op: impl FnMut(&mut S) -> Result<T, SourceError>,
    ) -> Result<T, SourceError> {
        let mut attempt = 0;
        loop {
            match op(&mut self.inner) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        source = %self.inner.describe(),
                        attempt,
                        max_retries = self.max_retries,
                        "Source {} failed, retrying: {}", what, e
                    );
                    thread::sleep(self.delay);
                }
                Err(e) if e.is_transient() => {
                    return Err(SourceError::Unavailable(format!(
                        "{} {} failed after {} attempts: {}",
                        self.inner.describe(),
                        what,
                        attempt + 1,
                        e
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<S: FrameSource> FrameSource for RetryingSource<S> {
    fn open(&mut self) -> Result<(), SourceError> {
        self.with_retries("open", |s| s.open())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        self.with_retries("read", |s| s.next_frame())
    }

    fn close(&mut self) {
        self.inner.close();
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}
