//! Shutdown signalling and background thread handles.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use tracing::{debug, error, warn};

/// Process-wide termination request counter.
///
/// The first request asks for a graceful shutdown; a second request while
/// shutting down asks for an immediate exit.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    requests: Arc<AtomicUsize>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request and return how many have been made so far.
    pub fn request(&self) -> usize {
        self.requests.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_requested(&self) -> bool {
        self.requests.load(Ordering::SeqCst) >= 1
    }

    pub fn is_forced(&self) -> bool {
        self.requests.load(Ordering::SeqCst) >= 2
    }
}

/// A named background thread that stops when its stop channel closes.
///
/// The thread body receives the stop [`Receiver`]; it should wait on it
/// with `recv_timeout` and return once the channel reports disconnection.
pub struct StoppableThread {
    name: String,
    stop_tx: Option<Sender<()>>,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl StoppableThread {
    pub fn spawn<F>(name: &str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce(Receiver<()>) + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);
        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            body(stop_rx);
            let _ = done_tx.send(());
        })?;
        debug!(thread = name, "Background thread started");
        Ok(Self {
            name: name.to_string(),
            stop_tx: Some(stop_tx),
            done_rx,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Close the stop channel without waiting.
    pub fn signal_stop(&mut self) {
        self.stop_tx.take();
    }

    /// Signal and wait up to `timeout`. Returns `false` if the thread was
    /// still running when the timeout expired; it is then left detached.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.signal_stop();
        self.join_timeout(timeout)
    }

    /// Wait up to `timeout` for the thread to finish on its own.
    pub fn join_timeout(&mut self, timeout: Duration) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };
        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    error!(thread = %self.name, "Background thread panicked");
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(thread = %self.name, ?timeout, "Background thread did not stop in time");
                false
            }
        }
    }
}

impl Drop for StoppableThread {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

/// Counts dropped items and says when a drop is worth a log line:
/// the first one, then every hundredth.
#[derive(Debug, Default)]
pub struct DropCounter {
    dropped: AtomicU64,
}

impl DropCounter {
    pub fn record(&self) -> Option<u64> {
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        (total == 1 || total % 100 == 0).then_some(total)
    }

    pub fn total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_signal_escalates() {
        let signal = ShutdownSignal::new();
        let other = signal.clone();
        assert!(!signal.is_requested());
        assert_eq!(other.request(), 1);
        assert!(signal.is_requested() && !signal.is_forced());
        other.request();
        assert!(signal.is_forced());
    }

    #[test]
    fn test_thread_stops_on_signal() {
        let mut thread = StoppableThread::spawn("test-loop", |stop| {
            loop {
                match stop.recv_timeout(Duration::from_millis(10)) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    _ => break,
                }
            }
        })
        .unwrap();
        assert!(thread.stop(Duration::from_secs(2)));
        assert!(thread.stop(Duration::from_secs(2)));
    }

    #[test]
    fn test_join_timeout_expires() {
        let mut thread = StoppableThread::spawn("sleeper", |_stop| {
            thread::sleep(Duration::from_millis(300));
        })
        .unwrap();
        assert!(!thread.join_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_drop_counter_log_points() {
        let counter = DropCounter::default();
        let logged: Vec<u64> = (0..250).filter_map(|_| counter.record()).collect();
        assert_eq!(logged, vec![1, 100, 200]);
        assert_eq!(counter.total(), 250);
    }
}
