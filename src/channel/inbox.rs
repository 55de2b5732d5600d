//! Directory inbox feeding the command router.
//!
//! Each `*.json` file dropped into the inbox is one inbound message. The
//! file stem is used as the topic for logging. A file is removed only once
//! its command is queued; unparseable files are renamed to `*.rejected`, and
//! files still being written (modified within the settle time) are left for
//! the next poll.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use tracing::{debug, info, warn};

use crate::channel::command::{CommandRouter, Routed};
use crate::lifecycle::StoppableThread;

const DEFAULT_SETTLE: Duration = Duration::from_millis(250);
const REJECTED_SUFFIX: &str = "rejected";

pub struct InboxWatcher {
    dir: PathBuf,
    router: Arc<CommandRouter>,
    poll_interval: Duration,
    settle: Duration,
}

impl InboxWatcher {
    pub fn new(dir: impl Into<PathBuf>, router: Arc<CommandRouter>, poll_interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            router,
            poll_interval,
            settle: DEFAULT_SETTLE,
        }
    }

    /// Minimum age of a file before it is read.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Deliver pending messages in file-name order. Returns how many were queued.
    ///
    /// Stops at the first message the queue cannot take, so order is kept.
    pub fn poll_once(&self) -> usize {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), "Inbox unreadable: {}", e);
                return 0;
            }
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut queued = 0;
        for path in &paths {
            if !self.is_settled(path) {
                debug!(file = %path.display(), "Inbox message still being written");
                break;
            }
            match self.deliver(path) {
                Some(Routed::Queued) => queued += 1,
                Some(Routed::Malformed) | None => {}
                Some(Routed::Busy) | Some(Routed::Closed) => break,
            }
        }
        queued
    }

    fn is_settled(&self, path: &Path) -> bool {
        match fs::metadata(path).and_then(|m| m.modified()) {
            // A modification time in the future counts as settled.
            Ok(modified) => modified.elapsed().map_or(true, |age| age >= self.settle),
            Err(_) => false,
        }
    }

    fn deliver(&self, path: &Path) -> Option<Routed> {
        let payload = match fs::read(path) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(file = %path.display(), "Failed to read inbox message: {}", e);
                return None;
            }
        };
        let topic = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let routed = self.router.on_message(&topic, &payload);
        match routed {
            Routed::Queued => {
                if let Err(e) = fs::remove_file(path) {
                    warn!(file = %path.display(), "Failed to remove inbox message: {}", e);
                }
            }
            Routed::Malformed => {
                let mut rejected = path.as_os_str().to_owned();
                rejected.push(".");
                rejected.push(REJECTED_SUFFIX);
                if let Err(e) = fs::rename(path, &rejected) {
                    warn!(file = %path.display(), "Failed to set aside rejected message: {}", e);
                }
            }
            Routed::Busy | Routed::Closed => {
                debug!(file = %path.display(), ?routed, "Inbox message kept for retry");
            }
        }
        Some(routed)
    }

    /// Poll on a background thread until stopped.
    pub fn spawn(self) -> std::io::Result<StoppableThread> {
        fs::create_dir_all(&self.dir)?;
        StoppableThread::spawn("cityeye-inbox", move |stop| {
            info!(dir = %self.dir.display(), "Inbox watcher started");
            loop {
                self.poll_once();
                match stop.recv_timeout(self.poll_interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    _ => break,
                }
            }
            info!("Inbox watcher stopped");
        })
    }
}
