//! Batch sync: claim pending rows, publish them, flip or release the claims.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::channel::CloudChannel;
use crate::lifecycle::StoppableThread;
use crate::store::{ClaimedBatch, LocalStore};
use crate::sync::backoff::Backoff;
use crate::sync::janitor::Janitor;
use crate::sync::message::SyncMessage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub interval_secs: u64,
    pub batch_size: usize,
    /// Rows younger than this are never claimed
    pub grace_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_secs: u64,
    /// Fraction of each backoff delay, applied as `±jitter`
    pub jitter: f64,
    pub stale_claim_max_age_secs: u64,
    pub janitor_interval_secs: u64,
    pub retention_days: u32,
    pub purge_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 120,
            batch_size: 100,
            grace_secs: 120,
            max_retries: 5,
            initial_backoff_ms: 2_000,
            max_backoff_secs: 300,
            jitter: 0.2,
            stale_claim_max_age_secs: 60 * 60,
            janitor_interval_secs: 60 * 60,
            retention_days: 7,
            purge_interval_secs: 24 * 60 * 60,
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn grace(&self) -> TimeDelta {
        TimeDelta::seconds(self.grace_secs as i64)
    }

    pub fn stale_claim_max_age(&self) -> TimeDelta {
        TimeDelta::seconds(self.stale_claim_max_age_secs as i64)
    }

    pub fn retention(&self) -> TimeDelta {
        TimeDelta::days(self.retention_days as i64)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_secs(self.max_backoff_secs),
            self.jitter,
        )
    }
}

/// Totals for one sync cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub batches: usize,
    pub synced: usize,
    pub retries: u32,
    pub released: usize,
    pub errors: usize,
}

impl SyncReport {
    pub fn is_idle(&self) -> bool {
        *self == SyncReport::default()
    }
}

enum PublishOutcome {
    Published,
    Exhausted,
    Stopped,
}

/// Runs sync cycles; owned by the sync thread, usable synchronously in tests.
pub struct SyncWorker {
    store: Arc<LocalStore>,
    channel: Arc<dyn CloudChannel>,
    topic: String,
    config: SyncConfig,
    backoff: Backoff,
    batch_num: u64,
    rng: StdRng,
}

impl SyncWorker {
    pub fn new(
        store: Arc<LocalStore>,
        channel: Arc<dyn CloudChannel>,
        topic: impl Into<String>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            channel,
            topic: topic.into(),
            backoff: config.backoff(),
            config,
            batch_num: 0,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn run_cycle(&mut self, stop: &Receiver<()>) -> SyncReport {
        self.run_cycle_at(Utc::now(), stop)
    }

    /// One cycle with `now` as the eligibility clock. Batches are claimed
    /// until a short batch, a failed batch, or a stop request.
    pub fn run_cycle_at(&mut self, now: DateTime<Utc>, stop: &Receiver<()>) -> SyncReport {
        let mut report = SyncReport::default();
        let grace = self.config.grace();

        match self.store.pending_count(now, grace) {
            Ok(0) => {
                debug!("No rows pending sync");
                return report;
            }
            Ok(pending) => debug!(pending, "Rows pending sync"),
            Err(e) => {
                warn!("Failed to count pending rows: {}", e);
                report.errors += 1;
                return report;
            }
        }

        loop {
            let batch = match self.store.claim_batch(self.config.batch_size, now, grace) {
                Ok(batch) if batch.is_empty() => break,
                Ok(batch) => batch,
                Err(e) => {
                    warn!("Failed to claim sync batch: {}", e);
                    report.errors += 1;
                    break;
                }
            };

            self.batch_num += 1;
            let message = SyncMessage::from_batch(&batch, self.batch_num, Utc::now());
            match self.publish_with_retry(&message, stop, &mut report) {
                PublishOutcome::Published => match self.store.mark_synced(&batch, Utc::now()) {
                    Ok(n) => {
                        report.batches += 1;
                        report.synced += n;
                        info!(
                            batch_id = %message.batch_id,
                            batch_num = message.batch_num,
                            records = message.record_count,
                            "Batch synced"
                        );
                    }
                    Err(e) => {
                        error!(batch_id = %message.batch_id, "Failed to mark batch synced: {}", e);
                        report.errors += 1;
                        self.release(&batch, &mut report);
                        break;
                    }
                },
                PublishOutcome::Exhausted => {
                    warn!(
                        batch_id = %message.batch_id,
                        retries = self.config.max_retries,
                        "Publish retries exhausted, releasing batch"
                    );
                    self.release(&batch, &mut report);
                    break;
                }
                PublishOutcome::Stopped => {
                    debug!(batch_id = %message.batch_id, "Stop requested during retry");
                    self.release(&batch, &mut report);
                    break;
                }
            }

            if batch.len() < self.config.batch_size {
                break;
            }
        }

        report
    }

    fn publish_with_retry(
        &mut self,
        message: &SyncMessage,
        stop: &Receiver<()>,
        report: &mut SyncReport,
    ) -> PublishOutcome {
        let payload = match serde_json::to_vec(message) {
            Ok(payload) => payload,
            Err(e) => {
                error!(batch_id = %message.batch_id, "Failed to serialize batch: {}", e);
                return PublishOutcome::Exhausted;
            }
        };

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = self.backoff.delay(attempt - 1, &mut self.rng);
                report.retries += 1;
                debug!(batch_id = %message.batch_id, attempt, ?delay, "Retrying publish");
                match stop.recv_timeout(delay) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => return PublishOutcome::Stopped,
                }
            }

            if !self.channel.is_connected() {
                warn!(batch_id = %message.batch_id, attempt, "Cloud channel unavailable");
                continue;
            }
            match self.channel.publish(&self.topic, &payload) {
                Ok(()) => return PublishOutcome::Published,
                Err(e) => warn!(batch_id = %message.batch_id, attempt, "Publish failed: {}", e),
            }
        }
        PublishOutcome::Exhausted
    }

    fn release(&self, batch: &ClaimedBatch, report: &mut SyncReport) {
        match self.store.release(batch, Utc::now()) {
            Ok(n) => report.released += n,
            Err(e) => {
                // The janitor releases these once the claim goes stale.
                error!("Failed to release batch claim: {}", e);
                report.errors += 1;
            }
        }
    }
}

/// Background sync and janitor threads.
pub struct BatchSyncHandler {
    sync_thread: StoppableThread,
    janitor_thread: StoppableThread,
}

impl BatchSyncHandler {
    pub fn start(
        store: Arc<LocalStore>,
        channel: Arc<dyn CloudChannel>,
        topic: impl Into<String>,
        config: SyncConfig,
    ) -> std::io::Result<Self> {
        let interval = config.interval();
        let mut worker = SyncWorker::new(store.clone(), channel, topic, config.clone());
        let sync_thread = StoppableThread::spawn("cityeye-sync", move |stop| {
            info!(?interval, "Batch sync started");
            loop {
                match stop.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => break,
                }
                let report = worker.run_cycle(&stop);
                if !report.is_idle() {
                    info!(
                        batches = report.batches,
                        synced = report.synced,
                        retries = report.retries,
                        released = report.released,
                        errors = report.errors,
                        "Sync cycle finished"
                    );
                }
            }
            info!("Batch sync stopped");
        })?;

        let janitor_thread = Janitor::new(store, config).spawn()?;

        Ok(Self {
            sync_thread,
            janitor_thread,
        })
    }

    /// Stop both threads, waiting at most `timeout` for each.
    pub fn stop(mut self, timeout: Duration) -> bool {
        self.sync_thread.signal_stop();
        self.janitor_thread.signal_stop();
        let synced = self.sync_thread.join_timeout(timeout);
        let janitor = self.janitor_thread.join_timeout(timeout);
        synced && janitor
    }
}
