//! Stale-claim recovery and retention purge.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::RecvTimeoutError;
use tracing::{error, info};

use crate::lifecycle::StoppableThread;
use crate::store::LocalStore;
use crate::sync::handler::SyncConfig;

pub struct Janitor {
    store: Arc<LocalStore>,
    config: SyncConfig,
}

impl Janitor {
    pub fn new(store: Arc<LocalStore>, config: SyncConfig) -> Self {
        Self { store, config }
    }

    /// Release claims older than the configured max age.
    pub fn release_stale(&self, now: DateTime<Utc>) -> usize {
        match self.store.release_stale(now, self.config.stale_claim_max_age()) {
            Ok(0) => 0,
            Ok(released) => {
                info!(released, "Released stale sync claims");
                released
            }
            Err(e) => {
                error!("Stale claim release failed: {}", e);
                0
            }
        }
    }

    /// Delete synced rows past the retention window.
    pub fn purge(&self, now: DateTime<Utc>) -> usize {
        match self.store.purge_synced(now, self.config.retention()) {
            Ok(0) => 0,
            Ok(purged) => {
                info!(purged, "Purged synced rows past retention");
                purged
            }
            Err(e) => {
                error!("Retention purge failed: {}", e);
                0
            }
        }
    }

    /// Run both jobs at start, then stale release every janitor interval and
    /// the purge every purge interval.
    pub fn spawn(self) -> std::io::Result<StoppableThread> {
        let tick = Duration::from_secs(self.config.janitor_interval_secs.max(1));
        let purge_every = Duration::from_secs(self.config.purge_interval_secs);
        StoppableThread::spawn("cityeye-janitor", move |stop| {
            info!(?tick, ?purge_every, "Janitor started");
            self.release_stale(Utc::now());
            self.purge(Utc::now());
            let mut last_purge = Instant::now();
            loop {
                match stop.recv_timeout(tick) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => break,
                }
                self.release_stale(Utc::now());
                if last_purge.elapsed() >= purge_every {
                    self.purge(Utc::now());
                    last_purge = Instant::now();
                }
            }
            info!("Janitor stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    use crate::counter::{CountEvent, ZoneRef};

    fn car() -> CountEvent {
        CountEvent {
            track_id: "2_1".into(),
            route: "0->1".into(),
            class_label: "vehicle::car".into(),
            from_zone: ZoneRef::Zone(0),
            to_zone: ZoneRef::Zone(1),
        }
    }

    #[test]
    fn test_janitor_recovers_claims_then_purges() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        store.insert_count_event(&car(), t0).unwrap();
        store.insert_count_event(&car(), t0).unwrap();
        store.claim_batch(10, t0, TimeDelta::zero()).unwrap();

        let janitor = Janitor::new(store.clone(), SyncConfig::default());
        assert_eq!(janitor.release_stale(t0 + TimeDelta::minutes(30)), 0);
        assert_eq!(janitor.release_stale(t0 + TimeDelta::hours(2)), 2);
        assert_eq!(store.unsynced_count().unwrap(), 2);

        let at = t0 + TimeDelta::hours(2);
        let batch = store.claim_batch(10, at, TimeDelta::zero()).unwrap();
        store.mark_synced(&batch, at).unwrap();
        assert_eq!(janitor.purge(at + TimeDelta::days(1)), 0);
        assert_eq!(janitor.purge(at + TimeDelta::days(8)), 2);
    }
}
