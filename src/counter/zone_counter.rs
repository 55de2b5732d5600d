//! Zone-crossing counter: turns tracked detections into route count events.
//!
//! The counter owns the live track table. Each frame, every tracked
//! detection updates its [`Tracklet`]; when the reference point lies inside
//! a zone, the box vote and the velocity vote must agree before the
//! trajectory is mutated. Tracks that stop updating for more than
//! `buffer_size` frames are finalized into a single [`CountEvent`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::counter::direction::{BOX_VOTE_TIE_BREAK, box_vote, direction_for, resolve};
use crate::counter::tracklet::{Tracklet, ZoneRef};
use crate::counter::zone::{Point, ZoneSet};
use crate::detection::{Detection, LabelTable};
use crate::error::ZoneError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    /// Frames without an update before a track is finalized
    pub buffer_size: u64,
    /// Reference point inside the box, as fractions of width and height
    pub reference_factor: [f32; 2],
    /// Center displacements shorter than this (px) are ignored
    pub noise_threshold: f32,
    /// Boxes considered by the short-window vote
    pub vote_window: usize,
    /// Boxes kept per track
    pub history_limit: usize,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            buffer_size: 30,
            reference_factor: [0.5, 1.0],
            noise_threshold: 5.0,
            vote_window: 5,
            history_limit: 64,
        }
    }
}

/// A finalized count: one per track, emitted when the track goes stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountEvent {
    pub track_id: String,
    /// `"{in}->{out}"`, either side may be `loss`
    pub route: String,
    /// Entry of the [`LabelTable`], e.g. `"vehicle::car"`
    pub class_label: String,
    pub from_zone: ZoneRef,
    pub to_zone: ZoneRef,
}

pub struct ZoneCounter {
    zones: ZoneSet,
    zones_path: Option<PathBuf>,
    labels: LabelTable,
    config: CounterConfig,
    tracks: BTreeMap<String, Tracklet>,
}

impl ZoneCounter {
    pub fn new(zones: ZoneSet, labels: LabelTable, config: CounterConfig) -> Self {
        Self {
            zones,
            zones_path: None,
            labels,
            config,
            tracks: BTreeMap::new(),
        }
    }

    pub fn from_file(path: &Path, labels: LabelTable, config: CounterConfig) -> Result<Self, ZoneError> {
        let zones = ZoneSet::load(path)?;
        info!(path = %path.display(), zones = zones.len(), "Loaded zone configuration");
        let mut counter = Self::new(zones, labels, config);
        counter.zones_path = Some(path.to_path_buf());
        Ok(counter)
    }

    pub fn zones(&self) -> &ZoneSet {
        &self.zones
    }

    pub fn zones_path(&self) -> Option<&Path> {
        self.zones_path.as_deref()
    }

    pub fn config(&self) -> &CounterConfig {
        &self.config
    }

    /// Number of live tracks.
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn tracklet(&self, track_id: &str) -> Option<&Tracklet> {
        self.tracks.get(track_id)
    }

    /// Feed one frame of detections. Detections without a track id are ignored.
    pub fn count_by_frame(&mut self, frame_idx: u64, detections: &[Detection]) {
        let label_count = self.labels.len();
        for det in detections {
            let Some(track_id) = det.track_id.as_deref() else {
                continue;
            };
            let label = self.labels.label_for(det);
            let tracklet = self.tracks.entry(track_id.to_string()).or_insert_with(|| {
                Tracklet::new(det.class_id, frame_idx, label_count, self.config.history_limit)
            });
            tracklet.observe(frame_idx, det.bbox, label, self.config.noise_threshold);

            let (x, y) = det.bbox.reference_point(self.config.reference_factor);
            let Some(zone) = self.zones.zone_at(Point::new(x, y)) else {
                continue;
            };

            let centers = tracklet.recent_centers(self.config.vote_window);
            let by_box = box_vote(
                &self.zones,
                zone,
                &centers,
                self.config.noise_threshold,
                BOX_VOTE_TIE_BREAK,
            );
            let by_velocity = tracklet
                .velocity()
                .and_then(|v| direction_for(&self.zones, zone, v));

            if let Some(direction) = resolve(by_box, by_velocity) {
                if tracklet.apply(direction, zone, frame_idx) {
                    debug!(frame = frame_idx, track_id, zone, ?direction, "Trajectory updated");
                }
            }
        }
    }

    /// Finalize at most one stale track.
    ///
    /// Stale tracks that yield no event (no label votes, or no route) are
    /// evicted and the search continues, so `None` means no stale track is
    /// left for `frame_idx`.
    pub fn finish_tracklets(&mut self, frame_idx: u64) -> Option<CountEvent> {
        loop {
            let stale = self
                .tracks
                .iter()
                .find(|(_, t)| t.is_stale(frame_idx, self.config.buffer_size))
                .map(|(id, _)| id.clone())?;
            let Some(tracklet) = self.tracks.remove(&stale) else {
                continue;
            };
            if let Some(event) = self.finalize(stale, &tracklet) {
                return Some(event);
            }
        }
    }

    /// Finalize every live track regardless of staleness (shutdown flush).
    pub fn finish_all(&mut self) -> Vec<CountEvent> {
        let tracks = std::mem::take(&mut self.tracks);
        tracks
            .into_iter()
            .filter_map(|(id, tracklet)| self.finalize(id, &tracklet))
            .collect()
    }

    /// Replace the zone set from `content` and reset the live track table.
    ///
    /// On error the previous zones and tracks stay active.
    pub fn reload_config(&mut self, path: &Path, content: &str) -> Result<(), ZoneError> {
        let zones = ZoneSet::parse(content)?;
        let dropped = self.tracks.len();
        self.tracks.clear();
        self.zones = zones;
        self.zones_path = Some(path.to_path_buf());
        info!(
            path = %path.display(),
            zones = self.zones.len(),
            dropped_tracks = dropped,
            "Zone configuration reloaded"
        );
        Ok(())
    }

    fn finalize(&self, track_id: String, tracklet: &Tracklet) -> Option<CountEvent> {
        let Some(label) = tracklet.resolved_label() else {
            debug!(%track_id, "Dropping track without label votes");
            return None;
        };
        let (from_zone, to_zone) = tracklet.route()?;
        let Some(class_label) = self.labels.name(label) else {
            warn!(%track_id, label, "Label index outside the label table");
            return None;
        };

        let event = CountEvent {
            route: format!("{}->{}", from_zone, to_zone),
            class_label: class_label.to_string(),
            from_zone,
            to_zone,
            track_id,
        };
        info!(
            track_id = %event.track_id,
            route = %event.route,
            label = %event.class_label,
            "Track finalized"
        );
        Some(event)
    }
}
