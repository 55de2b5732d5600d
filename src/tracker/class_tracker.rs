//! Single-class tracker: Kalman prediction, IoU cost, optimal assignment.

use crate::error::TrackError;
use crate::tracker::kalman_filter::{KalmanFilter, StateCovariance, StateMean};
use crate::tracker::matching::{self, AssignmentResult};
use crate::tracker::multi_class::TrackerConfig;
use crate::tracker::rect::Rect;
use crate::tracker::track_state::TrackState;

/// One object track inside a [`ClassTracker`].
#[derive(Debug, Clone)]
pub struct RawTrack {
    /// Identifier unique within the owning class tracker
    pub id: u64,
    pub state: TrackState,
    /// Number of frames this track was matched on
    pub hits: u32,
    /// Frames since the last match
    pub time_since_update: u32,
    /// Detection score of the last match
    pub score: f32,
    mean: StateMean,
    covariance: StateCovariance,
    last_bbox: Rect,
}

impl RawTrack {
    fn new(id: u64, bbox: Rect, score: f32, kalman_filter: &KalmanFilter) -> Self {
        let (mean, covariance) =
            kalman_filter.initiate(&KalmanFilter::measurement(bbox.to_xyah()));
        Self {
            id,
            state: TrackState::Tentative,
            hits: 1,
            time_since_update: 0,
            score,
            mean,
            covariance,
            last_bbox: bbox,
        }
    }

    /// Current filtered (or predicted) box.
    pub fn rect(&self) -> Rect {
        Rect::from_xyah(
            self.mean[0] as f32,
            self.mean[1] as f32,
            self.mean[2] as f32,
            self.mean[3] as f32,
        )
    }

    /// Box of the last matched detection.
    pub fn last_bbox(&self) -> Rect {
        self.last_bbox
    }

    fn predict(&mut self, kalman_filter: &KalmanFilter) {
        if self.mean[3] + self.mean[7] <= 0.0 {
            self.mean[7] = 0.0;
        }
        let (mean, covariance) = kalman_filter.predict(&self.mean, &self.covariance);
        self.mean = mean;
        self.covariance = covariance;
        self.time_since_update += 1;
    }

    fn update(
        &mut self,
        bbox: Rect,
        score: f32,
        kalman_filter: &KalmanFilter,
    ) -> Result<(), TrackError> {
        let (mean, covariance) = kalman_filter.update(
            &self.mean,
            &self.covariance,
            &KalmanFilter::measurement(bbox.to_xyah()),
        )?;
        self.mean = mean;
        self.covariance = covariance;
        self.hits += 1;
        self.time_since_update = 0;
        self.score = score;
        self.last_bbox = bbox;
        Ok(())
    }
}

/// A track reported for the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackMatch {
    pub track_id: u64,
    /// Index into the detection slice passed to [`ClassTracker::update`]
    pub detection_index: usize,
    pub bbox: Rect,
    pub score: f32,
}

/// Tracks objects of a single class. Identity never crosses class boundaries
/// because every class gets its own instance and id counter.
#[derive(Debug, Clone)]
pub struct ClassTracker {
    tracks: Vec<RawTrack>,
    next_id: u64,
    frame_count: u64,
    match_thresh: f32,
    max_age: u32,
    min_hits: u32,
    kalman_filter: KalmanFilter,
}

impl ClassTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            frame_count: 0,
            match_thresh: config.match_thresh,
            max_age: config.max_age,
            min_hits: config.min_hits,
            kalman_filter: KalmanFilter::default(),
        }
    }

    pub fn tracks(&self) -> &[RawTrack] {
        &self.tracks
    }

    /// Advance one frame with this class's detections `(bbox, score)`.
    ///
    /// Work happens on a copy of the track table that is only committed once
    /// assignment and all filter updates succeed; on error the tracker is
    /// left exactly as it was.
    pub fn update(&mut self, detections: &[(Rect, f32)]) -> Result<Vec<TrackMatch>, TrackError> {
        let frame_count = self.frame_count + 1;
        let mut next_id = self.next_id;

        let mut tracks = self.tracks.clone();
        for track in tracks.iter_mut() {
            track.predict(&self.kalman_filter);
        }
        tracks.retain(|t| t.rect().is_valid());

        let track_rects: Vec<Rect> = tracks.iter().map(|t| t.rect()).collect();
        let det_rects: Vec<Rect> = detections.iter().map(|(r, _)| *r).collect();
        let dists = matching::iou_distance(&track_rects, &det_rects);

        let AssignmentResult {
            matches,
            unmatched_tracks,
            unmatched_detections,
        } = matching::linear_assignment(&dists, self.match_thresh)?;

        let mut matched_index = vec![None; tracks.len()];
        for (itrack, idet) in matches {
            let (bbox, score) = detections[idet];
            tracks[itrack].update(bbox, score, &self.kalman_filter)?;
            matched_index[itrack] = Some(idet);
        }

        // Unconfirmed tracks get no grace period.
        for itrack in unmatched_tracks {
            if tracks[itrack].state == TrackState::Tentative {
                tracks[itrack].state = TrackState::Deleted;
            }
        }

        for idet in unmatched_detections {
            let (bbox, score) = detections[idet];
            tracks.push(RawTrack::new(next_id, bbox, score, &self.kalman_filter));
            matched_index.push(Some(idet));
            next_id += 1;
        }

        let mut output = Vec::new();
        for (track, det) in tracks.iter_mut().zip(matched_index.iter()) {
            if track.state == TrackState::Deleted {
                continue;
            }
            if track.hits >= self.min_hits || frame_count <= self.min_hits as u64 {
                track.state = TrackState::Confirmed;
            }
            if let Some(idet) = det {
                if track.state == TrackState::Confirmed {
                    output.push(TrackMatch {
                        track_id: track.id,
                        detection_index: *idet,
                        bbox: track.last_bbox,
                        score: track.score,
                    });
                }
            }
        }

        let max_age = self.max_age;
        tracks.retain(|t| t.state != TrackState::Deleted && t.time_since_update <= max_age);

        self.tracks = tracks;
        self.next_id = next_id;
        self.frame_count = frame_count;
        Ok(output)
    }
}
