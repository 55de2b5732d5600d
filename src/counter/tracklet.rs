//! Per-track trajectory bookkeeping for zone counting.

use std::collections::VecDeque;
use std::fmt;

use crate::counter::direction::Direction;
use crate::tracker::Rect;

/// Zone endpoint of a route: a configured zone index, or `loss` when the
/// track appeared or disappeared without a matching boundary event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneRef {
    Zone(usize),
    Lost,
}

impl fmt::Display for ZoneRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneRef::Zone(idx) => write!(f, "{}", idx),
            ZoneRef::Lost => f.write_str("loss"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrajectorySegment {
    pub in_zone: ZoneRef,
    pub out_zone: ZoneRef,
    pub frame_in: u64,
    pub frame_out: Option<u64>,
    pub found_out: bool,
}

#[derive(Debug, Clone)]
pub struct Tracklet {
    pub class_id: u32,
    boxes: VecDeque<Rect>,
    velocities: VecDeque<[f32; 2]>,
    velocity: Option<[f32; 2]>,
    label_votes: Vec<u32>,
    segments: Vec<TrajectorySegment>,
    first_frame: u64,
    last_update_frame: u64,
    history_limit: usize,
}

impl Tracklet {
    pub fn new(class_id: u32, frame: u64, label_count: usize, history_limit: usize) -> Self {
        Self {
            class_id,
            boxes: VecDeque::new(),
            velocities: VecDeque::new(),
            velocity: None,
            label_votes: vec![0; label_count],
            segments: Vec::new(),
            first_frame: frame,
            last_update_frame: frame,
            history_limit: history_limit.max(2),
        }
    }

    /// Record one matched observation. The recorded velocity only changes
    /// when the center moved at least `noise` pixels.
    pub fn observe(&mut self, frame: u64, bbox: Rect, label: Option<usize>, noise: f32) {
        if let Some(prev) = self.boxes.back() {
            let (px, py) = prev.center();
            let (cx, cy) = bbox.center();
            let d = [cx - px, cy - py];
            if (d[0] * d[0] + d[1] * d[1]).sqrt() >= noise {
                self.velocity = Some(d);
            }
        }

        self.boxes.push_back(bbox);
        self.velocities.push_back(self.velocity.unwrap_or([0.0, 0.0]));
        while self.boxes.len() > self.history_limit {
            self.boxes.pop_front();
            self.velocities.pop_front();
        }

        if let Some(vote) = label.and_then(|idx| self.label_votes.get_mut(idx)) {
            *vote += 1;
        }
        self.last_update_frame = frame;
    }

    pub fn velocity(&self) -> Option<[f32; 2]> {
        self.velocity
    }

    pub fn velocities(&self) -> impl Iterator<Item = &[f32; 2]> {
        self.velocities.iter()
    }

    pub fn boxes(&self) -> impl Iterator<Item = &Rect> {
        self.boxes.iter()
    }

    /// Centers of the last `window` boxes, oldest first.
    pub fn recent_centers(&self, window: usize) -> Vec<(f32, f32)> {
        let skip = self.boxes.len().saturating_sub(window);
        self.boxes.iter().skip(skip).map(Rect::center).collect()
    }

    pub fn segments(&self) -> &[TrajectorySegment] {
        &self.segments
    }

    pub fn first_frame(&self) -> u64 {
        self.first_frame
    }

    pub fn last_update_frame(&self) -> u64 {
        self.last_update_frame
    }

    pub fn is_stale(&self, frame: u64, buffer_size: u64) -> bool {
        frame.saturating_sub(self.last_update_frame) > buffer_size
    }

    /// Apply an accepted direction event; returns whether the segment list changed.
    pub fn apply(&mut self, direction: Direction, zone: usize, frame: u64) -> bool {
        match direction {
            Direction::In => {
                if let Some(last) = self.segments.last() {
                    if last.in_zone == ZoneRef::Zone(zone) && !last.found_out {
                        return false;
                    }
                }
                self.segments.push(TrajectorySegment {
                    in_zone: ZoneRef::Zone(zone),
                    out_zone: ZoneRef::Lost,
                    frame_in: frame,
                    frame_out: None,
                    found_out: false,
                });
                true
            }
            Direction::Out => {
                if let Some(open) = self.segments.iter_mut().rev().find(|s| !s.found_out) {
                    // Flicker at the entry zone.
                    if open.in_zone == ZoneRef::Zone(zone) {
                        return false;
                    }
                    open.out_zone = ZoneRef::Zone(zone);
                    open.frame_out = Some(frame);
                    open.found_out = true;
                    return true;
                }
                if let Some(last) = self.segments.last_mut() {
                    if last.out_zone == ZoneRef::Zone(zone) {
                        last.frame_out = Some(frame);
                        return false;
                    }
                }
                self.segments.push(TrajectorySegment {
                    in_zone: ZoneRef::Lost,
                    out_zone: ZoneRef::Zone(zone),
                    frame_in: frame,
                    frame_out: Some(frame),
                    found_out: true,
                });
                true
            }
        }
    }

    /// Mode of the accumulated label votes; ties go to the lowest label index.
    pub fn resolved_label(&self) -> Option<usize> {
        let mut best: Option<(usize, u32)> = None;
        for (idx, &count) in self.label_votes.iter().enumerate() {
            if count > 0 && best.is_none_or(|(_, c)| count > c) {
                best = Some((idx, count));
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// Merge the first-opened and last-closed segments into one route.
    pub fn route(&self) -> Option<(ZoneRef, ZoneRef)> {
        let first = self.segments.first()?;
        let to = self
            .segments
            .iter()
            .rev()
            .find(|s| s.found_out)
            .map(|s| s.out_zone)
            .unwrap_or(ZoneRef::Lost);
        match (first.in_zone, to) {
            (ZoneRef::Lost, ZoneRef::Lost) => None,
            route => Some(route),
        }
    }
}
