//! Direction inference inside a zone.
//!
//! Moving from zone `i` towards another zone's centroid is an `In` event for
//! `i` (the route starts there); moving from another zone towards `i` is an
//! `Out` event (the route ends there). The comparison uses the pairwise
//! direction best aligned with the motion, by absolute cosine similarity.

use crate::counter::zone::ZoneSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// What the short-window box vote yields when `in` and `out` votes are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    /// A tie never yields a direction.
    Undetermined,
    /// A tie yields the direction of the most recent displacement.
    LastObserved,
}

pub const BOX_VOTE_TIE_BREAK: TieBreak = TieBreak::Undetermined;

/// Direction implied by `velocity` while inside `zone`.
pub fn direction_for(zones: &ZoneSet, zone: usize, velocity: [f32; 2]) -> Option<Direction> {
    let norm = (velocity[0] * velocity[0] + velocity[1] * velocity[1]).sqrt();
    if norm <= f32::EPSILON {
        return None;
    }

    let cos = zones
        .directions_from(zone)
        .iter()
        .map(|d| (velocity[0] * d.unit[0] + velocity[1] * d.unit[1]) / norm)
        .max_by(|a, b| a.abs().total_cmp(&b.abs()))?;

    if cos > 0.0 {
        Some(Direction::In)
    } else if cos < 0.0 {
        Some(Direction::Out)
    } else {
        None
    }
}

/// Majority vote over consecutive displacements of `points` (oldest first).
/// Displacements shorter than `noise` are skipped.
pub fn box_vote(
    zones: &ZoneSet,
    zone: usize,
    points: &[(f32, f32)],
    noise: f32,
    tie_break: TieBreak,
) -> Option<Direction> {
    let mut ins = 0usize;
    let mut outs = 0usize;
    let mut last = None;

    for pair in points.windows(2) {
        let d = [pair[1].0 - pair[0].0, pair[1].1 - pair[0].1];
        if (d[0] * d[0] + d[1] * d[1]).sqrt() < noise {
            continue;
        }
        let Some(dir) = direction_for(zones, zone, d) else {
            continue;
        };
        match dir {
            Direction::In => ins += 1,
            Direction::Out => outs += 1,
        }
        last = Some(dir);
    }

    match ins.cmp(&outs) {
        std::cmp::Ordering::Greater => Some(Direction::In),
        std::cmp::Ordering::Less => Some(Direction::Out),
        std::cmp::Ordering::Equal => match tie_break {
            TieBreak::Undetermined => None,
            TieBreak::LastObserved => last,
        },
    }
}

/// Accept a direction only if both votes agree.
pub fn resolve(box_vote: Option<Direction>, velocity_vote: Option<Direction>) -> Option<Direction> {
    match (box_vote, velocity_vote) {
        (Some(a), Some(b)) if a == b => Some(a),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::zone::Point;

    fn two_zones() -> ZoneSet {
        ZoneSet::new(vec![
            vec![
                Point::new(0.0, 0.0),
                Point::new(100.0, 0.0),
                Point::new(100.0, 100.0),
                Point::new(0.0, 100.0),
            ],
            vec![
                Point::new(100.0, 0.0),
                Point::new(200.0, 0.0),
                Point::new(200.0, 100.0),
                Point::new(100.0, 100.0),
            ],
        ])
        .unwrap()
    }

    #[test]
    fn test_direction_for() {
        let zones = two_zones();
        assert_eq!(direction_for(&zones, 0, [10.0, 0.0]), Some(Direction::In));
        assert_eq!(direction_for(&zones, 1, [10.0, 0.0]), Some(Direction::Out));
        assert_eq!(direction_for(&zones, 0, [-10.0, 1.0]), Some(Direction::Out));
        assert_eq!(direction_for(&zones, 0, [0.0, 10.0]), None);
        assert_eq!(direction_for(&zones, 0, [0.0, 0.0]), None);
    }

    #[test]
    fn test_single_zone_has_no_direction() {
        let zones = ZoneSet::new(vec![vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
        ]])
        .unwrap();
        assert_eq!(direction_for(&zones, 0, [5.0, 0.0]), None);
    }

    #[test]
    fn test_box_vote_majority_and_noise() {
        let zones = two_zones();
        let pts = [(10.0, 50.0), (20.0, 50.0), (21.0, 50.0), (31.0, 50.0), (25.0, 50.0)];
        // +10, (+1 noise), +10, -6  => 2 in, 1 out
        assert_eq!(
            box_vote(&zones, 0, &pts, 5.0, TieBreak::Undetermined),
            Some(Direction::In)
        );
    }

    #[test]
    fn test_box_vote_tie_break() {
        let zones = two_zones();
        let pts = [(10.0, 50.0), (20.0, 50.0), (10.0, 50.0)];
        assert_eq!(box_vote(&zones, 0, &pts, 5.0, TieBreak::Undetermined), None);
        assert_eq!(
            box_vote(&zones, 0, &pts, 5.0, TieBreak::LastObserved),
            Some(Direction::Out)
        );
        assert_eq!(BOX_VOTE_TIE_BREAK, TieBreak::Undetermined);
    }

    #[test]
    fn test_resolve_requires_agreement() {
        assert_eq!(resolve(Some(Direction::In), Some(Direction::In)), Some(Direction::In));
        assert_eq!(resolve(Some(Direction::In), Some(Direction::Out)), None);
        assert_eq!(resolve(None, Some(Direction::Out)), None);
    }
}
