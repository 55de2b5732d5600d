use cityeye::tracker::TrackerConfig;
use cityeye::{Detection, MultiClassTracker, Rect};

fn car(x: f32, y: f32) -> Detection {
    Detection::new(2, 0.9, Rect::from_tlbr(x, y, x + 100.0, y + 100.0))
}

fn person(x: f32, y: f32) -> Detection {
    Detection::new(0, 0.8, Rect::from_tlbr(x, y, x + 40.0, y + 100.0))
}

#[test]
fn test_basic_tracking() {
    let mut tracker = MultiClassTracker::new(TrackerConfig::default());

    // Frame 1: One detection
    let mut dets1 = vec![car(100.0, 100.0)];
    let tracks1 = tracker.update(1, &mut dets1);
    assert_eq!(tracks1.len(), 1);
    let id1 = tracks1[0].track_id.clone();
    assert_eq!(dets1[0].track_id.as_deref(), Some(id1.as_str()));

    // Frame 2: Same object moved slightly
    let mut dets2 = vec![car(105.0, 105.0)];
    let tracks2 = tracker.update(2, &mut dets2);
    assert_eq!(tracks2.len(), 1);
    assert_eq!(tracks2[0].track_id, id1);

    // Frame 3: Object disappears
    let mut dets3 = vec![];
    assert!(tracker.update(3, &mut dets3).is_empty());

    // Frame 4: Object reappears close by within max_age
    let mut dets4 = vec![car(112.0, 112.0)];
    let tracks4 = tracker.update(4, &mut dets4);
    assert_eq!(tracks4.len(), 1);
    assert_eq!(tracks4[0].track_id, id1);
}

#[test]
fn test_classes_never_share_identity() {
    let mut tracker = MultiClassTracker::new(TrackerConfig::default());

    // A person and a car at the same place.
    let mut dets = vec![person(100.0, 100.0), car(100.0, 100.0)];
    let first = tracker.update(1, &mut dets);
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].track_id, "0_1");
    assert_eq!(first[1].track_id, "2_1");

    // Swap detection order; each class keeps its own id.
    let mut dets = vec![car(102.0, 100.0), person(102.0, 100.0)];
    let second = tracker.update(2, &mut dets);
    assert_eq!(dets[0].track_id.as_deref(), Some("2_1"));
    assert_eq!(dets[1].track_id.as_deref(), Some("0_1"));
    assert_eq!(second.len(), 2);
}

#[test]
fn test_identity_stable_over_smooth_motion() {
    let mut tracker = MultiClassTracker::new(TrackerConfig::default());
    let mut ids = Vec::new();
    for frame in 1..=20u64 {
        let x = 50.0 + frame as f32 * 8.0;
        let mut dets = vec![car(x, 200.0), car(x, 500.0)];
        let tracks = tracker.update(frame, &mut dets);
        assert_eq!(tracks.len(), 2, "frame {}", frame);
        ids.push((tracks[0].track_id.clone(), tracks[1].track_id.clone()));
    }
    assert!(ids.iter().all(|pair| *pair == ids[0]));
    assert_ne!(ids[0].0, ids[0].1);
}

#[test]
fn test_new_object_after_warmup_needs_confirmation() {
    let mut tracker = MultiClassTracker::new(TrackerConfig::default());
    for frame in 1..=3u64 {
        let mut dets = vec![car(0.0, 0.0)];
        tracker.update(frame, &mut dets);
    }

    // Second car shows up on frame 4: tentative until it has min_hits.
    let mut seen = Vec::new();
    for frame in 4..=6u64 {
        let mut dets = vec![car(0.0, 0.0), car(600.0, 600.0)];
        let tracks = tracker.update(frame, &mut dets);
        seen.push(tracks.len());
        if frame < 6 {
            assert!(dets[1].track_id.is_none());
        }
    }
    assert_eq!(seen, vec![1, 1, 2]);
}

#[test]
fn test_allow_list_restricts_tracking() {
    let config = TrackerConfig {
        tracked_classes: vec![2],
        ..TrackerConfig::default()
    };
    let mut tracker = MultiClassTracker::new(config);
    let mut dets = vec![person(0.0, 0.0), car(300.0, 0.0)];
    let tracks = tracker.update(1, &mut dets);
    assert_eq!(tracks.len(), 1);
    assert_eq!(dets.len(), 1);
    assert_eq!(tracks[0].class_id, 2);
}
