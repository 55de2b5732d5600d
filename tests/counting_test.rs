use std::path::Path;

use cityeye::counter::{CounterConfig, ZoneRef};
use cityeye::detection::Attribute;
use cityeye::{Detection, LabelTable, Rect, ZoneCounter, ZoneSet};

const THREE_LANES: &str = r#"[
    {"content": [{"x": 0, "y": 0}, {"x": 200, "y": 0}, {"x": 200, "y": 300}, {"x": 0, "y": 300}]},
    {"content": [{"x": 200, "y": 0}, {"x": 400, "y": 0}, {"x": 400, "y": 300}, {"x": 200, "y": 300}]},
    {"content": [{"x": 400, "y": 0}, {"x": 600, "y": 0}, {"x": 600, "y": 300}, {"x": 400, "y": 300}]}
]"#;

const TWO_LANES: &str = r#"[
    {"content": [{"x": 0, "y": 0}, {"x": 300, "y": 0}, {"x": 300, "y": 300}, {"x": 0, "y": 300}]},
    {"content": [{"x": 300, "y": 0}, {"x": 600, "y": 0}, {"x": 600, "y": 300}, {"x": 300, "y": 300}]}
]"#;

fn counter(zones: &str) -> ZoneCounter {
    ZoneCounter::new(
        ZoneSet::parse(zones).unwrap(),
        LabelTable::standard(),
        CounterConfig::default(),
    )
}

/// A 60x40 box whose bottom-center sits at `(foot_x, 140)`.
fn car(track_id: &str, foot_x: f32) -> Detection {
    Detection::new(2, 0.9, Rect::new(foot_x - 30.0, 100.0, 60.0, 40.0)).with_track_id(track_id)
}

fn person(track_id: &str, foot_x: f32) -> Detection {
    Detection::new(0, 0.9, Rect::new(foot_x - 15.0, 60.0, 30.0, 80.0))
        .with_track_id(track_id)
        .with_attributes(vec![
            Attribute::new("gender::male", 0.9),
            Attribute::new("gender::female", 0.1),
            Attribute::new("age::30_to_49", 0.7),
            Attribute::new("age::18_to_29", 0.2),
        ])
}

#[test]
fn test_route_across_three_zones() {
    let mut counter = counter(THREE_LANES);
    let path = [100.0, 150.0, 250.0, 300.0, 450.0, 500.0];
    for (i, x) in path.iter().enumerate() {
        let frame = i as u64 + 1;
        counter.count_by_frame(frame, &[car("2_7", *x)]);
        assert!(counter.finish_tracklets(frame).is_none());
    }

    // Last update on frame 6; stale once more than 30 frames have passed.
    assert!(counter.finish_tracklets(36).is_none());
    let event = counter.finish_tracklets(37).unwrap();
    assert_eq!(event.route, "0->2");
    assert_eq!(event.from_zone, ZoneRef::Zone(0));
    assert_eq!(event.to_zone, ZoneRef::Zone(2));
    assert_eq!(event.class_label, "vehicle::car");
    assert_eq!(event.track_id, "2_7");
}

#[test]
fn test_finalization_is_idempotent() {
    let mut counter = counter(THREE_LANES);
    for (frame, x) in [(1, 100.0), (2, 150.0), (3, 250.0), (4, 300.0)] {
        counter.count_by_frame(frame, &[car("2_1", x)]);
    }
    assert!(counter.finish_tracklets(100).is_some());
    assert!(counter.finish_tracklets(100).is_none());
    assert!(counter.finish_tracklets(200).is_none());
    assert!(counter.finish_all().is_empty());
}

#[test]
fn test_person_label_from_attributes() {
    let mut counter = counter(TWO_LANES);
    for (frame, x) in [(1, 100.0), (2, 150.0), (3, 350.0), (4, 400.0)] {
        counter.count_by_frame(frame, &[person("0_3", x)]);
    }
    let event = counter.finish_tracklets(40).unwrap();
    assert_eq!(event.class_label, "male::30_to_49");
    assert_eq!(event.route, "0->1");
}

#[test]
fn test_track_first_seen_inside_destination() {
    let mut counter = counter(THREE_LANES);
    // Appears in zone 2 moving away from zones 0 and 1.
    for (frame, x) in [(1, 450.0), (2, 500.0), (3, 550.0)] {
        counter.count_by_frame(frame, &[car("2_9", x)]);
    }
    let event = counter.finish_tracklets(50).unwrap();
    assert_eq!(event.route, "loss->2");
    assert_eq!(event.from_zone, ZoneRef::Lost);
}

#[test]
fn test_stationary_track_yields_no_count() {
    let mut counter = counter(THREE_LANES);
    for frame in 1..=10 {
        counter.count_by_frame(frame, &[car("2_2", 100.0 + (frame % 2) as f32)]);
    }
    assert!(counter.finish_tracklets(60).is_none());
    assert_eq!(counter.track_count(), 0);
}

#[test]
fn test_concurrent_tracks_finalize_one_at_a_time() {
    let mut counter = counter(THREE_LANES);
    for (frame, x) in [(1, 100.0), (2, 150.0), (3, 250.0)] {
        counter.count_by_frame(frame, &[car("2_1", x), car("2_2", x + 200.0)]);
    }
    assert_eq!(counter.track_count(), 2);
    let first = counter.finish_tracklets(40).unwrap();
    let second = counter.finish_tracklets(40).unwrap();
    assert_ne!(first.track_id, second.track_id);
    assert!(counter.finish_tracklets(40).is_none());
}

#[test]
fn test_reload_resets_track_table() {
    let mut counter = counter(THREE_LANES);
    for (frame, x) in [(1, 100.0), (2, 150.0)] {
        counter.count_by_frame(frame, &[car("2_1", x)]);
    }
    assert_eq!(counter.track_count(), 1);

    counter.reload_config(Path::new("xlines.json"), TWO_LANES).unwrap();
    assert_eq!(counter.track_count(), 0);
    assert_eq!(counter.zones().len(), 2);

    // New tracks are evaluated against the new zones.
    for (frame, x) in [(3, 200.0), (4, 250.0), (5, 350.0), (6, 400.0)] {
        counter.count_by_frame(frame, &[car("2_5", x)]);
    }
    let event = counter.finish_tracklets(40).unwrap();
    assert_eq!(event.route, "0->1");
}

#[test]
fn test_invalid_reload_is_rejected() {
    let mut counter = counter(THREE_LANES);
    counter.count_by_frame(1, &[car("2_1", 100.0)]);
    let degenerate = r#"[{"content": [{"x": 0, "y": 0}, {"x": 10, "y": 10}]}]"#;
    assert!(counter.reload_config(Path::new("xlines.json"), degenerate).is_err());
    assert!(counter.reload_config(Path::new("xlines.json"), "not json").is_err());
    assert_eq!(counter.zones().len(), 3);
    assert_eq!(counter.track_count(), 1);
}
