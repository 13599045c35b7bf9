use facecap_core::{
    AxisTransform, ChannelSet, Detection, ExpressionWeight, HeadPose, ManualClock, MemorySink,
    PoseSink, Studio, TickOutcome,
};
use glam::Quat;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn detection(q: Quat, jaw: f32) -> Detection {
    Detection {
        timestamp_ms: None,
        head: Some(HeadPose::Quaternion(q.to_array())),
        expressions: vec![ExpressionWeight::new("jawOpen", jaw)],
    }
}

#[test]
fn test_three_frame_take_round_trip() {
    let clock = Arc::new(ManualClock::new());
    let mut studio = Studio::new(clock.clone(), ChannelSet::new(["jawOpen"]), AxisTransform::IDENTITY);
    let mut sink = MemorySink::with_target();

    let rotations = [
        Quat::IDENTITY,
        Quat::from_rotation_y(0.2),
        Quat::from_rotation_x(0.1),
    ];
    let scores = [0.0, 0.5, 0.9];

    studio.start_recording(&sink).unwrap();
    for (i, (q, score)) in rotations.iter().zip(scores).enumerate() {
        if i > 0 {
            clock.advance(Duration::from_secs(1));
        }
        assert!(studio.on_detection(&detection(*q, score), &mut sink));
    }
    let id = studio.stop_recording().expect("take produced");

    let take = studio.store().get(id).unwrap();
    assert_eq!(take.duration_seconds, 2.0);
    assert_eq!(take.samples().len(), 3);
    assert_eq!(take.name, "Take 1");
    for (sample, q) in take.samples().iter().zip(rotations) {
        assert!(sample.rotation.angle_between(q) < 1e-4);
    }

    let ticket = studio.play(Some(id), &mut sink).unwrap();
    clock.advance(Duration::from_millis(1200));
    let outcome = studio.tick_playback(ticket, &mut sink);
    assert!(matches!(outcome, TickOutcome::Continue(_)));
    assert!(sink.rotation().angle_between(rotations[2]) < 1e-4);
    assert_eq!(sink.weight("jawOpen"), Some(0.9));

    clock.advance(Duration::from_secs(1));
    let next = match outcome {
        TickOutcome::Continue(t) => t,
        _ => unreachable!(),
    };
    assert_eq!(studio.tick_playback(next, &mut sink), TickOutcome::Finished);
    assert!(sink.is_neutral());
    assert!(!studio.is_playing());
}

#[test]
fn test_empty_recording_leaves_store_empty() {
    let clock = Arc::new(ManualClock::new());
    let mut studio = Studio::new(clock, ChannelSet::default(), AxisTransform::default());
    let mut sink = MemorySink::with_target();
    studio.start_recording(&sink).unwrap();
    studio.on_detection(&Detection::default(), &mut sink);
    assert_eq!(studio.stop_recording(), None);
    assert!(studio.takes().is_empty());
    assert_eq!(studio.store().active_id(), None);
}

proptest! {
    #[test]
    fn prop_sample_times_are_monotonic(steps in proptest::collection::vec(0u64..50, 1..200)) {
        let clock = Arc::new(ManualClock::new());
        let mut studio = Studio::new(clock.clone(), ChannelSet::new(["jawOpen"]), AxisTransform::default());
        let mut sink = MemorySink::with_target();
        studio.start_recording(&sink).unwrap();
        for (i, step) in steps.iter().enumerate() {
            clock.advance(Duration::from_millis(*step));
            studio.on_detection(&detection(Quat::IDENTITY, (i % 10) as f32 / 10.0), &mut sink);
        }
        let id = studio.stop_recording().unwrap();
        let take = studio.store().get(id).unwrap();
        prop_assert_eq!(take.samples().len(), steps.len());
        for pair in take.samples().windows(2) {
            prop_assert!(pair[0].t <= pair[1].t);
        }
        prop_assert_eq!(take.duration_seconds, take.samples().last().unwrap().t);
    }
}
