//! Take recorder: turns a live detection stream into a take.

use crate::channels::ChannelSet;
use crate::clock::SharedClock;
use crate::error::CoreError;
use crate::sink::PoseSink;
use crate::store::TakeStore;
use crate::types::{Detection, Sample, Take, TakeId};
use std::time::Duration;

/// State of one in-progress recording. Reset on every `start`.
#[derive(Debug)]
struct CaptureSession {
    id: u64,
    started_at: Duration,
    buffer: Vec<Sample>,
}

/// Captures samples while recording and promotes them to a take on stop.
pub struct Recorder {
    clock: SharedClock,
    channels: ChannelSet,
    session: Option<CaptureSession>,
    sessions_started: u64,
    dropped: u64,
}

impl Recorder {
    pub fn new(clock: SharedClock, channels: ChannelSet) -> Self {
        Self {
            clock,
            channels,
            session: None,
            sessions_started: 0,
            dropped: 0,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    /// Samples captured so far in the current session.
    pub fn buffered(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.buffer.len())
    }

    /// Seconds since the current session started.
    pub fn elapsed(&self) -> Option<f32> {
        self.session
            .as_ref()
            .map(|s| self.clock.now().saturating_sub(s.started_at).as_secs_f32())
    }

    /// Frames dropped for lack of data since the recorder was created.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    /// Begin a new recording.
    ///
    /// Starting while already recording restarts: the previous buffer is
    /// discarded.
    pub fn start(&mut self, sink: &dyn PoseSink) -> Result<(), CoreError> {
        if !sink.has_rotation_target() {
            return Err(CoreError::Precondition(
                "no rotation target configured".into(),
            ));
        }
        if let Some(prev) = self.session.take() {
            tracing::warn!(
                session = prev.id,
                discarded = prev.buffer.len(),
                "recording restarted; previous buffer discarded"
            );
        }
        self.sessions_started += 1;
        self.session = Some(CaptureSession {
            id: self.sessions_started,
            started_at: self.clock.now(),
            buffer: Vec::new(),
        });
        tracing::info!(session = self.sessions_started, "recording started");
        Ok(())
    }

    /// Capture one tracking frame. Returns whether a sample was appended.
    ///
    /// Frames arriving while idle are ignored. Frames with neither a head
    /// pose nor an expression reading, or arriving after the head bone
    /// was unassigned, are dropped.
    pub fn capture_frame(&mut self, detection: &Detection, sink: &dyn PoseSink) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if !detection.is_usable() || !sink.has_rotation_target() {
            self.dropped += 1;
            tracing::trace!(session = session.id, "dropped incomplete frame");
            return false;
        }

        let mut t = self
            .clock
            .now()
            .saturating_sub(session.started_at)
            .as_secs_f32();
        if let Some(prev) = session.buffer.last() {
            t = t.max(prev.t);
        }

        session.buffer.push(Sample {
            t,
            rotation: sink.rotation(),
            expressions: self.channels.normalize(&detection.expressions),
        });
        true
    }

    /// Finish the recording.
    ///
    /// An empty recording is discarded and yields `None`; otherwise the
    /// take is added to `store`, becomes active, and its id is returned.
    pub fn stop(&mut self, store: &mut TakeStore) -> Option<TakeId> {
        let session = self.session.take()?;
        if session.buffer.is_empty() {
            tracing::info!(session = session.id, "recording stopped with no frames; no take produced");
            return None;
        }

        let frames = session.buffer.len();
        let take = Take::new(store.next_take_name(), session.buffer)?;
        tracing::info!(
            session = session.id,
            take = %take.id,
            name = %take.name,
            frames,
            duration = take.duration_seconds,
            "recording stopped"
        );
        Some(store.add(take))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sink::MemorySink;
    use crate::types::{ExpressionWeight, HeadPose};
    use glam::Quat;
    use std::sync::Arc;

    fn recorder() -> (Recorder, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let rec = Recorder::new(clock.clone(), ChannelSet::new(["jawOpen", "mouthClose"]));
        (rec, clock)
    }

    fn expr_frame(weight: f32) -> Detection {
        Detection {
            expressions: vec![ExpressionWeight::new("jawOpen", weight)],
            ..Detection::default()
        }
    }

    #[test]
    fn test_start_requires_rotation_target() {
        let (mut rec, _) = recorder();
        let err = rec.start(&MemorySink::without_target()).unwrap_err();
        assert!(matches!(err, CoreError::Precondition(_)));
        assert!(!rec.is_recording());
    }

    #[test]
    fn test_capture_ignored_when_idle() {
        let (mut rec, _) = recorder();
        let sink = MemorySink::with_target();
        assert!(!rec.capture_frame(&expr_frame(0.5), &sink));
        assert_eq!(rec.buffered(), 0);
        assert_eq!(rec.dropped_frames(), 0);
    }

    #[test]
    fn test_incomplete_frame_dropped() {
        let (mut rec, _) = recorder();
        let sink = MemorySink::with_target();
        rec.start(&sink).unwrap();
        assert!(!rec.capture_frame(&Detection::default(), &sink));
        assert_eq!(rec.buffered(), 0);
        assert_eq!(rec.dropped_frames(), 1);
    }

    #[test]
    fn test_pose_only_frame_captured() {
        let (mut rec, _) = recorder();
        let sink = MemorySink::with_target();
        rec.start(&sink).unwrap();
        let det = Detection {
            head: Some(HeadPose::Quaternion([0.0, 0.0, 0.0, 1.0])),
            ..Detection::default()
        };
        assert!(rec.capture_frame(&det, &sink));
        assert_eq!(rec.buffered(), 1);
    }

    #[test]
    fn test_empty_recording_produces_no_take() {
        let (mut rec, _) = recorder();
        let mut store = TakeStore::new();
        rec.start(&MemorySink::with_target()).unwrap();
        assert_eq!(rec.stop(&mut store), None);
        assert!(store.is_empty());
        assert!(!rec.is_recording());
    }

    #[test]
    fn test_stop_when_idle_is_none() {
        let (mut rec, _) = recorder();
        let mut store = TakeStore::new();
        assert_eq!(rec.stop(&mut store), None);
    }

    #[test]
    fn test_restart_discards_previous_buffer() {
        let (mut rec, clock) = recorder();
        let sink = MemorySink::with_target();
        let mut store = TakeStore::new();
        rec.start(&sink).unwrap();
        rec.capture_frame(&expr_frame(0.1), &sink);
        clock.advance(Duration::from_secs(5));
        rec.start(&sink).unwrap();
        clock.advance(Duration::from_millis(500));
        rec.capture_frame(&expr_frame(0.2), &sink);
        let id = rec.stop(&mut store).unwrap();
        let take = store.get(id).unwrap();
        assert_eq!(take.samples().len(), 1);
        assert!((take.duration_seconds - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_samples_store_full_channel_set() {
        let (mut rec, _) = recorder();
        let sink = MemorySink::with_target();
        let mut store = TakeStore::new();
        rec.start(&sink).unwrap();
        rec.capture_frame(&expr_frame(0.4), &sink);
        let id = rec.stop(&mut store).unwrap();
        let take = store.get(id).unwrap();
        let s = &take.samples()[0];
        assert_eq!(s.expressions.len(), 2);
        assert_eq!(s.weight("jawOpen"), Some(0.4));
        assert_eq!(s.weight("mouthClose"), Some(0.0));
    }

    #[test]
    fn test_rotation_snapshot_is_by_value() {
        let (mut rec, _) = recorder();
        let mut sink = MemorySink::with_target();
        let mut store = TakeStore::new();
        let q = Quat::from_rotation_y(0.4);
        sink.apply_rotation(q);
        rec.start(&sink).unwrap();
        rec.capture_frame(&expr_frame(0.0), &sink);
        sink.apply_rotation(Quat::from_rotation_x(1.0));
        let id = rec.stop(&mut store).unwrap();
        assert_eq!(store.get(id).unwrap().samples()[0].rotation, q);
    }

    #[test]
    fn test_stop_names_takes_sequentially() {
        let (mut rec, _) = recorder();
        let sink = MemorySink::with_target();
        let mut store = TakeStore::new();
        for _ in 0..2 {
            rec.start(&sink).unwrap();
            rec.capture_frame(&expr_frame(0.3), &sink);
            rec.stop(&mut store).unwrap();
        }
        let names: Vec<String> = store.list().iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["Take 1", "Take 2"]);
    }
}
