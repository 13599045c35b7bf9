//! Capture studio: owns the take store, recorder and player, and keeps
//! the avatar sink to a single writer at a time.

use crate::channels::{AxisTransform, ChannelSet};
use crate::clock::SharedClock;
use crate::error::CoreError;
use crate::player::{FrameTicket, Player, TickOutcome};
use crate::recorder::Recorder;
use crate::sink::PoseSink;
use crate::store::TakeStore;
use crate::types::{Detection, Take, TakeId};
use std::sync::Arc;

/// State-change notifications for UI collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudioEvent {
    RecordingChanged { recording: bool },
    PlaybackChanged { playing: bool },
    TakesChanged,
    ActiveTakeChanged(Option<TakeId>),
}

type Observer = Box<dyn FnMut(&StudioEvent) + Send>;

pub struct Studio {
    store: TakeStore,
    recorder: Recorder,
    player: Player,
    axis: AxisTransform,
    observers: Vec<Observer>,
}

impl Studio {
    pub fn new(clock: SharedClock, channels: ChannelSet, axis: AxisTransform) -> Self {
        Self {
            store: TakeStore::new(),
            recorder: Recorder::new(clock.clone(), channels),
            player: Player::new(clock),
            axis,
            observers: Vec::new(),
        }
    }

    /// Register a callback for every [`StudioEvent`].
    pub fn subscribe(&mut self, observer: impl FnMut(&StudioEvent) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn store(&self) -> &TakeStore {
        &self.store
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn takes(&self) -> Vec<Arc<Take>> {
        self.store.list()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn is_playing(&self) -> bool {
        self.player.is_playing()
    }

    /// Feed one tracking result.
    ///
    /// Retargets the detection live onto the sink and captures it when
    /// recording. Ignored while a take is playing so the sink is never
    /// driven by two sources. Returns whether a sample was captured.
    pub fn on_detection(&mut self, detection: &Detection, sink: &mut dyn PoseSink) -> bool {
        if self.player.is_playing() {
            return false;
        }
        if let Some(head) = &detection.head {
            if sink.has_rotation_target() {
                sink.apply_rotation(self.axis.head_rotation(head));
            }
        }
        if !detection.expressions.is_empty() {
            // Same vector the recorder captures, so playback matches the preview.
            let expressions = self.recorder.channels().normalize(&detection.expressions);
            sink.apply_expressions(&expressions);
        }
        self.recorder.capture_frame(detection, sink)
    }

    pub fn start_recording(&mut self, sink: &dyn PoseSink) -> Result<(), CoreError> {
        if self.player.is_playing() {
            return Err(CoreError::Conflict("cannot record while a take is playing".into()));
        }
        self.recorder.start(sink)?;
        self.emit(StudioEvent::RecordingChanged { recording: true });
        Ok(())
    }

    /// Stop recording; returns the new take's id if any frames were captured.
    pub fn stop_recording(&mut self) -> Option<TakeId> {
        if !self.recorder.is_recording() {
            return None;
        }
        let id = self.recorder.stop(&mut self.store);
        self.emit(StudioEvent::RecordingChanged { recording: false });
        if id.is_some() {
            self.emit(StudioEvent::TakesChanged);
            self.emit(StudioEvent::ActiveTakeChanged(id));
        }
        id
    }

    /// Play `take_id`, or the active take when `None`.
    pub fn play(
        &mut self,
        take_id: Option<TakeId>,
        sink: &mut dyn PoseSink,
    ) -> Result<FrameTicket, CoreError> {
        if self.recorder.is_recording() {
            return Err(CoreError::Conflict("cannot play while recording".into()));
        }
        let ticket = self.player.play(&self.store, take_id, sink).map_err(|e| {
            tracing::warn!(error = %e, "playback not started");
            e
        })?;
        self.emit(StudioEvent::PlaybackChanged { playing: true });
        Ok(ticket)
    }

    pub fn tick_playback(&mut self, ticket: FrameTicket, sink: &mut dyn PoseSink) -> TickOutcome {
        let outcome = self.player.tick(ticket, sink);
        if outcome == TickOutcome::Finished {
            self.emit(StudioEvent::PlaybackChanged { playing: false });
        }
        outcome
    }

    pub fn stop_playback(&mut self, sink: &mut dyn PoseSink) {
        if self.player.is_playing() {
            self.player.stop(sink);
            self.emit(StudioEvent::PlaybackChanged { playing: false });
        }
    }

    /// Make `id` the active take. Playback in progress is stopped.
    pub fn select_take(&mut self, id: TakeId, sink: &mut dyn PoseSink) -> bool {
        if !self.store.contains(id) {
            tracing::warn!(take = %id, "select: take not found");
            return false;
        }
        self.stop_playback(sink);
        let ok = self.store.set_active(id, sink);
        if ok {
            self.emit(StudioEvent::ActiveTakeChanged(Some(id)));
        }
        ok
    }

    /// Delete a take; stops playback first if that take is playing.
    pub fn delete_take(&mut self, id: TakeId, sink: &mut dyn PoseSink) -> bool {
        if self.player.current_take() == Some(id) {
            self.stop_playback(sink);
        }
        let was_active = self.store.active_id() == Some(id);
        let removed = self.store.delete(id, sink);
        if removed {
            self.emit(StudioEvent::TakesChanged);
            if was_active {
                self.emit(StudioEvent::ActiveTakeChanged(None));
            }
        }
        removed
    }

    fn emit(&mut self, event: StudioEvent) {
        for observer in self.observers.iter_mut() {
            observer(&event);
        }
    }
}
