//! Take playback with step-function sampling.
//!
//! The player never blocks. Its driver calls [`Player::tick`] once per
//! display refresh with the ticket returned by the previous call. A
//! ticket from a stopped or replaced session is stale and writes nothing.

use crate::clock::SharedClock;
use crate::error::CoreError;
use crate::sink::PoseSink;
use crate::store::TakeStore;
use crate::types::{Sample, Take, TakeId};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Playing,
}

/// Handle for the next scheduled animation frame of a playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTicket {
    session: u64,
    frame: u64,
}

impl FrameTicket {
    /// Zero-based frame number within the session.
    pub fn frame(&self) -> u64 {
        self.frame
    }
}

/// Result of one animation-frame step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A sample was applied; schedule the next frame with this ticket.
    Continue(FrameTicket),
    /// Playback ran past the last sample; the sink is back to neutral.
    Finished,
    /// The ticket's session is no longer live. Nothing was written.
    Stale,
}

#[derive(Debug)]
struct PlaybackSession {
    id: u64,
    started_at: Duration,
    take: Arc<Take>,
}

/// Replays takes against a pose sink on the clock's schedule.
pub struct Player {
    clock: SharedClock,
    session: Option<PlaybackSession>,
    sessions_started: u64,
}

impl Player {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            session: None,
            sessions_started: 0,
        }
    }

    pub fn state(&self) -> PlayerState {
        if self.session.is_some() {
            PlayerState::Playing
        } else {
            PlayerState::Idle
        }
    }

    pub fn is_playing(&self) -> bool {
        self.session.is_some()
    }

    /// Id of the take being played, if any.
    pub fn current_take(&self) -> Option<TakeId> {
        self.session.as_ref().map(|s| s.take.id)
    }

    /// Start playing `take_id`, or the active take when `None`.
    ///
    /// A session already in progress is stopped first.
    pub fn play(
        &mut self,
        store: &TakeStore,
        take_id: Option<TakeId>,
        sink: &mut dyn PoseSink,
    ) -> Result<FrameTicket, CoreError> {
        let take = match take_id {
            Some(id) => store.get(id),
            None => store.active(),
        }
        .filter(|t| !t.samples().is_empty())
        .ok_or_else(|| match take_id {
            Some(id) => CoreError::NotFound(format!("take {id}")),
            None => CoreError::NotFound("no active take".into()),
        })?;

        self.stop(sink);

        self.sessions_started += 1;
        let id = self.sessions_started;
        tracing::info!(
            session = id,
            take = %take.id,
            duration = take.duration_seconds,
            "playback started"
        );
        self.session = Some(PlaybackSession {
            id,
            started_at: self.clock.now(),
            take,
        });
        Ok(FrameTicket {
            session: id,
            frame: 0,
        })
    }

    /// Run one animation frame.
    pub fn tick(&mut self, ticket: FrameTicket, sink: &mut dyn PoseSink) -> TickOutcome {
        let Some(session) = self.session.as_ref().filter(|s| s.id == ticket.session) else {
            return TickOutcome::Stale;
        };

        let elapsed = self
            .clock
            .now()
            .saturating_sub(session.started_at)
            .as_secs_f32();

        match sample_at(&session.take, elapsed) {
            Some(sample) => {
                sink.apply_rotation(sample.rotation);
                sink.apply_expressions(&sample.expressions);
                TickOutcome::Continue(FrameTicket {
                    session: ticket.session,
                    frame: ticket.frame + 1,
                })
            }
            None => {
                tracing::info!(session = session.id, frames = ticket.frame, "playback reached end of take");
                self.stop(sink);
                TickOutcome::Finished
            }
        }
    }

    /// Stop playback and return the sink to neutral. No-op when idle.
    pub fn stop(&mut self, sink: &mut dyn PoseSink) {
        if let Some(session) = self.session.take() {
            tracing::debug!(session = session.id, take = %session.take.id, "playback stopped");
            sink.reset_to_neutral();
        }
    }
}

/// The sample shown at `elapsed` seconds into playback: the first sample
/// with `t >= elapsed`, without interpolation. `None` once `elapsed` is
/// past the last sample.
pub fn sample_at(take: &Take, elapsed: f32) -> Option<&Sample> {
    take.samples().iter().find(|s| s.t >= elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sink::MemorySink;
    use crate::types::ExpressionWeight;
    use glam::Quat;

    fn take_at(times: &[f32]) -> Take {
        let samples = times
            .iter()
            .map(|&t| Sample {
                t,
                rotation: Quat::from_rotation_y(t),
                expressions: vec![ExpressionWeight::new("jawOpen", t / 2.0)],
            })
            .collect();
        Take::new("test", samples).unwrap()
    }

    fn setup(times: &[f32]) -> (Player, TakeStore, Arc<ManualClock>, TakeId) {
        let clock = Arc::new(ManualClock::new());
        let mut store = TakeStore::new();
        let id = store.add(take_at(times));
        (Player::new(clock.clone()), store, clock, id)
    }

    #[test]
    fn test_sample_at_is_step_function() {
        let take = take_at(&[0.0, 0.5, 1.0]);
        assert_eq!(sample_at(&take, 0.3).unwrap().t, 0.5);
        assert_eq!(sample_at(&take, 0.0).unwrap().t, 0.0);
        assert_eq!(sample_at(&take, 0.5).unwrap().t, 0.5);
        assert_eq!(sample_at(&take, 0.51).unwrap().t, 1.0);
        assert!(sample_at(&take, 1.01).is_none());
    }

    #[test]
    fn test_play_unknown_take_is_not_found() {
        let (mut player, store, _, _) = setup(&[0.0]);
        let mut sink = MemorySink::with_target();
        let err = player
            .play(&store, Some(uuid::Uuid::new_v4()), &mut sink)
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
        assert_eq!(player.state(), PlayerState::Idle);
    }

    #[test]
    fn test_play_without_active_take_is_not_found() {
        let clock = Arc::new(ManualClock::new());
        let mut player = Player::new(clock);
        let mut sink = MemorySink::with_target();
        let err = player.play(&TakeStore::new(), None, &mut sink).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn test_tick_applies_first_future_sample() {
        let (mut player, store, clock, _) = setup(&[0.0, 0.5, 1.0]);
        let mut sink = MemorySink::with_target();
        let ticket = player.play(&store, None, &mut sink).unwrap();
        clock.advance(Duration::from_millis(300));
        let outcome = player.tick(ticket, &mut sink);
        assert!(matches!(outcome, TickOutcome::Continue(t) if t.frame() == 1));
        assert_eq!(sink.rotation(), Quat::from_rotation_y(0.5));
        assert_eq!(sink.weight("jawOpen"), Some(0.25));
    }

    #[test]
    fn test_playback_terminates_and_resets() {
        let (mut player, store, clock, _) = setup(&[0.0, 0.5, 1.0]);
        let mut sink = MemorySink::with_target();
        let mut ticket = player.play(&store, None, &mut sink).unwrap();
        let mut finished = false;
        for _ in 0..100 {
            clock.advance(Duration::from_millis(16));
            match player.tick(ticket, &mut sink) {
                TickOutcome::Continue(next) => ticket = next,
                TickOutcome::Finished => {
                    finished = true;
                    break;
                }
                TickOutcome::Stale => panic!("ticket went stale"),
            }
        }
        assert!(finished);
        assert_eq!(player.state(), PlayerState::Idle);
        assert!(sink.is_neutral());
    }

    #[test]
    fn test_stale_ticket_does_not_write() {
        let (mut player, store, _, _) = setup(&[0.0, 1.0]);
        let mut sink = MemorySink::with_target();
        let ticket = player.play(&store, None, &mut sink).unwrap();
        player.stop(&mut sink);
        let writes = sink.writes();
        assert_eq!(player.tick(ticket, &mut sink), TickOutcome::Stale);
        assert_eq!(sink.writes(), writes);
    }

    #[test]
    fn test_replay_invalidates_previous_session() {
        let (mut player, store, _, id) = setup(&[0.0, 1.0]);
        let mut sink = MemorySink::with_target();
        let first = player.play(&store, Some(id), &mut sink).unwrap();
        let second = player.play(&store, Some(id), &mut sink).unwrap();
        assert_eq!(sink.resets(), 1);
        assert_eq!(player.tick(first, &mut sink), TickOutcome::Stale);
        assert!(matches!(player.tick(second, &mut sink), TickOutcome::Continue(_)));
    }

    #[test]
    fn test_stop_when_idle_does_not_reset() {
        let (mut player, _, _, _) = setup(&[0.0]);
        let mut sink = MemorySink::with_target();
        player.stop(&mut sink);
        assert_eq!(sink.resets(), 0);
    }
}
