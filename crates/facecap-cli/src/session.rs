//! Capture session driver: feeds a frame source into the studio, then
//! optionally replays and exports the recorded take.

use crate::config::Config;
use anyhow::{Context, Result};
use facecap_core::rig::{find_best_match, BoneRole};
use facecap_core::{
    ChannelSet, Detection, FileSource, FrameSource, LiveSource, ManualClock, PoseSink,
    SharedClock, SourceError, Studio, StudioEvent, SystemClock, TakeSummary, TickOutcome,
};
use facecap_gltf::{AvatarRig, AvatarScene, Exporter, NodeIndex};
use serde::Serialize;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// Where detections come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// JSON lines from a live tracker piped into stdin.
    Stdin,
    /// Detections pre-extracted from a video.
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub input: Input,
    /// Stop recording after this many seconds of take time.
    pub duration: Option<f32>,
    pub play: bool,
    pub export: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct CaptureReport {
    pub take: Option<TakeSummary>,
    pub dropped_frames: u64,
    pub malformed_lines: u64,
    pub played_frames: Option<u64>,
    pub export_path: Option<PathBuf>,
}

enum SourceEvent {
    Detection(Detection),
    Malformed { line: usize, error: String },
    Failed(String),
}

/// Resolve the head bone: the configured name if given, otherwise the best
/// match among the avatar's skin joints.
pub fn resolve_head(scene: &AvatarScene, requested: Option<&str>) -> Result<Option<NodeIndex>> {
    if let Some(name) = requested {
        let index = scene
            .find_node(name)
            .with_context(|| format!("bone `{name}` not found in avatar"))?;
        return Ok(Some(index));
    }
    let bones = scene.bones();
    let detected = find_best_match(&bones, BoneRole::Head);
    match detected {
        Some(bone) => tracing::info!(bone, "head bone auto-detected"),
        None => tracing::warn!(bones = bones.len(), "no head bone detected; pass --head-bone"),
    }
    Ok(detected.and_then(|bone| scene.find_node(bone)))
}

/// Record one take from `options.input` onto the avatar.
///
/// Recording ends when the source is exhausted, the duration limit is
/// reached, or on Ctrl-C.
pub async fn capture(
    config: &Config,
    scene: &AvatarScene,
    head: Option<NodeIndex>,
    options: CaptureOptions,
) -> Result<CaptureReport> {
    let mut rig = AvatarRig::new(scene, head, config.channel_map());
    let frame_period = Duration::from_secs_f64(1.0 / f64::from(config.playback_fps));

    // File input runs on its own timeline derived from detection
    // timestamps; live input runs on the wall clock.
    let (source, manual): (Box<dyn FrameSource + Send>, Option<Arc<ManualClock>>) =
        match &options.input {
            Input::Stdin => (
                Box::new(LiveSource::new(BufReader::new(std::io::stdin()))),
                None,
            ),
            Input::File(path) => {
                let source = FileSource::open(path, config.loop_video)
                    .with_context(|| format!("failed to open {}", path.display()))?;
                if config.loop_video && options.duration.is_none() {
                    tracing::warn!("looping input without --duration; stop with Ctrl-C");
                }
                (Box::new(source), Some(Arc::new(ManualClock::new())))
            }
        };
    let clock: SharedClock = match &manual {
        Some(manual) => manual.clone() as SharedClock,
        None => Arc::new(SystemClock::new()),
    };

    let mut studio = Studio::new(clock, ChannelSet::mediapipe(), config.axis);
    studio.subscribe(log_event);
    studio
        .start_recording(&rig)
        .context("cannot start recording")?;

    let mut events = spawn_source(source)?;
    let mut report = CaptureReport::default();
    report.malformed_lines = record(
        &mut studio,
        &mut rig,
        &mut events,
        manual.as_deref(),
        frame_period,
        options.duration,
    )
    .await;
    drop(events);

    let take_id = studio.stop_recording();
    report.dropped_frames = studio.recorder().dropped_frames();
    let Some(take) = take_id.and_then(|id| studio.store().get(id)) else {
        tracing::warn!(dropped = report.dropped_frames, "no frames captured; nothing recorded");
        return Ok(report);
    };
    report.take = Some(take.summary());

    if options.play {
        let frames = play_back(&mut studio, &mut rig, manual.as_deref(), frame_period).await?;
        report.played_frames = Some(frames);
    }

    if options.export {
        let exporter = Exporter::new(rig.channel_map().clone(), &config.output_dir);
        let path = exporter
            .export(Some(take.as_ref()), Some(scene), head)
            .context("export failed")?;
        report.export_path = Some(path);
    }

    Ok(report)
}

/// Feed source events into the studio until the source ends, the duration
/// limit is reached, or Ctrl-C. Returns the number of malformed lines.
///
/// On a file timeline the limit is checked against take time after each
/// detection. On the wall clock a timer also enforces it, so a silent live
/// source cannot keep the take open.
async fn record(
    studio: &mut Studio,
    rig: &mut AvatarRig,
    events: &mut mpsc::Receiver<SourceEvent>,
    manual: Option<&ManualClock>,
    frame_period: Duration,
    duration: Option<f32>,
) -> u64 {
    let mut timeline = FileTimeline::new(frame_period);
    let mut malformed = 0;

    let wall_limit = duration
        .filter(|_| manual.is_none())
        .map(|limit| Duration::try_from_secs_f32(limit).unwrap_or(Duration::ZERO));
    let deadline = tokio::time::sleep(wall_limit.unwrap_or(Duration::ZERO));
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SourceEvent::Detection(detection)) => {
                    if let Some(manual) = manual {
                        manual.advance(timeline.step(detection.timestamp_ms));
                    }
                    studio.on_detection(&detection, rig);
                }
                Some(SourceEvent::Malformed { line, error }) => {
                    malformed += 1;
                    tracing::warn!(line, error = %error, "skipping malformed detection");
                }
                Some(SourceEvent::Failed(error)) => {
                    tracing::error!(error = %error, "frame source failed; ending capture");
                    break;
                }
                None => {
                    tracing::info!("frame source exhausted");
                    break;
                }
            },
            _ = &mut deadline, if wall_limit.is_some() => {
                tracing::info!(elapsed = ?studio.recorder().elapsed(), "capture duration reached");
                break;
            }
            _ = &mut ctrl_c => {
                tracing::info!("capture interrupted");
                break;
            }
        }
        if let (Some(limit), Some(elapsed)) = (duration, studio.recorder().elapsed()) {
            if elapsed >= limit {
                tracing::info!(elapsed, "capture duration reached");
                break;
            }
        }
    }
    malformed
}

/// Replay the active take in real time at the configured frame rate.
async fn play_back(
    studio: &mut Studio,
    rig: &mut AvatarRig,
    manual: Option<&ManualClock>,
    period: Duration,
) -> Result<u64> {
    let mut ticket = studio.play(None, rig).context("cannot start playback")?;
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut frames = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut ctrl_c => {
                studio.stop_playback(rig);
                break;
            }
        }
        match studio.tick_playback(ticket, rig) {
            TickOutcome::Continue(next) => {
                ticket = next;
                frames += 1;
                tracing::trace!(frame = next.frame(), rotation = ?rig.rotation(), "playback frame");
            }
            TickOutcome::Finished | TickOutcome::Stale => break,
        }
        if let Some(clock) = manual {
            clock.advance(period);
        }
    }
    Ok(frames)
}

/// Read the source on a dedicated thread; blocking reads never stall the
/// runtime.
fn spawn_source(mut source: Box<dyn FrameSource + Send>) -> Result<mpsc::Receiver<SourceEvent>> {
    let (tx, rx) = mpsc::channel(64);
    std::thread::Builder::new()
        .name("facecap-source".into())
        .spawn(move || {
            tracing::debug!(kind = ?source.kind(), "source thread started");
            loop {
                let event = match source.next_detection() {
                    Ok(Some(detection)) => SourceEvent::Detection(detection),
                    Ok(None) => break,
                    Err(SourceError::Parse { line, source: e }) => SourceEvent::Malformed {
                        line,
                        error: e.to_string(),
                    },
                    Err(e) => {
                        let _ = tx.blocking_send(SourceEvent::Failed(e.to_string()));
                        break;
                    }
                };
                if tx.blocking_send(event).is_err() {
                    break;
                }
            }
            tracing::debug!("source thread exiting");
        })
        .context("failed to spawn source thread")?;
    Ok(rx)
}

/// Clock steps for file input: the gap between consecutive detection
/// timestamps, or one frame period when timestamps are missing or go
/// backwards (a looped file restarting).
struct FileTimeline {
    last_ts: Option<f64>,
    started: bool,
    period: Duration,
}

impl FileTimeline {
    fn new(period: Duration) -> Self {
        Self {
            last_ts: None,
            started: false,
            period,
        }
    }

    fn step(&mut self, timestamp_ms: Option<f64>) -> Duration {
        let step = if !self.started {
            Duration::ZERO
        } else {
            match (self.last_ts, timestamp_ms) {
                (Some(prev), Some(ts)) if ts > prev => Duration::from_secs_f64((ts - prev) / 1000.0),
                _ => self.period,
            }
        };
        self.started = true;
        self.last_ts = timestamp_ms;
        step
    }
}

fn log_event(event: &StudioEvent) {
    match event {
        StudioEvent::RecordingChanged { recording } => {
            tracing::info!(recording, "recording state changed")
        }
        StudioEvent::PlaybackChanged { playing } => {
            tracing::info!(playing, "playback state changed")
        }
        StudioEvent::TakesChanged => tracing::debug!("take list changed"),
        StudioEvent::ActiveTakeChanged(id) => tracing::info!(take = ?id, "active take changed"),
    }
}
