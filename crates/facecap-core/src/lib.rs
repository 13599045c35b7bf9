//! facecap-core — Take capture and playback engine.
//!
//! Records timestamped head rotation and expression samples from a
//! tracking source into takes, keeps them in an in-memory store, and
//! replays them against an avatar pose sink with step-function sampling.

pub mod channels;
pub mod clock;
pub mod error;
pub mod player;
pub mod recorder;
pub mod rig;
pub mod sink;
pub mod source;
pub mod store;
pub mod studio;
pub mod types;

pub use channels::{AxisTransform, ChannelMap, ChannelSet};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::CoreError;
pub use player::{FrameTicket, Player, PlayerState, TickOutcome};
pub use recorder::Recorder;
pub use sink::{MemorySink, PoseSink};
pub use source::{FileSource, FrameSource, LiveSource, SourceError, SourceKind};
pub use store::TakeStore;
pub use studio::{Studio, StudioEvent};
pub use types::{Detection, ExpressionWeight, HeadPose, Sample, Take, TakeId, TakeSummary};
