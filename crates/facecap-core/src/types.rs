use chrono::{DateTime, Utc};
use glam::Quat;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a recorded take.
pub type TakeId = Uuid;

/// One named expression channel and its intensity at an instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionWeight {
    #[serde(alias = "categoryName")]
    pub name: String,
    /// Normalized intensity in [0, 1] as reported by the tracker.
    #[serde(alias = "score")]
    pub weight: f32,
}

impl ExpressionWeight {
    pub fn new(name: impl Into<String>, weight: f32) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }

    /// This reading with its weight clamped to [0, 1], or `None` when the
    /// weight is not a finite number.
    pub fn clamped(&self) -> Option<Self> {
        self.weight
            .is_finite()
            .then(|| Self::new(self.name.clone(), self.weight.clamp(0.0, 1.0)))
    }
}

/// Head pose as delivered by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadPose {
    /// Column-major 4x4 facial transformation matrix.
    Matrix([f32; 16]),
    /// Rotation quaternion as `[x, y, z, w]`.
    Quaternion([f32; 4]),
}

/// One tracking result for a processed video frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Source frame timestamp in milliseconds, when the source knows it.
    #[serde(default, alias = "timestampMs")]
    pub timestamp_ms: Option<f64>,
    #[serde(default)]
    pub head: Option<HeadPose>,
    #[serde(default, alias = "blendshapes")]
    pub expressions: Vec<ExpressionWeight>,
}

impl Detection {
    /// A detection is usable when it carries a head pose or at least one
    /// expression reading. Anything else is a dropped frame.
    pub fn is_usable(&self) -> bool {
        self.head.is_some() || !self.expressions.is_empty()
    }
}

/// One instant's head rotation plus expression weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since the start of the recording.
    pub t: f32,
    pub rotation: Quat,
    pub expressions: Vec<ExpressionWeight>,
}

impl Sample {
    /// Weight of the named channel, if this sample carries it.
    pub fn weight(&self, name: &str) -> Option<f32> {
        self.expressions
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.weight)
    }
}

/// One complete recorded performance.
///
/// A take always holds at least one sample; [`Take::new`] refuses an
/// empty buffer, so every stored take has a defined duration.
#[derive(Debug, Clone, Serialize)]
pub struct Take {
    pub id: TakeId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub duration_seconds: f32,
    samples: Vec<Sample>,
}

impl Take {
    /// Build a take from captured samples, or `None` if nothing was captured.
    pub fn new(name: impl Into<String>, samples: Vec<Sample>) -> Option<Self> {
        let duration_seconds = samples.last()?.t;
        Some(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
            duration_seconds,
            samples,
        })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn last_sample(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn summary(&self) -> TakeSummary {
        TakeSummary {
            id: self.id,
            name: self.name.clone(),
            created_at: self.created_at,
            duration_seconds: self.duration_seconds,
            samples: self.samples.len(),
        }
    }
}

/// Take metadata without the sample payload, for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TakeSummary {
    pub id: TakeId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub duration_seconds: f32,
    pub samples: usize,
}
