//! Expression channel sets, tracker → avatar morph mapping, and the
//! head-pose axis calibration.

use crate::types::{ExpressionWeight, HeadPose};
use glam::{EulerRot, Mat4, Quat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The 52 face blendshape categories reported by the MediaPipe face landmarker.
pub const MEDIAPIPE_BLENDSHAPES: [&str; 52] = [
    "_neutral",
    "browDownLeft",
    "browDownRight",
    "browInnerUp",
    "browOuterUpLeft",
    "browOuterUpRight",
    "cheekPuff",
    "cheekSquintLeft",
    "cheekSquintRight",
    "eyeBlinkLeft",
    "eyeBlinkRight",
    "eyeLookDownLeft",
    "eyeLookDownRight",
    "eyeLookInLeft",
    "eyeLookInRight",
    "eyeLookOutLeft",
    "eyeLookOutRight",
    "eyeLookUpLeft",
    "eyeLookUpRight",
    "eyeSquintLeft",
    "eyeSquintRight",
    "eyeWideLeft",
    "eyeWideRight",
    "jawForward",
    "jawLeft",
    "jawOpen",
    "jawRight",
    "mouthClose",
    "mouthDimpleLeft",
    "mouthDimpleRight",
    "mouthFrownLeft",
    "mouthFrownRight",
    "mouthFunnel",
    "mouthLeft",
    "mouthLowerDownLeft",
    "mouthLowerDownRight",
    "mouthPressLeft",
    "mouthPressRight",
    "mouthPucker",
    "mouthRight",
    "mouthRollLower",
    "mouthRollUpper",
    "mouthShrugLower",
    "mouthShrugUpper",
    "mouthSmileLeft",
    "mouthSmileRight",
    "mouthStretchLeft",
    "mouthStretchRight",
    "mouthUpperUpLeft",
    "mouthUpperUpRight",
    "noseSneerLeft",
    "noseSneerRight",
];

/// Tracker channel → morph target names used by CC-style character rigs.
const CC_RIG_MORPHS: [(&str, &str); 51] = [
    ("eyeBlinkLeft", "Eye_Blink_L"),
    ("eyeLookDownLeft", "Eye_L_Look_Down"),
    ("eyeLookInLeft", "Eye_L_Look_R"),
    ("eyeLookOutLeft", "Eye_L_Look_L"),
    ("eyeLookUpLeft", "Eye_L_Look_Up"),
    ("eyeSquintLeft", "Eye_Squint_L"),
    ("eyeWideLeft", "Eye_Wide_L"),
    ("eyeBlinkRight", "Eye_Blink_R"),
    ("eyeLookDownRight", "Eye_R_Look_Down"),
    ("eyeLookInRight", "Eye_R_Look_L"),
    ("eyeLookOutRight", "Eye_R_Look_R"),
    ("eyeLookUpRight", "Eye_R_Look_Up"),
    ("eyeSquintRight", "Eye_Squint_R"),
    ("eyeWideRight", "Eye_Wide_R"),
    ("jawForward", "Jaw_Forward"),
    ("jawLeft", "Jaw_L"),
    ("jawRight", "Jaw_R"),
    ("jawOpen", "Jaw_Open"),
    ("mouthClose", "Mouth_Close"),
    ("mouthFunnel", "Mouth_Funnel"),
    ("mouthPucker", "Mouth_Pucker"),
    ("mouthLeft", "Mouth_L"),
    ("mouthRight", "Mouth_R"),
    ("mouthSmileLeft", "Mouth_Smile_L"),
    ("mouthSmileRight", "Mouth_Smile_R"),
    ("mouthFrownLeft", "Mouth_Frown_L"),
    ("mouthFrownRight", "Mouth_Frown_R"),
    ("mouthDimpleLeft", "Mouth_Dimple_L"),
    ("mouthDimpleRight", "Mouth_Dimple_R"),
    ("mouthStretchLeft", "Mouth_Stretch_L"),
    ("mouthStretchRight", "Mouth_Stretch_R"),
    ("mouthRollLower", "Mouth_Roll_In_Lower"),
    ("mouthRollUpper", "Mouth_Roll_In_Upper"),
    ("mouthShrugLower", "Mouth_Shrug_Lower"),
    ("mouthShrugUpper", "Mouth_Shrug_Upper"),
    ("mouthPressLeft", "Mouth_Press_L"),
    ("mouthPressRight", "Mouth_Press_R"),
    ("mouthLowerDownLeft", "Mouth_Down_Lower_L"),
    ("mouthLowerDownRight", "Mouth_Down_Lower_R"),
    ("mouthUpperUpLeft", "Mouth_Up_Upper_L"),
    ("mouthUpperUpRight", "Mouth_Up_Upper_R"),
    ("browDownLeft", "Brow_Drop_L"),
    ("browDownRight", "Brow_Drop_R"),
    ("browInnerUp", "Brow_Raise_Inner_L"),
    ("browOuterUpLeft", "Brow_Raise_Outer_L"),
    ("browOuterUpRight", "Brow_Raise_Outer_R"),
    ("cheekPuff", "Cheek_Puff_L"),
    ("cheekSquintLeft", "Cheek_Raise_L"),
    ("cheekSquintRight", "Cheek_Raise_R"),
    ("noseSneerLeft", "Nose_Sneer_L"),
    ("noseSneerRight", "Nose_Sneer_R"),
];

/// Ordered, fixed set of tracker channels stored in every sample of a take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSet {
    names: Vec<String>,
}

impl ChannelSet {
    /// Build a channel set, dropping duplicate names (first occurrence wins).
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if !out.contains(&name) {
                out.push(name);
            }
        }
        Self { names: out }
    }

    /// The MediaPipe face landmarker's 52 blendshape categories.
    pub fn mediapipe() -> Self {
        Self::new(MEDIAPIPE_BLENDSHAPES)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Expand tracker readings into the full channel vector.
    ///
    /// Output order is the set's order. Channels with no reading (or a
    /// non-finite one) read 0.0; names outside the set are dropped.
    /// Weights are clamped to `[0, 1]`.
    pub fn normalize(&self, readings: &[ExpressionWeight]) -> Vec<ExpressionWeight> {
        self.names
            .iter()
            .map(|name| {
                let weight = readings
                    .iter()
                    .find(|r| &r.name == name)
                    .and_then(ExpressionWeight::clamped)
                    .map_or(0.0, |r| r.weight);
                ExpressionWeight::new(name.clone(), weight)
            })
            .collect()
    }
}

impl Default for ChannelSet {
    fn default() -> Self {
        Self::mediapipe()
    }
}

/// Maps tracker channel names onto an avatar's morph target names.
///
/// Channels without an entry map to themselves, so avatars whose morphs
/// already use tracker (ARKit-style) names need no table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelMap {
    to_morph: BTreeMap<String, String>,
}

impl ChannelMap {
    /// No renames; every channel targets the morph of the same name.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Table for CC-style rigs (`jawOpen` → `Jaw_Open`, ...).
    pub fn cc_rig() -> Self {
        Self::identity().with_overrides(CC_RIG_MORPHS)
    }

    /// Add or replace entries.
    pub fn with_overrides<I, K, V>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (channel, morph) in entries {
            self.to_morph.insert(channel.into(), morph.into());
        }
        self
    }

    /// Morph target name driven by `channel`.
    pub fn morph_for<'a>(&'a self, channel: &'a str) -> &'a str {
        self.to_morph
            .get(channel)
            .map(String::as_str)
            .unwrap_or(channel)
    }

    /// Weight for `morph` among `expressions`, if any channel maps onto it.
    pub fn weight_for_morph(&self, morph: &str, expressions: &[ExpressionWeight]) -> Option<f32> {
        expressions
            .iter()
            .find(|e| self.morph_for(&e.name) == morph)
            .map(|e| e.weight)
    }

    pub fn len(&self) -> usize {
        self.to_morph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_morph.is_empty()
    }
}

/// Per-axis sign applied to the Euler angles of a detected head pose.
///
/// The default mirrors yaw and roll, matching a selfie-mirrored webcam
/// driving a rig whose head bone faces +Z.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisTransform {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl AxisTransform {
    pub const IDENTITY: Self = Self {
        x: 1.0,
        y: 1.0,
        z: 1.0,
    };

    /// Convert a tracker head pose into the bone rotation to apply.
    ///
    /// Scale and translation in a transformation matrix are discarded.
    /// Degenerate input yields the identity rotation.
    pub fn head_rotation(&self, pose: &HeadPose) -> Quat {
        let raw = match pose {
            HeadPose::Matrix(cols) => {
                let (_, rotation, _) = Mat4::from_cols_array(cols).to_scale_rotation_translation();
                rotation
            }
            HeadPose::Quaternion(xyzw) => Quat::from_array(*xyzw),
        };
        if !raw.is_finite() || raw.length_squared() < 1e-12 {
            return Quat::IDENTITY;
        }
        let (ex, ey, ez) = raw.normalize().to_euler(EulerRot::XYZ);
        Quat::from_euler(EulerRot::XYZ, ex * self.x, ey * self.y, ez * self.z).normalize()
    }
}

impl Default for AxisTransform {
    fn default() -> Self {
        Self {
            x: 1.0,
            y: -1.0,
            z: -1.0,
        }
    }
}
