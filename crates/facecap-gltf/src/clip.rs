//! Keyframe animation clip built from a take.

use crate::scene::NodeIndex;

/// What a keyframe track animates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackTarget {
    /// Node rotation quaternion, 4 values per key.
    Rotation { node: NodeIndex },
    /// One morph target weight of a mesh node, 1 value per key.
    MorphWeight { node: NodeIndex, target: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeTrack {
    /// `Head.quaternion` or `Face.morphTargetInfluences[jawOpen]`.
    pub name: String,
    pub target: TrackTarget,
    pub times: Vec<f32>,
    /// Flattened values, `value_size()` per key.
    pub values: Vec<f32>,
}

impl KeyframeTrack {
    pub fn value_size(&self) -> usize {
        match self.target {
            TrackTarget::Rotation { .. } => 4,
            TrackTarget::MorphWeight { .. } => 1,
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Values of key `i`.
    pub fn value(&self, i: usize) -> Option<&[f32]> {
        let n = self.value_size();
        self.values.get(i * n..(i + 1) * n)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub tracks: Vec<KeyframeTrack>,
}

impl AnimationClip {
    pub fn track(&self, name: &str) -> Option<&KeyframeTrack> {
        self.tracks.iter().find(|t| t.name == name)
    }
}
