//! The avatar control surface driven by live tracking and playback.

use crate::types::ExpressionWeight;
use glam::Quat;
use std::collections::BTreeMap;

/// External avatar control surface: head rotation plus named expressions.
///
/// Name → morph index resolution belongs to the implementor; the core
/// only ever speaks in channel names.
pub trait PoseSink {
    /// Whether a head bone (rotation target) is configured.
    fn has_rotation_target(&self) -> bool;
    /// Current head rotation, read by value.
    fn rotation(&self) -> Quat;
    fn apply_rotation(&mut self, rotation: Quat);
    fn apply_expressions(&mut self, expressions: &[ExpressionWeight]);
    /// Identity rotation and every expression weight at zero.
    fn reset_to_neutral(&mut self);
}

/// Headless sink that keeps the last applied pose in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    has_target: bool,
    rotation: Quat,
    weights: BTreeMap<String, f32>,
    writes: usize,
    resets: usize,
}

impl MemorySink {
    /// A sink with a head bone assigned.
    pub fn with_target() -> Self {
        Self {
            has_target: true,
            rotation: Quat::IDENTITY,
            ..Self::default()
        }
    }

    /// A sink with no head bone; recording against it is refused.
    pub fn without_target() -> Self {
        Self {
            has_target: false,
            rotation: Quat::IDENTITY,
            ..Self::default()
        }
    }

    pub fn weight(&self, name: &str) -> Option<f32> {
        self.weights.get(name).copied()
    }

    /// Number of rotation/expression writes since creation.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn resets(&self) -> usize {
        self.resets
    }

    pub fn is_neutral(&self) -> bool {
        self.rotation == Quat::IDENTITY && self.weights.values().all(|w| *w == 0.0)
    }
}

impl PoseSink for MemorySink {
    fn has_rotation_target(&self) -> bool {
        self.has_target
    }

    fn rotation(&self) -> Quat {
        self.rotation
    }

    fn apply_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.writes += 1;
    }

    fn apply_expressions(&mut self, expressions: &[ExpressionWeight]) {
        for e in expressions {
            self.weights.insert(e.name.clone(), e.weight);
        }
        self.writes += 1;
    }

    fn reset_to_neutral(&mut self) {
        self.rotation = Quat::IDENTITY;
        for w in self.weights.values_mut() {
            *w = 0.0;
        }
        self.resets += 1;
    }
}
