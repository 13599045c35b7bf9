//! Avatar pose state driven through the [`PoseSink`] interface.

use crate::scene::{AvatarScene, MorphMesh, NodeIndex};
use facecap_core::{ChannelMap, ExpressionWeight, PoseSink};
use glam::Quat;

/// Head bone rotation and per-mesh morph weights of a loaded avatar.
///
/// Channel names are resolved to morph target indices here, at the
/// boundary; everything upstream is name-keyed.
#[derive(Debug, Clone)]
pub struct AvatarRig {
    head: Option<NodeIndex>,
    rotation: Quat,
    meshes: Vec<MorphMesh>,
    weights: Vec<Vec<f32>>,
    map: ChannelMap,
}

impl AvatarRig {
    pub fn new(scene: &AvatarScene, head: Option<NodeIndex>, map: ChannelMap) -> Self {
        let meshes = scene.morph_meshes().to_vec();
        let weights = meshes.iter().map(|m| vec![0.0; m.targets.len()]).collect();
        Self {
            head,
            rotation: Quat::IDENTITY,
            meshes,
            weights,
            map,
        }
    }

    pub fn head(&self) -> Option<NodeIndex> {
        self.head
    }

    pub fn channel_map(&self) -> &ChannelMap {
        &self.map
    }

    /// Current weights of the `i`-th morph-capable mesh, in target order.
    pub fn mesh_weights(&self, i: usize) -> Option<&[f32]> {
        self.weights.get(i).map(Vec::as_slice)
    }

    /// Weight of `morph` on the first mesh that has it.
    pub fn morph_weight(&self, morph: &str) -> Option<f32> {
        self.meshes
            .iter()
            .zip(&self.weights)
            .find_map(|(mesh, w)| mesh.target_index(morph).map(|i| w[i]))
    }
}

impl PoseSink for AvatarRig {
    fn has_rotation_target(&self) -> bool {
        self.head.is_some()
    }

    fn rotation(&self) -> Quat {
        self.rotation
    }

    fn apply_rotation(&mut self, rotation: Quat) {
        if self.head.is_some() {
            self.rotation = rotation;
        }
    }

    /// Morphs no reading maps to keep their current weight. When several
    /// channels map to one morph, the first reading wins, as in export.
    fn apply_expressions(&mut self, expressions: &[ExpressionWeight]) {
        for (mesh, weights) in self.meshes.iter().zip(self.weights.iter_mut()) {
            for (morph, weight) in mesh.targets.iter().zip(weights.iter_mut()) {
                if let Some(w) = self.map.weight_for_morph(morph, expressions) {
                    *weight = w;
                }
            }
        }
    }

    fn reset_to_neutral(&mut self) {
        self.rotation = Quat::IDENTITY;
        for weights in &mut self.weights {
            weights.fill(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::tests::avatar;

    #[test]
    fn test_expressions_resolve_through_map() {
        let scene = avatar();
        let map = ChannelMap::identity().with_overrides([("mouthClose", "Mouth_Close")]);
        let mut rig = AvatarRig::new(&scene, Some(2), map);
        rig.apply_expressions(&[
            ExpressionWeight::new("jawOpen", 0.6),
            ExpressionWeight::new("mouthClose", 0.2),
            ExpressionWeight::new("cheekPuff", 1.0),
        ]);
        assert_eq!(rig.mesh_weights(0), Some(&[0.6, 0.2][..]));
        assert_eq!(rig.morph_weight("jawOpen"), Some(0.6));
        assert_eq!(rig.mesh_weights(1), Some(&[0.0][..]));
    }

    #[test]
    fn test_shared_morph_matches_export() {
        use crate::exporter::build_clip;
        use facecap_core::{Sample, Take};

        let scene = avatar();
        let map = ChannelMap::identity().with_overrides([("mouthClose", "jawOpen")]);
        let expressions = vec![
            ExpressionWeight::new("jawOpen", 0.9),
            ExpressionWeight::new("mouthClose", 0.1),
        ];
        let mut rig = AvatarRig::new(&scene, Some(2), map.clone());
        rig.apply_expressions(&expressions);

        let take = Take::new(
            "Take 1",
            vec![Sample {
                t: 0.0,
                rotation: Quat::IDENTITY,
                expressions,
            }],
        )
        .unwrap();
        let clip = build_clip(&take, &scene, 2, &map).unwrap();
        let track = clip.track("Face.morphTargetInfluences[jawOpen]").unwrap();
        assert_eq!(rig.morph_weight("jawOpen"), Some(0.9));
        assert_eq!(track.values, vec![0.9]);
    }

    #[test]
    fn test_reset_to_neutral() {
        let scene = avatar();
        let mut rig = AvatarRig::new(&scene, Some(2), ChannelMap::identity());
        rig.apply_rotation(Quat::from_rotation_z(0.5));
        rig.apply_expressions(&[ExpressionWeight::new("jawOpen", 1.0)]);
        rig.reset_to_neutral();
        assert_eq!(rig.rotation(), Quat::IDENTITY);
        assert_eq!(rig.morph_weight("jawOpen"), Some(0.0));
    }

    #[test]
    fn test_no_head_bone_means_no_rotation_target() {
        let scene = avatar();
        let mut rig = AvatarRig::new(&scene, None, ChannelMap::identity());
        assert!(!rig.has_rotation_target());
        rig.apply_rotation(Quat::from_rotation_x(1.0));
        assert_eq!(rig.rotation(), Quat::IDENTITY);
    }
}
