//! Take → animation clip → `.glb` export.
//!
//! The whole avatar is re-exported with one extra animation appended, so
//! the file plays standalone in any glTF viewer.

use crate::clip::{AnimationClip, KeyframeTrack, TrackTarget};
use crate::glb::{pad_to_4, Glb, GlbError};
use crate::scene::{AvatarScene, NodeIndex};
use facecap_core::{ChannelMap, CoreError, Take};
use glam::Mat4;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

const COMPONENT_FLOAT: u32 = 5126;
const SCALAR: &str = "SCALAR";
const VEC4: &str = "VEC4";
const ROTATION: &str = "rotation";
const WEIGHTS: &str = "weights";
const MAX_NAME_ATTEMPTS: u32 = 10_000;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("failed to serialize scene: {0}")]
    Serialize(#[from] GlbError),
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Turns a scene plus clip into the bytes of an export file.
pub trait SceneSerializer {
    fn serialize(&self, scene: &AvatarScene, clip: &AnimationClip) -> Result<Vec<u8>, GlbError>;
}

/// Build the keyframe clip reproducing `take` on `scene`.
///
/// One rotation track on `head` and one weight track per morph target of
/// every morph-capable mesh. Sample times and values are used verbatim;
/// channels absent from a sample key to 0.
pub fn build_clip(
    take: &Take,
    scene: &AvatarScene,
    head: NodeIndex,
    map: &ChannelMap,
) -> Result<AnimationClip, CoreError> {
    if head >= scene.nodes().len() {
        return Err(CoreError::Validation(format!("head bone {head} is not in the model")));
    }
    let meshes = scene.morph_meshes();
    if meshes.is_empty() {
        return Err(CoreError::Validation("no expression channels on model".into()));
    }

    let samples = take.samples();
    let times: Vec<f32> = samples.iter().map(|s| s.t).collect();

    let head_name = scene
        .node_name(head)
        .map(str::to_owned)
        .unwrap_or_else(|| format!("Node_{head}"));
    let mut tracks = vec![KeyframeTrack {
        name: format!("{head_name}.quaternion"),
        target: TrackTarget::Rotation { node: head },
        times: times.clone(),
        values: samples.iter().flat_map(|s| s.rotation.to_array()).collect(),
    }];

    for mesh in meshes {
        for (target, morph) in mesh.targets.iter().enumerate() {
            let values = samples
                .iter()
                .map(|s| map.weight_for_morph(morph, &s.expressions).unwrap_or(0.0))
                .collect();
            tracks.push(KeyframeTrack {
                name: format!("{}.morphTargetInfluences[{morph}]", mesh.name),
                target: TrackTarget::MorphWeight {
                    node: mesh.node,
                    target,
                },
                times: times.clone(),
                values,
            });
        }
    }

    tracing::debug!(
        take = %take.id,
        tracks = tracks.len(),
        meshes = meshes.len(),
        keys = times.len(),
        "animation clip built"
    );
    Ok(AnimationClip {
        name: take.name.clone(),
        duration: take.duration_seconds,
        tracks,
    })
}

/// Writes the avatar and clip as a single binary glTF.
///
/// Keyframe data is appended to the embedded buffer; existing content is
/// preserved byte for byte. Morph weight tracks are merged into one
/// `weights` channel per mesh node, as glTF requires.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlbWriter;

impl SceneSerializer for GlbWriter {
    fn serialize(&self, scene: &AvatarScene, clip: &AnimationClip) -> Result<Vec<u8>, GlbError> {
        let mut json = scene.glb().json.clone();
        let mut bin = scene.glb().bin.clone().unwrap_or_default();

        let buffers = array_mut(&mut json, "buffers")?;
        if buffers.is_empty() {
            buffers.push(json!({ "byteLength": 0 }));
        }
        if buffers[0].get("uri").is_some() {
            return Err(GlbError::Unsupported(
                "buffer 0 is external; only self-contained avatars can be exported".into(),
            ));
        }

        let mut animation = Animation {
            name: &clip.name,
            channels: Vec::new(),
            samplers: Vec::new(),
        };
        let mut inputs: Vec<(Vec<f32>, usize)> = Vec::new();

        let mut input_for = |json: &mut Value,
                             bin: &mut Vec<u8>,
                             times: &[f32]|
         -> Result<usize, GlbError> {
            if let Some((_, idx)) = inputs.iter().find(|(t, _)| t.as_slice() == times) {
                return Ok(*idx);
            }
            let idx = push_accessor(json, bin, times, times.len(), SCALAR, true)?;
            inputs.push((times.to_vec(), idx));
            Ok(idx)
        };

        let mut morph_groups: BTreeMap<NodeIndex, Vec<&KeyframeTrack>> = BTreeMap::new();
        for track in &clip.tracks {
            if track.is_empty() {
                return Err(GlbError::Unsupported(format!("track `{}` has no keyframes", track.name)));
            }
            match track.target {
                TrackTarget::Rotation { node } => {
                    matrix_to_trs(&mut json, node)?;
                    let input = input_for(&mut json, &mut bin, &track.times)?;
                    let output = push_accessor(&mut json, &mut bin, &track.values, track.len(), VEC4, false)?;
                    animation.push(node, ROTATION, input, output);
                }
                TrackTarget::MorphWeight { node, .. } => {
                    morph_groups.entry(node).or_default().push(track);
                }
            }
        }

        for (node, tracks) in &morph_groups {
            let times = &tracks[0].times;
            if tracks.iter().any(|t| &t.times != times) {
                return Err(GlbError::Unsupported(format!(
                    "morph tracks on node {node} use different time axes"
                )));
            }
            let target_count = scene
                .morph_meshes()
                .iter()
                .find(|m| m.node == *node)
                .map(|m| m.targets.len())
                .unwrap_or(0)
                .max(
                    tracks
                        .iter()
                        .filter_map(|t| match t.target {
                            TrackTarget::MorphWeight { target, .. } => Some(target + 1),
                            TrackTarget::Rotation { .. } => None,
                        })
                        .max()
                        .unwrap_or(0),
                );

            let mut weights = vec![0.0f32; times.len() * target_count];
            for track in tracks {
                if let TrackTarget::MorphWeight { target, .. } = track.target {
                    for (key, value) in track.values.iter().take(times.len()).enumerate() {
                        weights[key * target_count + target] = *value;
                    }
                }
            }

            let input = input_for(&mut json, &mut bin, times)?;
            let output = push_accessor(&mut json, &mut bin, &weights, weights.len(), SCALAR, false)?;
            animation.push(*node, WEIGHTS, input, output);
        }

        // Unnamed morph nodes get the name their tracks were built with.
        for mesh in scene.morph_meshes() {
            if let Some(node) = json["nodes"].get_mut(mesh.node) {
                if node.get("name").and_then(Value::as_str).map_or(true, str::is_empty) {
                    node["name"] = Value::String(mesh.name.clone());
                }
            }
        }

        let animation = serde_json::to_value(&animation)?;
        array_mut(&mut json, "animations")?.push(animation);

        pad_to_4(&mut bin, 0);
        json["buffers"][0]["byteLength"] = json!(bin.len());

        Glb {
            json,
            bin: Some(bin),
        }
        .to_bytes()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BufferView {
    buffer: usize,
    byte_offset: usize,
    byte_length: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Accessor {
    buffer_view: usize,
    component_type: u32,
    count: usize,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    min: Option<[f32; 1]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<[f32; 1]>,
}

#[derive(Serialize)]
struct Animation<'a> {
    name: &'a str,
    channels: Vec<AnimationChannel>,
    samplers: Vec<AnimationSampler>,
}

impl Animation<'_> {
    /// Add a linear sampler and the channel driving `path` on `node` with it.
    fn push(&mut self, node: NodeIndex, path: &'static str, input: usize, output: usize) {
        self.channels.push(AnimationChannel {
            sampler: self.samplers.len(),
            target: ChannelTarget { node, path },
        });
        self.samplers.push(AnimationSampler {
            input,
            output,
            interpolation: "LINEAR",
        });
    }
}

#[derive(Serialize)]
struct AnimationChannel {
    sampler: usize,
    target: ChannelTarget,
}

#[derive(Serialize)]
struct ChannelTarget {
    node: NodeIndex,
    path: &'static str,
}

#[derive(Serialize)]
struct AnimationSampler {
    input: usize,
    output: usize,
    interpolation: &'static str,
}

/// glTF forbids animating a node that carries `matrix`; replace it with
/// the equivalent translation, rotation and scale.
fn matrix_to_trs(json: &mut Value, node: NodeIndex) -> Result<(), GlbError> {
    let Some(object) = json["nodes"].get_mut(node).and_then(Value::as_object_mut) else {
        return Ok(());
    };
    let Some(matrix) = object.remove("matrix") else {
        return Ok(());
    };
    let cols: [f32; 16] = serde_json::from_value(matrix)
        .map_err(|e| GlbError::InvalidDocument(format!("node {node} matrix: {e}")))?;
    let (scale, rotation, translation) = Mat4::from_cols_array(&cols).to_scale_rotation_translation();
    object.insert("translation".into(), json!(translation.to_array()));
    object.insert("rotation".into(), json!(rotation.to_array()));
    object.insert("scale".into(), json!(scale.to_array()));
    tracing::debug!(node, "animated node matrix decomposed");
    Ok(())
}

/// Append `data` as a float accessor with its own buffer view.
fn push_accessor(
    json: &mut Value,
    bin: &mut Vec<u8>,
    data: &[f32],
    count: usize,
    kind: &'static str,
    with_bounds: bool,
) -> Result<usize, GlbError> {
    pad_to_4(bin, 0);
    let offset = bin.len();
    for v in data {
        bin.extend_from_slice(&v.to_le_bytes());
    }

    let view = serde_json::to_value(BufferView {
        buffer: 0,
        byte_offset: offset,
        byte_length: data.len() * 4,
    })?;
    let views = array_mut(json, "bufferViews")?;
    views.push(view);
    let buffer_view = views.len() - 1;

    let bounds = |init: f32, pick: fn(f32, f32) -> f32| [data.iter().copied().fold(init, pick)];
    let accessor = serde_json::to_value(Accessor {
        buffer_view,
        component_type: COMPONENT_FLOAT,
        count,
        kind,
        min: with_bounds.then(|| bounds(f32::INFINITY, f32::min)),
        max: with_bounds.then(|| bounds(f32::NEG_INFINITY, f32::max)),
    })?;
    let accessors = array_mut(json, "accessors")?;
    accessors.push(accessor);
    Ok(accessors.len() - 1)
}

fn array_mut<'a>(json: &'a mut Value, key: &str) -> Result<&'a mut Vec<Value>, GlbError> {
    json.as_object_mut()
        .ok_or_else(|| GlbError::InvalidDocument("root is not an object".into()))?
        .entry(key)
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| GlbError::InvalidDocument(format!("`{key}` is not an array")))
}

/// Bakes takes into `.glb` files in an output directory.
pub struct Exporter<S = GlbWriter> {
    serializer: S,
    map: ChannelMap,
    output_dir: PathBuf,
}

impl Exporter<GlbWriter> {
    pub fn new(map: ChannelMap, output_dir: impl Into<PathBuf>) -> Self {
        Self::with_serializer(GlbWriter, map, output_dir)
    }
}

impl<S: SceneSerializer> Exporter<S> {
    pub fn with_serializer(serializer: S, map: ChannelMap, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            serializer,
            map,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Serialize `take` on `scene` to export bytes without touching disk.
    pub fn export_bytes(
        &self,
        take: Option<&Take>,
        scene: Option<&AvatarScene>,
        head: Option<NodeIndex>,
    ) -> Result<Vec<u8>, ExportError> {
        let (take, scene, head) = match (take, scene, head) {
            (Some(t), Some(s), Some(h)) => (t, s, h),
            _ => return Err(CoreError::Validation("missing take/model/bone".into()).into()),
        };
        let clip = build_clip(take, scene, head, &self.map)?;
        let bytes = self.serializer.serialize(scene, &clip)?;
        tracing::info!(
            take = %take.id,
            name = %take.name,
            tracks = clip.tracks.len(),
            bytes = bytes.len(),
            "take serialized"
        );
        Ok(bytes)
    }

    /// Export to `<output_dir>/<take name>_FaceCap.glb` and return the path.
    ///
    /// Existing exports are never replaced: if the name is taken, the first
    /// free `<take name>_FaceCap (N).glb` is used. The file appears only
    /// once fully written; on any failure nothing is left behind under the
    /// final name.
    pub fn export(
        &self,
        take: Option<&Take>,
        scene: Option<&AvatarScene>,
        head: Option<NodeIndex>,
    ) -> Result<PathBuf, ExportError> {
        let bytes = self.export_bytes(take, scene, head)?;
        let name = take.map(|t| t.name.as_str()).unwrap_or_default();
        std::fs::create_dir_all(&self.output_dir).map_err(|source| ExportError::Io {
            path: self.output_dir.clone(),
            source,
        })?;

        let path = (1..=MAX_NAME_ATTEMPTS)
            .map(|n| self.output_dir.join(numbered_file_name(name, n)))
            .find(|p| !p.exists())
            .ok_or_else(|| ExportError::Io {
                path: self.output_dir.join(export_file_name(name)),
                source: std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "no free export file name",
                ),
            })?;
        let io_err = |source| ExportError::Io {
            path: path.clone(),
            source,
        };

        let partial = path.with_extension("glb.part");
        std::fs::write(&partial, &bytes).map_err(io_err)?;
        if let Err(e) = std::fs::rename(&partial, &path) {
            let _ = std::fs::remove_file(&partial);
            return Err(io_err(e));
        }
        tracing::info!(path = %path.display(), "export written");
        Ok(path)
    }
}

/// File name for an exported take, with path separators neutralised.
pub fn export_file_name(take_name: &str) -> String {
    numbered_file_name(take_name, 1)
}

fn numbered_file_name(take_name: &str, n: u32) -> String {
    let safe: String = take_name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if n <= 1 {
        format!("{safe}_FaceCap.glb")
    } else {
        format!("{safe}_FaceCap ({n}).glb")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::tests::avatar;
    use facecap_core::{ExpressionWeight, Sample};
    use glam::Quat;

    fn take() -> Take {
        let samples = [(0.0, 0.1), (0.5, 0.4), (1.0, 0.8)]
            .iter()
            .map(|&(t, jaw)| Sample {
                t,
                rotation: Quat::from_rotation_y(t),
                expressions: vec![
                    ExpressionWeight::new("jawOpen", jaw),
                    ExpressionWeight::new("mouthClose", 0.3),
                ],
            })
            .collect();
        Take::new("Take 1", samples).unwrap()
    }

    #[test]
    fn test_build_clip_tracks() {
        let scene = avatar();
        let map = ChannelMap::identity().with_overrides([("mouthClose", "Mouth_Close")]);
        let clip = build_clip(&take(), &scene, 2, &map).unwrap();

        assert_eq!(clip.name, "Take 1");
        assert_eq!(clip.duration, 1.0);
        // 1 rotation + 2 face morphs + 1 unnamed teeth morph
        assert_eq!(clip.tracks.len(), 4);

        let rot = clip.track("mixamorig:Head.quaternion").unwrap();
        assert_eq!(rot.times, vec![0.0, 0.5, 1.0]);
        assert_eq!(rot.value(1).unwrap(), &Quat::from_rotation_y(0.5).to_array()[..]);

        let jaw = clip.track("Face.morphTargetInfluences[jawOpen]").unwrap();
        assert_eq!(jaw.values, vec![0.1, 0.4, 0.8]);
        let close = clip.track("Face.morphTargetInfluences[Mouth_Close]").unwrap();
        assert_eq!(close.values, vec![0.3, 0.3, 0.3]);
        let teeth = clip.track("Mesh_4.morphTargetInfluences[0]").unwrap();
        assert_eq!(teeth.values, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_missing_inputs_rejected() {
        let exporter = Exporter::new(ChannelMap::identity(), "/tmp/unused");
        let scene = avatar();
        let t = take();
        for (take, scene, head) in [
            (None, Some(&scene), Some(2)),
            (Some(&t), None, Some(2)),
            (Some(&t), Some(&scene), None),
        ] {
            let err = exporter.export_bytes(take, scene, head).unwrap_err();
            assert!(matches!(err, ExportError::Core(CoreError::Validation(_))));
        }
    }

    #[test]
    fn test_model_without_morphs_rejected() {
        let mut json = crate::scene::tests::avatar_json();
        json["meshes"] = json!([{ "primitives": [] }, { "primitives": [] }]);
        let scene = AvatarScene::from_glb(Glb { json, bin: None }).unwrap();
        let err = build_clip(&take(), &scene, 2, &ChannelMap::identity()).unwrap_err();
        assert_eq!(err, CoreError::Validation("no expression channels on model".into()));
    }

    #[test]
    fn test_export_is_deterministic() {
        let exporter = Exporter::new(ChannelMap::identity(), "/tmp/unused");
        let scene = avatar();
        let t = take();
        let a = exporter.export_bytes(Some(&t), Some(&scene), Some(2)).unwrap();
        let b = exporter.export_bytes(Some(&t), Some(&scene), Some(2)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_serialized_animation_layout() {
        let scene = avatar();
        let clip = build_clip(&take(), &scene, 2, &ChannelMap::identity()).unwrap();
        let bytes = GlbWriter.serialize(&scene, &clip).unwrap();
        let glb = Glb::from_bytes(&bytes).unwrap();

        let anim = &glb.json["animations"][0];
        assert_eq!(anim["name"], "Take 1");
        // rotation + one weights channel per morph node
        assert_eq!(anim["channels"].as_array().unwrap().len(), 3);
        assert_eq!(anim["channels"][0]["target"]["path"], "rotation");
        assert_eq!(anim["channels"][1]["target"]["path"], "weights");
        // Shared time axis: both samplers point at the same input accessor.
        assert_eq!(anim["samplers"][0]["input"], anim["samplers"][1]["input"]);

        let weights_acc = anim["samplers"][1]["output"].as_u64().unwrap() as usize;
        assert_eq!(glb.json["accessors"][weights_acc]["count"], 6);
        assert_eq!(glb.json["nodes"][4]["name"], "Mesh_4");
        assert_eq!(
            glb.json["buffers"][0]["byteLength"].as_u64().unwrap() as usize,
            glb.bin.as_ref().unwrap().len()
        );
    }

    #[test]
    fn test_animated_matrix_node_becomes_trs() {
        let mut json = crate::scene::tests::avatar_json();
        json["nodes"][2]["matrix"] = json!([
            1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 2.0, 3.0, 1.0
        ]);
        let scene = AvatarScene::from_glb(Glb { json, bin: Some(vec![0; 4]) }).unwrap();
        let clip = build_clip(&take(), &scene, 2, &ChannelMap::identity()).unwrap();
        let glb = Glb::from_bytes(&GlbWriter.serialize(&scene, &clip).unwrap()).unwrap();

        let head = &glb.json["nodes"][2];
        assert!(head.get("matrix").is_none());
        assert_eq!(head["translation"], json!([1.0, 2.0, 3.0]));
        assert_eq!(head["rotation"], json!([0.0, 0.0, 0.0, 1.0]));
        assert_eq!(head["scale"], json!([1.0, 1.0, 1.0]));
        // Nodes that are not animated keep their matrix.
        assert!(scene.glb().json["nodes"][2].get("matrix").is_some());
    }

    #[test]
    fn test_empty_track_rejected() {
        let scene = avatar();
        let mut clip = build_clip(&take(), &scene, 2, &ChannelMap::identity()).unwrap();
        clip.tracks[0].times.clear();
        clip.tracks[0].values.clear();
        assert!(matches!(
            GlbWriter.serialize(&scene, &clip),
            Err(GlbError::Unsupported(_))
        ));
    }

    #[test]
    fn test_external_buffer_rejected() {
        let mut json = crate::scene::tests::avatar_json();
        json["buffers"][0]["uri"] = json!("avatar.bin");
        let scene = AvatarScene::from_glb(Glb { json, bin: None }).unwrap();
        let clip = build_clip(&take(), &scene, 2, &ChannelMap::identity()).unwrap();
        assert!(matches!(
            GlbWriter.serialize(&scene, &clip),
            Err(GlbError::Unsupported(_))
        ));
    }

    #[test]
    fn test_export_file_name() {
        assert_eq!(export_file_name("Take 3"), "Take 3_FaceCap.glb");
        assert_eq!(export_file_name("a/b:c"), "a_b_c_FaceCap.glb");
        assert_eq!(numbered_file_name("Take 3", 2), "Take 3_FaceCap (2).glb");
    }
}
