//! Avatar scene graph view over a glTF document.
//!
//! Only what capture and export need is modelled: node names,
//! which nodes are skin joints (bones), and which nodes carry
//! a mesh with morph targets. Everything else in the document is kept
//! verbatim so re-export preserves the whole avatar.

use crate::glb::{Glb, GlbError};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

pub type NodeIndex = usize;

#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub index: NodeIndex,
    pub name: Option<String>,
    pub mesh: Option<usize>,
    /// Referenced as a joint by at least one skin.
    pub is_bone: bool,
}

/// A node whose mesh exposes named morph targets.
#[derive(Debug, Clone, PartialEq)]
pub struct MorphMesh {
    pub node: NodeIndex,
    /// Node name, or `Mesh_<node>` when the node is unnamed.
    pub name: String,
    pub mesh: usize,
    /// Morph target names in target index order.
    pub targets: Vec<String>,
}

impl MorphMesh {
    pub fn target_index(&self, morph: &str) -> Option<usize> {
        self.targets.iter().position(|t| t == morph)
    }
}

#[derive(Deserialize)]
struct RawNode {
    name: Option<String>,
    mesh: Option<usize>,
    #[serde(default)]
    children: Vec<usize>,
}

#[derive(Deserialize)]
struct RawMesh {
    #[serde(default)]
    primitives: Vec<RawPrimitive>,
    extras: Option<RawMeshExtras>,
}

#[derive(Deserialize)]
struct RawPrimitive {
    #[serde(default)]
    targets: Vec<Value>,
}

#[derive(Deserialize)]
struct RawMeshExtras {
    #[serde(rename = "targetNames")]
    target_names: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct RawSkin {
    #[serde(default)]
    joints: Vec<usize>,
}

/// Loaded avatar: the source document plus an index of its nodes.
#[derive(Debug, Clone)]
pub struct AvatarScene {
    glb: Glb,
    nodes: Vec<SceneNode>,
    morph_meshes: Vec<MorphMesh>,
}

impl AvatarScene {
    pub fn load(path: &Path) -> Result<Self, GlbError> {
        let bytes = std::fs::read(path)?;
        let scene = Self::from_bytes(&bytes)?;
        tracing::info!(
            path = %path.display(),
            nodes = scene.nodes.len(),
            bones = scene.bones().len(),
            morph_meshes = scene.morph_meshes.len(),
            "avatar loaded"
        );
        Ok(scene)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GlbError> {
        Self::from_glb(Glb::from_bytes(bytes)?)
    }

    pub fn from_glb(glb: Glb) -> Result<Self, GlbError> {
        let raw_nodes: Vec<RawNode> = array_of(&glb.json, "nodes")?;
        let raw_meshes: Vec<RawMesh> = array_of(&glb.json, "meshes")?;
        let raw_skins: Vec<RawSkin> = array_of(&glb.json, "skins")?;

        let node_count = raw_nodes.len();
        let mut is_joint = vec![false; node_count];
        for skin in &raw_skins {
            for &joint in &skin.joints {
                *is_joint
                    .get_mut(joint)
                    .ok_or_else(|| invalid(format!("skin joint {joint} out of range")))? = true;
            }
        }

        let mut nodes = Vec::with_capacity(node_count);
        let mut morph_meshes = Vec::new();
        for (index, raw) in raw_nodes.into_iter().enumerate() {
            if let Some(&child) = raw.children.iter().find(|&&c| c >= node_count) {
                return Err(invalid(format!("node {index} has child {child} out of range")));
            }
            if let Some(mesh_idx) = raw.mesh {
                let mesh = raw_meshes
                    .get(mesh_idx)
                    .ok_or_else(|| invalid(format!("node {index} references mesh {mesh_idx}")))?;
                let targets = morph_target_names(mesh);
                if !targets.is_empty() {
                    morph_meshes.push(MorphMesh {
                        node: index,
                        name: raw
                            .name
                            .clone()
                            .filter(|n| !n.is_empty())
                            .unwrap_or_else(|| format!("Mesh_{index}")),
                        mesh: mesh_idx,
                        targets,
                    });
                }
            }
            nodes.push(SceneNode {
                index,
                name: raw.name,
                mesh: raw.mesh,
                is_bone: is_joint[index],
            });
        }

        Ok(Self {
            glb,
            nodes,
            morph_meshes,
        })
    }

    pub fn glb(&self) -> &Glb {
        &self.glb
    }

    pub fn nodes(&self) -> &[SceneNode] {
        &self.nodes
    }

    pub fn node_name(&self, index: NodeIndex) -> Option<&str> {
        self.nodes.get(index)?.name.as_deref()
    }

    /// Names of all skin joints, in node order.
    pub fn bones(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.is_bone)
            .filter_map(|n| n.name.as_deref())
            .collect()
    }

    /// First node with exactly this name.
    pub fn find_node(&self, name: &str) -> Option<NodeIndex> {
        self.nodes
            .iter()
            .find(|n| n.name.as_deref() == Some(name))
            .map(|n| n.index)
    }

    pub fn morph_meshes(&self) -> &[MorphMesh] {
        &self.morph_meshes
    }
}

/// Morph target names of a mesh, one per target the primitives declare.
/// Targets without names in `extras.targetNames` are named by their index;
/// surplus names with no target behind them are dropped.
fn morph_target_names(mesh: &RawMesh) -> Vec<String> {
    let count = mesh
        .primitives
        .iter()
        .map(|p| p.targets.len())
        .max()
        .unwrap_or(0);
    let named = mesh
        .extras
        .as_ref()
        .and_then(|e| e.target_names.clone())
        .unwrap_or_default();
    (0..count)
        .map(|i| named.get(i).cloned().unwrap_or_else(|| i.to_string()))
        .collect()
}

fn array_of<T: for<'de> Deserialize<'de>>(json: &Value, key: &str) -> Result<Vec<T>, GlbError> {
    match json.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| invalid(format!("`{key}`: {e}"))),
    }
}

fn invalid(msg: String) -> GlbError {
    GlbError::InvalidDocument(msg)
}
