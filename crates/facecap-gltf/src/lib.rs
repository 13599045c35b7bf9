//! facecap-gltf — glTF adapter for the capture engine.
//!
//! Reads binary glTF avatars, exposes their bones and morph-capable
//! meshes, drives them as a pose sink, and bakes takes into animation
//! clips embedded in a re-exported `.glb`.

pub mod avatar;
pub mod clip;
pub mod exporter;
pub mod glb;
pub mod scene;

pub use avatar::AvatarRig;
pub use clip::{AnimationClip, KeyframeTrack, TrackTarget};
pub use exporter::{build_clip, export_file_name, ExportError, Exporter, GlbWriter, SceneSerializer};
pub use glb::{Glb, GlbError};
pub use scene::{AvatarScene, MorphMesh, NodeIndex, SceneNode};
