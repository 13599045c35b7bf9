use facecap_core::{AxisTransform, ChannelMap};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// CLI configuration: defaults, then the TOML file, then `FACECAP_*`
/// environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory exported `.glb` files are written to.
    pub output_dir: PathBuf,
    /// Playback tick rate.
    pub playback_fps: u32,
    /// Head bone name; auto-detected from the rig when unset.
    pub head_bone: Option<String>,
    /// Loop detection files until the capture duration runs out.
    pub loop_video: bool,
    /// Per-axis sign applied to the tracker's head rotation.
    pub axis: AxisTransform,
    /// Tracker channel → morph name entries layered over the CC rig table.
    pub channels: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            playback_fps: 30,
            head_bone: None,
            loop_video: false,
            axis: AxisTransform::default(),
            channels: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location if that file exists,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = default_config_path();
                if default.is_file() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "config file loaded");
        Ok(config)
    }

    /// Apply `FACECAP_*` overrides read through `lookup`. Unparseable
    /// values leave the current setting in place.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("FACECAP_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(bone) = lookup("FACECAP_HEAD_BONE") {
            self.head_bone = Some(bone).filter(|b| !b.is_empty());
        }
        self.playback_fps = env_parsed(&lookup, "FACECAP_PLAYBACK_FPS", self.playback_fps);
        self.loop_video = env_bool(&lookup, "FACECAP_LOOP_VIDEO", self.loop_video);
        self.axis.x = env_parsed(&lookup, "FACECAP_AXIS_X", self.axis.x);
        self.axis.y = env_parsed(&lookup, "FACECAP_AXIS_Y", self.axis.y);
        self.axis.z = env_parsed(&lookup, "FACECAP_AXIS_Z", self.axis.z);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=240).contains(&self.playback_fps) {
            return Err(ConfigError::Invalid(format!(
                "playback_fps must be within 1..=240, got {}",
                self.playback_fps
            )));
        }
        for (axis, sign) in [("x", self.axis.x), ("y", self.axis.y), ("z", self.axis.z)] {
            if sign != 1.0 && sign != -1.0 {
                return Err(ConfigError::Invalid(format!(
                    "axis.{axis} must be 1 or -1, got {sign}"
                )));
            }
        }
        Ok(())
    }

    pub fn channel_map(&self) -> ChannelMap {
        ChannelMap::cc_rig().with_overrides(self.channels.clone())
    }
}

/// `$XDG_CONFIG_HOME/facecap/config.toml`.
pub fn default_config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home().join(".config"))
        .join("facecap/config.toml")
}

/// `$XDG_DATA_HOME/facecap/exports`.
pub fn default_output_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home().join(".local/share"))
        .join("facecap/exports")
}

fn home() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

fn env_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    current: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(current)
}

fn env_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, current: bool) -> bool {
    match lookup(key).as_deref().map(str::trim) {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.playback_fps, 30);
        assert!(!config.loop_video);
        assert_eq!(config.axis, AxisTransform::default());
        assert!(config.output_dir.ends_with("facecap/exports"));
        config.validate().unwrap();
    }

    #[test]
    fn test_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
output_dir = "/srv/takes"
playback_fps = 60
head_bone = "CC_Base_Head"

[axis]
x = 1.0
y = 1.0
z = -1.0

[channels]
jawOpen = "MouthOpen"
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/srv/takes"));
        assert_eq!(config.playback_fps, 60);
        assert_eq!(config.head_bone.as_deref(), Some("CC_Base_Head"));
        assert_eq!(config.axis.y, 1.0);
        // Unset keys keep their defaults.
        assert!(!config.loop_video);

        let map = config.channel_map();
        assert_eq!(map.morph_for("jawOpen"), "MouthOpen");
        assert_eq!(map.morph_for("eyeBlinkLeft"), "Eye_Blink_L");
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "playback_rate = 30\n").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file(Path::new("/nonexistent/facecap.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[
            ("FACECAP_OUTPUT_DIR", "/tmp/out"),
            ("FACECAP_PLAYBACK_FPS", "24"),
            ("FACECAP_LOOP_VIDEO", "true"),
            ("FACECAP_HEAD_BONE", "head"),
            ("FACECAP_AXIS_Z", "1"),
        ]));
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.playback_fps, 24);
        assert!(config.loop_video);
        assert_eq!(config.head_bone.as_deref(), Some("head"));
        assert_eq!(config.axis.z, 1.0);
    }

    #[test]
    fn test_bad_env_value_keeps_setting() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[
            ("FACECAP_PLAYBACK_FPS", "fast"),
            ("FACECAP_LOOP_VIDEO", "maybe"),
        ]));
        assert_eq!(config.playback_fps, 30);
        assert!(!config.loop_video);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config {
            playback_fps: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        config.playback_fps = 30;
        config.axis.y = 0.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
