//! Engine configuration loaded from a TOML file.
//!
//! Every section and field has a default, so a partial file only overrides
//! what it names and a missing file yields [`EngineConfig::default`].
//!
//! ```toml
//! [window]
//! title = "Orbit"
//! width = 1280
//! height = 720
//!
//! [renderer]
//! validation = true
//! shadow_map_size = 2048
//!
//! [controller]
//! move_speed = 3.0
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub window: WindowConfig,
    pub renderer: RendererConfig,
    pub controller: ControllerConfig,
    pub assets: AssetsConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Loads the configuration at `path`.
    ///
    /// A missing file is not an error and yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file exists but cannot be read, and
    /// [`Error::Config`] if it is not valid TOML or has a field of the wrong
    /// type.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on malformed input.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Orbit".to_string(),
            width: 800,
            height: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Enables the Khronos validation layer when it is installed.
    pub validation: bool,
    /// Bound on fence waits and image acquisition. Unbounded when absent.
    pub acquire_timeout_ms: Option<u64>,
    /// Edge length of the square shadow map.
    pub shadow_map_size: u32,
    /// Scenes with at most this many drawable objects use push constants
    /// for per-object data; larger scenes use a storage buffer.
    pub object_strategy_threshold: usize,
    /// Capacity of the per-frame object storage buffer.
    pub max_objects: usize,
    /// Capacity of the per-frame point light array.
    pub max_lights: usize,
    pub clear_color: [f32; 4],
}

impl RendererConfig {
    /// The acquire timeout in nanoseconds, as Vulkan expects it.
    pub fn acquire_timeout_ns(&self) -> u64 {
        self.acquire_timeout_ms
            .map_or(u64::MAX, |ms| ms.saturating_mul(1_000_000))
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            acquire_timeout_ms: None,
            shadow_map_size: 2048,
            object_strategy_threshold: 64,
            max_objects: 1000,
            max_lights: 10,
            clear_color: [0.01, 0.01, 0.01, 1.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// World units per second.
    pub move_speed: f32,
    /// Radians per second.
    pub look_speed: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            move_speed: 3.0,
            look_speed: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Directory that relative asset paths resolve against.
    pub root: PathBuf,
    /// Scene description, relative to `root`. The built-in scene is used
    /// when unset.
    pub scene: Option<PathBuf>,
    /// Compiled SPIR-V shaders, relative to `root`.
    pub shader_dir: PathBuf,
}

impl AssetsConfig {
    /// Resolves `path` against the resource root. Absolute paths are
    /// returned unchanged.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }

    /// Path of the compiled shader `name`, e.g. `"simple.vert"`.
    pub fn shader(&self, name: &str) -> PathBuf {
        self.resolve(self.shader_dir.join(format!("{}.spv", name)))
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            scene: None,
            shader_dir: PathBuf::from("shaders"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,orbit=debug".to_string(),
            thread_ids: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.controller.move_speed, 3.0);
        assert_eq!(config.renderer.max_lights, 10);
    }

    #[test]
    fn test_partial_section_overrides_only_named_fields() {
        let config = EngineConfig::from_toml_str(
            r#"
            [window]
            width = 1280

            [controller]
            look_speed = 2.0
            "#,
        )
        .unwrap();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.window.title, "Orbit");
        assert_eq!(config.controller.look_speed, 2.0);
        assert_eq!(config.controller.move_speed, 3.0);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let result = EngineConfig::from_toml_str("[window]\nwidth = \"wide\"");
        assert!(matches!(result, Err(Error::Config(_))));

        let result = EngineConfig::from_toml_str("[window");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = EngineConfig::load("does/not/exist/orbit.toml").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_acquire_timeout() {
        let mut renderer = RendererConfig::default();
        assert_eq!(renderer.acquire_timeout_ns(), u64::MAX);
        renderer.acquire_timeout_ms = Some(500);
        assert_eq!(renderer.acquire_timeout_ns(), 500_000_000);
    }

    #[test]
    fn test_scene_path_is_optional() {
        assert_eq!(EngineConfig::default().assets.scene, None);

        let config = EngineConfig::from_toml_str(
            r#"
            [assets]
            scene = "assets/scene.toml"
            "#,
        )
        .unwrap();
        assert_eq!(config.assets.scene, Some(PathBuf::from("assets/scene.toml")));
    }

    #[test]
    fn test_asset_paths_resolve_against_root() {
        let assets = AssetsConfig {
            root: PathBuf::from("/opt/orbit"),
            ..Default::default()
        };
        assert_eq!(
            assets.resolve("models/cube.obj"),
            PathBuf::from("/opt/orbit/models/cube.obj")
        );
        assert_eq!(
            assets.shader("simple.vert"),
            PathBuf::from("/opt/orbit/shaders/simple.vert.spv")
        );
    }
}
