//! Scene description file.
//!
//! ```toml
//! texture = "textures/checker.png"
//! light_orbit_speed = 0.5
//!
//! [camera]
//! position = [0.0, -1.5, -4.0]
//!
//! [sun]
//! direction = [1.0, 3.0, 1.0]
//!
//! [meshes.cube]
//! kind = "cube"
//!
//! [[objects]]
//! mesh = "cube"
//! translation = [0.0, 0.0, 2.5]
//! scale = [2.0, 2.0, 2.0]
//!
//! [[point_lights]]
//! position = [1.0, -1.0, 2.5]
//! color = [1.0, 0.2, 0.2]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::Vec3;
use orbit_core::config::AssetsConfig;
use orbit_core::{Error, Result};
use orbit_resources::{Mesh, MeshBuilder};
use orbit_rhi::device::Device;
use orbit_scene::{DirectionalLight, Transform, World};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDescription {
    /// Albedo texture shared by every object; plain white when absent.
    pub texture: Option<PathBuf>,
    /// Point light orbit speed in radians per second.
    pub light_orbit_speed: f32,
    pub camera: CameraDesc,
    pub sun: SunDesc,
    pub meshes: BTreeMap<String, MeshSource>,
    pub objects: Vec<ObjectDesc>,
    pub point_lights: Vec<PointLightDesc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraDesc {
    pub position: Vec3,
    /// Pitch, yaw and roll in radians.
    pub rotation: Vec3,
    /// Vertical field of view in degrees.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraDesc {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, -1.5, -4.0),
            rotation: Vec3::new(-0.3, 0.0, 0.0),
            fov_y: 50.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SunDesc {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for SunDesc {
    fn default() -> Self {
        let light = DirectionalLight::default();
        Self {
            direction: light.direction,
            color: light.color,
            intensity: light.intensity,
        }
    }
}

impl SunDesc {
    pub fn light(&self) -> DirectionalLight {
        DirectionalLight::new(self.direction, self.color, self.intensity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MeshSource {
    Cube,
    Quad,
    /// OBJ or glTF file, relative to the resource root.
    File { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectDesc {
    /// Key into [`SceneDescription::meshes`].
    pub mesh: String,
    pub translation: Vec3,
    pub scale: Vec3,
    /// Pitch, yaw and roll in radians.
    pub rotation: Vec3,
    pub color: Vec3,
}

impl Default for ObjectDesc {
    fn default() -> Self {
        Self {
            mesh: String::new(),
            translation: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Vec3::ZERO,
            color: Vec3::ONE,
        }
    }
}

impl ObjectDesc {
    pub fn transform(&self) -> Transform {
        let mut transform = Transform::new()
            .with_translation(self.translation)
            .with_scale(self.scale);
        transform.set_euler(self.rotation);
        transform
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointLightDesc {
    pub position: Vec3,
    pub radius: f32,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for PointLightDesc {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            radius: 0.1,
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

impl Default for SceneDescription {
    /// A floor, two cubes and three orbiting lights.
    fn default() -> Self {
        let mut meshes = BTreeMap::new();
        meshes.insert("cube".to_string(), MeshSource::Cube);
        meshes.insert("quad".to_string(), MeshSource::Quad);

        let objects = vec![
            ObjectDesc {
                mesh: "quad".to_string(),
                translation: Vec3::new(0.0, 0.5, 0.0),
                scale: Vec3::new(6.0, 1.0, 6.0),
                ..Default::default()
            },
            ObjectDesc {
                mesh: "cube".to_string(),
                translation: Vec3::new(-0.8, 0.0, 0.5),
                scale: Vec3::splat(0.8),
                rotation: Vec3::new(0.0, 0.6, 0.0),
                color: Vec3::new(0.9, 0.6, 0.3),
            },
            ObjectDesc {
                mesh: "cube".to_string(),
                translation: Vec3::new(0.9, -0.25, -0.2),
                scale: Vec3::splat(1.2),
                ..Default::default()
            },
        ];

        let point_lights = [
            Vec3::new(1.0, 0.2, 0.2),
            Vec3::new(0.2, 1.0, 0.2),
            Vec3::new(0.2, 0.2, 1.0),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, color)| {
            let angle = i as f32 * std::f32::consts::TAU / 3.0;
            PointLightDesc {
                position: Vec3::new(2.0 * angle.cos(), -1.0, 2.0 * angle.sin()),
                color,
                intensity: 0.4,
                ..Default::default()
            }
        })
        .collect();

        Self {
            texture: None,
            light_orbit_speed: 0.5,
            camera: CameraDesc::default(),
            sun: SunDesc::default(),
            meshes,
            objects,
            point_lights,
        }
    }
}

impl SceneDescription {
    /// The scene configured in `assets`, or the built-in scene when no
    /// scene path is set.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn from_assets(assets: &AssetsConfig) -> Result<Self> {
        match &assets.scene {
            Some(path) => Self::load(assets.resolve(path)),
            None => {
                info!("No scene configured, using the built-in scene");
                Ok(Self::default())
            }
        }
    }

    /// Loads the scene at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resource`] if the file does not exist,
    /// [`Error::Io`] if it cannot be read and [`Error::Config`] if it is
    /// malformed or names an unknown mesh.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::Resource(format!(
                "Scene file not found: {}",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(path)?;
        let scene = Self::from_toml_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!(
            "Loaded scene {:?}: {} objects, {} point lights",
            path,
            scene.objects.len(),
            scene.point_lights.len()
        );
        Ok(scene)
    }

    /// # Errors
    ///
    /// Returns [`Error::Config`] on malformed input or an object whose mesh
    /// is not declared.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let scene: Self = toml::from_str(contents)?;
        scene.validate()?;
        Ok(scene)
    }

    fn validate(&self) -> Result<()> {
        match self.objects.iter().find(|o| !self.meshes.contains_key(&o.mesh)) {
            Some(object) => Err(Error::Config(format!("unknown mesh {:?}", object.mesh))),
            None => Ok(()),
        }
    }

    /// Uploads every declared mesh and spawns the objects and lights.
    ///
    /// # Errors
    ///
    /// Returns an error if a mesh file cannot be loaded or uploaded.
    pub fn build_world(&self, device: &Arc<Device>, assets: &AssetsConfig) -> anyhow::Result<World<Mesh>> {
        let mut meshes = BTreeMap::new();
        for (name, source) in &self.meshes {
            let builder = match source {
                MeshSource::Cube => MeshBuilder::cube(),
                MeshSource::Quad => MeshBuilder::quad(),
                MeshSource::File { path } => MeshBuilder::from_file(assets.resolve(path))?,
            };
            meshes.insert(name.as_str(), Arc::new(Mesh::from_builder(Arc::clone(device), &builder)?));
            debug!("Mesh {:?} ready", name);
        }

        let mut world = World::new();
        for desc in &self.objects {
            let Some(mesh) = meshes.get(desc.mesh.as_str()) else {
                continue;
            };
            world.spawn_mesh(Arc::clone(mesh), desc.transform()).color = desc.color;
        }
        for light in &self.point_lights {
            world.spawn_point_light(light.position, light.radius, light.color, light.intensity);
        }
        Ok(world)
    }
}

/// Bounding sphere of the drawables, for aiming the shadow camera.
///
/// Each object counts as a sphere around its translation that encloses a
/// unit cube scaled by the transform.
pub fn scene_bounds<M>(world: &World<M>) -> (Vec3, f32) {
    let objects: Vec<_> = world.drawables().map(|o| &o.transform).collect();
    if objects.is_empty() {
        return (Vec3::ZERO, 1.0);
    }

    let center = objects.iter().map(|t| t.translation).sum::<Vec3>() / objects.len() as f32;
    let radius = objects
        .iter()
        .map(|t| t.translation.distance(center) + 0.5 * t.scale.abs().length())
        .fold(1.0_f32, f32::max);
    (center, radius)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_parse_minimal_scene() {
        let scene = SceneDescription::from_toml_str(
            r#"
            light_orbit_speed = 1.0

            [meshes.model]
            kind = "file"
            path = "models/smooth_vase.obj"

            [[objects]]
            mesh = "model"
            translation = [0.0, 0.5, 2.5]
            scale = [3.0, 1.5, 3.0]

            [[point_lights]]
            position = [1.0, -1.0, 0.0]
            color = [1.0, 0.0, 0.0]
            "#,
        )
        .expect("valid scene");

        assert_eq!(scene.light_orbit_speed, 1.0);
        assert_eq!(
            scene.meshes.get("model"),
            Some(&MeshSource::File {
                path: PathBuf::from("models/smooth_vase.obj")
            })
        );
        assert_eq!(scene.objects[0].scale, Vec3::new(3.0, 1.5, 3.0));
        assert_eq!(scene.objects[0].color, Vec3::ONE);
        assert_eq!(scene.point_lights[0].radius, 0.1);
        assert_eq!(scene.camera, CameraDesc::default());
    }

    #[test]
    fn test_unknown_mesh_is_rejected() {
        let result = SceneDescription::from_toml_str(
            r#"
            [[objects]]
            mesh = "missing"
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_unset_scene_path_yields_builtin_scene() {
        let scene = SceneDescription::from_assets(&AssetsConfig::default()).expect("defaults");
        assert_eq!(scene, SceneDescription::default());
        assert!(scene.validate().is_ok());
        assert_eq!(scene.point_lights.len(), 3);
    }

    #[test]
    fn test_configured_missing_scene_is_error() {
        let assets = AssetsConfig {
            root: PathBuf::from("/nonexistent/orbit"),
            scene: Some(PathBuf::from("scene.toml")),
            ..Default::default()
        };
        let result = SceneDescription::from_assets(&assets);
        assert!(matches!(result, Err(Error::Resource(_))));
    }

    #[test]
    fn test_object_transform_uses_description() {
        let desc = ObjectDesc {
            translation: Vec3::new(0.0, 0.0, 2.5),
            scale: Vec3::splat(2.0),
            ..Default::default()
        };
        let transform = desc.transform();
        assert_abs_diff_eq!(
            transform.mat4(),
            glam::Mat4::from_translation(Vec3::new(0.0, 0.0, 2.5)) * glam::Mat4::from_scale(Vec3::splat(2.0)),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_scene_bounds_cover_objects() {
        let mut world: World<()> = World::new();
        world.spawn_mesh(Arc::new(()), Transform::new().with_translation(Vec3::new(-2.0, 0.0, 0.0)));
        world.spawn_mesh(Arc::new(()), Transform::new().with_translation(Vec3::new(2.0, 0.0, 0.0)));
        world.spawn_point_light(Vec3::new(50.0, 0.0, 0.0), 0.1, Vec3::ONE, 1.0);

        let (center, radius) = scene_bounds(&world);
        assert_abs_diff_eq!(center, Vec3::ZERO, epsilon = 1e-6);
        assert!(radius >= 2.0 + 0.5 * 3.0_f32.sqrt() - 1e-5);
        assert!(radius < 10.0);
    }

    #[test]
    fn test_empty_world_has_unit_bounds() {
        let world: World<()> = World::new();
        assert_eq!(scene_bounds(&world), (Vec3::ZERO, 1.0));
    }
}
