//! Records uploaded to the GPU.
//!
//! Layouts match the GLSL declarations in `shaders/`: uniform blocks use
//! std140 and storage buffers std430, so every field here is a `Mat4`,
//! `Vec4` or a scalar padded to 16 bytes. A GLSL `mat3` is three `Vec4`
//! columns.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use orbit_scene::{Camera, DirectionalLight, GameObject, PointLight, Transform};

/// Per-frame scene constants, set 0 binding 0 (dynamic uniform buffer).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GlobalUbo {
    pub projection: Mat4,
    pub view: Mat4,
    pub inverse_view: Mat4,
    /// View-projection of the shadow-casting light.
    pub light_view_projection: Mat4,
    /// xyz color, w intensity.
    pub ambient_light_color: Vec4,
    /// xyz direction the light travels, w unused.
    pub light_direction: Vec4,
    /// xyz color, w intensity.
    pub light_color: Vec4,
    pub num_point_lights: u32,
    pub _padding: [u32; 3],
}

impl Default for GlobalUbo {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            inverse_view: Mat4::IDENTITY,
            light_view_projection: Mat4::IDENTITY,
            ambient_light_color: Vec4::new(1.0, 1.0, 1.0, 0.02),
            light_direction: Vec4::new(0.0, 1.0, 0.0, 0.0),
            light_color: Vec4::ONE,
            num_point_lights: 0,
            _padding: [0; 3],
        }
    }
}

impl GlobalUbo {
    /// Frame constants for `camera`, lit by `sun` seen through
    /// `light_view_projection`.
    pub fn new(camera: &Camera, sun: &DirectionalLight, light_view_projection: Mat4) -> Self {
        Self {
            projection: camera.projection(),
            view: camera.view(),
            inverse_view: camera.inverse_view(),
            light_view_projection,
            light_direction: sun.direction.extend(0.0),
            light_color: sun.color.extend(sun.intensity),
            ..Self::default()
        }
    }
}

/// Per-object matrices and tint. Used both as a push constant block and as
/// one element of the per-frame object storage buffer, so it stays within
/// the 128 bytes every device guarantees for push constants.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ObjectData {
    pub model: Mat4,
    /// Columns of the `mat3` normal matrix, w unused.
    pub normal_matrix: [Vec4; 3],
    /// xyz tint multiplied into the surface color, w unused.
    pub color: Vec4,
}

impl ObjectData {
    pub fn new(transform: &Transform, color: Vec3) -> Self {
        let normal = transform.normal_matrix();
        Self {
            model: transform.mat4(),
            normal_matrix: [
                normal.x_axis.extend(0.0),
                normal.y_axis.extend(0.0),
                normal.z_axis.extend(0.0),
            ],
            color: color.extend(1.0),
        }
    }

    pub fn from_object<M>(object: &GameObject<M>) -> Self {
        Self::new(&object.transform, object.color)
    }
}

/// Object records for every drawable in `objects`, in draw order.
pub fn object_records<'a, M: 'a>(
    objects: impl IntoIterator<Item = &'a GameObject<M>>,
) -> Vec<ObjectData> {
    objects.into_iter().map(ObjectData::from_object).collect()
}

/// One element of the per-frame point light storage buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PointLightData {
    /// xyz position, w unused.
    pub position: Vec4,
    /// xyz color, w intensity.
    pub color: Vec4,
}

impl PointLightData {
    pub fn new(position: Vec3, light: &PointLight) -> Self {
        Self {
            position: position.extend(1.0),
            color: light.color.extend(light.intensity),
        }
    }
}

/// Push constants of the point light billboard pipeline.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PointLightPushConstants {
    pub position: Vec4,
    pub color: Vec4,
    pub radius: f32,
    pub _padding: [f32; 3],
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use orbit_scene::World;
    use std::mem::size_of;
    use std::sync::Arc;

    #[test]
    fn test_record_sizes_match_shader_layouts() {
        assert_eq!(size_of::<GlobalUbo>(), 4 * 64 + 3 * 16 + 16);
        assert_eq!(size_of::<ObjectData>(), 128);
        assert_eq!(size_of::<PointLightData>(), 32);
        assert_eq!(size_of::<PointLightPushConstants>(), 48);
    }

    #[test]
    fn test_object_record_carries_model_matrix() {
        let transform = Transform::new()
            .with_translation(Vec3::new(0.0, 0.0, 2.5))
            .with_scale(Vec3::splat(2.0));
        let data = ObjectData::new(&transform, Vec3::ONE);

        let expected = Mat4::from_translation(Vec3::new(0.0, 0.0, 2.5)) * Mat4::from_scale(Vec3::splat(2.0));
        assert_abs_diff_eq!(data.model, expected, epsilon = 1e-6);
        assert_abs_diff_eq!(data.normal_matrix[0], Vec4::new(0.5, 0.0, 0.0, 0.0), epsilon = 1e-6);
        assert_abs_diff_eq!(data.normal_matrix[2], Vec4::new(0.0, 0.0, 0.5, 0.0), epsilon = 1e-6);

        let bytes = bytemuck::bytes_of(&data);
        let floats: &[f32] = bytemuck::cast_slice(&bytes[..64]);
        assert_eq!(&floats[12..15], &[0.0, 0.0, 2.5]);
    }

    #[test]
    fn test_object_record_carries_tint() {
        let mut world: World<()> = World::new();
        world.spawn_mesh(Arc::new(()), Transform::new().with_translation(Vec3::X)).color =
            Vec3::new(0.9, 0.6, 0.3);
        world.spawn_mesh(Arc::new(()), Transform::new());

        let records = object_records(world.drawables());
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].color, Vec4::ONE);
        assert_eq!(records[0].color, Vec4::new(0.9, 0.6, 0.3, 1.0));

        // Tint sits right after the model and normal matrices.
        let bytes = bytemuck::bytes_of(&records[0]);
        let tint: &[f32] = bytemuck::cast_slice(&bytes[112..128]);
        assert_eq!(tint, &[0.9, 0.6, 0.3, 1.0]);
    }

    #[test]
    fn test_point_light_packs_intensity_in_w() {
        let light = PointLight {
            color: Vec3::new(1.0, 0.5, 0.25),
            intensity: 3.0,
        };
        let data = PointLightData::new(Vec3::new(1.0, -2.0, 3.0), &light);
        assert_eq!(data.color, Vec4::new(1.0, 0.5, 0.25, 3.0));
        assert_eq!(data.position.truncate(), Vec3::new(1.0, -2.0, 3.0));
    }
}
