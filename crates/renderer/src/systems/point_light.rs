//! Point lights: orbit animation, GPU upload and billboards.

use std::mem::size_of;
use std::sync::Arc;

use ash::vk;
use glam::{Quat, Vec3};
use orbit_rhi::command::CommandRecorder;
use orbit_rhi::device::Device;
use orbit_rhi::pipeline::{Pipeline, PipelineConfig, PipelineLayout};
use orbit_scene::{GameObject, World, WORLD_UP};
use tracing::info;

use super::ShaderPaths;
use crate::error::RenderResult;
use crate::frame_info::FrameInfo;
use crate::gpu_data::{GlobalUbo, PointLightData, PointLightPushConstants};

const PUSH_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
);

/// Rotates every point light by `angle` radians about the world up axis
/// through the origin.
pub fn orbit_lights<M>(world: &mut World<M>, angle: f32) {
    let rotation = Quat::from_axis_angle(WORLD_UP, angle);
    for object in world.iter_mut().filter(|o| o.point_light.is_some()) {
        object.transform.translation = rotation * object.transform.translation;
    }
}

/// GPU records of the first `max` point lights in id order.
pub fn collect_lights<M>(world: &World<M>, max: usize) -> Vec<PointLightData> {
    world
        .point_lights()
        .take(max)
        .map(|(object, light)| PointLightData::new(object.transform.translation, light))
        .collect()
}

/// Point light objects ordered farthest from `eye` first.
pub fn back_to_front<M>(world: &World<M>, eye: Vec3) -> Vec<&GameObject<M>> {
    let mut lights: Vec<_> = world
        .point_lights()
        .map(|(object, _)| (object.transform.translation.distance_squared(eye), object))
        .collect();
    lights.sort_by(|a, b| b.0.total_cmp(&a.0));
    lights.into_iter().map(|(_, object)| object).collect()
}

/// Animates point lights and draws them as alpha-blended billboards.
pub struct PointLightSystem {
    pipeline: Pipeline,
    layout: PipelineLayout,
    device: Arc<Device>,
    /// Radians per second.
    orbit_speed: f32,
    max_lights: usize,
}

impl PointLightSystem {
    /// Builds the billboard pipeline. Only the global set is bound.
    ///
    /// # Errors
    ///
    /// Returns an error if the layout or pipeline cannot be created.
    pub fn new(
        device: Arc<Device>,
        render_pass: vk::RenderPass,
        global_set_layout: vk::DescriptorSetLayout,
        shaders: &ShaderPaths,
        orbit_speed: f32,
        max_lights: usize,
    ) -> RenderResult<Self> {
        let push_range = vk::PushConstantRange::default()
            .stage_flags(PUSH_STAGES)
            .offset(0)
            .size(size_of::<PointLightPushConstants>() as u32);
        let layout = PipelineLayout::new(Arc::clone(&device), &[global_set_layout], &[push_range])?;

        let config = PipelineConfig {
            render_pass,
            pipeline_layout: layout.handle(),
            ..PipelineConfig::default()
                .without_vertex_input()
                .with_alpha_blending()
        };
        let pipeline = Pipeline::new(Arc::clone(&device), &shaders.vertex, &shaders.fragment, &config)?;
        info!("Point light system ready");

        Ok(Self {
            pipeline,
            layout,
            device,
            orbit_speed,
            max_lights,
        })
    }

    /// Advances the orbit by one frame, records the light count in `ubo`
    /// and returns the records for the frame's light buffer.
    pub fn update<M>(
        &self,
        frame_time: f32,
        world: &mut World<M>,
        ubo: &mut GlobalUbo,
    ) -> Vec<PointLightData> {
        orbit_lights(world, self.orbit_speed * frame_time);
        let lights = collect_lights(world, self.max_lights);
        ubo.num_point_lights = lights.len() as u32;
        lights
    }

    /// Draws one billboard per light, farthest first so blending composes.
    pub fn render<M>(&self, frame: &FrameInfo<'_>, world: &World<M>) {
        let recorder = CommandRecorder::new(&self.device, frame.command_buffer);
        let layout = self.layout.handle();

        self.pipeline.bind(frame.command_buffer);
        recorder.bind_descriptor_sets(layout, 0, &[frame.global_set], &[frame.dynamic_offset]);

        for object in back_to_front(world, frame.camera.position()) {
            let Some(light) = object.point_light else {
                continue;
            };
            let push = PointLightPushConstants {
                position: object.transform.translation.extend(1.0),
                color: object.color.extend(light.intensity),
                radius: object.transform.scale.x,
                _padding: [0.0; 3],
            };
            recorder.push_constants(layout, PUSH_STAGES, &push);
            recorder.draw(6, 1, 0, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_resources::FrameLimits;
    use approx::assert_abs_diff_eq;
    use std::f32::consts::FRAC_PI_2;

    fn world_with_lights(positions: &[Vec3]) -> World<()> {
        let mut world = World::new();
        for &position in positions {
            world.spawn_point_light(position, 0.1, Vec3::ONE, 1.0);
        }
        world
    }

    #[test]
    fn test_orbit_keeps_height_and_radius() {
        let mut world = world_with_lights(&[Vec3::new(2.0, -1.0, 0.0)]);
        orbit_lights(&mut world, FRAC_PI_2);
        let position = world.iter().next().map(|o| o.transform.translation);
        let position = position.expect("light");
        assert_abs_diff_eq!(position.y, -1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(position.x.hypot(position.z), 2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(position.x, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_orbit_ignores_plain_objects() {
        let mut world = world_with_lights(&[Vec3::X]);
        let id = world.spawn().id();
        world.get_mut(id).expect("object").transform.translation = Vec3::new(3.0, 0.0, 0.0);
        orbit_lights(&mut world, 1.0);
        assert_eq!(world.get(id).expect("object").transform.translation, Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn test_collect_caps_at_max() {
        let world = world_with_lights(&[Vec3::X, Vec3::Y, Vec3::Z]);
        let lights = collect_lights(&world, 2);
        assert_eq!(lights.len(), 2);
        assert_eq!(lights[0].position, Vec3::X.extend(1.0));
        assert_eq!(lights[0].color.w, 1.0);
    }

    #[test]
    fn test_collect_fits_light_buffer() {
        let positions: Vec<Vec3> = (0..12).map(|i| Vec3::X * i as f32).collect();
        let world = world_with_lights(&positions);
        let capacity = FrameLimits::default().max_lights as usize;
        assert_eq!(collect_lights(&world, capacity).len(), capacity);
    }

    #[test]
    fn test_back_to_front_orders_by_distance() {
        let world = world_with_lights(&[Vec3::Z, Vec3::Z * 5.0, Vec3::Z * 3.0]);
        let order: Vec<f32> = back_to_front(&world, Vec3::ZERO)
            .iter()
            .map(|o| o.transform.translation.z)
            .collect();
        assert_eq!(order, vec![5.0, 3.0, 1.0]);
    }
}
