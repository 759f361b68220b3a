//! What render systems receive for one frame.

use ash::vk;
use orbit_scene::Camera;

/// Handles and timing of the frame being recorded.
///
/// The descriptor sets belong to slot `frame_index`, which `begin_frame`
/// has already waited on.
#[derive(Clone, Copy, Debug)]
pub struct FrameInfo<'a> {
    pub frame_index: usize,
    /// Seconds since the previous frame.
    pub frame_time: f32,
    pub command_buffer: vk::CommandBuffer,
    pub camera: &'a Camera,
    /// Set 0: scene constants, bound with `dynamic_offset`.
    pub global_set: vk::DescriptorSet,
    /// Set 1: this slot's object and point light storage buffers.
    pub object_set: vk::DescriptorSet,
    /// Set 2: albedo texture and shadow map.
    pub material_set: vk::DescriptorSet,
    pub dynamic_offset: u32,
}
