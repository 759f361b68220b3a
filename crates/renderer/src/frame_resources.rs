//! Per-frame GPU buffers and their descriptor sets.
//!
//! | set | binding | contents                          | written                 |
//! |-----|---------|-----------------------------------|-------------------------|
//! | 0   | 0       | `GlobalUbo`, dynamic uniform      | one aligned copy per slot |
//! | 1   | 0       | `ObjectData[]`, storage           | one buffer per slot     |
//! | 1   | 1       | `PointLightData[]`, storage       | one buffer per slot     |
//! | 2   | 0       | albedo texture                    | once                    |
//! | 2   | 1       | shadow map, compare sampler       | once                    |
//!
//! Slot `i` may only be written after `begin_frame` waited on its fence.

use std::mem::size_of;
use std::sync::Arc;

use ash::vk;
use orbit_rhi::MemoryLocation;
use orbit_rhi::buffer::Buffer;
use orbit_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorWriter, LayoutBindings};
use orbit_rhi::device::Device;
use orbit_rhi::sync::MAX_FRAMES_IN_FLIGHT;
use orbit_scene::Camera;
use tracing::debug;

use crate::error::{RenderError, RenderResult};
use crate::frame_info::FrameInfo;
use crate::gpu_data::{GlobalUbo, ObjectData, PointLightData};

/// Capacities of the per-slot storage buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameLimits {
    pub max_objects: u32,
    pub max_lights: u32,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_objects: 1000,
            max_lights: 10,
        }
    }
}

/// Set 0: scene constants.
pub fn global_bindings() -> LayoutBindings {
    let mut bindings = LayoutBindings::new();
    bindings.add_binding(
        0,
        vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        1,
    );
    bindings
}

/// Set 1: per-slot object and point light arrays.
pub fn frame_bindings() -> LayoutBindings {
    let mut bindings = LayoutBindings::new();
    bindings.add_binding(
        0,
        vk::DescriptorType::STORAGE_BUFFER,
        vk::ShaderStageFlags::VERTEX,
        1,
    );
    bindings.add_binding(
        1,
        vk::DescriptorType::STORAGE_BUFFER,
        vk::ShaderStageFlags::FRAGMENT,
        1,
    );
    bindings
}

/// Set 2: albedo and shadow map samplers.
pub fn material_bindings() -> LayoutBindings {
    let mut bindings = LayoutBindings::new();
    bindings.add_binding(
        0,
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        vk::ShaderStageFlags::FRAGMENT,
        1,
    );
    bindings.add_binding(
        1,
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        vk::ShaderStageFlags::FRAGMENT,
        1,
    );
    bindings
}

struct FrameSlot {
    objects: Buffer,
    lights: Buffer,
    set: vk::DescriptorSet,
}

/// Buffers and descriptor sets for all frame slots.
pub struct FrameResources {
    slots: Vec<FrameSlot>,
    global_ubo: Buffer,
    global_set: vk::DescriptorSet,
    material_set: vk::DescriptorSet,
    // Destroying the pool frees every set above.
    pool: DescriptorPool,
    global_layout: DescriptorSetLayout,
    frame_layout: DescriptorSetLayout,
    material_layout: DescriptorSetLayout,
    limits: FrameLimits,
}

impl FrameResources {
    /// Creates the buffers of every slot and writes all descriptor sets.
    ///
    /// `albedo` and `shadow_map` are combined image sampler infos for set 2.
    ///
    /// # Errors
    ///
    /// Returns an error if a buffer, layout, pool or set cannot be created.
    pub fn new(
        device: Arc<Device>,
        limits: FrameLimits,
        albedo: vk::DescriptorImageInfo,
        shadow_map: vk::DescriptorImageInfo,
    ) -> RenderResult<Self> {
        let global_layout = DescriptorSetLayout::new(Arc::clone(&device), global_bindings())?;
        let frame_layout = DescriptorSetLayout::new(Arc::clone(&device), frame_bindings())?;
        let material_layout = DescriptorSetLayout::new(Arc::clone(&device), material_bindings())?;

        let slot_count = MAX_FRAMES_IN_FLIGHT as u32;
        let pool = DescriptorPool::builder()
            .set_max_sets(slot_count + 2)
            .add_pool_size(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1)
            .add_pool_size(vk::DescriptorType::STORAGE_BUFFER, 2 * slot_count)
            .add_pool_size(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 2)
            .build(Arc::clone(&device))?;

        let global_ubo = Buffer::new(
            Arc::clone(&device),
            size_of::<GlobalUbo>() as vk::DeviceSize,
            slot_count,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
            device.min_uniform_buffer_offset_alignment(),
        )?;
        let global_set = DescriptorWriter::new(&global_layout, &pool)
            .write_buffer(
                0,
                global_ubo.descriptor_info(size_of::<GlobalUbo>() as vk::DeviceSize, 0),
            )
            .build()?;

        let slots = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| {
                let objects = storage_buffer(&device, size_of::<ObjectData>(), limits.max_objects)?;
                let lights = storage_buffer(&device, size_of::<PointLightData>(), limits.max_lights)?;
                let set = DescriptorWriter::new(&frame_layout, &pool)
                    .write_buffer(0, objects.descriptor_info(vk::WHOLE_SIZE, 0))
                    .write_buffer(1, lights.descriptor_info(vk::WHOLE_SIZE, 0))
                    .build()?;
                Ok::<_, RenderError>(FrameSlot {
                    objects,
                    lights,
                    set,
                })
            })
            .collect::<RenderResult<Vec<_>>>()?;

        let material_set = DescriptorWriter::new(&material_layout, &pool)
            .write_image(0, albedo)
            .write_image(1, shadow_map)
            .build()?;

        debug!(
            "Frame resources ready: {} slots, {} objects, {} lights",
            slots.len(),
            limits.max_objects,
            limits.max_lights
        );

        Ok(Self {
            slots,
            global_ubo,
            global_set,
            material_set,
            pool,
            global_layout,
            frame_layout,
            material_layout,
            limits,
        })
    }

    /// Set layouts in set order, for pipeline layouts.
    pub fn set_layouts(&self) -> [vk::DescriptorSetLayout; 3] {
        [
            self.global_layout.handle(),
            self.frame_layout.handle(),
            self.material_layout.handle(),
        ]
    }

    #[inline]
    pub fn limits(&self) -> FrameLimits {
        self.limits
    }

    /// Byte offset of slot `frame_index`'s `GlobalUbo` copy.
    pub fn dynamic_offset(&self, frame_index: usize) -> u32 {
        self.global_ubo.index_offset(frame_index as u32) as u32
    }

    /// # Errors
    ///
    /// Returns an error if the mapped write or flush fails.
    pub fn write_global(&mut self, frame_index: usize, ubo: &GlobalUbo) -> RenderResult<()> {
        let index = frame_index as u32;
        self.global_ubo.write_to_index(bytemuck::bytes_of(ubo), index)?;
        self.global_ubo.flush_index(index)?;
        Ok(())
    }

    /// Writes the object array of slot `frame_index`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::TooManyObjects`] if `records` exceeds the
    /// configured capacity, or the write/flush error.
    pub fn write_objects(&mut self, frame_index: usize, records: &[ObjectData]) -> RenderResult<()> {
        let capacity = self.limits.max_objects as usize;
        if records.len() > capacity {
            return Err(RenderError::TooManyObjects {
                count: records.len(),
                capacity,
            });
        }
        let buffer = &mut self.slots[frame_index].objects;
        buffer.write_to_buffer(bytemuck::cast_slice(records), 0)?;
        buffer.flush(vk::WHOLE_SIZE, 0)?;
        Ok(())
    }

    /// Writes the point light array of slot `frame_index`. `lights` is
    /// already capped by [`collect_lights`](crate::systems::point_light::collect_lights).
    ///
    /// # Errors
    ///
    /// Returns an error if the mapped write or flush fails, including a
    /// write past the buffer.
    pub fn write_lights(&mut self, frame_index: usize, lights: &[PointLightData]) -> RenderResult<()> {
        debug_assert!(
            lights.len() <= self.limits.max_lights as usize,
            "{} point lights exceed capacity {}",
            lights.len(),
            self.limits.max_lights
        );
        let buffer = &mut self.slots[frame_index].lights;
        buffer.write_to_buffer(bytemuck::cast_slice(lights), 0)?;
        buffer.flush(vk::WHOLE_SIZE, 0)?;
        Ok(())
    }

    /// Bundles slot `frame_index`'s sets for the render systems.
    pub fn frame_info<'a>(
        &self,
        frame_index: usize,
        frame_time: f32,
        command_buffer: vk::CommandBuffer,
        camera: &'a Camera,
    ) -> FrameInfo<'a> {
        FrameInfo {
            frame_index,
            frame_time,
            command_buffer,
            camera,
            global_set: self.global_set,
            object_set: self.slots[frame_index].set,
            material_set: self.material_set,
            dynamic_offset: self.dynamic_offset(frame_index),
        }
    }
}

fn storage_buffer(device: &Arc<Device>, element_size: usize, count: u32) -> RenderResult<Buffer> {
    Ok(Buffer::new(
        Arc::clone(device),
        element_size as vk::DeviceSize,
        count.max(1),
        vk::BufferUsageFlags::STORAGE_BUFFER,
        MemoryLocation::CpuToGpu,
        1,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_set_is_one_dynamic_uniform() {
        let bindings = global_bindings();
        assert_eq!(bindings.len(), 1);
        let binding = bindings.get(0).expect("binding 0");
        assert_eq!(binding.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC);
        assert!(binding.stage_flags.contains(vk::ShaderStageFlags::FRAGMENT));
    }

    #[test]
    fn test_frame_set_holds_objects_then_lights() {
        let bindings = frame_bindings();
        let objects = bindings.get(0).expect("objects");
        let lights = bindings.get(1).expect("lights");
        assert_eq!(objects.descriptor_type, vk::DescriptorType::STORAGE_BUFFER);
        assert_eq!(objects.stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(lights.descriptor_type, vk::DescriptorType::STORAGE_BUFFER);
        assert_eq!(lights.stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_material_set_samples_two_images() {
        let bindings = material_bindings();
        assert_eq!(bindings.len(), 2);
        assert!(
            bindings
                .to_vec()
                .iter()
                .all(|b| b.descriptor_type == vk::DescriptorType::COMBINED_IMAGE_SAMPLER
                    && b.descriptor_count == 1)
        );
    }

    #[test]
    fn test_default_limits() {
        let limits = FrameLimits::default();
        assert_eq!(limits.max_objects, 1000);
        assert_eq!(limits.max_lights, 10);
    }
}
