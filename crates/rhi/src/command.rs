//! Command pools and command buffer recording.
//!
//! - [`CommandPool`] owns a `VkCommandPool` and allocates primary buffers
//! - [`CommandRecorder`] borrows the device and records into a raw
//!   `vk::CommandBuffer`, so the frame loop can hand out plain handles while
//!   render systems still record through a safe-looking API
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use orbit_rhi::command::{CommandPool, CommandRecorder};
//! use orbit_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>) -> Result<(), orbit_rhi::RhiError> {
//! let family = device.queue_families().graphics_family.unwrap_or(0);
//! let pool = CommandPool::new(device.clone(), family)?;
//! let buffers = pool.allocate_command_buffers(2)?;
//!
//! let recorder = CommandRecorder::new(&device, buffers[0]);
//! recorder.begin()?;
//! // ... record ...
//! recorder.end()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::RhiResult;

/// Vulkan command pool wrapper.
///
/// Not thread-safe; one pool per recording thread.
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
    queue_family_index: u32,
}

impl CommandPool {
    /// Creates a pool whose buffers can be reset individually.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkCreateCommandPool` fails.
    pub fn new(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };
        info!(
            "Command pool created for queue family {}",
            queue_family_index
        );

        Ok(Self {
            device,
            pool,
            queue_family_index,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Allocates `count` primary command buffers.
    ///
    /// The buffers are freed with the pool.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn allocate_command_buffers(&self, count: u32) -> RhiResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let buffers = unsafe { self.device.handle().allocate_command_buffers(&alloc_info)? };
        debug!("Allocated {} command buffer(s)", buffers.len());
        Ok(buffers)
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        debug!("Destroyed command pool");
    }
}

/// Records commands into a borrowed command buffer.
#[derive(Clone, Copy)]
pub struct CommandRecorder<'a> {
    device: &'a Device,
    buffer: vk::CommandBuffer,
}

impl<'a> CommandRecorder<'a> {
    #[inline]
    pub fn new(device: &'a Device, buffer: vk::CommandBuffer) -> Self {
        Self { device, buffer }
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    // =========================================================================
    // Recording control
    // =========================================================================

    /// Begins recording for a single submission.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkBeginCommandBuffer` fails.
    pub fn begin(&self) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)?;
        }
        Ok(())
    }

    /// Ends recording.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkEndCommandBuffer` fails, which is how deferred
    /// recording errors surface.
    pub fn end(&self) -> RhiResult<()> {
        unsafe { self.device.handle().end_command_buffer(self.buffer)? };
        Ok(())
    }

    // =========================================================================
    // Render passes
    // =========================================================================

    /// Begins an inline render pass over `render_area`.
    pub fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) {
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);
        unsafe {
            self.device.handle().cmd_begin_render_pass(
                self.buffer,
                &begin_info,
                vk::SubpassContents::INLINE,
            );
        }
    }

    pub fn end_render_pass(&self) {
        unsafe { self.device.handle().cmd_end_render_pass(self.buffer) };
    }

    /// Sets a full-extent viewport (depth 0..1) and matching scissor.
    pub fn set_viewport_and_scissor(&self, extent: vk::Extent2D) {
        let viewport = vk::Viewport::default()
            .x(0.0)
            .y(0.0)
            .width(extent.width as f32)
            .height(extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0);
        let scissor = vk::Rect2D::default().extent(extent);
        unsafe {
            self.device
                .handle()
                .cmd_set_viewport(self.buffer, 0, &[viewport]);
            self.device
                .handle()
                .cmd_set_scissor(self.buffer, 0, &[scissor]);
        }
    }

    // =========================================================================
    // Binding
    // =========================================================================

    pub fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe {
            self.device.handle().cmd_bind_pipeline(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    /// Binds `sets` starting at `first_set` for the graphics bind point.
    pub fn bind_descriptor_sets(
        &self,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            self.device.handle().cmd_bind_descriptor_sets(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                first_set,
                sets,
                dynamic_offsets,
            );
        }
    }

    pub fn bind_vertex_buffer(&self, buffer: vk::Buffer) {
        unsafe {
            self.device
                .handle()
                .cmd_bind_vertex_buffers(self.buffer, 0, &[buffer], &[0]);
        }
    }

    pub fn bind_index_buffer(&self, buffer: vk::Buffer) {
        unsafe {
            self.device.handle().cmd_bind_index_buffer(
                self.buffer,
                buffer,
                0,
                vk::IndexType::UINT32,
            );
        }
    }

    /// Pushes a plain-old-data value at offset 0.
    pub fn push_constants<T: bytemuck::Pod>(
        &self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        data: &T,
    ) {
        unsafe {
            self.device.handle().cmd_push_constants(
                self.buffer,
                layout,
                stages,
                0,
                bytemuck::bytes_of(data),
            );
        }
    }

    // =========================================================================
    // Drawing
    // =========================================================================

    pub fn draw(
        &self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.handle().cmd_draw(
                self.buffer,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
    }

    pub fn draw_indexed(&self, index_count: u32, instance_count: u32, first_instance: u32) {
        unsafe {
            self.device.handle().cmd_draw_indexed(
                self.buffer,
                index_count,
                instance_count,
                0,
                0,
                first_instance,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_pool_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CommandPool>();
    }

    #[test]
    fn test_recorder_is_copy() {
        fn assert_copy<T: Copy>() {}
        assert_copy::<CommandRecorder<'static>>();
    }
}
