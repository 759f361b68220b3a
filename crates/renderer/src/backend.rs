//! The GPU side of a frame, behind a trait.
//!
//! [`Renderer`](crate::Renderer) drives the frame state machine and calls a
//! [`FrameBackend`] for everything that touches Vulkan. [`VulkanBackend`] is
//! the real implementation over a [`SwapChain`].

use std::sync::Arc;

use ash::vk;
use orbit_platform::Surface;
use orbit_rhi::command::{CommandPool, CommandRecorder};
use orbit_rhi::device::Device;
use orbit_rhi::swapchain::{AcquireOutcome, PresentOutcome, SwapChain, SwapChainContext};
use orbit_rhi::sync::MAX_FRAMES_IN_FLIGHT;
use orbit_rhi::{RhiError, RhiResult};
use tracing::{debug, info};

/// Depth cleared to the far plane.
pub const CLEAR_DEPTH: vk::ClearDepthStencilValue = vk::ClearDepthStencilValue {
    depth: 1.0,
    stencil: 0,
};

/// Where a render pass draws: pass, framebuffer, area and clear values.
#[derive(Clone)]
pub struct RenderPassTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_values: Vec<vk::ClearValue>,
}

impl RenderPassTarget {
    /// Target with one color and one depth attachment.
    pub fn color_depth(
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    ) -> Self {
        Self {
            render_pass,
            framebuffer,
            extent,
            clear_values: vec![
                vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: clear_color,
                    },
                },
                vk::ClearValue {
                    depth_stencil: CLEAR_DEPTH,
                },
            ],
        }
    }

    /// Target with a single depth attachment.
    pub fn depth_only(
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
    ) -> Self {
        Self {
            render_pass,
            framebuffer,
            extent,
            clear_values: vec![vk::ClearValue {
                depth_stencil: CLEAR_DEPTH,
            }],
        }
    }
}

/// GPU operations the frame lifecycle needs.
pub trait FrameBackend {
    /// Waits on slot `frame_index` and acquires the next image.
    fn acquire(&mut self, frame_index: usize) -> RhiResult<AcquireOutcome>;

    /// Resets and begins the command buffer of slot `frame_index`.
    fn begin_commands(&mut self, frame_index: usize) -> RhiResult<vk::CommandBuffer>;

    fn end_commands(&mut self, command_buffer: vk::CommandBuffer) -> RhiResult<()>;

    /// Submits the slot's commands and presents `image_index`.
    fn submit(
        &mut self,
        command_buffer: vk::CommandBuffer,
        frame_index: usize,
        image_index: u32,
    ) -> RhiResult<PresentOutcome>;

    /// Replaces the swap chain with one sized to `extent`.
    fn rebuild(&mut self, extent: vk::Extent2D) -> RhiResult<()>;

    /// Begins `target` and sets viewport and scissor to its extent.
    fn begin_render_pass(&mut self, command_buffer: vk::CommandBuffer, target: &RenderPassTarget);

    fn end_render_pass(&mut self, command_buffer: vk::CommandBuffer);

    /// Target for swap chain image `image_index`.
    fn swap_chain_target(&self, image_index: u32) -> RenderPassTarget;

    fn swap_chain_render_pass(&self) -> vk::RenderPass;

    fn swap_chain_extent(&self) -> vk::Extent2D;

    /// Blocks until the GPU is idle.
    fn wait_idle(&self) -> RhiResult<()>;
}

/// [`FrameBackend`] over a Vulkan swap chain with one command buffer per
/// frame slot.
pub struct VulkanBackend {
    swap_chain: SwapChain,
    command_buffers: Vec<vk::CommandBuffer>,
    command_pool: CommandPool,
    surface: Surface,
    device: Arc<Device>,
    timeout: u64,
    clear_color: [f32; 4],
}

impl VulkanBackend {
    /// Creates the swap chain for `surface` and the per-slot command buffers.
    ///
    /// `timeout` bounds fence waits and acquisition, in nanoseconds.
    ///
    /// # Errors
    ///
    /// Returns an error if the swap chain or command buffers cannot be
    /// created.
    pub fn new(
        device: Arc<Device>,
        surface: Surface,
        extent: vk::Extent2D,
        timeout: u64,
        clear_color: [f32; 4],
    ) -> RhiResult<Self> {
        let graphics_family = device
            .queue_families()
            .graphics_family
            .ok_or_else(|| RhiError::InvalidHandle("Device has no graphics queue".into()))?;

        let swap_chain = SwapChain::new(
            SwapChainContext {
                device: &device,
                surface: surface.handle(),
                surface_loader: surface.loader(),
                timeout,
            },
            extent,
            None,
        )?;

        let command_pool = CommandPool::new(Arc::clone(&device), graphics_family)?;
        let command_buffers = command_pool.allocate_command_buffers(MAX_FRAMES_IN_FLIGHT as u32)?;
        info!(
            "Frame backend ready: {} swap chain images, {} frames in flight",
            swap_chain.image_count(),
            MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            swap_chain,
            command_buffers,
            command_pool,
            surface,
            device,
            timeout,
            clear_color,
        })
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn swap_chain(&self) -> &SwapChain {
        &self.swap_chain
    }

    fn recorder(&self, command_buffer: vk::CommandBuffer) -> CommandRecorder<'_> {
        CommandRecorder::new(&self.device, command_buffer)
    }
}

impl FrameBackend for VulkanBackend {
    fn acquire(&mut self, frame_index: usize) -> RhiResult<AcquireOutcome> {
        self.swap_chain.acquire_next_image(frame_index)
    }

    fn begin_commands(&mut self, frame_index: usize) -> RhiResult<vk::CommandBuffer> {
        let command_buffer = self.command_buffers[frame_index];
        unsafe {
            self.device.handle().reset_command_buffer(
                command_buffer,
                vk::CommandBufferResetFlags::empty(),
            )?;
        }
        self.recorder(command_buffer).begin()?;
        Ok(command_buffer)
    }

    fn end_commands(&mut self, command_buffer: vk::CommandBuffer) -> RhiResult<()> {
        self.recorder(command_buffer).end()
    }

    fn submit(
        &mut self,
        command_buffer: vk::CommandBuffer,
        frame_index: usize,
        image_index: u32,
    ) -> RhiResult<PresentOutcome> {
        self.swap_chain
            .submit_command_buffers(command_buffer, frame_index, image_index)
    }

    fn rebuild(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        self.device.wait_idle()?;

        let rebuilt = SwapChain::new(
            SwapChainContext {
                device: &self.device,
                surface: self.surface.handle(),
                surface_loader: self.surface.loader(),
                timeout: self.timeout,
            },
            extent,
            Some(&self.swap_chain),
        )?;

        if !self.swap_chain.compare_swap_formats(&rebuilt) {
            return Err(RhiError::SwapchainFormatChanged);
        }

        // The old swap chain was only needed as the creation hint.
        self.swap_chain = rebuilt;
        debug!(
            "Swap chain rebuilt at {}x{}",
            self.swap_chain.extent().width,
            self.swap_chain.extent().height
        );
        Ok(())
    }

    fn begin_render_pass(&mut self, command_buffer: vk::CommandBuffer, target: &RenderPassTarget) {
        let recorder = self.recorder(command_buffer);
        recorder.begin_render_pass(
            target.render_pass,
            target.framebuffer,
            vk::Rect2D::default().extent(target.extent),
            &target.clear_values,
        );
        recorder.set_viewport_and_scissor(target.extent);
    }

    fn end_render_pass(&mut self, command_buffer: vk::CommandBuffer) {
        self.recorder(command_buffer).end_render_pass();
    }

    fn swap_chain_target(&self, image_index: u32) -> RenderPassTarget {
        RenderPassTarget::color_depth(
            self.swap_chain.render_pass(),
            self.swap_chain.framebuffer(image_index),
            self.swap_chain.extent(),
            self.clear_color,
        )
    }

    fn swap_chain_render_pass(&self) -> vk::RenderPass {
        self.swap_chain.render_pass()
    }

    fn swap_chain_extent(&self) -> vk::Extent2D {
        self.swap_chain.extent()
    }

    fn wait_idle(&self) -> RhiResult<()> {
        self.device.wait_idle()
    }
}
