//! Swap chain and frame acquisition.
//!
//! A [`SwapChain`] owns everything whose lifetime follows the surface size:
//! the presentable images and their views, one depth image per swap chain
//! image, the render pass and framebuffers, and the per-slot
//! synchronization objects. On resize the renderer builds a new swap chain
//! passing the old one as `previous` and then drops the old one.
//!
//! Frame flow for slot `frame_index`:
//!
//! 1. [`SwapChain::acquire_next_image`] waits on the slot fence and acquires
//! 2. the caller records into its command buffer for that slot
//! 3. [`SwapChain::submit_command_buffers`] waits until no earlier frame is
//!    still rendering into the acquired image, submits and presents
//!
//! Out-of-date and suboptimal surfaces are reported as [`AcquireOutcome`] and
//! [`PresentOutcome`] values, never as errors.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc, subresource_range};
use crate::render_pass::{Framebuffer, RenderPass};
use crate::sync::{FrameSync, MAX_FRAMES_IN_FLIGHT};

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Result of acquiring a swap chain image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is ready. `suboptimal` means presenting still works but the
    /// swap chain should be rebuilt.
    Ready { image_index: u32, suboptimal: bool },
    /// The surface changed; the swap chain must be rebuilt before rendering.
    OutOfDate,
}

/// Result of presenting a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    /// Whether the swap chain should be rebuilt before the next frame.
    #[inline]
    pub fn needs_rebuild(self) -> bool {
        !matches!(self, PresentOutcome::Presented)
    }
}

/// What a swap chain needs besides the device: the surface to present to.
#[derive(Clone, Copy)]
pub struct SwapChainContext<'a> {
    pub device: &'a Arc<Device>,
    pub surface: vk::SurfaceKHR,
    pub surface_loader: &'a ash::khr::surface::Instance,
    /// Timeout in nanoseconds for fence waits and acquisition.
    pub timeout: u64,
}

/// Surface capabilities, formats and present modes.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries the surface support of `physical_device`.
    ///
    /// # Errors
    ///
    /// Returns an error if any surface query fails.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Which frame slot's fence last rendered into each swap chain image.
#[derive(Debug, Clone)]
pub struct ImagesInFlight {
    fences: Vec<vk::Fence>,
}

impl ImagesInFlight {
    pub fn new(image_count: usize) -> Self {
        Self {
            fences: vec![vk::Fence::null(); image_count],
        }
    }

    /// Records `fence` as the owner of `image_index` and returns the
    /// previous owner, if any, which must be waited on before reuse.
    pub fn claim(&mut self, image_index: u32, fence: vk::Fence) -> Option<vk::Fence> {
        let slot = &mut self.fences[image_index as usize];
        let previous = std::mem::replace(slot, fence);
        (previous != vk::Fence::null()).then_some(previous)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fences.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fences.is_empty()
    }
}

/// Swap chain with its render targets and frame synchronization.
pub struct SwapChain {
    device: Arc<Device>,
    // Framebuffers are cleared in `drop` before the views they reference.
    framebuffers: Vec<Framebuffer>,
    render_pass: RenderPass,
    depth_images: Vec<Image>,
    image_views: Vec<vk::ImageView>,
    images: Vec<vk::Image>,
    swapchain: vk::SwapchainKHR,
    frame_sync: Vec<FrameSync>,
    images_in_flight: ImagesInFlight,
    color_format: vk::Format,
    depth_format: vk::Format,
    extent: vk::Extent2D,
    timeout: u64,
}

impl SwapChain {
    /// Creates a swap chain for `window_extent`.
    ///
    /// `previous` is handed to the driver as `oldSwapchain` so it can reuse
    /// resources; the caller drops it afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface has no usable formats, no depth
    /// format is supported, or any Vulkan object cannot be created.
    pub fn new(
        ctx: SwapChainContext<'_>,
        window_extent: vk::Extent2D,
        previous: Option<&SwapChain>,
    ) -> RhiResult<Self> {
        let device = Arc::clone(ctx.device);
        let support =
            SwapchainSupportDetails::query(device.physical_device(), ctx.surface, ctx.surface_loader)?;
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Surface reports no formats or present modes".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, window_extent);
        let image_count = determine_image_count(&support.capabilities);

        let queue_families = device.queue_families();
        let (Some(graphics_family), Some(present_family)) =
            (queue_families.graphics_family, queue_families.present_family)
        else {
            return Err(RhiError::SwapchainError(
                "Device has no graphics or present queue".to_string(),
            ));
        };
        let family_indices = [graphics_family, present_family];
        let (sharing_mode, shared_families) = if graphics_family != present_family {
            (vk::SharingMode::CONCURRENT, &family_indices[..])
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let old_swapchain = previous.map_or(vk::SwapchainKHR::null(), |p| p.swapchain);
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(ctx.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(shared_families)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let loader = device.swapchain_loader();
        let swapchain = unsafe { loader.create_swapchain(&create_info, None)? };
        let images = unsafe { loader.get_swapchain_images(swapchain)? };

        info!(
            "Swap chain created: {}x{}, {:?}, {:?}, {} image(s)",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            images.len()
        );

        // Partially built state is cleaned up by Drop from here on.
        let depth_format = find_depth_format(&device)?;
        let mut swap_chain = Self {
            render_pass: RenderPass::swap_chain(
                Arc::clone(&device),
                surface_format.format,
                depth_format,
            )?,
            device,
            framebuffers: Vec::new(),
            depth_images: Vec::new(),
            image_views: Vec::new(),
            images_in_flight: ImagesInFlight::new(images.len()),
            images,
            swapchain,
            frame_sync: Vec::new(),
            color_format: surface_format.format,
            depth_format,
            extent,
            timeout: ctx.timeout,
        };
        swap_chain.create_image_views()?;
        swap_chain.create_depth_resources()?;
        swap_chain.create_framebuffers()?;
        swap_chain.frame_sync = FrameSync::for_frames_in_flight(&swap_chain.device)?;

        Ok(swap_chain)
    }

    /// Waits for slot `frame_index` to be free, then acquires the next
    /// image, signaling the slot's image-available semaphore.
    ///
    /// # Errors
    ///
    /// Returns an error if the fence wait times out or acquisition fails for
    /// a reason other than an out-of-date surface.
    pub fn acquire_next_image(&self, frame_index: usize) -> RhiResult<AcquireOutcome> {
        let sync = &self.frame_sync[frame_index];
        sync.in_flight_fence().wait(self.timeout)?;

        let result = unsafe {
            self.device.swapchain_loader().acquire_next_image(
                self.swapchain,
                self.timeout,
                sync.image_available(),
                vk::Fence::null(),
            )
        };
        acquire_outcome(result)
    }

    /// Submits `cmd` for slot `frame_index` and presents `image_index`.
    ///
    /// # Errors
    ///
    /// Returns an error if a fence wait or the queue submission fails, or
    /// presentation fails for a reason other than an out-of-date or
    /// suboptimal surface.
    pub fn submit_command_buffers(
        &mut self,
        cmd: vk::CommandBuffer,
        frame_index: usize,
        image_index: u32,
    ) -> RhiResult<PresentOutcome> {
        let sync = &self.frame_sync[frame_index];
        let fence = sync.in_flight_fence();

        if let Some(previous) = self.images_in_flight.claim(image_index, fence.handle()) {
            unsafe {
                self.device
                    .handle()
                    .wait_for_fences(&[previous], true, self.timeout)?;
            }
        }

        let wait_semaphores = [sync.image_available()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [sync.render_finished()];
        let command_buffers = [cmd];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        fence.reset()?;
        unsafe {
            self.device.handle().queue_submit(
                self.device.graphics_queue(),
                &[submit_info],
                fence.handle(),
            )?;
        }

        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.device
                .swapchain_loader()
                .queue_present(self.device.present_queue(), &present_info)
        };
        present_outcome(result)
    }

    /// Whether `other` renders with the same color and depth formats, so
    /// pipelines built against one stay valid for the other.
    #[inline]
    pub fn compare_swap_formats(&self, other: &SwapChain) -> bool {
        self.color_format == other.color_format && self.depth_format == other.depth_format
    }

    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    /// Framebuffer of swap chain image `image_index`.
    #[inline]
    pub fn framebuffer(&self, image_index: u32) -> vk::Framebuffer {
        self.framebuffers[image_index as usize].handle()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn color_format(&self) -> vk::Format {
        self.color_format
    }

    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    fn create_image_views(&mut self) -> RhiResult<()> {
        for &image in &self.images {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.color_format)
                .subresource_range(subresource_range(vk::ImageAspectFlags::COLOR));
            let view = unsafe { self.device.handle().create_image_view(&create_info, None)? };
            self.image_views.push(view);
        }
        Ok(())
    }

    fn create_depth_resources(&mut self) -> RhiResult<()> {
        for _ in 0..self.images.len() {
            let depth = Image::new(
                Arc::clone(&self.device),
                ImageDesc::depth(self.extent, self.depth_format),
            )?;
            self.depth_images.push(depth);
        }
        Ok(())
    }

    fn create_framebuffers(&mut self) -> RhiResult<()> {
        for (view, depth) in self.image_views.iter().zip(&self.depth_images) {
            let framebuffer = Framebuffer::new(
                Arc::clone(&self.device),
                self.render_pass.handle(),
                &[*view, depth.view()],
                self.extent,
            )?;
            self.framebuffers.push(framebuffer);
        }
        debug!("Created {} swap chain framebuffer(s)", self.framebuffers.len());
        Ok(())
    }
}

impl Drop for SwapChain {
    fn drop(&mut self) {
        self.framebuffers.clear();
        unsafe {
            for &view in &self.image_views {
                self.device.handle().destroy_image_view(view, None);
            }
            self.device
                .swapchain_loader()
                .destroy_swapchain(self.swapchain, None);
        }
        info!(
            "Swap chain destroyed (was {}x{})",
            self.extent.width, self.extent.height
        );
    }
}

/// Returns the first depth format usable as an optimal-tiling depth
/// attachment.
///
/// # Errors
///
/// Returns [`RhiError::UnsupportedFormat`] if none is.
pub fn find_depth_format(device: &Device) -> RhiResult<vk::Format> {
    device.find_supported_format(
        &DEPTH_FORMAT_CANDIDATES,
        vk::ImageTiling::OPTIMAL,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
    )
}

fn acquire_outcome(result: Result<(u32, bool), vk::Result>) -> RhiResult<AcquireOutcome> {
    match result {
        Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Ready {
            image_index,
            suboptimal,
        }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(e) => Err(RhiError::SwapchainError(format!(
            "Failed to acquire swap chain image: {:?}",
            e
        ))),
    }
}

fn present_outcome(result: Result<bool, vk::Result>) -> RhiResult<PresentOutcome> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => Ok(PresentOutcome::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
        Err(e) => Err(RhiError::SwapchainError(format!(
            "Failed to present swap chain image: {:?}",
            e
        ))),
    }
}

/// Prefers `B8G8R8A8_SRGB` with the sRGB non-linear color space.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .unwrap_or_else(|| {
            warn!("Preferred surface format unavailable, using {:?}", formats[0].format);
            formats[0]
        })
}

/// Prefers `MAILBOX`, falling back to the always-available `FIFO`.
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Uses the surface's current extent when defined, otherwise clamps the
/// window extent to the surface limits.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_extent: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: window_extent.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: window_extent.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum and at least the number of frames in flight,
/// capped by the surface maximum (0 means unbounded).
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = (capabilities.min_image_count + 1).max(MAX_FRAMES_IN_FLIGHT as u32);
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_choose_surface_format_prefers_srgb() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::B8G8R8A8_SRGB
        );
    }

    #[test]
    fn test_choose_surface_format_falls_back_to_first() {
        let formats = vec![vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::R8G8B8A8_UNORM
        );
    }

    #[test]
    fn test_choose_present_mode() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(1920, 1080),
            ..Default::default()
        };
        assert_eq!(choose_extent(&capabilities, extent(800, 600)), extent(1920, 1080));
    }

    #[test]
    fn test_choose_extent_clamps_window_extent() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(u32::MAX, u32::MAX),
            min_image_extent: extent(100, 100),
            max_image_extent: extent(2000, 2000),
            ..Default::default()
        };
        assert_eq!(choose_extent(&capabilities, extent(3000, 50)), extent(2000, 100));
        assert_eq!(choose_extent(&capabilities, extent(800, 600)), extent(800, 600));
    }

    #[test]
    fn test_image_count_covers_frames_in_flight() {
        let single = vk::SurfaceCapabilitiesKHR {
            min_image_count: 1,
            max_image_count: 0,
            ..Default::default()
        };
        assert!(determine_image_count(&single) >= MAX_FRAMES_IN_FLIGHT as u32);

        let typical = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&typical), 3);

        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capped), 2);
    }

    #[test]
    fn test_acquire_outcome_mapping() {
        assert_eq!(
            acquire_outcome(Ok((1, false))).ok(),
            Some(AcquireOutcome::Ready {
                image_index: 1,
                suboptimal: false
            })
        );
        assert_eq!(
            acquire_outcome(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).ok(),
            Some(AcquireOutcome::OutOfDate)
        );
        assert!(acquire_outcome(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
    }

    #[test]
    fn test_present_outcome_mapping() {
        assert_eq!(present_outcome(Ok(false)).ok(), Some(PresentOutcome::Presented));
        assert_eq!(present_outcome(Ok(true)).ok(), Some(PresentOutcome::Suboptimal));
        assert_eq!(
            present_outcome(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).ok(),
            Some(PresentOutcome::OutOfDate)
        );
        assert!(present_outcome(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
        assert!(PresentOutcome::Suboptimal.needs_rebuild());
        assert!(!PresentOutcome::Presented.needs_rebuild());
    }

    #[test]
    fn test_images_in_flight_returns_previous_owner() {
        use ash::vk::Handle;

        let mut tracker = ImagesInFlight::new(3);
        let slot0 = vk::Fence::from_raw(10);
        let slot1 = vk::Fence::from_raw(11);

        assert_eq!(tracker.claim(2, slot0), None);
        assert_eq!(tracker.claim(0, slot1), None);
        // Image 2 comes back while slot 0's frame may still render into it.
        assert_eq!(tracker.claim(2, slot1), Some(slot0));
        assert_eq!(tracker.len(), 3);
    }

    #[test]
    fn test_depth_candidates_order() {
        assert_eq!(DEPTH_FORMAT_CANDIDATES[0], vk::Format::D32_SFLOAT);
        assert_eq!(DEPTH_FORMAT_CANDIDATES[2], vk::Format::D24_UNORM_S8_UINT);
    }
}
