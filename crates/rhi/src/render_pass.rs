//! Render passes and framebuffers.
//!
//! Two pass shapes are used:
//! - the swap chain pass: one color attachment presented to the surface and
//!   one transient depth attachment
//! - the depth-only pass: one depth attachment left in
//!   `DEPTH_STENCIL_READ_ONLY_OPTIMAL` so a later pass can sample it

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// RAII wrapper over `VkRenderPass`.
pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
}

impl RenderPass {
    /// Creates the color + depth pass that renders into swap chain images.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkCreateRenderPass` fails.
    pub fn swap_chain(
        device: Arc<Device>,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> RhiResult<Self> {
        let attachments = swap_chain_attachments(color_format, depth_format);
        let color_ref = [vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
        let depth_ref = vk::AttachmentReference::default()
            .attachment(1)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_ref)
            .depth_stencil_attachment(&depth_ref);

        let dependencies = [swap_chain_dependency()];
        Self::create(device, &attachments, &[subpass], &dependencies, "swap chain")
    }

    /// Creates a depth-only pass for offscreen shadow rendering.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkCreateRenderPass` fails.
    pub fn depth_only(device: Arc<Device>, depth_format: vk::Format) -> RhiResult<Self> {
        let attachments = [depth_only_attachment(depth_format)];
        let depth_ref = vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .depth_stencil_attachment(&depth_ref);

        let dependencies = depth_only_dependencies();
        Self::create(device, &attachments, &[subpass], &dependencies, "depth-only")
    }

    fn create(
        device: Arc<Device>,
        attachments: &[vk::AttachmentDescription],
        subpasses: &[vk::SubpassDescription],
        dependencies: &[vk::SubpassDependency],
        label: &str,
    ) -> RhiResult<Self> {
        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(attachments)
            .subpasses(subpasses)
            .dependencies(dependencies);

        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };
        debug!("Created {} render pass", label);

        Ok(Self {
            device,
            render_pass,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
        debug!("Destroyed render pass");
    }
}

/// RAII wrapper over `VkFramebuffer`.
pub struct Framebuffer {
    device: Arc<Device>,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
}

impl Framebuffer {
    /// Creates a single-layer framebuffer over `attachments`.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkCreateFramebuffer` fails.
    pub fn new(
        device: Arc<Device>,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.handle().create_framebuffer(&create_info, None)? };
        Ok(Self {
            device,
            framebuffer,
            extent,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_framebuffer(self.framebuffer, None);
        }
    }
}

fn swap_chain_attachments(
    color_format: vk::Format,
    depth_format: vk::Format,
) -> [vk::AttachmentDescription; 2] {
    let color = vk::AttachmentDescription::default()
        .format(color_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

    let depth = vk::AttachmentDescription::default()
        .format(depth_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    [color, depth]
}

fn swap_chain_dependency() -> vk::SubpassDependency {
    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stages)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(stages)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
}

fn depth_only_attachment(depth_format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(depth_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL)
}

/// Sampling in the previous frame's main pass must finish before the depth
/// write, and the depth write before this frame's sampling.
fn depth_only_dependencies() -> [vk::SubpassDependency; 2] {
    [
        vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
            .dst_stage_mask(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS)
            .src_access_mask(vk::AccessFlags::SHADER_READ)
            .dst_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
            .dependency_flags(vk::DependencyFlags::BY_REGION),
        vk::SubpassDependency::default()
            .src_subpass(0)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS)
            .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
            .src_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ)
            .dependency_flags(vk::DependencyFlags::BY_REGION),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_chain_attachments_present_color() {
        let [color, depth] =
            swap_chain_attachments(vk::Format::B8G8R8A8_SRGB, vk::Format::D32_SFLOAT);
        assert_eq!(color.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(color.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(depth.format, vk::Format::D32_SFLOAT);
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::DONT_CARE);
    }

    #[test]
    fn test_depth_only_attachment_is_sampleable_after_pass() {
        let depth = depth_only_attachment(vk::Format::D32_SFLOAT);
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(
            depth.final_layout,
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        );
    }

    #[test]
    fn test_depth_only_dependencies_bracket_the_pass() {
        let [before, after] = depth_only_dependencies();
        assert_eq!(before.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(before.src_access_mask, vk::AccessFlags::SHADER_READ);
        assert_eq!(
            before.dst_access_mask,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        );
        assert_eq!(after.dst_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(after.dst_stage_mask, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }
}
