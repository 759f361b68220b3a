//! Offscreen depth target for the directional light.
//!
//! Each frame the shadow pass renders scene depth from the light into this
//! image; the main pass then samples it with a comparison sampler. The
//! depth-only render pass leaves the image in
//! `DEPTH_STENCIL_READ_ONLY_OPTIMAL` and its external dependencies order the
//! previous frame's fragment reads before this frame's depth writes.

use std::sync::Arc;

use ash::vk;
use glam::{Mat4, Vec3};
use orbit_rhi::device::Device;
use orbit_rhi::image::{Image, ImageDesc};
use orbit_rhi::render_pass::{Framebuffer, RenderPass};
use orbit_rhi::sampler::{Sampler, SamplerDesc};
use orbit_rhi::swapchain::DEPTH_FORMAT_CANDIDATES;
use orbit_scene::{Camera, DirectionalLight, WORLD_UP};
use tracing::info;

use crate::backend::RenderPassTarget;
use crate::error::RenderResult;

/// Default edge length of the shadow map in texels.
pub const DEFAULT_SHADOW_MAP_SIZE: u32 = 2048;

/// Orthographic camera looking along `light.direction` at a sphere of
/// `radius` around `center`.
///
/// The sphere's nearest point lands on depth 0, its centre on 0.5 and its
/// farthest point on 1.
pub fn light_camera(light: &DirectionalLight, center: Vec3, radius: f32) -> Camera {
    let direction = light.direction.normalize();
    // Any up vector not parallel to the light works for an orthographic view.
    let up = if direction.cross(WORLD_UP).length_squared() < 1e-6 {
        Vec3::Z
    } else {
        WORLD_UP
    };

    let mut camera = Camera::new();
    camera.set_view_direction(center - direction * 2.0 * radius, direction, up);
    camera.set_orthographic_projection(-radius, radius, -radius, radius, radius, 3.0 * radius);
    camera
}

/// Depth image, render pass, framebuffer and sampler of the shadow pass.
pub struct ShadowMap {
    framebuffer: Framebuffer,
    render_pass: RenderPass,
    sampler: Sampler,
    image: Image,
    extent: vk::Extent2D,
    camera: Camera,
}

impl ShadowMap {
    /// Creates a `size`×`size` shadow map.
    ///
    /// # Errors
    ///
    /// Returns an error if no depth format can be both rendered to and
    /// sampled, or any of the Vulkan objects cannot be created.
    pub fn new(device: Arc<Device>, size: u32) -> RenderResult<Self> {
        let format = device.find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT | vk::FormatFeatureFlags::SAMPLED_IMAGE,
        )?;
        let extent = vk::Extent2D {
            width: size,
            height: size,
        };

        let image = Image::new(
            Arc::clone(&device),
            ImageDesc::depth(extent, format).with_usage(vk::ImageUsageFlags::SAMPLED),
        )?;
        let render_pass = RenderPass::depth_only(Arc::clone(&device), format)?;
        let framebuffer = Framebuffer::new(
            Arc::clone(&device),
            render_pass.handle(),
            &[image.view()],
            extent,
        )?;
        let sampler = Sampler::new(device, SamplerDesc::shadow())?;

        info!("Shadow map created: {}x{} {:?}", size, size, format);

        Ok(Self {
            framebuffer,
            render_pass,
            sampler,
            image,
            extent,
            camera: Camera::new(),
        })
    }

    /// Aims the light camera; see [`light_camera`].
    pub fn update_light(&mut self, light: &DirectionalLight, center: Vec3, radius: f32) {
        self.camera = light_camera(light, center, radius);
    }

    #[inline]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// World to light clip space.
    #[inline]
    pub fn light_view_projection(&self) -> Mat4 {
        self.camera.view_projection()
    }

    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Target for [`Renderer::begin_render_pass`](crate::Renderer::begin_render_pass).
    pub fn target(&self) -> RenderPassTarget {
        RenderPassTarget::depth_only(self.render_pass.handle(), self.framebuffer.handle(), self.extent)
    }

    /// Combined image sampler info for the material set.
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        self.image.descriptor_info(
            self.sampler.handle(),
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn project(camera: &Camera, point: Vec3) -> Vec3 {
        let clip = camera.view_projection() * point.extend(1.0);
        clip.truncate() / clip.w
    }

    #[test]
    fn test_scene_centre_projects_to_middle_depth() {
        let light = DirectionalLight::default();
        let center = Vec3::new(1.0, 2.0, 3.0);
        let camera = light_camera(&light, center, 10.0);

        assert_abs_diff_eq!(project(&camera, center), Vec3::new(0.0, 0.0, 0.5), epsilon = 1e-5);
        assert_abs_diff_eq!(project(&camera, center - light.direction * 10.0).z, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(project(&camera, center + light.direction * 10.0).z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_sphere_edge_stays_inside_frustum() {
        let light = DirectionalLight::default();
        let camera = light_camera(&light, Vec3::ZERO, 5.0);
        let side = light.direction.cross(WORLD_UP).normalize() * 5.0;
        let ndc = project(&camera, side);
        assert!(ndc.x.abs() <= 1.0 + 1e-5 && ndc.y.abs() <= 1.0 + 1e-5);
    }

    #[test]
    fn test_straight_down_light_has_valid_view() {
        let light = DirectionalLight::new(Vec3::Y, Vec3::ONE, 1.0);
        let camera = light_camera(&light, Vec3::ZERO, 4.0);
        let view = camera.view();
        assert!(view.is_finite());
        assert_abs_diff_eq!(view * camera.inverse_view(), Mat4::IDENTITY, epsilon = 1e-5);
    }
}
