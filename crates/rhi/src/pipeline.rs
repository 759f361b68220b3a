//! Graphics pipelines.
//!
//! - [`PipelineLayout`] wraps `VkPipelineLayout`
//! - [`PipelineConfig`] is a plain struct holding every fixed-function
//!   setting; start from [`PipelineConfig::default`] or
//!   [`PipelineConfig::depth_only`] and adjust fields
//! - [`Pipeline`] loads the two SPIR-V stages and builds the pipeline for a
//!   render pass
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use ash::vk;
//! use orbit_rhi::device::Device;
//! use orbit_rhi::pipeline::{Pipeline, PipelineConfig, PipelineLayout};
//!
//! # fn example(device: Arc<Device>, render_pass: vk::RenderPass) -> Result<(), orbit_rhi::RhiError> {
//! let layout = PipelineLayout::new(device.clone(), &[], &[])?;
//! let mut config = PipelineConfig::default();
//! config.render_pass = render_pass;
//! config.pipeline_layout = layout.handle();
//!
//! let pipeline = Pipeline::new(
//!     device,
//!     Path::new("shaders/simple.vert.spv"),
//!     Path::new("shaders/simple.frag.spv"),
//!     &config,
//! )?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::{Shader, ShaderStage};
use crate::vertex::Vertex;

/// RAII wrapper over `VkPipelineLayout`.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates a layout from set layouts (in set order) and push constant
    /// ranges.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkCreatePipelineLayout` fails.
    pub fn new(
        device: Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        debug!(
            "Created pipeline layout with {} set layout(s) and {} push constant range(s)",
            descriptor_set_layouts.len(),
            push_constant_ranges.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Destroyed pipeline layout");
    }
}

/// Face culling mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

/// Front face winding order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrontFace {
    CounterClockwise,
    #[default]
    Clockwise,
}

impl FrontFace {
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

/// Rasterizer depth bias, used by the shadow pass against acne.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthBias {
    pub constant_factor: f32,
    pub slope_factor: f32,
    pub clamp: f32,
}

impl Default for DepthBias {
    fn default() -> Self {
        Self {
            constant_factor: 1.25,
            slope_factor: 1.75,
            clamp: 0.0,
        }
    }
}

/// Color attachment blending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorBlend {
    /// Source replaces destination.
    #[default]
    Opaque,
    /// `src * src_alpha + dst * (1 - src_alpha)`.
    Alpha,
}

impl ColorBlend {
    pub fn to_vk(self) -> vk::PipelineColorBlendAttachmentState {
        let state = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .color_blend_op(vk::BlendOp::ADD)
            .alpha_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO);
        match self {
            ColorBlend::Opaque => state
                .blend_enable(false)
                .src_color_blend_factor(vk::BlendFactor::ONE)
                .dst_color_blend_factor(vk::BlendFactor::ZERO),
            ColorBlend::Alpha => state
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA),
        }
    }
}

/// Fixed-function state of a graphics pipeline.
///
/// `render_pass` and `pipeline_layout` must be set before
/// [`Pipeline::new`].
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth_bias: Option<DepthBias>,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare_op: vk::CompareOp,
    /// `None` means the render pass has no color attachment.
    pub color_blend: Option<ColorBlend>,
    pub dynamic_states: Vec<vk::DynamicState>,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
    pub pipeline_layout: vk::PipelineLayout,
}

impl Default for PipelineConfig {
    /// Triangle lists of [`Vertex`], depth tested and written, opaque
    /// color, dynamic viewport and scissor.
    fn default() -> Self {
        Self {
            vertex_bindings: Vertex::binding_descriptions(),
            vertex_attributes: Vertex::attribute_descriptions(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: CullMode::None,
            front_face: FrontFace::Clockwise,
            depth_bias: None,
            depth_test: true,
            depth_write: true,
            depth_compare_op: vk::CompareOp::LESS,
            color_blend: Some(ColorBlend::Opaque),
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
            render_pass: vk::RenderPass::null(),
            subpass: 0,
            pipeline_layout: vk::PipelineLayout::null(),
        }
    }
}

impl PipelineConfig {
    /// Depth-only variant for shadow rendering: no color attachment, depth
    /// bias on, no culling.
    pub fn depth_only() -> Self {
        Self {
            depth_bias: Some(DepthBias::default()),
            depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
            color_blend: None,
            cull_mode: CullMode::None,
            ..Self::default()
        }
    }

    /// Drops vertex input so the vertex shader generates its own positions.
    pub fn without_vertex_input(mut self) -> Self {
        self.vertex_bindings.clear();
        self.vertex_attributes.clear();
        self
    }

    /// Switches the color attachment to alpha blending.
    pub fn with_alpha_blending(mut self) -> Self {
        self.color_blend = Some(ColorBlend::Alpha);
        self
    }

    fn validate(&self) -> RhiResult<()> {
        if self.render_pass == vk::RenderPass::null() {
            return Err(RhiError::PipelineError(
                "Cannot create pipeline: no render pass in config".to_string(),
            ));
        }
        if self.pipeline_layout == vk::PipelineLayout::null() {
            return Err(RhiError::PipelineError(
                "Cannot create pipeline: no pipeline layout in config".to_string(),
            ));
        }
        Ok(())
    }
}

/// Graphics pipeline built from a vertex and a fragment shader.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    /// Loads both shader stages and creates the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] if the config lacks a render pass
    /// or layout, [`RhiError::ShaderError`] if a shader cannot be loaded,
    /// or the Vulkan error of pipeline creation.
    pub fn new(
        device: Arc<Device>,
        vert_path: &Path,
        frag_path: &Path,
        config: &PipelineConfig,
    ) -> RhiResult<Self> {
        config.validate()?;

        let vertex = Shader::from_spirv_file(Arc::clone(&device), vert_path, ShaderStage::Vertex)?;
        let fragment =
            Shader::from_spirv_file(Arc::clone(&device), frag_path, ShaderStage::Fragment)?;
        let stages = [vertex.stage_create_info(), fragment.stage_create_info()];

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&config.vertex_bindings)
            .vertex_attribute_descriptions(&config.vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(config.topology)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let bias = config.depth_bias.unwrap_or(DepthBias {
            constant_factor: 0.0,
            slope_factor: 0.0,
            clamp: 0.0,
        });
        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(config.polygon_mode)
            .line_width(1.0)
            .cull_mode(config.cull_mode.to_vk())
            .front_face(config.front_face.to_vk())
            .depth_bias_enable(config.depth_bias.is_some())
            .depth_bias_constant_factor(bias.constant_factor)
            .depth_bias_slope_factor(bias.slope_factor)
            .depth_bias_clamp(bias.clamp);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(config.depth_test)
            .depth_write_enable(config.depth_write)
            .depth_compare_op(config.depth_compare_op)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> =
            config.color_blend.iter().map(|blend| blend.to_vk()).collect();
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&config.dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(config.pipeline_layout)
            .render_pass(config.render_pass)
            .subpass(config.subpass);

        let pipeline = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, result)| result)?[0]
        };

        info!(
            "Graphics pipeline created from {:?} and {:?}",
            vert_path, frag_path
        );

        Ok(Self { device, pipeline })
    }

    /// Binds the pipeline to the graphics bind point of `cmd`.
    pub fn bind(&self, cmd: vk::CommandBuffer) {
        unsafe {
            self.device.handle().cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline,
            );
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        debug!("Destroyed graphics pipeline");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert!(config.depth_test && config.depth_write);
        assert_eq!(config.color_blend, Some(ColorBlend::Opaque));
        assert_eq!(config.vertex_attributes.len(), 4);
        assert!(config.dynamic_states.contains(&vk::DynamicState::VIEWPORT));
        assert!(config.dynamic_states.contains(&vk::DynamicState::SCISSOR));
        assert!(config.depth_bias.is_none());
    }

    #[test]
    fn test_depth_only_config() {
        let config = PipelineConfig::depth_only();
        assert!(config.color_blend.is_none());
        assert!(config.depth_bias.is_some());
        assert_eq!(config.cull_mode, CullMode::None);
        assert!(config.depth_write);
        // Same vertex format as the main pass.
        assert_eq!(config.vertex_bindings.len(), 1);
    }

    #[test]
    fn test_billboard_config() {
        let config = PipelineConfig::default()
            .without_vertex_input()
            .with_alpha_blending();
        assert!(config.vertex_bindings.is_empty());
        assert!(config.vertex_attributes.is_empty());
        assert_eq!(config.color_blend, Some(ColorBlend::Alpha));
    }

    #[test]
    fn test_config_without_render_pass_rejected() {
        let config = PipelineConfig::default();
        assert!(matches!(config.validate(), Err(RhiError::PipelineError(_))));
    }

    #[test]
    fn test_color_blend_to_vk() {
        let opaque = ColorBlend::Opaque.to_vk();
        assert_eq!(opaque.blend_enable, vk::FALSE);
        let alpha = ColorBlend::Alpha.to_vk();
        assert_eq!(alpha.blend_enable, vk::TRUE);
        assert_eq!(alpha.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
    }

    #[test]
    fn test_cull_mode_to_vk() {
        assert_eq!(CullMode::None.to_vk(), vk::CullModeFlags::NONE);
        assert_eq!(CullMode::Back.to_vk(), vk::CullModeFlags::BACK);
        assert_eq!(FrontFace::Clockwise.to_vk(), vk::FrontFace::CLOCKWISE);
    }
}
