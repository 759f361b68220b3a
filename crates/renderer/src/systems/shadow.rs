//! Shadow pass: scene depth from the directional light.

use std::sync::Arc;

use ash::vk;
use orbit_resources::Mesh;
use orbit_rhi::command::CommandRecorder;
use orbit_rhi::device::Device;
use orbit_rhi::pipeline::{Pipeline, PipelineConfig, PipelineLayout};
use orbit_scene::World;
use tracing::info;

use super::ShaderPaths;
use super::object_data::{ObjectDataSource, ObjectDataStrategy};
use crate::error::RenderResult;
use crate::frame_info::FrameInfo;
use crate::gpu_data::ObjectData;

/// Renders drawables into the [`ShadowMap`](crate::ShadowMap).
///
/// Shares object records with [`SimpleRenderSystem`](super::SimpleRenderSystem):
/// with the storage strategy it reads what that system uploaded.
pub struct ShadowRenderSystem {
    pipeline: Pipeline,
    layout: PipelineLayout,
    source: Box<dyn ObjectDataSource>,
    device: Arc<Device>,
}

impl ShadowRenderSystem {
    /// Builds the depth-only pipeline for the shadow map's `render_pass`.
    ///
    /// Only sets 0 (global) and 1 (frame) of `set_layouts` are used.
    ///
    /// # Errors
    ///
    /// Returns an error if the layout or pipeline cannot be created.
    pub fn new(
        device: Arc<Device>,
        render_pass: vk::RenderPass,
        set_layouts: &[vk::DescriptorSetLayout],
        strategy: ObjectDataStrategy,
        shaders: &ShaderPaths,
    ) -> RenderResult<Self> {
        let source = strategy.source();
        let layout = PipelineLayout::new(
            Arc::clone(&device),
            &set_layouts[..2.min(set_layouts.len())],
            &source.push_constant_ranges(),
        )?;

        let config = PipelineConfig {
            render_pass,
            pipeline_layout: layout.handle(),
            ..PipelineConfig::depth_only()
        };
        let pipeline = Pipeline::new(Arc::clone(&device), &shaders.vertex, &shaders.fragment, &config)?;
        info!("Shadow render system ready ({:?})", strategy);

        Ok(Self {
            pipeline,
            layout,
            source,
            device,
        })
    }

    pub fn render_game_objects(&self, frame: &FrameInfo<'_>, world: &World<Mesh>) {
        let recorder = CommandRecorder::new(&self.device, frame.command_buffer);
        let layout = self.layout.handle();

        self.pipeline.bind(frame.command_buffer);
        recorder.bind_descriptor_sets(layout, 0, &[frame.global_set], &[frame.dynamic_offset]);
        recorder.bind_descriptor_sets(layout, 1, &[frame.object_set], &[]);

        for (index, object) in world.drawables().enumerate() {
            let Some(mesh) = object.mesh.as_deref() else {
                continue;
            };
            let record = ObjectData::from_object(object);
            self.source.prepare_draw(&recorder, layout, &record);
            mesh.bind(frame.command_buffer);
            mesh.draw(frame.command_buffer, self.source.first_instance(index as u32));
        }
    }
}
