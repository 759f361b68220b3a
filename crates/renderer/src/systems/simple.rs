//! Main pass: lit, textured, shadowed meshes.

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
use crate::frame_resources::FrameResources;
use crate::gpu_data::{ObjectData, object_records};

/// Draws every mesh-bearing object into the swap chain pass.
pub struct SimpleRenderSystem {
    pipeline: Pipeline,
    layout: PipelineLayout,
    source: Box<dyn ObjectDataSource>,
    device: Arc<Device>,
}

impl SimpleRenderSystem {
    /// Builds the pipeline for `render_pass`.
    ///
    /// `set_layouts` are sets 0 (global), 1 (frame) and 2 (material).
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
            set_layouts,
            &source.push_constant_ranges(),
        )?;

        let config = PipelineConfig {
            render_pass,
            pipeline_layout: layout.handle(),
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(Arc::clone(&device), &shaders.vertex, &shaders.fragment, &config)?;
        info!("Simple render system ready ({:?})", strategy);

        Ok(Self {
            pipeline,
            layout,
            source,
            device,
        })
    }

    #[inline]
    pub fn strategy(&self) -> ObjectDataStrategy {
        self.source.strategy()
    }

    /// Uploads this frame's object records, if the strategy reads them from
    /// the storage buffer. Call once per frame before any pass draws.
    ///
    /// # Errors
    ///
    /// Returns an error if the scene exceeds the buffer capacity or the
    /// write fails.
    pub fn upload_objects(
        &self,
        resources: &mut FrameResources,
        frame_index: usize,
        world: &World<Mesh>,
    ) -> RenderResult<()> {
        let records = object_records(world.drawables());
        self.source.upload(resources, frame_index, &records)
    }

    /// Records draws for every drawable in `world`.
    ///
    /// The `i`-th drawable in id order uses object slot `i`.
    pub fn render_game_objects(&self, frame: &FrameInfo<'_>, world: &World<Mesh>) {
        let recorder = CommandRecorder::new(&self.device, frame.command_buffer);
        let layout = self.layout.handle();

        self.pipeline.bind(frame.command_buffer);
        recorder.bind_descriptor_sets(layout, 0, &[frame.global_set], &[frame.dynamic_offset]);
        recorder.bind_descriptor_sets(layout, 1, &[frame.object_set], &[]);
        recorder.bind_descriptor_sets(layout, 2, &[frame.material_set], &[]);

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
