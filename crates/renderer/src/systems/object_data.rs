//! How per-object matrices reach the vertex shader.
//!
//! Small scenes push each object's [`ObjectData`] as push constants right
//! before its draw. Larger scenes upload all records into the frame slot's
//! storage buffer once and select one per draw through `first_instance`.
//! The choice is made once, when a render system is built; draws go through
//! the boxed [`ObjectDataSource`] either way.

use std::mem::size_of;

use ash::vk;
use orbit_rhi::command::CommandRecorder;

use crate::error::RenderResult;
use crate::frame_resources::FrameResources;
use crate::gpu_data::ObjectData;

/// Stages that read per-object push constants.
pub const OBJECT_PUSH_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::VERTEX;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectDataStrategy {
    PushConstants,
    StorageBuffer,
}

impl ObjectDataStrategy {
    /// Push constants up to `threshold` objects, a storage buffer above.
    pub fn for_object_count(count: usize, threshold: usize) -> Self {
        if count > threshold {
            Self::StorageBuffer
        } else {
            Self::PushConstants
        }
    }

    /// Vertex shader variant name, e.g. `simple_push.vert`.
    pub fn vertex_shader(self, base: &str) -> String {
        let variant = match self {
            Self::PushConstants => "push",
            Self::StorageBuffer => "storage",
        };
        format!("{}_{}.vert", base, variant)
    }

    pub fn source(self) -> Box<dyn ObjectDataSource> {
        match self {
            Self::PushConstants => Box::new(PushConstantSource),
            Self::StorageBuffer => Box::new(StorageBufferSource),
        }
    }
}

/// Delivers [`ObjectData`] to draws.
pub trait ObjectDataSource {
    fn strategy(&self) -> ObjectDataStrategy;

    /// Push constant ranges the pipeline layout must declare.
    fn push_constant_ranges(&self) -> Vec<vk::PushConstantRange>;

    /// Makes this frame's records available before any draw.
    fn upload(
        &self,
        resources: &mut FrameResources,
        frame_index: usize,
        records: &[ObjectData],
    ) -> RenderResult<()>;

    /// Records what a draw needs before it is issued.
    fn prepare_draw(
        &self,
        recorder: &CommandRecorder<'_>,
        layout: vk::PipelineLayout,
        record: &ObjectData,
    );

    /// `first_instance` for the draw of object `index`.
    fn first_instance(&self, index: u32) -> u32;
}

struct PushConstantSource;

impl ObjectDataSource for PushConstantSource {
    fn strategy(&self) -> ObjectDataStrategy {
        ObjectDataStrategy::PushConstants
    }

    fn push_constant_ranges(&self) -> Vec<vk::PushConstantRange> {
        vec![
            vk::PushConstantRange::default()
                .stage_flags(OBJECT_PUSH_STAGES)
                .offset(0)
                .size(size_of::<ObjectData>() as u32),
        ]
    }

    fn upload(&self, _: &mut FrameResources, _: usize, _: &[ObjectData]) -> RenderResult<()> {
        Ok(())
    }

    fn prepare_draw(
        &self,
        recorder: &CommandRecorder<'_>,
        layout: vk::PipelineLayout,
        record: &ObjectData,
    ) {
        recorder.push_constants(layout, OBJECT_PUSH_STAGES, record);
    }

    fn first_instance(&self, _index: u32) -> u32 {
        0
    }
}

struct StorageBufferSource;

impl ObjectDataSource for StorageBufferSource {
    fn strategy(&self) -> ObjectDataStrategy {
        ObjectDataStrategy::StorageBuffer
    }

    fn push_constant_ranges(&self) -> Vec<vk::PushConstantRange> {
        Vec::new()
    }

    fn upload(
        &self,
        resources: &mut FrameResources,
        frame_index: usize,
        records: &[ObjectData],
    ) -> RenderResult<()> {
        resources.write_objects(frame_index, records)
    }

    fn prepare_draw(&self, _: &CommandRecorder<'_>, _: vk::PipelineLayout, _: &ObjectData) {}

    fn first_instance(&self, index: u32) -> u32 {
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_switches_above_threshold() {
        assert_eq!(
            ObjectDataStrategy::for_object_count(0, 64),
            ObjectDataStrategy::PushConstants
        );
        assert_eq!(
            ObjectDataStrategy::for_object_count(64, 64),
            ObjectDataStrategy::PushConstants
        );
        assert_eq!(
            ObjectDataStrategy::for_object_count(65, 64),
            ObjectDataStrategy::StorageBuffer
        );
    }

    #[test]
    fn test_push_constants_fit_guaranteed_limit() {
        let source = ObjectDataStrategy::PushConstants.source();
        let ranges = source.push_constant_ranges();
        assert_eq!(ranges.len(), 1);
        // 128 bytes is the minimum maxPushConstantsSize.
        assert!(ranges[0].size <= 128);
        assert_eq!(source.first_instance(7), 0);
    }

    #[test]
    fn test_storage_buffer_selects_by_instance() {
        let source = ObjectDataStrategy::StorageBuffer.source();
        assert!(source.push_constant_ranges().is_empty());
        assert_eq!(source.first_instance(7), 7);
        assert_eq!(source.strategy(), ObjectDataStrategy::StorageBuffer);
    }

    #[test]
    fn test_vertex_shader_variants() {
        assert_eq!(
            ObjectDataStrategy::PushConstants.vertex_shader("simple"),
            "simple_push.vert"
        );
        assert_eq!(
            ObjectDataStrategy::StorageBuffer.vertex_shader("shadow"),
            "shadow_storage.vert"
        );
    }
}
