//! Render systems: one pipeline each, recording draws for a frame.

use std::path::PathBuf;

pub mod object_data;
pub mod point_light;
pub mod shadow;
pub mod simple;

pub use object_data::{ObjectDataSource, ObjectDataStrategy};
pub use point_light::PointLightSystem;
pub use shadow::ShadowRenderSystem;
pub use simple::SimpleRenderSystem;

/// Compiled SPIR-V stages of one pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderPaths {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl ShaderPaths {
    pub fn new(vertex: impl Into<PathBuf>, fragment: impl Into<PathBuf>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }
}
