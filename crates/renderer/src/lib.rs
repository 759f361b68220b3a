//! Frame lifecycle and render systems.
//!
//! [`Renderer`] drives acquire, record and present over a [`FrameBackend`];
//! [`VulkanBackend`] is the swap chain implementation. [`FrameResources`]
//! holds the per-slot buffers and descriptor sets the systems in
//! [`systems`] bind.

mod backend;
mod error;
mod frame;
mod frame_info;
mod frame_resources;
mod gpu_data;
mod renderer;
mod shadow_map;
pub mod systems;

pub use backend::{CLEAR_DEPTH, FrameBackend, RenderPassTarget, VulkanBackend};
pub use error::{RenderError, RenderResult};
pub use frame::{FinishedFrame, FrameCycle};
pub use frame_info::FrameInfo;
pub use frame_resources::{FrameLimits, FrameResources, frame_bindings, global_bindings, material_bindings};
pub use gpu_data::{GlobalUbo, ObjectData, PointLightData, PointLightPushConstants, object_records};
pub use renderer::Renderer;
pub use shadow_map::{DEFAULT_SHADOW_MAP_SIZE, ShadowMap, light_camera};
pub use systems::{
    ObjectDataStrategy, PointLightSystem, ShaderPaths, ShadowRenderSystem, SimpleRenderSystem,
};
