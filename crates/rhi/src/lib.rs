//! Vulkan abstraction layer (Render Hardware Interface) for orbit.
//!
//! Thin RAII wrappers over `ash`:
//! - instance, physical device selection and logical device
//! - swap chain with frame acquisition and presentation
//! - buffers, images and samplers backed by `gpu-allocator`
//! - descriptor set layouts, pools and writers
//! - render passes, pipelines and command recording
//!
//! Every wrapper holds an `Arc<Device>` so the device outlives the objects
//! created from it.

mod cleanup;
mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
pub use gpu_allocator::MemoryLocation;
