//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No GPU satisfies the renderer's requirements
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// None of the candidate formats supports the requested features
    #[error("No supported format among {0} candidate(s)")]
    UnsupportedFormat(usize),

    /// Shader loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Swap chain creation error
    #[error("Swap chain error: {0}")]
    SwapchainError(String),

    /// The rebuilt swap chain uses different color or depth formats than the
    /// one it replaced, so pipelines built against the old render pass are stale.
    #[error("Swap chain image or depth format changed across rebuild")]
    SwapchainFormatChanged,

    /// A descriptor pool has no room left for another set.
    #[error("Descriptor pool exhausted")]
    DescriptorPoolExhausted,

    /// Invalid handle or resource misuse
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
