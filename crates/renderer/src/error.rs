//! Renderer error types.

use orbit_resources::ResourceError;
use orbit_rhi::RhiError;
use thiserror::Error;

/// Errors raised while building or recording frames.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// More drawable objects than the per-frame storage buffer holds.
    #[error("{count} objects exceed the per-frame capacity of {capacity}")]
    TooManyObjects { count: usize, capacity: usize },
}

/// Result type alias for renderer operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;
