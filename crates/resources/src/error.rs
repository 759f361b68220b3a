//! Error types for resource loading.

use std::path::PathBuf;

use orbit_rhi::RhiError;
use thiserror::Error;

/// Error type for resource loading operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// GPU buffer, image or sampler creation failed.
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error("Failed to load OBJ file '{path}': {source}")]
    ObjLoad {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },

    #[error("Failed to load glTF file '{path}': {source}")]
    GltfLoad {
        path: PathBuf,
        #[source]
        source: gltf::Error,
    },

    /// glTF file contains no meshes.
    #[error("glTF file '{0}' contains no meshes")]
    NoMeshes(PathBuf),

    /// A mesh primitive has no position data.
    #[error("Mesh primitive has no position data")]
    NoPositionData,

    /// Fewer than three vertices, nothing to draw.
    #[error("Mesh needs at least 3 vertices, got {0}")]
    TooFewVertices(usize),

    #[error("Unsupported mesh format: '{0}'")]
    UnsupportedFormat(PathBuf),

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
