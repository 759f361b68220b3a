//! Resource loading for orbit.
//!
//! - [`MeshBuilder`] builds meshes in code or loads OBJ and glTF files
//! - [`Mesh`] holds them in device-local vertex and index buffers
//! - [`Texture`] decodes PNG/JPEG images into sampled GPU images

mod error;
pub mod mesh;
pub mod texture;

pub use error::{ResourceError, ResourceResult};
pub use mesh::{Mesh, MeshBuilder};
pub use texture::Texture;
