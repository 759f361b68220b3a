//! Meshes: CPU-side building and GPU-resident vertex/index buffers.
//!
//! [`MeshBuilder`] collects vertices and indices from code (cube, quad) or
//! from OBJ and glTF files. [`Mesh`] uploads a builder into device-local
//! buffers and records bind/draw commands.
//!
//! Both file formats are authored Y-up with the viewer on +Z. On load they
//! are turned 180° about X into orbit's Y-down, +Z-forward world, so a model
//! stands upright and faces a camera placed on its -Z side.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use glam::{Vec2, Vec3};
use orbit_rhi::buffer::Buffer;
use orbit_rhi::command::CommandRecorder;
use orbit_rhi::device::Device;
use orbit_rhi::vertex::Vertex;
use tracing::{debug, info, warn};

use crate::error::{ResourceError, ResourceResult};

/// Vertices and optional indices ready for upload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshBuilder {
    pub vertices: Vec<Vertex>,
    /// Triangle list indices. Empty means non-indexed drawing.
    pub indices: Vec<u32>,
}

impl MeshBuilder {
    /// Loads a mesh file, choosing the loader from the extension
    /// (`obj`, `gltf` or `glb`).
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::FileNotFound`] for a missing file,
    /// [`ResourceError::UnsupportedFormat`] for other extensions, and the
    /// loader's error otherwise.
    pub fn from_file(path: impl AsRef<Path>) -> ResourceResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let builder = match extension.as_deref() {
            Some("obj") => Self::load_obj(path)?,
            Some("gltf" | "glb") => Self::load_gltf(path)?,
            _ => return Err(ResourceError::UnsupportedFormat(path.to_path_buf())),
        };

        info!(
            "Loaded mesh {:?}: {} vertices, {} indices",
            path,
            builder.vertices.len(),
            builder.indices.len()
        );
        Ok(builder)
    }

    /// Loads every model of an OBJ file into one mesh, merging identical
    /// vertices.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::ObjLoad`] if the file cannot be parsed.
    pub fn load_obj(path: impl AsRef<Path>) -> ResourceResult<Self> {
        let path = path.as_ref();
        let (models, _materials) =
            tobj::load_obj(path, &tobj::GPU_LOAD_OPTIONS).map_err(|source| {
                ResourceError::ObjLoad {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
        Self::from_obj_models(&models)
    }

    /// Builds a mesh from already parsed OBJ models.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NoPositionData`] if an index points past
    /// the position array.
    pub fn from_obj_models(models: &[tobj::Model]) -> ResourceResult<Self> {
        let mut builder = Self::default();
        let mut unique = HashMap::new();

        for model in models {
            let mesh = &model.mesh;
            for &index in &mesh.indices {
                let i = index as usize;
                let position = vec3_at(&mesh.positions, i).ok_or(ResourceError::NoPositionData)?;
                let color = vec3_at(&mesh.vertex_color, i).unwrap_or(Vec3::ONE);
                let normal = vec3_at(&mesh.normals, i).unwrap_or(Vec3::ZERO);
                let uv = mesh
                    .texcoords
                    .get(2 * i..2 * i + 2)
                    .map_or(Vec2::ZERO, |t| Vec2::new(t[0], 1.0 - t[1]));

                builder.push_unique(
                    &mut unique,
                    Vertex::new(to_world_axes(position), color, to_world_axes(normal), uv),
                );
            }
        }

        debug!(
            "OBJ: {} unique vertices for {} indices",
            builder.vertices.len(),
            builder.indices.len()
        );
        Ok(builder)
    }

    /// Loads all triangle primitives of a glTF or GLB file into one mesh.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::GltfLoad`] if the file cannot be imported,
    /// [`ResourceError::NoMeshes`] if it has no meshes, and
    /// [`ResourceError::NoPositionData`] for a primitive without positions.
    pub fn load_gltf(path: impl AsRef<Path>) -> ResourceResult<Self> {
        let path = path.as_ref();
        let (document, buffers, _images) =
            gltf::import(path).map_err(|source| ResourceError::GltfLoad {
                path: path.to_path_buf(),
                source,
            })?;

        if document.meshes().len() == 0 {
            return Err(ResourceError::NoMeshes(path.to_path_buf()));
        }

        let mut builder = Self::default();
        for mesh in document.meshes() {
            for primitive in mesh.primitives() {
                if primitive.mode() != gltf::mesh::Mode::Triangles {
                    warn!(
                        "Skipping {:?} primitive in mesh {:?}",
                        primitive.mode(),
                        mesh.name()
                    );
                    continue;
                }

                let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
                let positions: Vec<Vec3> = reader
                    .read_positions()
                    .ok_or(ResourceError::NoPositionData)?
                    .map(Vec3::from)
                    .collect();
                let mut normals = reader.read_normals().map(|n| n.map(Vec3::from));
                let mut uvs = reader
                    .read_tex_coords(0)
                    .map(|t| t.into_f32().map(Vec2::from));
                let mut colors = reader
                    .read_colors(0)
                    .map(|c| c.into_rgb_f32().map(Vec3::from));

                let base = builder.vertices.len() as u32;
                for position in &positions {
                    let normal = normals.as_mut().and_then(Iterator::next).unwrap_or(Vec3::ZERO);
                    let uv = uvs.as_mut().and_then(Iterator::next).unwrap_or(Vec2::ZERO);
                    let color = colors.as_mut().and_then(Iterator::next).unwrap_or(Vec3::ONE);
                    builder.vertices.push(Vertex::new(
                        to_world_axes(*position),
                        color,
                        to_world_axes(normal),
                        uv,
                    ));
                }

                match reader.read_indices() {
                    Some(indices) => builder
                        .indices
                        .extend(indices.into_u32().map(|index| base + index)),
                    None => builder
                        .indices
                        .extend(base..base + positions.len() as u32),
                }
            }
        }

        Ok(builder)
    }

    /// Unit cube centered on the origin with one color per face.
    pub fn cube() -> Self {
        // (normal, u axis, v axis, color)
        let faces = [
            (Vec3::NEG_X, Vec3::Z, Vec3::Y, Vec3::new(0.9, 0.9, 0.9)),
            (Vec3::X, Vec3::NEG_Z, Vec3::Y, Vec3::new(0.8, 0.8, 0.1)),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z, Vec3::new(0.9, 0.6, 0.1)),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z, Vec3::new(0.8, 0.1, 0.1)),
            (Vec3::Z, Vec3::X, Vec3::Y, Vec3::new(0.1, 0.1, 0.8)),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y, Vec3::new(0.1, 0.8, 0.1)),
        ];

        let mut builder = Self::default();
        for (normal, u, v, color) in faces {
            let base = builder.vertices.len() as u32;
            for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                let position = normal * 0.5 + u * su + v * sv;
                let uv = Vec2::new(su + 0.5, sv + 0.5);
                builder.vertices.push(Vertex::new(position, color, normal, uv));
            }
            builder
                .indices
                .extend([base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        builder
    }

    /// Unit square in the XZ plane facing up (-Y), e.g. a floor.
    pub fn quad() -> Self {
        let corners = [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)];
        let vertices = corners
            .into_iter()
            .map(|(x, z)| {
                Vertex::new(
                    Vec3::new(x, 0.0, z),
                    Vec3::ONE,
                    Vec3::NEG_Y,
                    Vec2::new(x + 0.5, z + 0.5),
                )
            })
            .collect();
        Self {
            vertices,
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    fn push_unique(&mut self, unique: &mut HashMap<[u32; 11], u32>, vertex: Vertex) {
        // Bit patterns as key; f32 has no Eq/Hash.
        let key: [u32; 11] = bytemuck::cast(vertex);
        let index = *unique.entry(key).or_insert_with(|| {
            self.vertices.push(vertex);
            (self.vertices.len() - 1) as u32
        });
        self.indices.push(index);
    }
}

fn vec3_at(data: &[f32], index: usize) -> Option<Vec3> {
    data.get(3 * index..3 * index + 3)
        .map(|v| Vec3::new(v[0], v[1], v[2]))
}

/// Y-up, viewer-on-+Z file axes to orbit world axes.
fn to_world_axes(v: Vec3) -> Vec3 {
    Vec3::new(v.x, -v.y, -v.z)
}

/// GPU-resident mesh.
pub struct Mesh {
    device: Arc<Device>,
    vertex_buffer: Buffer,
    vertex_count: u32,
    index_buffer: Option<Buffer>,
    index_count: u32,
}

impl Mesh {
    /// Uploads `builder` into device-local vertex and index buffers.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::TooFewVertices`] for fewer than three
    /// vertices, or the upload error.
    pub fn from_builder(device: Arc<Device>, builder: &MeshBuilder) -> ResourceResult<Self> {
        let vertex_count = builder.vertices.len();
        if vertex_count < 3 {
            return Err(ResourceError::TooFewVertices(vertex_count));
        }

        let vertex_buffer = Buffer::device_local_with_data(
            Arc::clone(&device),
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&builder.vertices),
        )?;

        let index_buffer = if builder.indices.is_empty() {
            None
        } else {
            Some(Buffer::device_local_with_data(
                Arc::clone(&device),
                vk::BufferUsageFlags::INDEX_BUFFER,
                bytemuck::cast_slice(&builder.indices),
            )?)
        };

        Ok(Self {
            device,
            vertex_buffer,
            vertex_count: vertex_count as u32,
            index_buffer,
            index_count: builder.indices.len() as u32,
        })
    }

    /// Loads and uploads a mesh file. See [`MeshBuilder::from_file`].
    ///
    /// # Errors
    ///
    /// Returns the load or upload error.
    pub fn from_file(device: Arc<Device>, path: impl AsRef<Path>) -> ResourceResult<Self> {
        let builder = MeshBuilder::from_file(path)?;
        Self::from_builder(device, &builder)
    }

    /// Binds the vertex buffer and, if present, the index buffer.
    pub fn bind(&self, cmd: vk::CommandBuffer) {
        let recorder = CommandRecorder::new(&self.device, cmd);
        recorder.bind_vertex_buffer(self.vertex_buffer.handle());
        if let Some(index_buffer) = &self.index_buffer {
            recorder.bind_index_buffer(index_buffer.handle());
        }
    }

    /// Draws one instance. `first_instance` reaches the shader as
    /// `gl_InstanceIndex` and selects the object's storage buffer slot.
    pub fn draw(&self, cmd: vk::CommandBuffer, first_instance: u32) {
        let recorder = CommandRecorder::new(&self.device, cmd);
        if self.index_buffer.is_some() {
            recorder.draw_indexed(self.index_count, 1, first_instance);
        } else {
            recorder.draw(self.vertex_count, 1, 0, first_instance);
        }
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    #[inline]
    pub fn is_indexed(&self) -> bool {
        self.index_buffer.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_cube_faces_point_outward() {
        let cube = MeshBuilder::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        for vertex in &cube.vertices {
            // Every corner lies on the face its normal points out of.
            assert_abs_diff_eq!(vertex.position.dot(vertex.normal), 0.5, epsilon = 1e-6);
            assert_abs_diff_eq!(vertex.position.abs().max_element(), 0.5, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_quad_faces_up() {
        let quad = MeshBuilder::quad();
        assert_eq!(quad.vertices.len(), 4);
        assert!(quad.vertices.iter().all(|v| v.normal == Vec3::NEG_Y && v.position.y == 0.0));
        assert!(quad.indices.iter().all(|&i| (i as usize) < quad.vertices.len()));
    }

    #[test]
    fn test_obj_models_deduplicate_and_convert_axes() {
        let mesh = tobj::Mesh {
            positions: vec![0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0],
            normals: vec![0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0],
            texcoords: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            indices: vec![0, 1, 2, 2, 1, 0],
            ..Default::default()
        };
        let model = tobj::Model::new(mesh, "tri".to_string());
        let builder = MeshBuilder::from_obj_models(&[model]).unwrap();

        assert_eq!(builder.vertices.len(), 3);
        assert_eq!(builder.indices, vec![0, 1, 2, 2, 1, 0]);
        assert_eq!(builder.vertices[0].position, Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(builder.vertices[0].normal, Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(builder.vertices[0].color, Vec3::ONE);
        assert_eq!(builder.vertices[0].uv, Vec2::new(0.0, 1.0));
    }

    #[test]
    fn test_obj_index_out_of_range_is_error() {
        let mesh = tobj::Mesh {
            positions: vec![0.0; 9],
            indices: vec![0, 1, 7],
            ..Default::default()
        };
        let model = tobj::Model::new(mesh, "bad".to_string());
        assert!(matches!(
            MeshBuilder::from_obj_models(&[model]),
            Err(ResourceError::NoPositionData)
        ));
    }

    #[test]
    fn test_from_file_rejects_unknown_extension() {
        let path = std::env::temp_dir().join("orbit_mesh_test.stl");
        std::fs::write(&path, b"solid").unwrap();
        assert!(matches!(
            MeshBuilder::from_file(&path),
            Err(ResourceError::UnsupportedFormat(_))
        ));
        let _ = std::fs::remove_file(&path);

        assert!(matches!(
            MeshBuilder::from_file("missing/model.obj"),
            Err(ResourceError::FileNotFound(_))
        ));
    }
}
