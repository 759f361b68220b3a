//! Mesh vertex format and its vertex input description.
//!
//! # Memory Layout
//!
//! - Offset 0: position (12 bytes)
//! - Offset 12: color (12 bytes)
//! - Offset 24: normal (12 bytes)
//! - Offset 36: uv (8 bytes)
//! - Total size: 44 bytes
//!
//! Shader locations follow field order: `position` at 0 through `uv` at 3.

use std::mem::offset_of;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Vertex shared by every mesh pipeline.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position.
    pub position: Vec3,
    /// Per-vertex color, multiplied with the texture.
    pub color: Vec3,
    /// Object-space normal.
    pub normal: Vec3,
    /// Texture coordinates.
    pub uv: Vec2,
}

impl Vertex {
    #[inline]
    pub const fn new(position: Vec3, color: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position,
            color,
            normal,
            uv,
        }
    }

    /// Binding 0, per-vertex rate.
    pub fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        let attribute = |location: u32, format: vk::Format, offset: usize| {
            vk::VertexInputAttributeDescription {
                binding: 0,
                location,
                format,
                offset: offset as u32,
            }
        };
        vec![
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, position)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, color)),
            attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, normal)),
            attribute(3, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, uv)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_size() {
        assert_eq!(std::mem::size_of::<Vertex>(), 44);
    }

    #[test]
    fn test_vertex_binding_description() {
        let bindings = Vertex::binding_descriptions();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].stride, 44);
        assert_eq!(bindings[0].input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_vertex_attribute_offsets() {
        let attrs = Vertex::attribute_descriptions();
        let offsets: Vec<u32> = attrs.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24, 36]);
        assert_eq!(attrs[3].format, vk::Format::R32G32_SFLOAT);
        for (location, attr) in attrs.iter().enumerate() {
            assert_eq!(attr.location, location as u32);
        }
    }

    #[test]
    fn test_vertex_is_pod() {
        let vertex = Vertex::new(Vec3::X, Vec3::ONE, Vec3::NEG_Y, Vec2::new(0.5, 1.0));
        let bytes: &[u8] = bytemuck::bytes_of(&vertex);
        assert_eq!(bytes.len(), 44);
        let back: Vertex = *bytemuck::from_bytes(bytes);
        assert_eq!(back, vertex);
    }
}
