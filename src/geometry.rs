// Fixed quad geometry
//
// Two triangles covering clip space, one color per corner. Uploaded once per
// pipeline generation into host-visible vertex and index buffers.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Interleaved vertex: position followed by color, 6 floats total.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub color: Vec3,
}

impl Vertex {
    pub const fn new(position: Vec3, color: Vec3) -> Self {
        Self { position, color }
    }
}

pub static QUAD_VERTICES: [Vertex; 4] = [
    Vertex::new(Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, 0.0, 0.0)),
    Vertex::new(Vec3::new(-1.0, 1.0, 0.0), Vec3::new(0.0, 1.0, 0.0)),
    Vertex::new(Vec3::new(1.0, 1.0, 0.0), Vec3::new(0.0, 0.0, 1.0)),
    Vertex::new(Vec3::new(1.0, -1.0, 0.0), Vec3::new(0.0, 1.0, 0.0)),
];

pub static QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// Raw bytes of the quad vertices as they land in GPU memory.
pub fn quad_vertex_bytes() -> &'static [u8] {
    bytemuck::cast_slice(&QUAD_VERTICES)
}

pub fn quad_index_bytes() -> &'static [u8] {
    bytemuck::cast_slice(&QUAD_INDICES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_six_packed_floats() {
        assert_eq!(std::mem::size_of::<Vertex>(), 6 * std::mem::size_of::<f32>());
        assert_eq!(quad_vertex_bytes().len(), 4 * 24);
        assert_eq!(quad_index_bytes().len(), 6 * 2);
    }

    #[test]
    fn indices_form_two_triangles_over_all_corners() {
        assert_eq!(QUAD_INDICES.len() % 3, 0);
        for corner in 0..QUAD_VERTICES.len() as u16 {
            assert!(QUAD_INDICES.contains(&corner));
        }
    }

    #[test]
    fn color_follows_position_in_memory() {
        let floats: &[f32] = bytemuck::cast_slice(&QUAD_VERTICES[..1]);
        assert_eq!(floats, &[-1.0, -1.0, 0.0, 1.0, 0.0, 0.0]);
    }
}
