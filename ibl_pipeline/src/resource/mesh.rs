/// Triangle meshes handed to the resource manager

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// One mesh vertex
///
/// Uploaded interleaved in declaration order; locations 0..=4.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tangent: Vec3,
    pub bitangent: Vec3,
    pub texcoord: Vec2,
}

impl Vertex {
    /// Vertex with only a position (tangent frame and texcoord zeroed)
    pub fn at(position: Vec3) -> Self {
        Self { position, ..Self::zeroed() }
    }
}

/// Indexed triangle mesh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub faces: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, faces: Vec<[u32; 3]>) -> Self {
        Self { vertices, faces }
    }

    /// Number of indices (3 per face)
    pub fn index_count(&self) -> usize {
        self.faces.len() * 3
    }

    /// Unit cube centered on the origin, faces wound counter-clockwise
    /// when seen from outside
    pub fn unit_cube() -> Self {
        let corners = [
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(1.0, -1.0, -1.0),
            Vec3::new(1.0, 1.0, -1.0),
            Vec3::new(-1.0, 1.0, -1.0),
            Vec3::new(-1.0, -1.0, 1.0),
            Vec3::new(1.0, -1.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(-1.0, 1.0, 1.0),
        ];
        let faces = vec![
            [0, 3, 2], [0, 2, 1], // -Z
            [4, 5, 6], [4, 6, 7], // +Z
            [0, 4, 7], [0, 7, 3], // -X
            [1, 2, 6], [1, 6, 5], // +X
            [0, 1, 5], [0, 5, 4], // -Y
            [3, 7, 6], [3, 6, 2], // +Y
        ];
        Self::new(corners.iter().copied().map(Vertex::at).collect(), faces)
    }
}
