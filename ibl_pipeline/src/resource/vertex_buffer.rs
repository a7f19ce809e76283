/// Vertex/index buffers and their layout objects

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::device::{
    BufferId, BufferUsage, GraphicsDevice, IndexType, PrimitiveTopology, VertexArrayDesc,
    VertexArrayId, VertexAttribute, VertexFormat, VertexLayout,
};
use crate::error::{Error, Result};
use crate::ibl_debug;
use crate::resource::{Mesh, Vertex};

/// GPU geometry descriptor
///
/// `num_elements` is the index count for indexed geometry and the vertex
/// count otherwise. Deleting zeroes the descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexBuffer {
    pub vbo: BufferId,
    pub ibo: Option<BufferId>,
    pub vao: VertexArrayId,
    pub num_elements: u32,
    pub topology: PrimitiveTopology,
}

impl VertexBuffer {
    pub fn is_null(&self) -> bool {
        self.vao == VertexArrayId::default() && self.vbo == BufferId::default()
    }
}

/// Clip-space quad vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: Vec2,
    pub texcoord: Vec2,
}

/// Layout of [`Vertex`]: position, normal, tangent, bitangent, texcoord
pub fn mesh_vertex_layout() -> VertexLayout {
    let attribute = |location: u32, format: VertexFormat, offset: u32| VertexAttribute { location, format, offset };
    VertexLayout {
        stride: std::mem::size_of::<Vertex>() as u32,
        attributes: vec![
            attribute(0, VertexFormat::Float3, 0),
            attribute(1, VertexFormat::Float3, 12),
            attribute(2, VertexFormat::Float3, 24),
            attribute(3, VertexFormat::Float3, 36),
            attribute(4, VertexFormat::Float2, 48),
        ],
    }
}

/// Layout of [`QuadVertex`]: position, texcoord
pub fn quad_vertex_layout() -> VertexLayout {
    VertexLayout {
        stride: std::mem::size_of::<QuadVertex>() as u32,
        attributes: vec![
            VertexAttribute { location: 0, format: VertexFormat::Float2, offset: 0 },
            VertexAttribute { location: 1, format: VertexFormat::Float2, offset: 8 },
        ],
    }
}

/// Upload `mesh` as an indexed triangle list
///
/// # Errors
///
/// `Error::InvalidResource` for an empty mesh or a face index out of range.
/// Buffers created before a failure are released.
pub fn create_vertex_buffer(device: &mut dyn GraphicsDevice, mesh: &Mesh) -> Result<VertexBuffer> {
    if mesh.vertices.is_empty() || mesh.faces.is_empty() {
        return Err(Error::InvalidResource("create_vertex_buffer: empty mesh".to_string()));
    }
    let vertex_count = mesh.vertices.len() as u32;
    if let Some(face) = mesh.faces.iter().find(|f| f.iter().any(|&i| i >= vertex_count)) {
        return Err(Error::InvalidResource(format!(
            "create_vertex_buffer: face {:?} references a vertex beyond {}",
            face, vertex_count
        )));
    }

    let vbo = device.create_buffer(BufferUsage::Vertex, bytemuck::cast_slice(&mesh.vertices))?;
    let ibo = match device.create_buffer(BufferUsage::Index, bytemuck::cast_slice(&mesh.faces)) {
        Ok(id) => id,
        Err(e) => {
            device.destroy_buffer(vbo);
            return Err(e);
        }
    };
    let vao = match device.create_vertex_array(&VertexArrayDesc {
        vertex_buffer: vbo,
        index_buffer: Some((ibo, IndexType::U32)),
        layout: mesh_vertex_layout(),
    }) {
        Ok(id) => id,
        Err(e) => {
            device.destroy_buffer(ibo);
            device.destroy_buffer(vbo);
            return Err(e);
        }
    };

    ibl_debug!(
        "ibl::resource",
        "Created vertex buffer: {} vertices, {} faces",
        vertex_count,
        mesh.faces.len()
    );

    Ok(VertexBuffer {
        vbo,
        ibo: Some(ibo),
        vao,
        num_elements: mesh.index_count() as u32,
        topology: PrimitiveTopology::TriangleList,
    })
}

/// Corners of clip space in triangle strip order, `texcoord = (position + 1) / 2`
pub fn clip_space_quad_vertices() -> [QuadVertex; 4] {
    [
        Vec2::new(1.0, 1.0),
        Vec2::new(1.0, -1.0),
        Vec2::new(-1.0, 1.0),
        Vec2::new(-1.0, -1.0),
    ]
    .map(|position| QuadVertex { position, texcoord: (position + Vec2::ONE) * 0.5 })
}

/// Four-vertex triangle strip covering clip space `[-1,1] x [-1,1]`
pub fn create_clip_space_quad(device: &mut dyn GraphicsDevice) -> Result<VertexBuffer> {
    let vertices = clip_space_quad_vertices();

    let vbo = device.create_buffer(BufferUsage::Vertex, bytemuck::cast_slice(&vertices))?;
    let vao = match device.create_vertex_array(&VertexArrayDesc {
        vertex_buffer: vbo,
        index_buffer: None,
        layout: quad_vertex_layout(),
    }) {
        Ok(id) => id,
        Err(e) => {
            device.destroy_buffer(vbo);
            return Err(e);
        }
    };

    Ok(VertexBuffer {
        vbo,
        ibo: None,
        vao,
        num_elements: vertices.len() as u32,
        topology: PrimitiveTopology::TriangleStrip,
    })
}

/// Release vertex buffer, index buffer and layout, then zero the descriptor
pub fn delete_vertex_buffer(device: &mut dyn GraphicsDevice, buffer: &mut VertexBuffer) {
    if buffer.is_null() {
        return;
    }
    device.destroy_vertex_array(buffer.vao);
    if let Some(ibo) = buffer.ibo.take() {
        device.destroy_buffer(ibo);
    }
    device.destroy_buffer(buffer.vbo);

    buffer.vao = VertexArrayId::default();
    buffer.vbo = BufferId::default();
    buffer.num_elements = 0;
}

#[cfg(test)]
#[path = "vertex_buffer_tests.rs"]
mod tests;
