/// Resource module - GPU resource manager
///
/// Free functions that create and destroy GPU resources on a
/// `GraphicsDevice`. Descriptors are owned by the caller; nothing here
/// keeps state of its own.

pub mod image;
pub mod mesh;
pub mod pixel;
pub mod texture;
pub mod frame_buffer;
pub mod vertex_buffer;

pub use image::*;
pub use mesh::*;
pub use texture::*;
pub use frame_buffer::*;
pub use vertex_buffer::*;
