/// Device module - backend capability interface and shared GPU types

pub mod format;
pub mod graphics_device;
#[cfg(test)]
pub mod mock_device;

pub use format::*;
pub use graphics_device::*;
