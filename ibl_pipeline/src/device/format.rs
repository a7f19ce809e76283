/// Texture formats, pixel (upload) formats and shader stages

/// GPU-side texture storage format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum TextureFormat {
    R8_UNORM,
    RG8_UNORM,
    RGBA8_UNORM,
    RGBA8_SRGB,
    BGRA8_UNORM,
    BGRA8_SRGB,
    R16_SFLOAT,
    RG16_SFLOAT,
    RGBA16_SFLOAT,
    R32_SFLOAT,
    RG32_SFLOAT,
    RGBA32_SFLOAT,
    D32_SFLOAT,
    D24_UNORM_S8_UINT,
    D32_SFLOAT_S8_UINT,
}

/// Storage type of a single color component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    /// 8-bit normalized integer
    Unorm8,
    /// 16-bit float
    Float16,
    /// 32-bit float
    Float32,
}

impl ComponentType {
    /// Size of one component in bytes
    pub fn size(self) -> u32 {
        match self {
            ComponentType::Unorm8 => 1,
            ComponentType::Float16 => 2,
            ComponentType::Float32 => 4,
        }
    }

    /// True for the floating point storage types
    pub fn is_float(self) -> bool {
        !matches!(self, ComponentType::Unorm8)
    }
}

impl TextureFormat {
    /// Number of color components (0 for depth formats)
    pub fn components(self) -> u32 {
        match self {
            TextureFormat::R8_UNORM | TextureFormat::R16_SFLOAT | TextureFormat::R32_SFLOAT => 1,
            TextureFormat::RG8_UNORM | TextureFormat::RG16_SFLOAT | TextureFormat::RG32_SFLOAT => 2,
            TextureFormat::RGBA8_UNORM
            | TextureFormat::RGBA8_SRGB
            | TextureFormat::BGRA8_UNORM
            | TextureFormat::BGRA8_SRGB
            | TextureFormat::RGBA16_SFLOAT
            | TextureFormat::RGBA32_SFLOAT => 4,
            TextureFormat::D32_SFLOAT
            | TextureFormat::D24_UNORM_S8_UINT
            | TextureFormat::D32_SFLOAT_S8_UINT => 0,
        }
    }

    /// Component storage type, `None` for depth formats
    pub fn component_type(self) -> Option<ComponentType> {
        match self {
            TextureFormat::R8_UNORM
            | TextureFormat::RG8_UNORM
            | TextureFormat::RGBA8_UNORM
            | TextureFormat::RGBA8_SRGB
            | TextureFormat::BGRA8_UNORM
            | TextureFormat::BGRA8_SRGB => Some(ComponentType::Unorm8),
            TextureFormat::R16_SFLOAT
            | TextureFormat::RG16_SFLOAT
            | TextureFormat::RGBA16_SFLOAT => Some(ComponentType::Float16),
            TextureFormat::R32_SFLOAT
            | TextureFormat::RG32_SFLOAT
            | TextureFormat::RGBA32_SFLOAT => Some(ComponentType::Float32),
            TextureFormat::D32_SFLOAT
            | TextureFormat::D24_UNORM_S8_UINT
            | TextureFormat::D32_SFLOAT_S8_UINT => None,
        }
    }

    /// Bytes per texel
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            TextureFormat::D32_SFLOAT | TextureFormat::D24_UNORM_S8_UINT => 4,
            TextureFormat::D32_SFLOAT_S8_UINT => 8,
            color => color.components() * color.component_type().map_or(0, ComponentType::size),
        }
    }

    /// True for depth and depth/stencil formats
    pub fn is_depth(self) -> bool {
        self.components() == 0
    }

    /// True if the format carries a stencil aspect
    pub fn has_stencil(self) -> bool {
        matches!(self, TextureFormat::D24_UNORM_S8_UINT | TextureFormat::D32_SFLOAT_S8_UINT)
    }

    /// True for sRGB-encoded formats
    pub fn is_srgb(self) -> bool {
        matches!(self, TextureFormat::RGBA8_SRGB | TextureFormat::BGRA8_SRGB)
    }
}

/// Channel layout of CPU pixel data handed to an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    R,
    RG,
    RGB,
    RGBA,
}

impl PixelFormat {
    /// Number of channels in this layout
    pub fn components(self) -> u32 {
        match self {
            PixelFormat::R => 1,
            PixelFormat::RG => 2,
            PixelFormat::RGB => 3,
            PixelFormat::RGBA => 4,
        }
    }

    /// Layout matching a channel count (1..=4)
    pub fn from_channels(channels: u32) -> Option<Self> {
        match channels {
            1 => Some(PixelFormat::R),
            2 => Some(PixelFormat::RG),
            3 => Some(PixelFormat::RGB),
            4 => Some(PixelFormat::RGBA),
            _ => None,
        }
    }
}

/// Shader pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

#[cfg(test)]
#[path = "format_tests.rs"]
mod tests;
