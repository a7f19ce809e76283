/// Decoded images handed to the resource manager

use crate::error::{Error, Result};

/// Pixel components of a decoded image
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    /// 8-bit components (LDR)
    U8(Vec<u8>),
    /// 32-bit float components (HDR)
    F32(Vec<f32>),
}

impl PixelData {
    /// Number of components stored
    pub fn len(&self) -> usize {
        match self {
            PixelData::U8(v) => v.len(),
            PixelData::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decoded 2D image, rows top to bottom, components interleaved
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    /// Components per pixel (1..=4)
    pub channels: u32,
    pub pixels: PixelData,
}

impl Image {
    /// Create an image, checking that the data matches the dimensions
    pub fn new(width: u32, height: u32, channels: u32, pixels: PixelData) -> Result<Self> {
        if width == 0 || height == 0 || !(1..=4).contains(&channels) {
            return Err(Error::InvalidResource(format!(
                "image {}x{} with {} channels",
                width, height, channels
            )));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|count| count.checked_mul(channels as usize))
            .ok_or_else(|| {
                Error::InvalidResource(format!("image {}x{}x{} is too large", width, height, channels))
            })?;
        if pixels.len() != expected {
            return Err(Error::InvalidResource(format!(
                "image data has {} components, expected {}",
                pixels.len(),
                expected
            )));
        }
        Ok(Self { width, height, channels, pixels })
    }

    /// 8-bit image
    pub fn from_u8(width: u32, height: u32, channels: u32, data: Vec<u8>) -> Result<Self> {
        Self::new(width, height, channels, PixelData::U8(data))
    }

    /// Float (HDR) image
    pub fn from_f32(width: u32, height: u32, channels: u32, data: Vec<f32>) -> Result<Self> {
        Self::new(width, height, channels, PixelData::F32(data))
    }

    pub fn is_hdr(&self) -> bool {
        matches!(self.pixels, PixelData::F32(_))
    }
}

/// Six cube faces in +X, -X, +Y, -Y, +Z, -Z order
#[derive(Debug, Clone, PartialEq)]
pub struct CubeImage {
    pub faces: [Image; 6],
}

impl CubeImage {
    /// Create a cube image; faces must be square and equally sized
    pub fn new(faces: [Image; 6]) -> Result<Self> {
        let size = faces[0].width;
        let channels = faces[0].channels;
        let hdr = faces[0].is_hdr();
        for (index, face) in faces.iter().enumerate() {
            if face.width != size || face.height != size || face.channels != channels || face.is_hdr() != hdr {
                return Err(Error::InvalidResource(format!(
                    "cube face {} is {}x{}x{}, expected {}x{}x{}",
                    index, face.width, face.height, face.channels, size, size, channels
                )));
            }
        }
        Ok(Self { faces })
    }

    /// Edge length of every face
    pub fn size(&self) -> u32 {
        self.faces[0].width
    }
}

#[cfg(test)]
#[path = "image_tests.rs"]
mod tests;
