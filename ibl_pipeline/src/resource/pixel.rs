/// CPU repacking of decoded pixels into GPU texel layouts
///
/// Uploads always carry the exact byte layout of the texture's internal
/// format. Missing color components are filled with zero and a missing
/// alpha component with one.

use half::f16;

use crate::device::{ComponentType, PixelFormat, TextureFormat};
use crate::error::{Error, Result};
use crate::resource::{Image, PixelData};

/// Convert `image` (interpreted as `pixel_format`) into texels of `internal`
///
/// # Errors
///
/// `Error::UnsupportedFormat` when the image channel count differs from
/// `pixel_format`, when `internal` has fewer components than
/// `pixel_format`, or when 8-bit data targets a float format (or the
/// reverse).
pub fn repack(image: &Image, pixel_format: PixelFormat, internal: TextureFormat) -> Result<Vec<u8>> {
    let src_components = pixel_format.components();
    if image.channels != src_components {
        return Err(Error::UnsupportedFormat(format!(
            "image has {} channels but pixel format {:?} expects {}",
            image.channels, pixel_format, src_components
        )));
    }

    let Some(component_type) = internal.component_type() else {
        return Err(Error::UnsupportedFormat(format!(
            "{:?} cannot be uploaded from pixel data",
            internal
        )));
    };
    let dst_components = internal.components();
    if dst_components < src_components {
        return Err(Error::UnsupportedFormat(format!(
            "pixel format {:?} does not fit into {:?}",
            pixel_format, internal
        )));
    }

    let swizzle = matches!(internal, TextureFormat::BGRA8_UNORM | TextureFormat::BGRA8_SRGB);
    let pixel_count = image.pixels.len() / src_components as usize;
    let mut out = Vec::with_capacity(pixel_count * internal.bytes_per_pixel() as usize);

    match (&image.pixels, component_type) {
        (PixelData::U8(data), ComponentType::Unorm8) => {
            for texel in data.chunks_exact(src_components as usize) {
                let mut rgba = [0u8, 0, 0, u8::MAX];
                rgba[..texel.len()].copy_from_slice(texel);
                if swizzle {
                    rgba.swap(0, 2);
                }
                out.extend_from_slice(&rgba[..dst_components as usize]);
            }
        }
        (PixelData::F32(data), ComponentType::Float16 | ComponentType::Float32) => {
            for texel in data.chunks_exact(src_components as usize) {
                let mut rgba = [0.0f32, 0.0, 0.0, 1.0];
                rgba[..texel.len()].copy_from_slice(texel);
                for &value in &rgba[..dst_components as usize] {
                    if component_type == ComponentType::Float16 {
                        out.extend_from_slice(&f16::from_f32(value).to_le_bytes());
                    } else {
                        out.extend_from_slice(&value.to_le_bytes());
                    }
                }
            }
        }
        (pixels, _) => {
            let source = if matches!(pixels, PixelData::U8(_)) { "8-bit" } else { "float" };
            return Err(Error::UnsupportedFormat(format!(
                "{} image data cannot be uploaded to {:?}",
                source, internal
            )));
        }
    }

    Ok(out)
}

#[cfg(test)]
#[path = "pixel_tests.rs"]
mod tests;
