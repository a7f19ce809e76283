/// Texture creation, upload, mip generation and deletion

use crate::device::{
    GraphicsDevice, PixelFormat, TextureDesc, TextureFormat, TextureId, TextureKind, TextureUsage,
};
use crate::error::{Error, Result};
use crate::resource::{pixel, CubeImage, Image};
use crate::{ibl_debug, ibl_warn};

/// GPU texture descriptor
///
/// Deleting a texture zeroes its descriptor (null id, zero size).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture {
    pub id: TextureId,
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    /// Resolved mip level count (>= 1 while alive)
    pub levels: u32,
    pub format: TextureFormat,
    /// Levels 1.. have been generated
    pub mipmaps_generated: bool,
}

impl Texture {
    /// True once the texture has been deleted (or never created)
    pub fn is_null(&self) -> bool {
        self.id == TextureId::default()
    }

    fn zero(&mut self) {
        self.id = TextureId::default();
        self.width = 0;
        self.height = 0;
        self.levels = 0;
        self.mipmaps_generated = false;
    }
}

/// Full mip chain length: `floor(log2(max(width, height))) + 1`
///
/// A zero dimension counts as 1, so the result is always >= 1.
pub fn compute_mip_levels(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

fn resolve_levels(width: u32, height: u32, levels: u32) -> u32 {
    if levels > 0 {
        levels
    } else {
        compute_mip_levels(width, height)
    }
}

fn allocate(device: &mut dyn GraphicsDevice, desc: TextureDesc) -> Result<Texture> {
    let id = device.create_texture(&desc)?;
    ibl_debug!(
        "ibl::resource",
        "Created {:?} texture {}x{} {:?} ({} levels)",
        desc.kind,
        desc.width,
        desc.height,
        desc.format,
        desc.levels
    );
    Ok(Texture {
        id,
        kind: desc.kind,
        width: desc.width,
        height: desc.height,
        levels: desc.levels,
        format: desc.format,
        mipmaps_generated: false,
    })
}

/// Allocate an empty 2D texture usable as a sampled image and a color attachment
///
/// `levels == 0` allocates the full mip chain.
pub fn create_texture(
    device: &mut dyn GraphicsDevice,
    width: u32,
    height: u32,
    format: TextureFormat,
    levels: u32,
) -> Result<Texture> {
    allocate(
        device,
        TextureDesc {
            kind: TextureKind::Tex2D,
            width,
            height,
            format,
            levels: resolve_levels(width, height, levels),
            usage: TextureUsage::SAMPLED | TextureUsage::COLOR_ATTACHMENT,
        },
    )
}

/// Allocate an empty cube texture whose faces are `size` x `size`
pub fn create_cube_texture(
    device: &mut dyn GraphicsDevice,
    size: u32,
    format: TextureFormat,
    levels: u32,
) -> Result<Texture> {
    allocate(
        device,
        TextureDesc {
            kind: TextureKind::Cube,
            width: size,
            height: size,
            format,
            levels: resolve_levels(size, size, levels),
            usage: TextureUsage::SAMPLED | TextureUsage::UPLOAD,
        },
    )
}

/// Allocate a 2D texture and upload `image` into level 0
///
/// Higher levels stay uninitialized until [`generate_texture_mipmaps`].
///
/// # Errors
///
/// `Error::UnsupportedFormat` if the image cannot be repacked as
/// `pixel_format` into `format`. Nothing is allocated in that case.
pub fn create_texture_from_image(
    device: &mut dyn GraphicsDevice,
    image: &Image,
    pixel_format: PixelFormat,
    format: TextureFormat,
    levels: u32,
) -> Result<Texture> {
    let texels = pixel::repack(image, pixel_format, format)?;

    let mut texture = allocate(
        device,
        TextureDesc {
            kind: TextureKind::Tex2D,
            width: image.width,
            height: image.height,
            format,
            levels: resolve_levels(image.width, image.height, levels),
            usage: TextureUsage::SAMPLED | TextureUsage::UPLOAD,
        },
    )?;

    if let Err(e) = device.upload_texture(texture.id, 0, &texels) {
        delete_texture(device, &mut texture);
        return Err(e);
    }
    Ok(texture)
}

/// Upload the six faces of `cube` into level 0 of a cube texture
pub fn upload_cube_faces(
    device: &mut dyn GraphicsDevice,
    texture: &Texture,
    cube: &CubeImage,
    pixel_format: PixelFormat,
) -> Result<()> {
    if texture.kind != TextureKind::Cube {
        return Err(Error::InvalidResource("upload_cube_faces: not a cube texture".to_string()));
    }
    if cube.size() != texture.width {
        return Err(Error::InvalidResource(format!(
            "cube faces are {}x{}, texture is {}x{}",
            cube.size(),
            cube.size(),
            texture.width,
            texture.height
        )));
    }
    for (layer, face) in cube.faces.iter().enumerate() {
        let texels = pixel::repack(face, pixel_format, texture.format)?;
        device.upload_texture(texture.id, layer as u32, &texels)?;
    }
    Ok(())
}

/// Fill levels 1.. of `texture` from level 0
///
/// Runs once per texture; later calls are logged and skipped.
///
/// # Errors
///
/// `Error::InvalidResource` if the texture has a single level.
pub fn generate_texture_mipmaps(device: &mut dyn GraphicsDevice, texture: &mut Texture) -> Result<()> {
    if texture.levels == 1 {
        return Err(Error::InvalidResource(
            "generate_texture_mipmaps: texture was created with a single level".to_string(),
        ));
    }
    if texture.mipmaps_generated {
        ibl_warn!("ibl::resource", "Mipmaps already generated for {:?}, skipping", texture.id);
        return Ok(());
    }
    device.generate_mipmaps(texture.id)?;
    texture.mipmaps_generated = true;
    Ok(())
}

/// Release the texture and zero its descriptor (no-op when already zeroed)
pub fn delete_texture(device: &mut dyn GraphicsDevice, texture: &mut Texture) {
    if texture.is_null() {
        return;
    }
    device.destroy_texture(texture.id);
    texture.zero();
}

#[cfg(test)]
#[path = "texture_tests.rs"]
mod tests;
