/// Offscreen framebuffers and multisample resolve

use crate::device::{
    ColorAttachment, FramebufferDesc, FramebufferId, GraphicsDevice, RenderTargetDesc, RenderTargetId,
    TextureFormat,
};
use crate::error::{Error, Result};
use crate::ibl_debug;
use crate::resource::texture::{create_texture, delete_texture, Texture};

/// Color storage of a framebuffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorTarget {
    /// Single-sample, readable by shaders
    Texture(Texture),
    /// Multisampled, must be resolved before it can be read
    Multisampled(RenderTargetId),
}

/// Offscreen framebuffer descriptor
///
/// `samples > 1` means the color target is multisampled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    pub id: FramebufferId,
    pub color_target: ColorTarget,
    pub depth_stencil_target: RenderTargetId,
    pub width: u32,
    pub height: u32,
    pub samples: u32,
}

impl FrameBuffer {
    pub fn is_null(&self) -> bool {
        self.id == FramebufferId::default()
    }

    /// Shader-readable color texture (single-sample framebuffers only)
    pub fn color_texture(&self) -> Option<&Texture> {
        match &self.color_target {
            ColorTarget::Texture(texture) => Some(texture),
            ColorTarget::Multisampled(_) => None,
        }
    }
}

fn release_color(device: &mut dyn GraphicsDevice, color: &mut ColorTarget) {
    match color {
        ColorTarget::Texture(texture) => delete_texture(device, texture),
        ColorTarget::Multisampled(id) => {
            device.destroy_render_target(*id);
            *id = RenderTargetId::default();
        }
    }
}

/// Create a framebuffer with a color and a depth/stencil attachment
///
/// `samples == 1` gives a sampled single-level color texture; larger counts
/// give a multisampled render target.
///
/// # Errors
///
/// `Error::FramebufferIncomplete` if the device rejects the combination.
/// Attachments created before the failure are released.
pub fn create_frame_buffer(
    device: &mut dyn GraphicsDevice,
    width: u32,
    height: u32,
    samples: u32,
    color_format: TextureFormat,
    depth_stencil_format: TextureFormat,
) -> Result<FrameBuffer> {
    if samples == 0 {
        return Err(Error::FramebufferIncomplete("sample count must be at least 1".to_string()));
    }
    if !depth_stencil_format.is_depth() {
        return Err(Error::FramebufferIncomplete(format!(
            "{:?} is not a depth/stencil format",
            depth_stencil_format
        )));
    }

    let mut color = if samples > 1 {
        ColorTarget::Multisampled(device.create_render_target(&RenderTargetDesc {
            width,
            height,
            format: color_format,
            samples,
        })?)
    } else {
        ColorTarget::Texture(create_texture(device, width, height, color_format, 1)?)
    };

    let depth_stencil = match device.create_render_target(&RenderTargetDesc {
        width,
        height,
        format: depth_stencil_format,
        samples,
    }) {
        Ok(id) => id,
        Err(e) => {
            release_color(device, &mut color);
            return Err(e);
        }
    };

    let color_attachment = match &color {
        ColorTarget::Texture(texture) => ColorAttachment::Texture(texture.id),
        ColorTarget::Multisampled(id) => ColorAttachment::RenderTarget(*id),
    };
    let id = match device.create_framebuffer(&FramebufferDesc { color: color_attachment, depth_stencil }) {
        Ok(id) => id,
        Err(e) => {
            device.destroy_render_target(depth_stencil);
            release_color(device, &mut color);
            return Err(match e {
                Error::FramebufferIncomplete(_) => e,
                other => Error::FramebufferIncomplete(other.to_string()),
            });
        }
    };

    ibl_debug!(
        "ibl::resource",
        "Created framebuffer {}x{} ({} samples, {:?} / {:?})",
        width,
        height,
        samples,
        color_format,
        depth_stencil_format
    );

    Ok(FrameBuffer {
        id,
        color_target: color,
        depth_stencil_target: depth_stencil,
        width,
        height,
        samples,
    })
}

/// Resolve the multisampled color of `src` into the single-sample `dst`
///
/// # Errors
///
/// `Error::InvalidResource`, before any device work, unless
/// `src.samples > 1`, `dst.samples == 1` and both have the same size.
pub fn resolve_framebuffer(device: &mut dyn GraphicsDevice, src: &FrameBuffer, dst: &FrameBuffer) -> Result<()> {
    if src.samples <= 1 {
        return Err(Error::InvalidResource(format!(
            "resolve source must be multisampled (samples = {})",
            src.samples
        )));
    }
    if dst.samples != 1 {
        return Err(Error::InvalidResource(format!(
            "resolve destination must be single-sample (samples = {})",
            dst.samples
        )));
    }
    if src.width != dst.width || src.height != dst.height {
        return Err(Error::InvalidResource(format!(
            "resolve size mismatch: {}x{} -> {}x{}",
            src.width, src.height, dst.width, dst.height
        )));
    }
    device.resolve_framebuffer(src.id, dst.id)
}

/// Release the framebuffer and both attachments, then zero the descriptor
pub fn delete_frame_buffer(device: &mut dyn GraphicsDevice, frame_buffer: &mut FrameBuffer) {
    if frame_buffer.is_null() {
        return;
    }
    device.destroy_framebuffer(frame_buffer.id);
    release_color(device, &mut frame_buffer.color_target);
    device.destroy_render_target(frame_buffer.depth_stencil_target);

    frame_buffer.id = FramebufferId::default();
    frame_buffer.depth_stencil_target = RenderTargetId::default();
    frame_buffer.width = 0;
    frame_buffer.height = 0;
    frame_buffer.samples = 0;
}

#[cfg(test)]
#[path = "frame_buffer_tests.rs"]
mod tests;
