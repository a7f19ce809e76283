/// Framebuffer - color + depth/stencil attachment set for dynamic rendering
///
/// With dynamic rendering there is no VkFramebuffer object: the framebuffer
/// only records its attachments, validated once at creation, and the pass
/// binds their image views directly.

use ibl_pipeline::ibl::device::{ColorAttachment, RenderTargetId, TextureKind, TextureUsage};
use ibl_pipeline::ibl::{Error, Result};
use ibl_pipeline::ibl_error;

use crate::vulkan_texture::{RenderTarget, Texture};

/// Validated attachment set
#[derive(Debug, Clone, Copy)]
pub struct Framebuffer {
    pub(crate) color: ColorAttachment,
    pub(crate) depth_stencil: RenderTargetId,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) samples: u32,
}

/// Color attachment as seen during validation
pub(crate) enum ColorImage<'a> {
    Texture(&'a Texture),
    RenderTarget(&'a RenderTarget),
}

fn incomplete(message: String) -> Error {
    ibl_error!("ibl::vulkan", "Framebuffer incomplete: {}", message);
    Error::FramebufferIncomplete(message)
}

impl Framebuffer {
    /// Validate an attachment combination
    ///
    /// # Errors
    ///
    /// `Error::FramebufferIncomplete` when an attachment is missing, has the
    /// wrong kind or usage, or doesn't match the other in size or samples.
    pub(crate) fn new(
        color_id: ColorAttachment,
        color: Option<ColorImage<'_>>,
        depth_id: RenderTargetId,
        depth: Option<&RenderTarget>,
    ) -> Result<Self> {
        let (width, height, samples) = match color {
            None => return Err(incomplete("color attachment does not exist".to_string())),
            Some(ColorImage::Texture(texture)) => {
                let desc = &texture.desc;
                if desc.kind != TextureKind::Tex2D || desc.levels != 1 {
                    return Err(incomplete(format!(
                        "color texture must be a single-level 2D texture (got {:?} with {} levels)",
                        desc.kind, desc.levels
                    )));
                }
                if !desc.usage.contains(TextureUsage::COLOR_ATTACHMENT) {
                    return Err(incomplete("color texture was not created as an attachment".to_string()));
                }
                (desc.width, desc.height, 1)
            }
            Some(ColorImage::RenderTarget(target)) => {
                if target.desc.format.is_depth() {
                    return Err(incomplete(format!("{:?} is not a color format", target.desc.format)));
                }
                (target.desc.width, target.desc.height, target.desc.samples)
            }
        };

        let depth = depth.ok_or_else(|| incomplete("depth/stencil attachment does not exist".to_string()))?;
        if !depth.desc.format.is_depth() {
            return Err(incomplete(format!("{:?} is not a depth format", depth.desc.format)));
        }
        if (depth.desc.width, depth.desc.height) != (width, height) {
            return Err(incomplete(format!(
                "attachment sizes differ: color {}x{}, depth {}x{}",
                width, height, depth.desc.width, depth.desc.height
            )));
        }
        if depth.desc.samples != samples {
            return Err(incomplete(format!(
                "attachment sample counts differ: color {}, depth {}",
                samples, depth.desc.samples
            )));
        }

        Ok(Self {
            color: color_id,
            depth_stencil: depth_id,
            width,
            height,
            samples,
        })
    }
}
