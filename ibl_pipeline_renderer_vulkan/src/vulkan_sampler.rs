/// SamplerCache - internal VkSampler management for the Vulkan backend
///
/// The pipeline samples with two configurations only: repeating trilinear
/// for material textures and clamped trilinear for cube maps and
/// framebuffer colors. Samplers are created on first use.

use ash::vk;
use ibl_pipeline::ibl::device::{TextureDesc, TextureKind, TextureUsage};
use ibl_pipeline::ibl::Result;
use ibl_pipeline::ibl_err;
use rustc_hash::FxHashMap;

use crate::vulkan_context::GpuContext;

/// Sampler configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum SamplerKind {
    /// Trilinear, repeat addressing, anisotropic when available
    LinearRepeat,
    /// Trilinear, clamp to edge
    LinearClamp,
}

impl SamplerKind {
    /// Sampler a texture is bound with
    pub(crate) fn for_texture(desc: &TextureDesc) -> Self {
        if desc.kind == TextureKind::Cube || desc.usage.contains(TextureUsage::COLOR_ATTACHMENT) {
            SamplerKind::LinearClamp
        } else {
            SamplerKind::LinearRepeat
        }
    }
}

/// Internal sampler cache - creates VkSampler on first use, destroyed by the device
#[derive(Default)]
pub(crate) struct SamplerCache {
    cache: FxHashMap<SamplerKind, vk::Sampler>,
}

impl SamplerCache {
    /// Get or create a VkSampler for the given kind
    pub(crate) fn get(&mut self, ctx: &GpuContext, kind: SamplerKind) -> Result<vk::Sampler> {
        if let Some(&sampler) = self.cache.get(&kind) {
            return Ok(sampler);
        }
        let sampler = create_vk_sampler(ctx, kind)?;
        self.cache.insert(kind, sampler);
        Ok(sampler)
    }

    pub(crate) fn len(&self) -> usize {
        self.cache.len()
    }

    /// Destroy all cached samplers (device must still be alive)
    pub(crate) fn destroy_all(&mut self, ctx: &GpuContext) {
        for (_, sampler) in self.cache.drain() {
            unsafe {
                ctx.device.destroy_sampler(sampler, None);
            }
        }
    }
}

fn create_vk_sampler(ctx: &GpuContext, kind: SamplerKind) -> Result<vk::Sampler> {
    let address = match kind {
        SamplerKind::LinearRepeat => vk::SamplerAddressMode::REPEAT,
        SamplerKind::LinearClamp => vk::SamplerAddressMode::CLAMP_TO_EDGE,
    };

    let mut create_info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(address)
        .address_mode_v(address)
        .address_mode_w(address)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(vk::LOD_CLAMP_NONE)
        .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .unnormalized_coordinates(false);

    if kind == SamplerKind::LinearRepeat && ctx.anisotropy {
        create_info = create_info
            .anisotropy_enable(true)
            .max_anisotropy(ctx.limits.max_sampler_anisotropy.min(16.0));
    } else {
        create_info = create_info.anisotropy_enable(false).max_anisotropy(1.0);
    }

    unsafe {
        ctx.device
            .create_sampler(&create_info, None)
            .map_err(|e| ibl_err!("ibl::vulkan", "Failed to create {:?} sampler: {:?}", kind, e))
    }
}
