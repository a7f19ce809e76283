/// Texture and render target - Vulkan images with a single view

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use ibl_pipeline::ibl::device::{RenderTargetDesc, TextureDesc, TextureFormat, TextureKind, TextureUsage};
use ibl_pipeline::ibl::{Error, Result};
use ibl_pipeline::{ibl_debug, ibl_err, ibl_error};

use crate::vulkan_buffer::Buffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{aspect_of, format_to_vk, samples_to_vk, transition_image};

/// Image, view and memory shared by textures and render targets
pub(crate) struct GpuImage {
    pub(crate) image: vk::Image,
    pub(crate) view: vk::ImageView,
    pub(crate) allocation: Option<Allocation>,
    pub(crate) format: vk::Format,
    pub(crate) aspect: vk::ImageAspectFlags,
    pub(crate) levels: u32,
    pub(crate) layers: u32,
    /// Layout of every subresource after the last recorded command
    pub(crate) layout: vk::ImageLayout,
}

struct ImageSpec {
    width: u32,
    height: u32,
    format: TextureFormat,
    levels: u32,
    layers: u32,
    samples: vk::SampleCountFlags,
    usage: vk::ImageUsageFlags,
    cube: bool,
}

impl GpuImage {
    fn new(ctx: &GpuContext, spec: &ImageSpec, name: &str) -> Result<Self> {
        let format = format_to_vk(spec.format);
        let aspect = aspect_of(spec.format);

        unsafe {
            let image_create_info = vk::ImageCreateInfo::default()
                .flags(if spec.cube {
                    vk::ImageCreateFlags::CUBE_COMPATIBLE
                } else {
                    vk::ImageCreateFlags::empty()
                })
                .image_type(vk::ImageType::TYPE_2D)
                .format(format)
                .extent(vk::Extent3D { width: spec.width, height: spec.height, depth: 1 })
                .mip_levels(spec.levels)
                .array_layers(spec.layers)
                .samples(spec.samples)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(spec.usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let image = ctx
                .device
                .create_image(&image_create_info, None)
                .map_err(|e| ibl_err!("ibl::vulkan", "Failed to create {} image: {:?}", name, e))?;

            let allocation = match ctx.bind_image_memory(image, name) {
                Ok(allocation) => allocation,
                Err(e) => {
                    ctx.device.destroy_image(image, None);
                    return Err(e);
                }
            };

            let view_create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(if spec.cube { vk::ImageViewType::CUBE } else { vk::ImageViewType::TYPE_2D })
                .format(format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: aspect,
                    base_mip_level: 0,
                    level_count: spec.levels,
                    base_array_layer: 0,
                    layer_count: spec.layers,
                });

            let view = match ctx.device.create_image_view(&view_create_info, None) {
                Ok(view) => view,
                Err(e) => {
                    ctx.free(allocation);
                    ctx.device.destroy_image(image, None);
                    return Err(ibl_err!("ibl::vulkan", "Failed to create {} image view: {:?}", name, e));
                }
            };

            Ok(Self {
                image,
                view,
                allocation: Some(allocation),
                format,
                aspect,
                levels: spec.levels,
                layers: spec.layers,
                layout: vk::ImageLayout::UNDEFINED,
            })
        }
    }

    /// Record a transition of the whole image to `layout` (no-op if already there)
    pub(crate) fn transition(&mut self, device: &ash::Device, cb: vk::CommandBuffer, layout: vk::ImageLayout) {
        if self.layout == layout {
            return;
        }
        transition_image(device, cb, self.image, self.aspect, self.levels, self.layers, self.layout, layout);
        self.layout = layout;
    }

    pub(crate) fn destroy(mut self, ctx: &GpuContext) {
        unsafe {
            ctx.device.destroy_image_view(self.view, None);
            if let Some(allocation) = self.allocation.take() {
                ctx.free(allocation);
            }
            ctx.device.destroy_image(self.image, None);
        }
    }
}

// ============================================================================
// Texture
// ============================================================================

/// Sampled Vulkan texture (2D or cube)
pub struct Texture {
    pub(crate) gpu: GpuImage,
    pub(crate) desc: TextureDesc,
}

impl Texture {
    /// Create a texture after checking the format supports every requested use
    pub fn new(ctx: &GpuContext, desc: &TextureDesc) -> Result<Self> {
        let format = format_to_vk(desc.format);
        let features = ctx.format_features(format);

        let mut required = vk::FormatFeatureFlags::SAMPLED_IMAGE | vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR;
        let mut usage = vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST;
        if desc.usage.contains(TextureUsage::COLOR_ATTACHMENT) {
            required |= vk::FormatFeatureFlags::COLOR_ATTACHMENT;
            usage |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }
        if desc.levels > 1 {
            required |= vk::FormatFeatureFlags::BLIT_SRC | vk::FormatFeatureFlags::BLIT_DST;
            usage |= vk::ImageUsageFlags::TRANSFER_SRC;
        }
        if desc.format.is_depth() || !features.contains(required) {
            let message = format!("{:?} cannot be used as {:?} on this device", desc.format, desc.usage);
            ibl_error!("ibl::vulkan", "{}", message);
            return Err(Error::UnsupportedFormat(message));
        }

        let gpu = GpuImage::new(
            ctx,
            &ImageSpec {
                width: desc.width,
                height: desc.height,
                format: desc.format,
                levels: desc.levels,
                layers: desc.kind.layers(),
                samples: vk::SampleCountFlags::TYPE_1,
                usage,
                cube: desc.kind == TextureKind::Cube,
            },
            "texture",
        )?;

        ibl_debug!(
            "ibl::vulkan",
            "Created {:?} image {}x{} {:?} ({} levels)",
            desc.kind,
            desc.width,
            desc.height,
            desc.format,
            desc.levels
        );
        Ok(Self { gpu, desc: desc.clone() })
    }

    /// Copy `data` into level 0 of `layer` through a staging buffer
    pub fn upload(&mut self, ctx: &GpuContext, layer: u32, data: &[u8]) -> Result<()> {
        let staging = Buffer::staging(ctx, data)?;
        let (width, height) = (self.desc.width, self.desc.height);
        let old_layout = self.gpu.layout;
        let gpu = &self.gpu;

        let result = ctx.submit_one_shot(|device, cb| {
            transition_image(device, cb, gpu.image, gpu.aspect, gpu.levels, gpu.layers, old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);

            let region = vk::BufferImageCopy::default()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: gpu.aspect,
                    mip_level: 0,
                    base_array_layer: layer,
                    layer_count: 1,
                })
                .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                .image_extent(vk::Extent3D { width, height, depth: 1 });

            unsafe {
                device.cmd_copy_buffer_to_image(cb, staging.buffer, gpu.image, vk::ImageLayout::TRANSFER_DST_OPTIMAL, &[region]);
            }

            transition_image(device, cb, gpu.image, gpu.aspect, gpu.levels, gpu.layers, vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        });

        staging.destroy(ctx);
        result?;
        self.gpu.layout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
        Ok(())
    }

    /// Fill levels 1.. of every layer by successive linear blits
    pub fn generate_mipmaps(&mut self, ctx: &GpuContext) -> Result<()> {
        let (width, height) = (self.desc.width, self.desc.height);
        let old_layout = self.gpu.layout;
        let gpu = &self.gpu;

        ctx.submit_one_shot(|device, cb| {
            transition_image(device, cb, gpu.image, gpu.aspect, gpu.levels, gpu.layers, old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);

            for mip in 1..gpu.levels {
                let src_mip = mip - 1;
                let src_width = (width >> src_mip).max(1);
                let src_height = (height >> src_mip).max(1);
                let dst_width = (width >> mip).max(1);
                let dst_height = (height >> mip).max(1);

                let level_barrier = |old, new, src_access, dst_access, dst_stage| unsafe {
                    let barrier = vk::ImageMemoryBarrier::default()
                        .old_layout(old)
                        .new_layout(new)
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .image(gpu.image)
                        .subresource_range(vk::ImageSubresourceRange {
                            aspect_mask: gpu.aspect,
                            base_mip_level: src_mip,
                            level_count: 1,
                            base_array_layer: 0,
                            layer_count: gpu.layers,
                        })
                        .src_access_mask(src_access)
                        .dst_access_mask(dst_access);
                    device.cmd_pipeline_barrier(
                        cb,
                        vk::PipelineStageFlags::TRANSFER,
                        dst_stage,
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        &[barrier],
                    );
                };

                // Source level: TRANSFER_DST -> TRANSFER_SRC
                level_barrier(
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    vk::AccessFlags::TRANSFER_WRITE,
                    vk::AccessFlags::TRANSFER_READ,
                    vk::PipelineStageFlags::TRANSFER,
                );

                let blit = vk::ImageBlit::default()
                    .src_subresource(vk::ImageSubresourceLayers {
                        aspect_mask: gpu.aspect,
                        mip_level: src_mip,
                        base_array_layer: 0,
                        layer_count: gpu.layers,
                    })
                    .src_offsets([
                        vk::Offset3D { x: 0, y: 0, z: 0 },
                        vk::Offset3D { x: src_width as i32, y: src_height as i32, z: 1 },
                    ])
                    .dst_subresource(vk::ImageSubresourceLayers {
                        aspect_mask: gpu.aspect,
                        mip_level: mip,
                        base_array_layer: 0,
                        layer_count: gpu.layers,
                    })
                    .dst_offsets([
                        vk::Offset3D { x: 0, y: 0, z: 0 },
                        vk::Offset3D { x: dst_width as i32, y: dst_height as i32, z: 1 },
                    ]);

                unsafe {
                    device.cmd_blit_image(
                        cb,
                        gpu.image,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        gpu.image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[blit],
                        vk::Filter::LINEAR,
                    );
                }

                // Source level is done: TRANSFER_SRC -> SHADER_READ_ONLY
                level_barrier(
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    vk::AccessFlags::TRANSFER_READ,
                    vk::AccessFlags::SHADER_READ,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                );
            }

            // Last level was only ever a blit destination
            let barrier_last_mip = vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(gpu.image)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: gpu.aspect,
                    base_mip_level: gpu.levels - 1,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: gpu.layers,
                })
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ);

            unsafe {
                device.cmd_pipeline_barrier(
                    cb,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier_last_mip],
                );
            }
        })?;

        self.gpu.layout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
        Ok(())
    }
}

// ============================================================================
// Render target
// ============================================================================

/// Non-sampled attachment: multisampled color or depth/stencil
pub struct RenderTarget {
    pub(crate) gpu: GpuImage,
    pub(crate) desc: RenderTargetDesc,
}

impl RenderTarget {
    pub fn new(ctx: &GpuContext, desc: &RenderTargetDesc) -> Result<Self> {
        let format = format_to_vk(desc.format);
        let features = ctx.format_features(format);

        let (required, usage, supported_samples) = if desc.format.is_depth() {
            (
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                ctx.limits.framebuffer_depth_sample_counts,
            )
        } else {
            (
                vk::FormatFeatureFlags::COLOR_ATTACHMENT,
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
                ctx.limits.framebuffer_color_sample_counts,
            )
        };

        let samples = samples_to_vk(desc.samples)
            .filter(|flags| supported_samples.contains(*flags))
            .ok_or_else(|| {
                let message = format!("{} samples unsupported for {:?}", desc.samples, desc.format);
                ibl_error!("ibl::vulkan", "{}", message);
                Error::FramebufferIncomplete(message)
            })?;

        if !features.contains(required) {
            let message = format!("{:?} cannot be used as an attachment on this device", desc.format);
            ibl_error!("ibl::vulkan", "{}", message);
            return Err(Error::FramebufferIncomplete(message));
        }

        let gpu = GpuImage::new(
            ctx,
            &ImageSpec {
                width: desc.width,
                height: desc.height,
                format: desc.format,
                levels: 1,
                layers: 1,
                samples,
                usage,
                cube: false,
            },
            "render_target",
        )?;

        ibl_debug!(
            "ibl::vulkan",
            "Created render target {}x{} {:?} x{}",
            desc.width,
            desc.height,
            desc.format,
            desc.samples
        );
        Ok(Self { gpu, desc: *desc })
    }
}
