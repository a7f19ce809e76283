/// Swapchain - presentation surface of the Vulkan device
///
/// Handles image acquisition, presentation, and swapchain recreation when
/// the surface goes out of date. The tonemap pass renders straight into the
/// acquired image, so the swapchain prefers UNORM formats: the tonemap
/// shader applies gamma itself.

use ash::vk;
use ibl_pipeline::ibl::device::TextureFormat;
use ibl_pipeline::ibl::{Error, Result};
use ibl_pipeline::{ibl_debug, ibl_err, ibl_error};

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::vk_format_to_format;

/// Number of frames that can be recorded while the GPU works on the previous one
pub(crate) const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Surface formats in order of preference
const PREFERRED_FORMATS: [vk::Format; 2] = [vk::Format::B8G8R8A8_UNORM, vk::Format::R8G8B8A8_UNORM];

/// Pick the surface format: a preferred UNORM format, else the first reported one
pub(crate) fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    PREFERRED_FORMATS
        .iter()
        .find_map(|&wanted| formats.iter().find(|f| f.format == wanted).copied())
        .or_else(|| formats.first().copied())
}

/// Pick the swapchain extent (the surface's own extent unless it lets us choose)
pub(crate) fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// Image count: one more than the minimum, capped by the maximum (0 = unbounded)
pub(crate) fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

/// Vulkan swapchain
pub struct Swapchain {
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    swapchain: vk::SwapchainKHR,
    swapchain_loader: ash::khr::swapchain::Device,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    surface_format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    /// Requested size, used when the surface lets us pick the extent
    requested: (u32, u32),

    /// One semaphore per frame in flight (signaled by acquire)
    image_available_semaphores: Vec<vk::Semaphore>,
    /// One semaphore per swapchain image (waited on by present)
    render_finished_semaphores: Vec<vk::Semaphore>,
}

impl Swapchain {
    /// Create the swapchain for `surface`
    ///
    /// Failures are reported as `Error::ContextCreation`.
    pub fn new(
        ctx: &GpuContext,
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(&ctx.instance, &ctx.device);

        let mut swapchain = Self {
            surface,
            surface_loader,
            swapchain: vk::SwapchainKHR::null(),
            swapchain_loader,
            images: Vec::new(),
            image_views: Vec::new(),
            surface_format: vk::SurfaceFormatKHR::default(),
            extent: vk::Extent2D { width, height },
            requested: (width, height),
            image_available_semaphores: Vec::new(),
            render_finished_semaphores: Vec::new(),
        };

        unsafe {
            // Owns the surface from here on
            let formats = match swapchain
                .surface_loader
                .get_physical_device_surface_formats(ctx.physical_device, surface)
            {
                Ok(formats) => formats,
                Err(e) => {
                    swapchain.destroy(ctx);
                    return Err(context_error(format!("Failed to query surface formats: {:?}", e)));
                }
            };
            match choose_surface_format(&formats) {
                Some(format) => swapchain.surface_format = format,
                None => {
                    swapchain.destroy(ctx);
                    return Err(context_error("Surface reports no formats".to_string()));
                }
            }

            if let Err(e) = swapchain.build(ctx) {
                swapchain.destroy(ctx);
                return Err(context_error(e.to_string()));
            }

            let semaphore_create_info = vk::SemaphoreCreateInfo::default();
            for _ in 0..MAX_FRAMES_IN_FLIGHT {
                match ctx.device.create_semaphore(&semaphore_create_info, None) {
                    Ok(semaphore) => swapchain.image_available_semaphores.push(semaphore),
                    Err(e) => {
                        swapchain.destroy(ctx);
                        return Err(context_error(format!("Failed to create semaphore: {:?}", e)));
                    }
                }
            }

            ibl_debug!(
                "ibl::vulkan",
                "Swapchain created: {}x{} {:?}, {} images",
                swapchain.extent.width,
                swapchain.extent.height,
                swapchain.surface_format.format,
                swapchain.images.len()
            );
            Ok(swapchain)
        }
    }

    /// Create the swapchain object, its views and per-image semaphores
    unsafe fn build(&mut self, ctx: &GpuContext) -> Result<()> {
        let caps = self
            .surface_loader
            .get_physical_device_surface_capabilities(ctx.physical_device, self.surface)
            .map_err(|e| ibl_err!("ibl::vulkan", "Failed to get surface capabilities: {:?}", e))?;

        let extent = choose_extent(&caps, self.requested.0, self.requested.1);
        let old_swapchain = self.swapchain;

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(choose_image_count(&caps))
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = self
            .swapchain_loader
            .create_swapchain(&create_info, None)
            .map_err(|e| ibl_err!("ibl::vulkan", "Failed to create swapchain: {:?}", e))?;

        if old_swapchain != vk::SwapchainKHR::null() {
            self.swapchain_loader.destroy_swapchain(old_swapchain, None);
        }
        self.swapchain = swapchain;
        self.extent = extent;

        self.images = self
            .swapchain_loader
            .get_swapchain_images(swapchain)
            .map_err(|e| ibl_err!("ibl::vulkan", "Failed to get swapchain images: {:?}", e))?;

        for &image in &self.images {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.surface_format.format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = ctx
                .device
                .create_image_view(&create_info, None)
                .map_err(|e| ibl_err!("ibl::vulkan", "Failed to create swapchain image view: {:?}", e))?;
            self.image_views.push(view);
        }

        let semaphore_create_info = vk::SemaphoreCreateInfo::default();
        while self.render_finished_semaphores.len() < self.images.len() {
            let semaphore = ctx
                .device
                .create_semaphore(&semaphore_create_info, None)
                .map_err(|e| ibl_err!("ibl::vulkan", "Failed to create semaphore: {:?}", e))?;
            self.render_finished_semaphores.push(semaphore);
        }
        Ok(())
    }

    /// Rebuild after the surface went out of date (device must be idle)
    pub fn recreate(&mut self, ctx: &GpuContext) -> Result<()> {
        unsafe {
            for view in self.image_views.drain(..) {
                ctx.device.destroy_image_view(view, None);
            }
            self.build(ctx)?;
        }
        ibl_debug!(
            "ibl::vulkan",
            "Swapchain recreated: {}x{}",
            self.extent.width,
            self.extent.height
        );
        Ok(())
    }

    /// Acquire the next image, signaling the frame's image-available semaphore
    ///
    /// Returns `None` when the swapchain is out of date.
    pub fn acquire(&mut self, frame: usize) -> Result<Option<u32>> {
        unsafe {
            match self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                self.image_available_semaphores[frame],
                vk::Fence::null(),
            ) {
                Ok((index, _suboptimal)) => Ok(Some(index)),
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(None),
                Err(e) => Err(ibl_err!("ibl::vulkan", "Failed to acquire next swapchain image: {:?}", e)),
            }
        }
    }

    /// Present `image_index` once its render-finished semaphore is signaled
    ///
    /// Returns true if the swapchain must be recreated.
    pub fn present(&mut self, queue: vk::Queue, image_index: u32) -> Result<bool> {
        unsafe {
            let swapchains = [self.swapchain];
            let image_indices = [image_index];
            let wait_semaphores = [self.render_finished_semaphores[image_index as usize]];

            let present_info = vk::PresentInfoKHR::default()
                .wait_semaphores(&wait_semaphores)
                .swapchains(&swapchains)
                .image_indices(&image_indices);

            match self.swapchain_loader.queue_present(queue, &present_info) {
                Ok(suboptimal) => Ok(suboptimal),
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
                Err(e) => Err(ibl_err!("ibl::vulkan", "Failed to present swapchain image: {:?}", e)),
            }
        }
    }

    pub fn image(&self, index: u32) -> vk::Image {
        self.images[index as usize]
    }

    pub fn image_view(&self, index: u32) -> vk::ImageView {
        self.image_views[index as usize]
    }

    pub fn image_available_semaphore(&self, frame: usize) -> vk::Semaphore {
        self.image_available_semaphores[frame]
    }

    pub fn render_finished_semaphore(&self, image_index: u32) -> vk::Semaphore {
        self.render_finished_semaphores[image_index as usize]
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn vk_format(&self) -> vk::Format {
        self.surface_format.format
    }

    pub fn format(&self) -> TextureFormat {
        vk_format_to_format(self.surface_format.format)
    }

    /// Destroy semaphores, views, the swapchain and the surface
    pub fn destroy(&mut self, ctx: &GpuContext) {
        unsafe {
            for semaphore in self.image_available_semaphores.drain(..) {
                ctx.device.destroy_semaphore(semaphore, None);
            }
            for semaphore in self.render_finished_semaphores.drain(..) {
                ctx.device.destroy_semaphore(semaphore, None);
            }
            for view in self.image_views.drain(..) {
                ctx.device.destroy_image_view(view, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
                self.swapchain = vk::SwapchainKHR::null();
            }
            if self.surface != vk::SurfaceKHR::null() {
                self.surface_loader.destroy_surface(self.surface, None);
                self.surface = vk::SurfaceKHR::null();
            }
        }
    }
}

fn context_error(message: String) -> Error {
    ibl_error!("ibl::vulkan", "{}", message);
    Error::ContextCreation(message)
}
