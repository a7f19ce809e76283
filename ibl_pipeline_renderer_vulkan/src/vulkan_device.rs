/// VulkanGraphicsDevice - Vulkan implementation of the GraphicsDevice trait
///
/// Owns the instance, the logical device, the swapchain and every resource
/// created through the trait. Frames are recorded with dynamic rendering
/// (Vulkan 1.3) into one command buffer per frame in flight; uploads and
/// mipmap generation are one-shot submissions outside of frames.

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use ibl_pipeline::ibl::device::{
    BufferId, BufferUsage, ClearValues, ColorAttachment, DeviceCaps, DeviceConfig, DrawCall, FramebufferDesc,
    FramebufferId, GraphicsDevice, IndexType, PassTarget, ProgramId, RenderTargetDesc, RenderTargetId, ShaderStage,
    ShaderStageId, SurfaceInfo, TextureDesc, TextureId, TextureKind, VertexArrayDesc, VertexArrayId,
};
use ibl_pipeline::ibl::diagnostics::{DebugMessage, DiagnosticChannel};
use ibl_pipeline::ibl::{Error, Result};
use ibl_pipeline::{ibl_bail, ibl_debug, ibl_err, ibl_error, ibl_info, ibl_trace, ibl_warn};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use slotmap::SlotMap;
use std::ffi::{CStr, CString};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};
use winit::window::Window;

use crate::debug::{print_diagnostic_report, severity_flags, vulkan_debug_callback};
use crate::vulkan_buffer::Buffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{max_sample_count, samples_to_vk, transition_image};
use crate::vulkan_frame::FrameResources;
use crate::vulkan_frame_buffer::{ColorImage, Framebuffer};
use crate::vulkan_pipeline::{PipelineCache, PipelineKey};
use crate::vulkan_sampler::{SamplerCache, SamplerKind};
use crate::vulkan_shader::{DescriptorKind, Program, ShaderStageModule};
use crate::vulkan_swapchain::{Swapchain, MAX_FRAMES_IN_FLIGHT};
use crate::vulkan_texture::{RenderTarget, Texture};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Preference of a physical device type (higher wins)
pub(crate) fn device_type_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 3,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 1,
        _ => 0,
    }
}

fn context_error(message: String) -> Error {
    ibl_error!("ibl::vulkan", "{}", message);
    Error::ContextCreation(message)
}

fn invalid(message: String) -> Error {
    ibl_error!("ibl::vulkan", "{}", message);
    Error::InvalidResource(message)
}

// ============================================================================
// Initialization helpers
// ============================================================================

/// Instance-level objects, created before the logical device
struct InstanceObjects {
    entry: ash::Entry,
    instance: ash::Instance,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    surface_loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
}

impl InstanceObjects {
    /// Destroy in reverse creation order (used on failed initialization)
    unsafe fn destroy(self) {
        if self.surface != vk::SurfaceKHR::null() {
            self.surface_loader.destroy_surface(self.surface, None);
        }
        if let Some((loader, messenger)) = &self.debug_utils {
            loader.destroy_debug_utils_messenger(*messenger, None);
        }
        self.instance.destroy_instance(None);
    }
}

/// Chosen physical device and queue family
struct DeviceChoice {
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
    name: String,
    anisotropy: bool,
}

unsafe fn create_instance_objects(
    window: &Window,
    config: &DeviceConfig,
    diagnostics: Option<&DiagnosticChannel>,
) -> Result<InstanceObjects> {
    let entry = ash::Entry::load().map_err(|e| context_error(format!("Failed to load Vulkan library: {:?}", e)))?;

    let app_name = CString::new(config.app_name.clone()).unwrap_or_default();
    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(c"IBL Pipeline")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_3);

    let display_handle = window
        .display_handle()
        .map_err(|e| context_error(format!("Failed to get display handle: {}", e)))?;
    let window_handle = window
        .window_handle()
        .map_err(|e| context_error(format!("Failed to get window handle: {}", e)))?;

    let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
        .map_err(|e| context_error(format!("Failed to get required extensions: {:?}", e)))?
        .to_vec();

    // Debug utils only when the loader exposes it
    let debug_utils_available = diagnostics.is_some()
        && entry
            .enumerate_instance_extension_properties(None)
            .unwrap_or_default()
            .iter()
            .any(|ext| ext.extension_name_as_c_str().is_ok_and(|name| name == ash::ext::debug_utils::NAME));
    if diagnostics.is_some() && !debug_utils_available {
        ibl_warn!("ibl::vulkan", "VK_EXT_debug_utils unavailable, GPU debug messages are disabled");
    }
    if debug_utils_available {
        extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
    }

    let mut layer_names = Vec::new();
    if cfg!(feature = "vulkan-validation") && diagnostics.is_some() {
        let layer_available = entry
            .enumerate_instance_layer_properties()
            .unwrap_or_default()
            .iter()
            .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER));
        if layer_available {
            layer_names.push(VALIDATION_LAYER.as_ptr());
        } else {
            ibl_warn!("ibl::vulkan", "{:?} is not installed, continuing without it", VALIDATION_LAYER);
        }
    }

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_layer_names(&layer_names)
        .enabled_extension_names(&extension_names);

    let instance = entry
        .create_instance(&create_info, None)
        .map_err(|e| context_error(format!("Failed to create Vulkan instance: {:?}", e)))?;

    let mut objects = InstanceObjects {
        surface_loader: ash::khr::surface::Instance::new(&entry, &instance),
        entry,
        instance,
        debug_utils: None,
        surface: vk::SurfaceKHR::null(),
    };

    if let (Some(channel), true) = (diagnostics, debug_utils_available) {
        let loader = ash::ext::debug_utils::Instance::new(&objects.entry, &objects.instance);
        let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(severity_flags(channel.filter()))
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vulkan_debug_callback))
            .user_data(channel as *const DiagnosticChannel as *mut std::os::raw::c_void);

        match loader.create_debug_utils_messenger(&debug_info, None) {
            Ok(messenger) => objects.debug_utils = Some((loader, messenger)),
            Err(e) => {
                objects.destroy();
                return Err(context_error(format!("Failed to create debug messenger: {:?}", e)));
            }
        }
    }

    match ash_window::create_surface(
        &objects.entry,
        &objects.instance,
        display_handle.as_raw(),
        window_handle.as_raw(),
        None,
    ) {
        Ok(surface) => objects.surface = surface,
        Err(e) => {
            objects.destroy();
            return Err(context_error(format!("Failed to create surface: {:?}", e)));
        }
    }

    Ok(objects)
}

/// Pick the best Vulkan 1.3 device with a graphics+present queue and dynamic rendering
unsafe fn pick_physical_device(objects: &InstanceObjects) -> Result<DeviceChoice> {
    let physical_devices = objects
        .instance
        .enumerate_physical_devices()
        .map_err(|e| context_error(format!("Failed to enumerate physical devices: {:?}", e)))?;

    let mut best: Option<(u32, DeviceChoice)> = None;
    for physical_device in physical_devices {
        let properties = objects.instance.get_physical_device_properties(physical_device);
        let name = properties
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "Unknown GPU".to_string());

        if properties.api_version < vk::API_VERSION_1_3 {
            ibl_debug!("ibl::vulkan", "Skipping {}: Vulkan 1.3 not supported", name);
            continue;
        }

        let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut features13);
        objects.instance.get_physical_device_features2(physical_device, &mut features2);
        let anisotropy = features2.features.sampler_anisotropy == vk::TRUE;
        if features13.dynamic_rendering != vk::TRUE {
            ibl_debug!("ibl::vulkan", "Skipping {}: no dynamic rendering", name);
            continue;
        }

        let has_swapchain = objects
            .instance
            .enumerate_device_extension_properties(physical_device)
            .unwrap_or_default()
            .iter()
            .any(|ext| ext.extension_name_as_c_str().is_ok_and(|name| name == ash::khr::swapchain::NAME));
        if !has_swapchain {
            ibl_debug!("ibl::vulkan", "Skipping {}: no swapchain support", name);
            continue;
        }

        let queue_families = objects
            .instance
            .get_physical_device_queue_family_properties(physical_device);
        let queue_family = (0..queue_families.len() as u32).find(|&i| {
            queue_families[i as usize].queue_flags.contains(vk::QueueFlags::GRAPHICS)
                && objects
                    .surface_loader
                    .get_physical_device_surface_support(physical_device, i, objects.surface)
                    .unwrap_or(false)
        });
        let Some(queue_family) = queue_family else {
            ibl_debug!("ibl::vulkan", "Skipping {}: no graphics queue can present", name);
            continue;
        };

        let score = device_type_score(properties.device_type);
        if best.as_ref().map_or(true, |(best_score, _)| score > *best_score) {
            best = Some((
                score,
                DeviceChoice {
                    physical_device,
                    queue_family,
                    name,
                    anisotropy,
                },
            ));
        }
    }

    best.map(|(_, choice)| choice)
        .ok_or_else(|| context_error("No Vulkan 1.3 GPU with dynamic rendering and presentation found".to_string()))
}

// ============================================================================
// Device
// ============================================================================

/// Pass being recorded
#[derive(Debug, Clone, Copy)]
struct ActivePass {
    target: PassTarget,
    color_format: vk::Format,
    depth_format: Option<vk::Format>,
    samples: vk::SampleCountFlags,
}

/// Frame being recorded
#[derive(Debug, Clone, Copy)]
struct Recording {
    image_index: u32,
    pass: Option<ActivePass>,
    /// The swapchain image was rendered and is in PRESENT_SRC layout
    surface_ready: bool,
}

/// Vulkan graphics device
pub struct VulkanGraphicsDevice {
    _entry: ash::Entry,
    ctx: GpuContext,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    /// Boxed so the messenger's user-data pointer stays valid
    diagnostics: Option<Box<DiagnosticChannel>>,
    swapchain: Option<Swapchain>,
    frames: Vec<FrameResources>,
    current_frame: usize,
    recording: Option<Recording>,
    /// Work was submitted since the last wait for idle
    gpu_busy: bool,
    caps: DeviceCaps,

    stages: SlotMap<ShaderStageId, ShaderStageModule>,
    programs: SlotMap<ProgramId, Program>,
    textures: SlotMap<TextureId, Texture>,
    render_targets: SlotMap<RenderTargetId, RenderTarget>,
    framebuffers: SlotMap<FramebufferId, Framebuffer>,
    buffers: SlotMap<BufferId, Buffer>,
    vertex_arrays: SlotMap<VertexArrayId, VertexArrayDesc>,
    pipelines: PipelineCache,
    samplers: SamplerCache,

    /// Keeps the window alive as long as its surface
    _window: Arc<Window>,
}

impl VulkanGraphicsDevice {
    /// Create a device presenting to `window`
    ///
    /// # Errors
    ///
    /// `Error::ContextCreation` if any part of the context cannot be created.
    pub fn new(window: Arc<Window>, config: &DeviceConfig) -> Result<Self> {
        let diagnostics = config
            .enable_diagnostics
            .then(|| Box::new(DiagnosticChannel::new(config.diagnostic_severity)));

        unsafe {
            let objects = create_instance_objects(&window, config, diagnostics.as_deref())?;
            let choice = match pick_physical_device(&objects) {
                Ok(choice) => choice,
                Err(e) => {
                    objects.destroy();
                    return Err(e);
                }
            };

            let queue_priorities = [1.0];
            let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(choice.queue_family)
                .queue_priorities(&queue_priorities)];
            let device_extension_names = [ash::khr::swapchain::NAME.as_ptr()];
            let device_features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(choice.anisotropy);
            let mut features13 = vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true);

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names)
                .enabled_features(&device_features)
                .push_next(&mut features13);

            let device = match objects
                .instance
                .create_device(choice.physical_device, &device_create_info, None)
            {
                Ok(device) => device,
                Err(e) => {
                    objects.destroy();
                    return Err(context_error(format!("Failed to create logical device: {:?}", e)));
                }
            };
            let graphics_queue = device.get_device_queue(choice.queue_family, 0);

            let allocator = match Allocator::new(&AllocatorCreateDesc {
                instance: objects.instance.clone(),
                device: device.clone(),
                physical_device: choice.physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            }) {
                Ok(allocator) => allocator,
                Err(e) => {
                    device.destroy_device(None);
                    objects.destroy();
                    return Err(context_error(format!("Failed to create GPU allocator: {:?}", e)));
                }
            };

            // TRANSIENT + RESET for reusable one-shot uploads
            let upload_pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(choice.queue_family)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            let upload_command_pool = match device.create_command_pool(&upload_pool_create_info, None) {
                Ok(pool) => pool,
                Err(e) => {
                    drop(allocator);
                    device.destroy_device(None);
                    objects.destroy();
                    return Err(context_error(format!("Failed to create upload command pool: {:?}", e)));
                }
            };

            let limits = objects
                .instance
                .get_physical_device_properties(choice.physical_device)
                .limits;
            let caps = DeviceCaps {
                backend_name: "Vulkan".to_string(),
                max_samples: max_sample_count(
                    limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts,
                ),
                max_texture_size: limits.max_image_dimension2_d.min(limits.max_image_dimension_cube),
                clip_space_y_down: true,
            };

            let InstanceObjects {
                entry,
                instance,
                debug_utils,
                surface_loader,
                surface,
            } = objects;

            // From here on Drop cleans up whatever was created
            let mut this = Self {
                _entry: entry,
                ctx: GpuContext {
                    instance,
                    physical_device: choice.physical_device,
                    device,
                    allocator: ManuallyDrop::new(Mutex::new(allocator)),
                    graphics_queue,
                    graphics_queue_family: choice.queue_family,
                    upload_command_pool,
                    limits,
                    anisotropy: choice.anisotropy,
                },
                debug_utils,
                diagnostics,
                swapchain: None,
                frames: Vec::with_capacity(MAX_FRAMES_IN_FLIGHT),
                current_frame: 0,
                recording: None,
                gpu_busy: false,
                caps,
                stages: SlotMap::with_key(),
                programs: SlotMap::with_key(),
                textures: SlotMap::with_key(),
                render_targets: SlotMap::with_key(),
                framebuffers: SlotMap::with_key(),
                buffers: SlotMap::with_key(),
                vertex_arrays: SlotMap::with_key(),
                pipelines: PipelineCache::default(),
                samplers: SamplerCache::default(),
                _window: window,
            };

            this.swapchain = Some(Swapchain::new(&this.ctx, surface, surface_loader, config.width, config.height)?);
            for _ in 0..MAX_FRAMES_IN_FLIGHT {
                let frame = FrameResources::new(&this.ctx).map_err(|e| context_error(e.to_string()))?;
                this.frames.push(frame);
            }

            ibl_info!(
                "ibl::vulkan",
                "Vulkan device ready: {} (max {} samples, textures up to {})",
                choice.name,
                this.caps.max_samples,
                this.caps.max_texture_size
            );
            Ok(this)
        }
    }

    fn swapchain(&self) -> Result<&Swapchain> {
        self.swapchain
            .as_ref()
            .ok_or_else(|| ibl_err!("ibl::vulkan", "Swapchain is not available"))
    }

    fn command_buffer(&self) -> vk::CommandBuffer {
        self.frames[self.current_frame].command_buffer
    }

    /// Wait for in-flight frames before a resource is destroyed
    fn idle_before_destroy(&mut self) {
        if self.gpu_busy {
            unsafe {
                self.ctx.device.device_wait_idle().ok();
            }
            self.gpu_busy = false;
        }
    }

    /// Reject one-shot submissions while a frame is being recorded
    fn check_outside_frame(&self, operation: &str) -> Result<()> {
        if self.recording.is_some() {
            return Err(invalid(format!("{} is not allowed while a frame is being recorded", operation)));
        }
        Ok(())
    }

    fn recording_mut(&mut self, operation: &str) -> Result<&mut Recording> {
        match self.recording.as_mut() {
            Some(recording) => Ok(recording),
            None => Err(ibl_err!("ibl::vulkan", "{}: no frame is being recorded", operation)),
        }
    }

    fn acquire_image(&mut self) -> Result<u32> {
        let frame = self.current_frame;
        let swapchain = self
            .swapchain
            .as_mut()
            .ok_or_else(|| ibl_err!("ibl::vulkan", "Swapchain is not available"))?;
        if let Some(index) = swapchain.acquire(frame)? {
            return Ok(index);
        }

        ibl_debug!("ibl::vulkan", "Swapchain out of date, recreating");
        unsafe {
            self.ctx
                .device
                .device_wait_idle()
                .map_err(|e| ibl_err!("ibl::vulkan", "Failed to wait idle before swapchain recreate: {:?}", e))?;
        }
        swapchain.recreate(&self.ctx)?;
        swapchain
            .acquire(frame)?
            .ok_or_else(|| ibl_err!("ibl::vulkan", "Swapchain still out of date after recreation"))
    }
}

impl GraphicsDevice for VulkanGraphicsDevice {
    fn caps(&self) -> &DeviceCaps {
        &self.caps
    }

    fn surface_info(&self) -> SurfaceInfo {
        match &self.swapchain {
            Some(swapchain) => SurfaceInfo {
                width: swapchain.extent().width,
                height: swapchain.extent().height,
                format: swapchain.format(),
            },
            None => SurfaceInfo {
                width: 0,
                height: 0,
                format: crate::vulkan_format::vk_format_to_format(vk::Format::UNDEFINED),
            },
        }
    }

    // ===== SHADERS =====

    fn create_shader_stage(&mut self, name: &str, stage: ShaderStage, code: &[u8]) -> Result<ShaderStageId> {
        let module = ShaderStageModule::compile(name, stage, code)?;
        Ok(self.stages.insert(module))
    }

    fn destroy_shader_stage(&mut self, id: ShaderStageId) {
        // Stages hold no Vulkan objects
        self.stages.remove(id);
    }

    fn link_program(&mut self, stages: &[ShaderStageId]) -> Result<ProgramId> {
        let mut modules = Vec::with_capacity(stages.len());
        for &id in stages {
            let module = self.stages.get(id).ok_or_else(|| {
                ibl_error!("ibl::vulkan", "Program link failed: unknown shader stage");
                Error::ShaderLink { log: "unknown shader stage".to_string() }
            })?;
            modules.push(module);
        }
        let program = Program::link(&self.ctx, &modules)?;
        Ok(self.programs.insert(program))
    }

    fn destroy_program(&mut self, id: ProgramId) {
        if !self.programs.contains_key(id) {
            return;
        }
        self.idle_before_destroy();
        self.pipelines.purge_program(&self.ctx, id);
        if let Some(program) = self.programs.remove(id) {
            program.destroy(&self.ctx);
        }
    }

    // ===== TEXTURES =====

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId> {
        let max = self.caps.max_texture_size;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(invalid(format!(
                "texture size {}x{} outside 1..={}",
                desc.width, desc.height, max
            )));
        }
        if desc.kind == TextureKind::Cube && desc.width != desc.height {
            return Err(invalid("cube faces must be square".to_string()));
        }
        let max_levels = 32 - desc.width.max(desc.height).leading_zeros();
        if desc.levels == 0 || desc.levels > max_levels {
            return Err(invalid(format!("invalid level count {}", desc.levels)));
        }

        let texture = Texture::new(&self.ctx, desc)?;
        Ok(self.textures.insert(texture))
    }

    fn upload_texture(&mut self, id: TextureId, layer: u32, data: &[u8]) -> Result<()> {
        self.check_outside_frame("upload_texture")?;
        let texture = self
            .textures
            .get_mut(id)
            .ok_or_else(|| invalid("upload_texture: unknown texture".to_string()))?;

        let desc = &texture.desc;
        if layer >= desc.kind.layers() {
            return Err(invalid(format!("layer {} out of range for {:?}", layer, desc.kind)));
        }
        let expected = desc.width as usize * desc.height as usize * desc.format.bytes_per_pixel() as usize;
        if data.len() != expected {
            return Err(invalid(format!(
                "upload of {} bytes, expected {} for {}x{} {:?}",
                data.len(),
                expected,
                desc.width,
                desc.height,
                desc.format
            )));
        }

        texture.upload(&self.ctx, layer, data)?;
        ibl_trace!("ibl::vulkan", "Uploaded layer {} ({} bytes)", layer, data.len());
        Ok(())
    }

    fn generate_mipmaps(&mut self, id: TextureId) -> Result<()> {
        self.check_outside_frame("generate_mipmaps")?;
        let texture = self
            .textures
            .get_mut(id)
            .ok_or_else(|| invalid("generate_mipmaps: unknown texture".to_string()))?;
        if texture.desc.levels <= 1 {
            return Err(invalid("texture has a single level".to_string()));
        }
        texture.generate_mipmaps(&self.ctx)
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if !self.textures.contains_key(id) {
            return;
        }
        self.idle_before_destroy();
        if let Some(texture) = self.textures.remove(id) {
            texture.gpu.destroy(&self.ctx);
        }
    }

    // ===== RENDER TARGETS / FRAMEBUFFERS =====

    fn create_render_target(&mut self, desc: &RenderTargetDesc) -> Result<RenderTargetId> {
        let max = self.caps.max_texture_size;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(invalid(format!(
                "render target size {}x{} outside 1..={}",
                desc.width, desc.height, max
            )));
        }
        let target = RenderTarget::new(&self.ctx, desc)?;
        Ok(self.render_targets.insert(target))
    }

    fn destroy_render_target(&mut self, id: RenderTargetId) {
        if !self.render_targets.contains_key(id) {
            return;
        }
        self.idle_before_destroy();
        if let Some(target) = self.render_targets.remove(id) {
            target.gpu.destroy(&self.ctx);
        }
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Result<FramebufferId> {
        let color = match desc.color {
            ColorAttachment::Texture(id) => self.textures.get(id).map(ColorImage::Texture),
            ColorAttachment::RenderTarget(id) => self.render_targets.get(id).map(ColorImage::RenderTarget),
        };
        let depth = self.render_targets.get(desc.depth_stencil);
        let framebuffer = Framebuffer::new(desc.color, color, desc.depth_stencil, depth)?;
        ibl_debug!(
            "ibl::vulkan",
            "Created framebuffer {}x{} x{}",
            framebuffer.width,
            framebuffer.height,
            framebuffer.samples
        );
        Ok(self.framebuffers.insert(framebuffer))
    }

    fn destroy_framebuffer(&mut self, id: FramebufferId) {
        // No Vulkan object behind a framebuffer
        self.framebuffers.remove(id);
    }

    fn resolve_framebuffer(&mut self, src: FramebufferId, dst: FramebufferId) -> Result<()> {
        let recording = self.recording_mut("resolve_framebuffer")?;
        if recording.pass.is_some() {
            ibl_bail!("ibl::vulkan", "resolve_framebuffer called inside a pass");
        }

        let (Some(src_fb), Some(dst_fb)) = (self.framebuffers.get(src).copied(), self.framebuffers.get(dst).copied())
        else {
            return Err(invalid("resolve: unknown framebuffer".to_string()));
        };
        let (ColorAttachment::RenderTarget(src_id), ColorAttachment::Texture(dst_id)) = (src_fb.color, dst_fb.color)
        else {
            return Err(invalid(
                "resolve: source color must be a render target and destination color a texture".to_string(),
            ));
        };
        if src_fb.samples < 2 || (src_fb.width, src_fb.height) != (dst_fb.width, dst_fb.height) {
            return Err(invalid("resolve: incompatible framebuffers".to_string()));
        }

        let cb = self.frames[self.current_frame].command_buffer;
        let device = &self.ctx.device;
        let (Some(src_target), Some(dst_texture)) = (self.render_targets.get_mut(src_id), self.textures.get_mut(dst_id))
        else {
            return Err(invalid("resolve: framebuffer attachment was destroyed".to_string()));
        };

        src_target.gpu.transition(device, cb, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        dst_texture.gpu.transition(device, cb, vk::ImageLayout::TRANSFER_DST_OPTIMAL);

        let subresource = vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let region = vk::ImageResolve {
            src_subresource: subresource,
            src_offset: vk::Offset3D::default(),
            dst_subresource: subresource,
            dst_offset: vk::Offset3D::default(),
            extent: vk::Extent3D {
                width: src_fb.width,
                height: src_fb.height,
                depth: 1,
            },
        };
        unsafe {
            device.cmd_resolve_image(
                cb,
                src_target.gpu.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst_texture.gpu.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
        dst_texture.gpu.transition(device, cb, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        ibl_trace!("ibl::vulkan", "Resolved {}x{}", src_fb.width, src_fb.height);
        Ok(())
    }

    // ===== GEOMETRY =====

    fn create_buffer(&mut self, usage: BufferUsage, data: &[u8]) -> Result<BufferId> {
        if data.is_empty() {
            return Err(invalid(format!("{:?} buffer cannot be empty", usage)));
        }
        let buffer = Buffer::new(&self.ctx, usage, data.len() as u64)?;
        if let Err(e) = buffer.write(0, data) {
            buffer.destroy(&self.ctx);
            return Err(e);
        }
        Ok(self.buffers.insert(buffer))
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        if !self.buffers.contains_key(id) {
            return;
        }
        self.idle_before_destroy();
        if let Some(buffer) = self.buffers.remove(id) {
            buffer.destroy(&self.ctx);
        }
    }

    fn create_vertex_array(&mut self, desc: &VertexArrayDesc) -> Result<VertexArrayId> {
        match self.buffers.get(desc.vertex_buffer) {
            Some(buffer) if buffer.usage == BufferUsage::Vertex => {}
            Some(_) => return Err(invalid("vertex array: vertex buffer has the wrong usage".to_string())),
            None => return Err(invalid("vertex array references unknown buffer".to_string())),
        }
        if let Some((index_buffer, _)) = desc.index_buffer {
            match self.buffers.get(index_buffer) {
                Some(buffer) if buffer.usage == BufferUsage::Index => {}
                Some(_) => return Err(invalid("vertex array: index buffer has the wrong usage".to_string())),
                None => return Err(invalid("vertex array references unknown buffer".to_string())),
            }
        }
        if desc.layout.stride == 0 || desc.layout.attributes.is_empty() {
            return Err(invalid("vertex array layout is empty".to_string()));
        }
        Ok(self.vertex_arrays.insert(desc.clone()))
    }

    fn destroy_vertex_array(&mut self, id: VertexArrayId) {
        self.vertex_arrays.remove(id);
    }

    // ===== FRAME =====

    fn begin_frame(&mut self) -> Result<()> {
        if self.recording.is_some() {
            ibl_bail!("ibl::vulkan", "begin_frame: frame already open");
        }
        self.frames[self.current_frame].reset(&self.ctx)?;
        let image_index = self.acquire_image()?;

        let cb = self.command_buffer();
        let begin_info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.ctx
                .device
                .begin_command_buffer(cb, &begin_info)
                .map_err(|e| ibl_err!("ibl::vulkan", "Failed to begin frame command buffer: {:?}", e))?;
        }

        self.recording = Some(Recording {
            image_index,
            pass: None,
            surface_ready: false,
        });
        ibl_trace!("ibl::vulkan", "Frame {} begins on image {}", self.current_frame, image_index);
        Ok(())
    }

    fn begin_pass(&mut self, target: PassTarget, clear: &ClearValues) -> Result<()> {
        let recording = *self.recording_mut("begin_pass")?;
        if recording.pass.is_some() {
            ibl_bail!("ibl::vulkan", "begin_pass: a pass is already open");
        }
        let cb = self.command_buffer();
        let device = &self.ctx.device;

        let color_clear = vk::ClearValue {
            color: vk::ClearColorValue { float32: clear.color },
        };
        let depth_clear = vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: clear.depth,
                stencil: clear.stencil,
            },
        };

        let (color_view, depth, active, extent) = match target {
            PassTarget::Surface => {
                let swapchain = self
                    .swapchain
                    .as_ref()
                    .ok_or_else(|| ibl_err!("ibl::vulkan", "Swapchain is not available"))?;
                // Contents are cleared, so the previous layout doesn't matter
                transition_image(
                    device,
                    cb,
                    swapchain.image(recording.image_index),
                    vk::ImageAspectFlags::COLOR,
                    1,
                    1,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                );
                let active = ActivePass {
                    target,
                    color_format: swapchain.vk_format(),
                    depth_format: None,
                    samples: vk::SampleCountFlags::TYPE_1,
                };
                (swapchain.image_view(recording.image_index), None, active, swapchain.extent())
            }
            PassTarget::Framebuffer(id) => {
                let framebuffer = *self
                    .framebuffers
                    .get(id)
                    .ok_or_else(|| invalid("begin_pass: unknown framebuffer".to_string()))?;
                let dead = || invalid("begin_pass: framebuffer attachment was destroyed".to_string());

                let (color_view, color_format) = match framebuffer.color {
                    ColorAttachment::Texture(tex_id) => {
                        let texture = self.textures.get_mut(tex_id).ok_or_else(dead)?;
                        texture.gpu.transition(device, cb, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
                        (texture.gpu.view, texture.gpu.format)
                    }
                    ColorAttachment::RenderTarget(rt_id) => {
                        let target = self.render_targets.get_mut(rt_id).ok_or_else(dead)?;
                        target.gpu.transition(device, cb, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
                        (target.gpu.view, target.gpu.format)
                    }
                };

                let depth_target = self.render_targets.get_mut(framebuffer.depth_stencil).ok_or_else(dead)?;
                // Depth is cleared every pass
                depth_target.gpu.layout = vk::ImageLayout::UNDEFINED;
                depth_target
                    .gpu
                    .transition(device, cb, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
                let has_stencil = depth_target.desc.format.has_stencil();

                let samples = samples_to_vk(framebuffer.samples).unwrap_or(vk::SampleCountFlags::TYPE_1);
                let active = ActivePass {
                    target,
                    color_format,
                    depth_format: Some(depth_target.gpu.format),
                    samples,
                };
                let extent = vk::Extent2D {
                    width: framebuffer.width,
                    height: framebuffer.height,
                };
                (color_view, Some((depth_target.gpu.view, has_stencil)), active, extent)
            }
        };

        let color_attachments = [vk::RenderingAttachmentInfo::default()
            .image_view(color_view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(color_clear)];
        let depth_attachment = depth.map(|(view, _)| {
            vk::RenderingAttachmentInfo::default()
                .image_view(view)
                .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .clear_value(depth_clear)
        });

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(attachment) = depth_attachment.as_ref() {
            rendering_info = rendering_info.depth_attachment(attachment);
            if depth.is_some_and(|(_, stencil)| stencil) {
                rendering_info = rendering_info.stencil_attachment(attachment);
            }
        }

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        unsafe {
            device.cmd_begin_rendering(cb, &rendering_info);
            device.cmd_set_viewport(cb, 0, &[viewport]);
            device.cmd_set_scissor(cb, 0, &[render_area]);
        }

        if let Some(recording) = self.recording.as_mut() {
            recording.pass = Some(active);
        }
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall) -> Result<()> {
        let Some(pass) = self.recording.and_then(|r| r.pass) else {
            ibl_bail!("ibl::vulkan", "draw outside of a pass");
        };

        let program = self
            .programs
            .get(call.program)
            .ok_or_else(|| invalid("draw references a dead program".to_string()))?;
        let vertex_array = self
            .vertex_arrays
            .get(call.vertex_array)
            .ok_or_else(|| invalid("draw references a dead vertex array".to_string()))?;
        let vertex_buffer = self
            .buffers
            .get(vertex_array.vertex_buffer)
            .ok_or_else(|| invalid("draw references a dead vertex buffer".to_string()))?;
        let index_buffer = match vertex_array.index_buffer {
            Some((id, index_type)) => Some((
                self.buffers
                    .get(id)
                    .ok_or_else(|| invalid("draw references a dead index buffer".to_string()))?,
                index_type,
            )),
            None => None,
        };

        let key = PipelineKey {
            program: call.program,
            layout: vertex_array.layout.clone(),
            topology: call.topology,
            state: call.state,
            color_format: pass.color_format,
            depth_format: pass.depth_format,
            samples: pass.samples,
        };
        let pipeline = self.pipelines.get(&self.ctx, &key, program)?;

        // Gather descriptor contents before touching the frame
        let alignment = self.ctx.limits.min_uniform_buffer_offset_alignment;
        let frame = &mut self.frames[self.current_frame];
        let mut buffer_infos: Vec<(u32, vk::DescriptorBufferInfo)> = Vec::new();
        let mut image_infos: Vec<(u32, vk::DescriptorImageInfo)> = Vec::new();
        for binding in &program.bindings {
            match binding.kind {
                DescriptorKind::UniformBuffer => {
                    let block = call
                        .uniforms
                        .iter()
                        .find(|u| u.binding == binding.binding)
                        .ok_or_else(|| {
                            invalid(format!(
                                "draw with {} is missing uniform block '{}' (binding {})",
                                program.name, binding.name, binding.binding
                            ))
                        })?;
                    let (buffer, offset) = frame.push_uniform(block.data, alignment)?;
                    buffer_infos.push((
                        binding.binding,
                        vk::DescriptorBufferInfo {
                            buffer,
                            offset,
                            range: block.data.len() as u64,
                        },
                    ));
                }
                DescriptorKind::CombinedImageSampler => {
                    let sampled = call
                        .textures
                        .iter()
                        .find(|t| t.binding == binding.binding)
                        .ok_or_else(|| {
                            invalid(format!(
                                "draw with {} is missing texture '{}' (binding {})",
                                program.name, binding.name, binding.binding
                            ))
                        })?;
                    let texture = self
                        .textures
                        .get(sampled.texture)
                        .ok_or_else(|| invalid("draw references a dead texture".to_string()))?;
                    if texture.gpu.layout != vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL {
                        return Err(invalid(format!(
                            "texture bound at {} is not readable (layout {:?})",
                            binding.binding, texture.gpu.layout
                        )));
                    }
                    let sampler = self.samplers.get(&self.ctx, SamplerKind::for_texture(&texture.desc))?;
                    image_infos.push((
                        binding.binding,
                        vk::DescriptorImageInfo {
                            sampler,
                            image_view: texture.gpu.view,
                            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                        },
                    ));
                }
            }
        }

        let set = frame.allocate_set(&self.ctx, program.set_layout)?;
        let mut writes = Vec::with_capacity(buffer_infos.len() + image_infos.len());
        for (binding, info) in &buffer_infos {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(info)),
            );
        }
        for (binding, info) in &image_infos {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(std::slice::from_ref(info)),
            );
        }

        let cb = frame.command_buffer;
        let device = &self.ctx.device;
        unsafe {
            device.update_descriptor_sets(&writes, &[]);
            device.cmd_bind_pipeline(cb, vk::PipelineBindPoint::GRAPHICS, pipeline);
            device.cmd_bind_descriptor_sets(
                cb,
                vk::PipelineBindPoint::GRAPHICS,
                program.pipeline_layout,
                0,
                &[set],
                &[],
            );
            device.cmd_bind_vertex_buffers(cb, 0, &[vertex_buffer.buffer], &[0]);
            match index_buffer {
                Some((buffer, index_type)) => {
                    let vk_index_type = match index_type {
                        IndexType::U16 => vk::IndexType::UINT16,
                        IndexType::U32 => vk::IndexType::UINT32,
                    };
                    device.cmd_bind_index_buffer(cb, buffer.buffer, 0, vk_index_type);
                    device.cmd_draw_indexed(cb, call.element_count, 1, 0, 0, 0);
                }
                None => device.cmd_draw(cb, call.element_count, 1, 0, 0),
            }
        }
        Ok(())
    }

    fn end_pass(&mut self) -> Result<()> {
        let recording = *self.recording_mut("end_pass")?;
        let Some(pass) = recording.pass else {
            ibl_bail!("ibl::vulkan", "end_pass without begin_pass");
        };
        let cb = self.command_buffer();
        let device = &self.ctx.device;
        unsafe {
            device.cmd_end_rendering(cb);
        }

        let mut surface_ready = recording.surface_ready;
        match pass.target {
            PassTarget::Surface => {
                let image = self.swapchain()?.image(recording.image_index);
                transition_image(
                    device,
                    cb,
                    image,
                    vk::ImageAspectFlags::COLOR,
                    1,
                    1,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    vk::ImageLayout::PRESENT_SRC_KHR,
                );
                surface_ready = true;
            }
            PassTarget::Framebuffer(id) => {
                // Single-sample colors are sampled by later passes
                if let Some(ColorAttachment::Texture(tex_id)) = self.framebuffers.get(id).map(|fb| fb.color) {
                    if let Some(texture) = self.textures.get_mut(tex_id) {
                        texture.gpu.transition(device, cb, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
                    }
                }
            }
        }

        if let Some(recording) = self.recording.as_mut() {
            recording.pass = None;
            recording.surface_ready = surface_ready;
        }
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        let recording = *self.recording_mut("present")?;
        if recording.pass.is_some() {
            ibl_bail!("ibl::vulkan", "present called inside a pass");
        }
        let cb = self.command_buffer();
        let frame = &self.frames[self.current_frame];
        let swapchain = self
            .swapchain
            .as_mut()
            .ok_or_else(|| ibl_err!("ibl::vulkan", "Swapchain is not available"))?;

        unsafe {
            if !recording.surface_ready {
                // Nothing drew to the surface this frame
                transition_image(
                    &self.ctx.device,
                    cb,
                    swapchain.image(recording.image_index),
                    vk::ImageAspectFlags::COLOR,
                    1,
                    1,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::PRESENT_SRC_KHR,
                );
            }
            self.ctx
                .device
                .end_command_buffer(cb)
                .map_err(|e| ibl_err!("ibl::vulkan", "Failed to end frame command buffer: {:?}", e))?;

            let wait_semaphores = [swapchain.image_available_semaphore(self.current_frame)];
            let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
            let signal_semaphores = [swapchain.render_finished_semaphore(recording.image_index)];
            let command_buffers = [cb];
            let submit_info = vk::SubmitInfo::default()
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages)
                .command_buffers(&command_buffers)
                .signal_semaphores(&signal_semaphores);

            self.ctx
                .device
                .reset_fences(&[frame.in_flight])
                .map_err(|e| ibl_err!("ibl::vulkan", "Failed to reset frame fence: {:?}", e))?;
            self.ctx
                .device
                .queue_submit(self.ctx.graphics_queue, &[submit_info], frame.in_flight)
                .map_err(|e| ibl_err!("ibl::vulkan", "Failed to submit frame: {:?}", e))?;
        }

        // The frame is submitted whatever present reports
        self.recording = None;
        self.gpu_busy = true;
        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;

        if swapchain.present(self.ctx.graphics_queue, recording.image_index)? {
            ibl_debug!("ibl::vulkan", "Swapchain suboptimal or out of date after present, recreating");
            unsafe {
                self.ctx
                    .device
                    .device_wait_idle()
                    .map_err(|e| ibl_err!("ibl::vulkan", "Failed to wait idle before swapchain recreate: {:?}", e))?;
            }
            swapchain.recreate(&self.ctx)?;
        }
        Ok(())
    }

    fn abort_frame(&mut self) {
        let Some(recording) = self.recording.as_mut() else {
            return;
        };
        let cb = self.frames[self.current_frame].command_buffer;
        if recording.pass.take().is_some() {
            unsafe { self.ctx.device.cmd_end_rendering(cb) };
        }
        // Discard whatever reached the surface; present still releases the acquired image
        recording.surface_ready = false;
        ibl_warn!("ibl::vulkan", "Aborting frame {}", self.current_frame);

        if let Err(e) = self.present() {
            ibl_error!("ibl::vulkan", "Failed to submit aborted frame: {}", e);
            // The next begin_frame resets the command pool
            self.recording = None;
            if let Err(e) = unsafe { self.ctx.device.device_wait_idle() } {
                ibl_error!("ibl::vulkan", "Failed to wait idle after aborted frame: {:?}", e);
            }
        }
    }

    fn wait_idle(&mut self) -> Result<()> {
        unsafe {
            self.ctx
                .device
                .device_wait_idle()
                .map_err(|e| ibl_err!("ibl::vulkan", "Failed to wait idle: {:?}", e))?;
        }
        self.gpu_busy = false;
        Ok(())
    }

    // ===== DIAGNOSTICS =====

    fn emit_diagnostic(&self, message: &DebugMessage) -> bool {
        self.diagnostics
            .as_ref()
            .map_or(false, |channel| channel.report(message))
    }
}

impl Drop for VulkanGraphicsDevice {
    fn drop(&mut self) {
        unsafe {
            // Wait for device to finish
            self.ctx.device.device_wait_idle().ok();

            let leaked = self.programs.len() + self.textures.len() + self.render_targets.len() + self.buffers.len();
            if leaked > 0 {
                ibl_warn!("ibl::vulkan", "Destroying device with {} live resources", leaked);
            }

            // 1. Resources, pipelines and samplers while the device is alive
            self.pipelines.destroy_all(&self.ctx);
            for (_, program) in self.programs.drain() {
                program.destroy(&self.ctx);
            }
            for (_, texture) in self.textures.drain() {
                texture.gpu.destroy(&self.ctx);
            }
            for (_, target) in self.render_targets.drain() {
                target.gpu.destroy(&self.ctx);
            }
            for (_, buffer) in self.buffers.drain() {
                buffer.destroy(&self.ctx);
            }
            self.samplers.destroy_all(&self.ctx);

            // 2. Frames, swapchain (and surface), upload pool
            for frame in &mut self.frames {
                frame.destroy(&self.ctx);
            }
            if let Some(mut swapchain) = self.swapchain.take() {
                swapchain.destroy(&self.ctx);
            }
            self.ctx.device.destroy_command_pool(self.ctx.upload_command_pool, None);

            // 3. Allocator: free VkDeviceMemory pages BEFORE destroying device
            ManuallyDrop::drop(&mut self.ctx.allocator);

            // 4. Debug messenger BEFORE device and instance
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }

            // 5. Device and instance
            self.ctx.device.destroy_device(None);
            self.ctx.instance.destroy_instance(None);
        }

        if let Some(channel) = &self.diagnostics {
            print_diagnostic_report(&channel.stats(), channel.repeated_messages());
        }
    }
}
