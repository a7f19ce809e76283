/*!
# IBL Pipeline - Vulkan Backend

Vulkan implementation of the `ibl_pipeline` device traits, built on Ash for
the Vulkan bindings and gpu-allocator for memory management.

Rendering uses dynamic rendering (Vulkan 1.3): framebuffers are attachment
sets bound when a pass begins, and graphics pipelines are built on first use
for each program, vertex layout, draw state and pass format combination.
Shader stages are SPIR-V binaries; descriptor layouts come from reflection.

```no_run
use std::sync::Arc;
use ibl_pipeline::ibl::PbrRenderer;
use ibl_pipeline_renderer_vulkan::ibl::VulkanDeviceFactory;
# fn run(window: Arc<winit::window::Window>, config: ibl_pipeline::ibl::render::RendererConfig,
#        assets: ibl_pipeline::ibl::SceneAssets) -> ibl_pipeline::ibl::Result<()> {
let mut renderer = PbrRenderer::new(VulkanDeviceFactory::new(window), config, assets);
# Ok(())
# }
```
*/

mod debug;
mod vulkan_buffer;
mod vulkan_context;
mod vulkan_device;
mod vulkan_factory;
mod vulkan_format;
mod vulkan_frame;
mod vulkan_frame_buffer;
mod vulkan_pipeline;
mod vulkan_sampler;
mod vulkan_shader;
mod vulkan_swapchain;
mod vulkan_texture;

pub mod ibl {
    pub use crate::vulkan_device::VulkanGraphicsDevice;
    pub use crate::vulkan_factory::VulkanDeviceFactory;
}
