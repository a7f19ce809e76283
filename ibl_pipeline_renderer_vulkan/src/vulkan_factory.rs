/// VulkanDeviceFactory - creates Vulkan devices presenting to a winit window

use ibl_pipeline::ibl::device::{DeviceConfig, DeviceFactory, GraphicsDevice};
use ibl_pipeline::ibl::Result;
use ibl_pipeline::ibl_info;
use std::sync::Arc;
use winit::window::Window;

use crate::vulkan_device::VulkanGraphicsDevice;

/// Device factory bound to one window
///
/// The renderer calls [`DeviceFactory::create_device`] when it is
/// initialized; every device created here presents to `window`.
pub struct VulkanDeviceFactory {
    window: Arc<Window>,
}

impl VulkanDeviceFactory {
    pub fn new(window: Arc<Window>) -> Self {
        Self { window }
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }
}

impl DeviceFactory for VulkanDeviceFactory {
    fn create_device(&mut self, config: &DeviceConfig) -> Result<Box<dyn GraphicsDevice>> {
        ibl_info!(
            "ibl::vulkan",
            "Creating Vulkan device for '{}' ({}x{}, {} samples)",
            config.app_name,
            config.width,
            config.height,
            config.samples
        );
        let device = VulkanGraphicsDevice::new(Arc::clone(&self.window), config)?;
        Ok(Box::new(device))
    }
}
