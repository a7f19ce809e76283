#![allow(dead_code)]
//! GPU test utilities - shared window and Vulkan factory for integration tests
//!
//! winit allows a single EventLoop per process, so every GPU test creates
//! its devices on the same hidden window. Devices themselves are created
//! per test; each one owns (and destroys) its own surface.

use ibl_pipeline::ibl::device::{DeviceConfig, GraphicsDevice};
use ibl_pipeline::ibl::diagnostics::DebugSeverity;
use ibl_pipeline_renderer_vulkan::ibl::{VulkanDeviceFactory, VulkanGraphicsDevice};
use std::sync::{Arc, OnceLock};
use winit::event_loop::EventLoop;
use winit::window::Window;

#[cfg(target_os = "windows")]
use winit::platform::windows::EventLoopBuilderExtWindows;
#[cfg(all(unix, not(target_os = "macos")))]
use winit::platform::x11::EventLoopBuilderExtX11;

pub const TEST_WIDTH: u32 = 320;
pub const TEST_HEIGHT: u32 = 240;

/// Global window (initialized once)
/// Note: EventLoop is intentionally leaked with mem::forget to keep Window valid
static GPU_WINDOW: OnceLock<Arc<Window>> = OnceLock::new();

/// Get the shared hidden test window
#[allow(deprecated)]
pub fn test_window() -> Arc<Window> {
    GPU_WINDOW
        .get_or_init(|| {
            // any_thread: cargo test runs tests outside the main thread
            let mut builder = EventLoop::builder();
            #[cfg(any(target_os = "windows", all(unix, not(target_os = "macos"))))]
            builder.with_any_thread(true);
            let event_loop = builder.build().unwrap();

            let window_attrs = Window::default_attributes()
                .with_title("GPU Test Window")
                .with_inner_size(winit::dpi::PhysicalSize::new(TEST_WIDTH, TEST_HEIGHT))
                .with_visible(false);
            let window = event_loop.create_window(window_attrs).unwrap();

            std::mem::forget(event_loop);
            Arc::new(window)
        })
        .clone()
}

/// Factory presenting to the shared window
pub fn test_factory() -> VulkanDeviceFactory {
    VulkanDeviceFactory::new(test_window())
}

/// Standalone Vulkan device on the shared window
pub fn test_device() -> Box<dyn GraphicsDevice> {
    let config = DeviceConfig {
        app_name: "ibl_pipeline integration tests".to_string(),
        width: TEST_WIDTH,
        height: TEST_HEIGHT,
        samples: 1,
        enable_diagnostics: true,
        diagnostic_severity: DebugSeverity::ErrorsAndWarnings,
    };
    Box::new(VulkanGraphicsDevice::new(test_window(), &config).expect("Failed to create Vulkan device for tests"))
}
