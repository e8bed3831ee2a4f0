// =============================================================================
// CONTEXT - one-time bring-up and teardown of the rendering context
// =============================================================================
//
// Bring-up order is a hard dependency chain:
//   loader -> instance (+ validation) -> physical device -> window + surface
//          -> queue families -> logical device -> swap chain
// Teardown runs the same chain backwards. A failing step unwinds whatever
// was already created; a half-built context is never returned.

use crate::backend::device::{self, LogicalDevice, PhysicalDeviceInfo};
use crate::backend::instance::{self, DebugMessenger};
use crate::backend::presentation::{PresentationDevice, VulkanPresentation};
use crate::backend::queue::{self, QueueAssignment};
use crate::backend::surface::{self, PresentationSurface, WindowParams};
use crate::backend::swapchain::{PresentationConfig, SwapChainManager};
use crate::config::Config;
use crate::error::{InitError, Result};
use ash::extensions::khr::Swapchain;
use ash::{vk, Entry};
use raw_window_handle::HasRawDisplayHandle;
use std::time::Duration;
use winit::event_loop::ActiveEventLoop;
use winit::window::Window;

/// Everything created between the instance and the swap chain
struct DeviceStage {
    physical_device: vk::PhysicalDevice,
    device_info: PhysicalDeviceInfo,
    window: Window,
    extent: vk::Extent2D,
    surface: PresentationSurface,
    queues: QueueAssignment,
    logical: LogicalDevice,
}

/// The rendering context. One per process.
///
/// Dropping it (or calling [`Context::cleanup`]) destroys every object in
/// reverse creation order.
pub struct Context {
    config: Config,

    // ─────────────────────────────────────────────────────────────────────────
    // SWAP CHAIN
    // ─────────────────────────────────────────────────────────────────────────
    swapchain: SwapChainManager,
    swapchain_loader: Swapchain,
    /// Size used when the surface lets us pick; updated when it doesn't
    extent: vk::Extent2D,

    // ─────────────────────────────────────────────────────────────────────────
    // DEVICE
    // ─────────────────────────────────────────────────────────────────────────
    logical: LogicalDevice,
    queues: QueueAssignment,
    surface: PresentationSurface,
    physical_device: vk::PhysicalDevice,
    device_info: PhysicalDeviceInfo,

    // ─────────────────────────────────────────────────────────────────────────
    // INSTANCE
    // ─────────────────────────────────────────────────────────────────────────
    debug: Option<DebugMessenger>,
    instance: ash::Instance,
    _entry: Entry,

    /// Dropped after the surface and instance are gone
    window: Window,

    fps_target: Option<f32>,
    fps_target_from_env: bool,
}

impl Context {
    /// Bring up the whole context for a new window.
    pub fn init(
        event_loop: &ActiveEventLoop,
        params: &WindowParams,
        enable_validation: bool,
        config: Config,
    ) -> Result<Self> {
        log::info!("Initializing Vulkan context...");

        let entry = instance::load_entry()?;
        let instance = instance::create_instance(
            &entry,
            &params.title,
            event_loop.raw_display_handle(),
            enable_validation,
        )?;

        // Validation output is informational; bring-up goes on without it
        let debug = if enable_validation {
            optional(DebugMessenger::new(&entry, &instance))
        } else {
            None
        };

        let stage = match Self::bring_up_device(&entry, &instance, event_loop, params) {
            Ok(stage) => stage,
            Err(e) => {
                if let Some(debug) = debug {
                    debug.destroy();
                }
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        };

        let swapchain_loader = Swapchain::new(&instance, &stage.logical.device);

        // From here on Drop handles the unwinding
        let mut context = Self {
            config,
            swapchain: SwapChainManager::new(),
            swapchain_loader,
            extent: stage.extent,
            logical: stage.logical,
            queues: stage.queues,
            surface: stage.surface,
            physical_device: stage.physical_device,
            device_info: stage.device_info,
            debug,
            instance,
            _entry: entry,
            window: stage.window,
            fps_target: None,
            fps_target_from_env: false,
        };

        context.rebuild_swap_chain()?;

        if let Some((fps, from_env)) = context.config.fps_target_override() {
            log::info!("Setting fps target from configuration to {:.2}", fps);
            context.set_framerate_target(fps);
            context.fps_target_from_env = from_env;
        }

        log::info!("Vulkan context initialized successfully!");
        Ok(context)
    }

    fn bring_up_device(
        entry: &Entry,
        instance: &ash::Instance,
        event_loop: &ActiveEventLoop,
        params: &WindowParams,
    ) -> Result<DeviceStage> {
        let (physical_device, device_info) = device::select_physical_device(instance)?;

        let window = surface::create_window(event_loop, params)?;
        let (width, height) = surface::settle_framebuffer_size(
            (params.width, params.height),
            || {
                let size = window.inner_size();
                (size.width, size.height)
            },
            surface::SETTLE_POLL_DELAY,
        );
        let extent = vk::Extent2D { width, height };

        let surface = PresentationSurface::new(entry, instance, physical_device, &window)?;

        let negotiated = queue::query_queue_families(
            instance,
            &surface.loader,
            physical_device,
            surface.surface,
        )
        .and_then(|families| queue::select_queue_families(&families))
        .and_then(|queues| {
            device::create_logical_device(instance, physical_device, &device_info, queues)
                .map(|logical| (queues, logical))
        });

        let (queues, logical) = match negotiated {
            Ok(negotiated) => negotiated,
            Err(e) => {
                surface.destroy();
                return Err(e);
            }
        };

        Ok(DeviceStage {
            physical_device,
            device_info,
            window,
            extent,
            surface,
            queues,
            logical,
        })
    }

    /// Throw away the current swap chain generation and build a new one.
    ///
    /// The caller must ensure no in-flight GPU work still uses the old
    /// images or semaphores (see [`Context::wait_idle`]).
    pub fn rebuild_swap_chain(&mut self) -> Result<PresentationConfig> {
        let present_mode_override = self.config.present_mode_override();
        let device = presentation(
            &self.logical,
            &self.swapchain_loader,
            &self.surface,
            self.physical_device,
        );

        self.swapchain.rebuild(
            &device,
            self.surface.format,
            self.queues,
            &mut self.extent,
            present_mode_override,
        )
    }

    /// Destroy the context. Equivalent to dropping it.
    pub fn cleanup(self) {
        drop(self);
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.logical.device.device_wait_idle() }
            .map_err(InitError::vulkan("Failed to wait for device idle"))
    }

    pub fn set_framerate_target(&mut self, fps: f32) {
        self.fps_target = Some(fps);
    }

    pub fn fps_target(&self) -> Option<f32> {
        self.fps_target
    }

    /// Time budget per frame implied by the frame-rate target
    pub fn frame_budget(&self) -> Option<Duration> {
        self.fps_target.map(frame_budget)
    }

    pub fn fps_target_from_env(&self) -> bool {
        self.fps_target_from_env
    }

    /// Record a new window size for the next rebuild.
    pub fn set_extent(&mut self, width: u32, height: u32) {
        self.extent = vk::Extent2D { width, height };
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn device_info(&self) -> &PhysicalDeviceInfo {
        &self.device_info
    }

    pub fn device(&self) -> &ash::Device {
        &self.logical.device
    }

    pub fn logical_device(&self) -> &LogicalDevice {
        &self.logical
    }

    pub fn queues(&self) -> QueueAssignment {
        self.queues
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.logical.graphics_queue
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.logical.present_queue
    }

    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface.format
    }

    pub fn swapchain(&self) -> &SwapChainManager {
        &self.swapchain
    }

    pub fn swapchain_mut(&mut self) -> &mut SwapChainManager {
        &mut self.swapchain
    }

    pub fn swapchain_loader(&self) -> &Swapchain {
        &self.swapchain_loader
    }
}

/// Keep going without an object whose creation failed.
fn optional<T>(result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("{}, continuing without it", e);
            None
        }
    }
}

fn frame_budget(fps: f32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(fps))
}

fn presentation<'a>(
    logical: &'a LogicalDevice,
    swapchain_loader: &'a Swapchain,
    surface: &'a PresentationSurface,
    physical_device: vk::PhysicalDevice,
) -> VulkanPresentation<'a> {
    VulkanPresentation {
        device: &logical.device,
        swapchain_loader,
        surface_loader: &surface.loader,
        physical_device,
        surface: surface.surface,
    }
}

/// Swap chain objects first, then the device they were created from.
fn release_device_objects<D: PresentationDevice>(swapchain: &mut SwapChainManager, device: &D) {
    swapchain.destroy(device);
    device.destroy_device();
}

impl Drop for Context {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan context...");

        if let Err(e) = self.wait_idle() {
            log::warn!("{}", e);
        }

        let device = presentation(
            &self.logical,
            &self.swapchain_loader,
            &self.surface,
            self.physical_device,
        );
        release_device_objects(&mut self.swapchain, &device);

        self.surface.destroy();
        if let Some(debug) = self.debug.take() {
            debug.destroy();
        }
        unsafe { self.instance.destroy_instance(None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{Call, FakeDevice};

    #[test]
    fn teardown_destroys_ring_then_chain_then_device() {
        let device = FakeDevice::new(vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            current_extent: vk::Extent2D {
                width: 640,
                height: 480,
            },
            ..Default::default()
        });
        let mut swapchain = SwapChainManager::new();
        let mut extent = vk::Extent2D::default();
        swapchain
            .rebuild(
                &device,
                crate::backend::surface::DEFAULT_SURFACE_FORMAT,
                QueueAssignment {
                    graphics: 0,
                    present: 0,
                },
                &mut extent,
                None,
            )
            .unwrap();

        release_device_objects(&mut swapchain, &device);

        let ring = device.position(|call| {
            matches!(call, Call::DestroyView(_) | Call::DestroySemaphore(_))
        });
        let chain = device.position(|call| matches!(call, Call::DestroySwapchain(_)));
        let destroyed_device = device.position(|call| *call == Call::DestroyDevice);

        assert_eq!(ring.len(), 3 * 3);
        assert_eq!(chain.len(), 1);
        assert_eq!(destroyed_device.len(), 1);
        assert!(ring.iter().all(|&index| index < chain[0]));
        assert!(chain[0] < destroyed_device[0]);
        assert_eq!(device.calls.borrow().last(), Some(&Call::DestroyDevice));
    }

    #[test]
    fn failed_debug_messenger_is_not_fatal() {
        let failed: Result<u32> = Err(InitError::Vulkan {
            what: "Failed to register debug callback",
            result: vk::Result::ERROR_EXTENSION_NOT_PRESENT,
        });
        assert_eq!(optional(failed), None);
        assert_eq!(optional(Ok(7u32)), Some(7));
    }

    #[test]
    fn frame_budget_follows_fps_target() {
        let budget = frame_budget(60.0);
        assert!((budget.as_secs_f64() * 1000.0 - 16.667).abs() < 0.001);
        assert_eq!(frame_budget(4.0), Duration::from_millis(250));
    }
}
