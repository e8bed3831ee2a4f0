// Window and presentation surface
//
// Creates the OS window, waits for its framebuffer size to settle, binds a
// Vulkan surface to it and resolves the color format used by every swap
// chain generation.

use crate::error::{InitError, Result};
use ash::extensions::khr::Surface;
use ash::{vk, Entry};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::time::Duration;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Fullscreen, Window};

/// Unchanged readings needed before a size that differs from the request is accepted
pub const SETTLE_STAGNANT_POLLS: u32 = 3;
/// Delay between unchanged readings
pub const SETTLE_POLL_DELAY: Duration = Duration::from_millis(100);
/// Upper bound on readings, in case the size never stops moving
pub const SETTLE_MAX_POLLS: u32 = 32;

/// Used when the surface has no preferred format
pub const DEFAULT_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::R8G8B8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

#[derive(Debug, Clone)]
pub struct WindowParams {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
    pub resizable: bool,
}

/// Minimum and optional maximum inner size for the window
fn size_limits(
    width: u32,
    height: u32,
    resizable: bool,
) -> (PhysicalSize<u32>, Option<PhysicalSize<u32>>) {
    if resizable {
        (PhysicalSize::new(1, 1), None)
    } else {
        let size = PhysicalSize::new(width, height);
        (size, Some(size))
    }
}

pub fn create_window(event_loop: &ActiveEventLoop, params: &WindowParams) -> Result<Window> {
    let (min_size, max_size) = size_limits(params.width, params.height, params.resizable);

    let mut attributes = Window::default_attributes()
        .with_title(params.title.clone())
        .with_inner_size(PhysicalSize::new(params.width, params.height))
        .with_resizable(params.resizable)
        .with_min_inner_size(min_size);

    if let Some(max_size) = max_size {
        attributes = attributes.with_max_inner_size(max_size);
    }
    if params.fullscreen {
        attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
    }

    let window = event_loop
        .create_window(attributes)
        .map_err(|e| InitError::WindowCreation(e.to_string()))?;

    log::info!(
        "Created window {}x{} ({}, {})",
        params.width,
        params.height,
        if params.fullscreen { "fullscreen" } else { "windowed" },
        if params.resizable { "resizable" } else { "fixed size" }
    );

    Ok(window)
}

/// Poll the framebuffer size until it can be trusted.
///
/// Returns as soon as the requested size is observed, or once the same
/// (different) size has been read `SETTLE_STAGNANT_POLLS` more times in a
/// row. A changed reading restarts the count. Never polls more than
/// `SETTLE_MAX_POLLS` times.
pub fn settle_framebuffer_size<F>(requested: (u32, u32), mut poll: F, delay: Duration) -> (u32, u32)
where
    F: FnMut() -> (u32, u32),
{
    let mut last = None;
    let mut stagnant = 0;

    for _ in 0..SETTLE_MAX_POLLS {
        let size = poll();
        if size == requested {
            return size;
        }

        if last == Some(size) {
            stagnant += 1;
            if stagnant == SETTLE_STAGNANT_POLLS {
                return size;
            }
            std::thread::sleep(delay);
        } else {
            stagnant = 0;
            last = Some(size);
        }
    }

    log::warn!("Framebuffer size never settled, using last observed size");
    last.unwrap_or(requested)
}

/// Pick the swap chain color format.
///
/// A lone `UNDEFINED` entry means the surface has no preference. Otherwise
/// the first sRGB-nonlinear entry wins, falling back to the first entry.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    match formats {
        [] => Err(InitError::NoSurfaceFormats),
        [only] if only.format == vk::Format::UNDEFINED => Ok(DEFAULT_SURFACE_FORMAT),
        _ => Ok(formats
            .iter()
            .copied()
            .find(|f| f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .unwrap_or_else(|| {
                log::warn!(
                    "No sRGB presentation surface available. Using format {:?}",
                    formats[0].format
                );
                formats[0]
            })),
    }
}

/// Window-bound presentation target
pub struct PresentationSurface {
    pub loader: Surface,
    pub surface: vk::SurfaceKHR,
    pub format: vk::SurfaceFormatKHR,
}

impl PresentationSurface {
    pub fn new(
        entry: &Entry,
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        window: &Window,
    ) -> Result<Self> {
        let loader = Surface::new(entry, instance);

        let surface = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        }
        .map_err(InitError::vulkan("Failed to create window surface"))?;

        let formats = unsafe { loader.get_physical_device_surface_formats(physical_device, surface) }
            .map_err(InitError::vulkan("Failed to query surface formats"));

        let format = match formats.and_then(|formats| choose_surface_format(&formats)) {
            Ok(format) => format,
            Err(e) => {
                unsafe { loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };

        log::info!(
            "Surface format: {:?} / {:?}",
            format.format,
            format.color_space
        );

        Ok(Self {
            loader,
            surface,
            format,
        })
    }

    /// Must run after every swap chain on this surface is gone.
    pub fn destroy(&self) {
        unsafe { self.loader.destroy_surface(self.surface, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn readings(sizes: &[(u32, u32)]) -> (impl FnMut() -> (u32, u32), std::rc::Rc<std::cell::Cell<usize>>) {
        let calls = std::rc::Rc::new(std::cell::Cell::new(0));
        let counter = calls.clone();
        let mut queue: VecDeque<_> = sizes.iter().copied().collect();
        let last = *sizes.last().unwrap();
        let poll = move || {
            counter.set(counter.get() + 1);
            queue.pop_front().unwrap_or(last)
        };
        (poll, calls)
    }

    #[test]
    fn requested_size_is_accepted_immediately() {
        let (poll, calls) = readings(&[(1920, 1080)]);
        let size = settle_framebuffer_size((1920, 1080), poll, Duration::ZERO);
        assert_eq!(size, (1920, 1080));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn waits_for_transient_sizes_to_pass() {
        let (poll, _) = readings(&[(640, 480), (1024, 768), (1920, 1080)]);
        let size = settle_framebuffer_size((1920, 1080), poll, Duration::ZERO);
        assert_eq!(size, (1920, 1080));
    }

    #[test]
    fn gives_up_after_three_stagnant_polls() {
        let (poll, calls) = readings(&[(1280, 800)]);
        let size = settle_framebuffer_size((1920, 1080), poll, Duration::ZERO);
        assert_eq!(size, (1280, 800));
        // One reading to notice the size, three more to call it stable
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn changed_size_restarts_the_count() {
        let (poll, calls) = readings(&[(800, 600), (800, 600), (1280, 800)]);
        let size = settle_framebuffer_size((1920, 1080), poll, Duration::ZERO);
        assert_eq!(size, (1280, 800));
        assert_eq!(calls.get(), 6);
    }

    #[test]
    fn never_polls_forever() {
        let mut width = 0;
        let size = settle_framebuffer_size(
            (1920, 1080),
            || {
                width += 1;
                (width, 100)
            },
            Duration::ZERO,
        );
        assert_eq!(size, (SETTLE_MAX_POLLS, 100));
    }

    #[test]
    fn fixed_size_windows_are_pinned() {
        let (min, max) = size_limits(800, 600, false);
        assert_eq!(min, PhysicalSize::new(800, 600));
        assert_eq!(max, Some(PhysicalSize::new(800, 600)));

        let (min, max) = size_limits(800, 600, true);
        assert_eq!(min, PhysicalSize::new(1, 1));
        assert_eq!(max, None);
    }

    #[test]
    fn undefined_format_uses_default_srgb() {
        let chosen = choose_surface_format(&[vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }])
        .unwrap();

        assert_eq!(chosen.format, vk::Format::R8G8B8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn srgb_colorspace_is_preferred() {
        let hdr = vk::SurfaceFormatKHR {
            format: vk::Format::A2B10G10R10_UNORM_PACK32,
            color_space: vk::ColorSpaceKHR::HDR10_ST2084_EXT,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };

        let chosen = choose_surface_format(&[hdr, srgb]).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn falls_back_to_first_format() {
        let first = vk::SurfaceFormatKHR {
            format: vk::Format::A2B10G10R10_UNORM_PACK32,
            color_space: vk::ColorSpaceKHR::HDR10_ST2084_EXT,
        };
        let second = vk::SurfaceFormatKHR {
            format: vk::Format::R16G16B16A16_SFLOAT,
            color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        };

        let chosen = choose_surface_format(&[first, second]).unwrap();
        assert_eq!(chosen.format, first.format);
        assert_eq!(chosen.color_space, first.color_space);
    }

    #[test]
    fn empty_format_list_is_fatal() {
        assert!(matches!(choose_surface_format(&[]), Err(InitError::NoSurfaceFormats)));
    }
}
