// Swapchain - the ring of presentable images
//
// Owns one generation of swap chain, image views and per-slot semaphores at
// a time. Every rebuild tears the previous generation down completely
// before anything new is created; nothing is carried across generations.
//
// The caller must make sure no GPU work still references the previous
// generation before asking for a rebuild.

use super::presentation::{PresentationDevice, SwapchainRequest};
use super::queue::QueueAssignment;
use super::sync::SyncPair;
use crate::error::{InitError, Result};
use ash::vk;

/// `current_extent` value meaning "the swap chain decides"
const EXTENT_DECIDED_BY_SWAPCHAIN: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainState {
    Uninitialized,
    Rebuilding,
    Ready,
}

/// Parameters a generation was built with
#[derive(Debug, Clone, Copy)]
pub struct PresentationConfig {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    /// Actual number of images, as reported back by the driver
    pub image_count: u32,
    pub extent: vk::Extent2D,
}

/// A swap chain image and the view we render through
#[derive(Debug, Clone, Copy)]
pub struct SwapChainImage {
    /// Owned by the swap chain
    pub image: vk::Image,
    pub view: vk::ImageView,
}

struct Generation {
    swapchain: vk::SwapchainKHR,
    images: Vec<SwapChainImage>,
    sync: Vec<SyncPair>,
}

impl Generation {
    fn populate<D: PresentationDevice>(&mut self, device: &D, format: vk::Format) -> Result<()> {
        let images = device
            .swapchain_images(self.swapchain)
            .map_err(InitError::vulkan("Failed to retrieve images in the swap chain"))?;

        for image in images {
            let view = device
                .create_image_view(&image_view_info(image, format))
                .map_err(InitError::vulkan(
                    "Failed to create image views for the swap chain images",
                ))?;
            self.images.push(SwapChainImage { image, view });
        }

        for _ in 0..self.images.len() {
            let pair = SyncPair::new(device)
                .map_err(InitError::vulkan("Failed to create swap chain semaphores"))?;
            self.sync.push(pair);
        }

        Ok(())
    }

    /// Views and semaphores go first, then the swap chain that owns the images.
    fn destroy<D: PresentationDevice>(mut self, device: &D) {
        for pair in self.sync.drain(..) {
            pair.destroy(device);
        }
        for image in self.images.drain(..) {
            device.destroy_image_view(image.view);
        }
        device.destroy_swapchain(self.swapchain);
    }
}

fn image_view_info(image: vk::Image, format: vk::Format) -> vk::ImageViewCreateInfo {
    vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .build()
}

fn clamp_dimension(value: u32, min: u32, max: u32) -> u32 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

/// Swap chain extent for the current surface.
///
/// When the surface leaves the size to us, the stored size is clamped into
/// the supported range. Otherwise the surface size wins and replaces the
/// stored one.
pub fn resolve_extent(caps: &vk::SurfaceCapabilitiesKHR, stored: &mut vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width == EXTENT_DECIDED_BY_SWAPCHAIN {
        vk::Extent2D {
            width: clamp_dimension(
                stored.width,
                caps.min_image_extent.width,
                caps.max_image_extent.width,
            ),
            height: clamp_dimension(
                stored.height,
                caps.min_image_extent.height,
                caps.max_image_extent.height,
            ),
        }
    } else {
        *stored = caps.current_extent;
        caps.current_extent
    }
}

/// FIFO unless a supported override was requested.
pub fn resolve_present_mode(
    supported: &[vk::PresentModeKHR],
    requested: Option<vk::PresentModeKHR>,
) -> vk::PresentModeKHR {
    match requested {
        Some(mode) if supported.contains(&mode) => {
            log::info!("Overriding presentation mode to {:?}", mode);
            mode
        }
        Some(mode) => {
            log::warn!("Can't override presentation mode: {:?} is not supported", mode);
            vk::PresentModeKHR::FIFO
        }
        None => vk::PresentModeKHR::FIFO,
    }
}

/// One more than the minimum, within the device maximum (0 = unbounded).
pub fn resolve_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = caps.min_image_count.saturating_add(1);
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

pub fn resolve_transform(caps: &vk::SurfaceCapabilitiesKHR) -> vk::SurfaceTransformFlagsKHR {
    if caps
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        caps.current_transform
    }
}

/// Distinct families share images concurrently instead of transferring ownership.
pub fn resolve_sharing(queues: QueueAssignment) -> (vk::SharingMode, Vec<u32>) {
    if queues.is_combined() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (
            vk::SharingMode::CONCURRENT,
            vec![queues.graphics, queues.present],
        )
    }
}

/// Builds and rebuilds the presentable image ring
pub struct SwapChainManager {
    state: SwapchainState,
    current: Option<Generation>,
    config: Option<PresentationConfig>,
    current_slot: usize,
    generation: u64,
}

impl Default for SwapChainManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SwapChainManager {
    pub fn new() -> Self {
        Self {
            state: SwapchainState::Uninitialized,
            current: None,
            config: None,
            current_slot: 0,
            generation: 0,
        }
    }

    /// Tear down the current generation (if any) and build a new one.
    ///
    /// `stored_extent` is the size to use when the surface has no opinion;
    /// it is overwritten when the surface reports a fixed size. On error no
    /// swap chain is left behind and the manager is `Uninitialized`.
    pub fn rebuild<D: PresentationDevice>(
        &mut self,
        device: &D,
        surface_format: vk::SurfaceFormatKHR,
        queues: QueueAssignment,
        stored_extent: &mut vk::Extent2D,
        present_mode_override: Option<vk::PresentModeKHR>,
    ) -> Result<PresentationConfig> {
        self.state = SwapchainState::Rebuilding;
        self.release(device);

        match self.build(device, surface_format, queues, stored_extent, present_mode_override) {
            Ok((generation, config)) => {
                // First acquisition wraps around to slot 0
                self.current_slot = generation.images.len().saturating_sub(1);
                self.current = Some(generation);
                self.config = Some(config);
                self.generation += 1;
                self.state = SwapchainState::Ready;

                log::info!(
                    "Swap chain generation {}: {} images, {}x{}, {:?}",
                    self.generation,
                    config.image_count,
                    config.extent.width,
                    config.extent.height,
                    config.present_mode
                );
                Ok(config)
            }
            Err(e) => {
                self.state = SwapchainState::Uninitialized;
                Err(e)
            }
        }
    }

    fn build<D: PresentationDevice>(
        &self,
        device: &D,
        surface_format: vk::SurfaceFormatKHR,
        queues: QueueAssignment,
        stored_extent: &mut vk::Extent2D,
        present_mode_override: Option<vk::PresentModeKHR>,
    ) -> Result<(Generation, PresentationConfig)> {
        let caps = device
            .surface_capabilities()
            .map_err(InitError::vulkan("Failed to query surface capabilities"))?;

        let extent = resolve_extent(&caps, stored_extent);

        let supported_modes = match present_mode_override {
            Some(_) => device.surface_present_modes().unwrap_or_else(|e| {
                log::warn!("Failed to query available presentation modes: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };
        let present_mode = resolve_present_mode(&supported_modes, present_mode_override);

        let (sharing_mode, queue_family_indices) = resolve_sharing(queues);

        let request = SwapchainRequest {
            surface_format,
            present_mode,
            image_count: resolve_image_count(&caps),
            extent,
            transform: resolve_transform(&caps),
            sharing_mode,
            queue_family_indices,
        };
        log::debug!("Swap chain request: {:?}", request);

        let swapchain = device
            .create_swapchain(&request)
            .map_err(InitError::vulkan("Failed to create swap chain"))?;

        let mut generation = Generation {
            swapchain,
            images: Vec::new(),
            sync: Vec::new(),
        };

        if let Err(e) = generation.populate(device, surface_format.format) {
            generation.destroy(device);
            return Err(e);
        }

        let config = PresentationConfig {
            surface_format,
            present_mode,
            image_count: generation.images.len() as u32,
            extent,
        };

        Ok((generation, config))
    }

    fn release<D: PresentationDevice>(&mut self, device: &D) {
        if let Some(generation) = self.current.take() {
            generation.destroy(device);
        }
        self.config = None;
    }

    /// Destroy the current generation, leaving the manager `Uninitialized`.
    pub fn destroy<D: PresentationDevice>(&mut self, device: &D) {
        self.release(device);
        self.current_slot = 0;
        self.state = SwapchainState::Uninitialized;
    }

    pub fn state(&self) -> SwapchainState {
        self.state
    }

    pub fn config(&self) -> Option<&PresentationConfig> {
        self.config.as_ref()
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.current
            .as_ref()
            .map_or(vk::SwapchainKHR::null(), |generation| generation.swapchain)
    }

    pub fn images(&self) -> &[SwapChainImage] {
        match &self.current {
            Some(generation) => &generation.images,
            None => &[],
        }
    }

    pub fn sync_pairs(&self) -> &[SyncPair] {
        match &self.current {
            Some(generation) => &generation.sync,
            None => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.images().len()
    }

    pub fn is_empty(&self) -> bool {
        self.images().is_empty()
    }

    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// Move to the next image slot and return it.
    pub fn advance_slot(&mut self) -> usize {
        let len = self.len();
        if len > 0 {
            self.current_slot = (self.current_slot + 1) % len;
        }
        self.current_slot
    }

    /// Number of generations built so far
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
