// In-memory presentation device for tests
//
// Mints unique handles and records every create/destroy call in order.

use super::presentation::{PresentationDevice, SwapchainRequest};
use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use std::cell::{Cell, RefCell};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    CreateSwapchain(u64),
    DestroySwapchain(u64),
    CreateView(u64),
    DestroyView(u64),
    CreateSemaphore(u64),
    DestroySemaphore(u64),
    DestroyDevice,
}

pub struct FakeDevice {
    pub caps: Cell<vk::SurfaceCapabilitiesKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
    /// Number of images the "driver" hands back, regardless of the request
    pub actual_image_count: Option<u32>,
    /// Fail the n-th image view creation (0-based, counted across the device lifetime)
    pub fail_view_at: Option<usize>,
    /// Fail the n-th semaphore creation, counted the same way
    pub fail_semaphore_at: Option<usize>,
    pub fail_caps: bool,
    pub fail_images: bool,
    pub calls: RefCell<Vec<Call>>,
    pub requests: RefCell<Vec<SwapchainRequest>>,
    views_created: Cell<usize>,
    semaphores_created: Cell<usize>,
    next_handle: Cell<u64>,
}

impl FakeDevice {
    pub fn new(caps: vk::SurfaceCapabilitiesKHR) -> Self {
        Self {
            caps: Cell::new(caps),
            present_modes: vec![vk::PresentModeKHR::FIFO],
            actual_image_count: None,
            fail_view_at: None,
            fail_semaphore_at: None,
            fail_caps: false,
            fail_images: false,
            calls: RefCell::new(Vec::new()),
            requests: RefCell::new(Vec::new()),
            views_created: Cell::new(0),
            semaphores_created: Cell::new(0),
            next_handle: Cell::new(1),
        }
    }

    fn mint(&self) -> u64 {
        let handle = self.next_handle.get();
        self.next_handle.set(handle + 1);
        handle
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    /// Handles created but not yet destroyed, excluding swap chain images
    pub fn live_objects(&self) -> usize {
        self.calls.borrow().iter().fold(0i64, |live, call| match call {
            Call::CreateSwapchain(_) | Call::CreateView(_) | Call::CreateSemaphore(_) => live + 1,
            Call::DestroySwapchain(_) | Call::DestroyView(_) | Call::DestroySemaphore(_) => live - 1,
            Call::DestroyDevice => live,
        }) as usize
    }

    pub fn position(&self, wanted: impl Fn(&Call) -> bool) -> Vec<usize> {
        self.calls
            .borrow()
            .iter()
            .enumerate()
            .filter(|(_, call)| wanted(call))
            .map(|(index, _)| index)
            .collect()
    }
}

impl PresentationDevice for FakeDevice {
    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        if self.fail_caps {
            return Err(vk::Result::ERROR_SURFACE_LOST_KHR);
        }
        Ok(self.caps.get())
    }

    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        Ok(self.present_modes.clone())
    }

    fn create_swapchain(&self, request: &SwapchainRequest) -> VkResult<vk::SwapchainKHR> {
        self.requests.borrow_mut().push(request.clone());
        let handle = self.mint();
        self.record(Call::CreateSwapchain(handle));
        Ok(vk::SwapchainKHR::from_raw(handle))
    }

    fn swapchain_images(&self, _swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        if self.fail_images {
            return Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        }
        let requested = self
            .requests
            .borrow()
            .last()
            .map(|request| request.image_count)
            .unwrap_or(0);
        let count = self.actual_image_count.unwrap_or(requested);
        Ok((0..count).map(|_| vk::Image::from_raw(self.mint())).collect())
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.record(Call::DestroySwapchain(swapchain.as_raw()));
    }

    fn create_image_view(&self, _info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
        let index = self.views_created.get();
        self.views_created.set(index + 1);
        if self.fail_view_at == Some(index) {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        let handle = self.mint();
        self.record(Call::CreateView(handle));
        Ok(vk::ImageView::from_raw(handle))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.record(Call::DestroyView(view.as_raw()));
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let index = self.semaphores_created.get();
        self.semaphores_created.set(index + 1);
        if self.fail_semaphore_at == Some(index) {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        let handle = self.mint();
        self.record(Call::CreateSemaphore(handle));
        Ok(vk::Semaphore::from_raw(handle))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.record(Call::DestroySemaphore(semaphore.as_raw()));
    }

    fn destroy_device(&self) {
        self.record(Call::DestroyDevice);
    }
}
