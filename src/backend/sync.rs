// Synchronization primitives
//
// One acquire/render-complete semaphore pair per swap chain image slot.

use super::presentation::PresentationDevice;
use ash::prelude::VkResult;
use ash::vk;

pub fn create_semaphore(device: &ash::Device) -> VkResult<vk::Semaphore> {
    let semaphore_info = vk::SemaphoreCreateInfo::builder();
    unsafe { device.create_semaphore(&semaphore_info, None) }
}

/// Semaphores for one image slot
#[derive(Debug, Clone, Copy)]
pub struct SyncPair {
    /// Signaled when the presentation engine hands the image over
    pub image_acquired: vk::Semaphore,
    /// Signaled when rendering into the image has finished
    pub render_complete: vk::Semaphore,
}

impl SyncPair {
    pub fn new<D: PresentationDevice + ?Sized>(device: &D) -> VkResult<Self> {
        let image_acquired = device.create_semaphore()?;
        let render_complete = match device.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                device.destroy_semaphore(image_acquired);
                return Err(e);
            }
        };

        Ok(Self {
            image_acquired,
            render_complete,
        })
    }

    pub fn destroy<D: PresentationDevice + ?Sized>(&self, device: &D) {
        device.destroy_semaphore(self.image_acquired);
        device.destroy_semaphore(self.render_complete);
    }
}
