// Backend module - Vulkan bring-up layer
//
// Design: Thin wrapper around ash, one module per bring-up step.
// Pure selection logic lives next to the calls that feed it.

pub mod device;
pub mod instance;
pub mod presentation;
pub mod queue;
pub mod surface;
pub mod swapchain;
pub mod sync;

#[cfg(test)]
pub(crate) mod fake;

pub use device::{LogicalDevice, PhysicalDeviceInfo};
pub use presentation::{PresentationDevice, VulkanPresentation};
pub use queue::QueueAssignment;
pub use swapchain::{PresentationConfig, SwapChainManager, SwapchainState};
pub use sync::SyncPair;
