// Bring-up errors
//
// Every variant here is fatal: the context under construction is torn down
// and never handed back. Degrading conditions (optional extensions, non-sRGB
// formats, rejected overrides) are logged as warnings instead.

use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("Vulkan loader unavailable: {0}")]
    LoaderUnavailable(String),

    #[error("No Vulkan devices found")]
    NoDevices,

    #[error("Found {0} Vulkan devices, only single-GPU systems are supported")]
    MultipleDevices(usize),

    #[error("Selected device does not provide a graphics queue")]
    NoGraphicsQueue,

    #[error("Selected device does not provide a presentation queue")]
    NoPresentQueue,

    #[error(
        "Graphics family {graphics} and presentation family {present} differ; \
         separate presentation queues are not supported"
    )]
    SeparatePresentQueue { graphics: u32, present: u32 },

    #[error("Required device extension '{0}' not available")]
    MissingExtension(String),

    #[error("Surface reported no formats")]
    NoSurfaceFormats,

    #[error("Failed to create window: {0}")]
    WindowCreation(String),

    #[error("{what}: {result}")]
    Vulkan {
        what: &'static str,
        result: vk::Result,
    },
}

impl InitError {
    /// Tag a failing Vulkan call with the bring-up step it belongs to.
    pub fn vulkan(what: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::Vulkan { what, result }
    }
}

pub type Result<T> = std::result::Result<T, InitError>;
