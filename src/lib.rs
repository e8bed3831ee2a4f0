// vk-bringup - GPU context bring-up and swap chain lifecycle
//
// Creates the instance, picks the GPU, opens the window and its surface,
// negotiates queues, creates the logical device and owns the ring of
// presentable images. Rendering itself lives elsewhere.

pub mod backend;
pub mod config;
pub mod context;
pub mod error;

pub use config::Config;
pub use context::Context;
pub use error::{InitError, Result};
