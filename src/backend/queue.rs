// Queue family negotiation
//
// Needs the presentation surface: presentation support is a per-family,
// per-surface property.

use crate::error::{InitError, Result};
use ash::extensions::khr::Surface;
use ash::vk;

/// What one queue family can do for us
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueFamilyCaps {
    pub graphics: bool,
    pub present: bool,
}

/// Queue family indices chosen for each role; they may coincide
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueAssignment {
    pub graphics: u32,
    pub present: u32,
}

impl QueueAssignment {
    pub fn is_combined(&self) -> bool {
        self.graphics == self.present
    }
}

/// Query graphics/presentation support for every family of the device.
pub fn query_queue_families(
    instance: &ash::Instance,
    surface_loader: &Surface,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Result<Vec<QueueFamilyCaps>> {
    let families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    families
        .iter()
        .enumerate()
        .map(|(index, props)| {
            let present = unsafe {
                surface_loader.get_physical_device_surface_support(
                    physical_device,
                    index as u32,
                    surface,
                )
            }
            .map_err(InitError::vulkan("Failed to query presentation support"))?;

            Ok(QueueFamilyCaps {
                graphics: props.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                present,
            })
        })
        .collect()
}

/// Pick graphics and presentation families.
///
/// The first family that can do both wins both roles and ends the scan.
/// Otherwise graphics falls back to the first graphics-capable family and
/// presentation to the first presentation-capable one.
pub fn select_queue_families(families: &[QueueFamilyCaps]) -> Result<QueueAssignment> {
    let mut graphics = None;
    let mut present = None;

    for (index, caps) in families.iter().enumerate() {
        if !caps.graphics {
            continue;
        }
        let index = index as u32;
        graphics.get_or_insert(index);
        if caps.present {
            graphics = Some(index);
            present = Some(index);
            break;
        }
    }

    let graphics = graphics.ok_or(InitError::NoGraphicsQueue)?;

    if present.is_none() {
        present = families
            .iter()
            .position(|caps| caps.present)
            .map(|index| index as u32);
    }

    let present = present.ok_or(InitError::NoPresentQueue)?;

    log::info!("Queue families: graphics {}, presentation {}", graphics, present);

    Ok(QueueAssignment { graphics, present })
}
