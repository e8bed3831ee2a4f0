// Vulkan Device - GPU selection and logical device creation
//
// Responsibilities:
// - Physical device selection (single-GPU systems only)
// - Immutable capability snapshot of the selected GPU
// - Extension/feature negotiation against that snapshot
// - Logical device + queue creation

use super::queue::QueueAssignment;
use crate::error::{InitError, Result};
use ash::prelude::VkResult;
use ash::vk;
use std::ffi::CStr;

/// Read access to the physical devices of an instance.
pub trait DeviceSource {
    fn enumerate_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>>;
    fn properties(&self, device: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties;
    fn memory_properties(&self, device: vk::PhysicalDevice) -> vk::PhysicalDeviceMemoryProperties;
    fn features(&self, device: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures;
    fn extensions(&self, device: vk::PhysicalDevice) -> VkResult<Vec<vk::ExtensionProperties>>;
}

impl DeviceSource for ash::Instance {
    fn enumerate_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        unsafe { self.enumerate_physical_devices() }
    }

    fn properties(&self, device: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties {
        unsafe { self.get_physical_device_properties(device) }
    }

    fn memory_properties(&self, device: vk::PhysicalDevice) -> vk::PhysicalDeviceMemoryProperties {
        unsafe { self.get_physical_device_memory_properties(device) }
    }

    fn features(&self, device: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures {
        unsafe { self.get_physical_device_features(device) }
    }

    fn extensions(&self, device: vk::PhysicalDevice) -> VkResult<Vec<vk::ExtensionProperties>> {
        unsafe { self.enumerate_device_extension_properties(device) }
    }
}

/// Capabilities of the selected GPU, captured once after selection
#[derive(Debug, Clone)]
pub struct PhysicalDeviceInfo {
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub extensions: Vec<vk::ExtensionProperties>,
}

impl PhysicalDeviceInfo {
    pub fn device_name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    pub fn supports_extension(&self, name: &CStr) -> bool {
        self.extensions.iter().any(|ext| extension_name(ext) == name)
    }
}

fn extension_name(props: &vk::ExtensionProperties) -> &CStr {
    unsafe { CStr::from_ptr(props.extension_name.as_ptr()) }
}

/// Pick the GPU and snapshot its capabilities.
///
/// Exactly one device must be present; multi-GPU systems are rejected
/// rather than guessed at.
pub fn select_physical_device<S: DeviceSource>(
    source: &S,
) -> Result<(vk::PhysicalDevice, PhysicalDeviceInfo)> {
    let devices = source
        .enumerate_devices()
        .map_err(InitError::vulkan("Failed to query Vulkan devices"))?;

    let device = match devices.as_slice() {
        [] => return Err(InitError::NoDevices),
        [device] => *device,
        _ => return Err(InitError::MultipleDevices(devices.len())),
    };

    let extensions = source
        .extensions(device)
        .map_err(InitError::vulkan("Failed to query device extensions"))?;

    let info = PhysicalDeviceInfo {
        properties: source.properties(device),
        memory_properties: source.memory_properties(device),
        features: source.features(device),
        extensions,
    };

    log::info!("Selected GPU: {}", info.device_name());
    log::info!(
        "API Version: {}.{}.{}",
        vk::api_version_major(info.properties.api_version),
        vk::api_version_minor(info.properties.api_version),
        vk::api_version_patch(info.properties.api_version)
    );
    log::debug!("Device reports {} extensions", info.extensions.len());

    Ok((device, info))
}

/// One entry of the device extension table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceExtension {
    pub name: &'static CStr,
    pub required: bool,
    pub enabled: bool,
}

impl DeviceExtension {
    const fn required(name: &'static CStr) -> Self {
        Self {
            name,
            required: true,
            enabled: false,
        }
    }
}

/// Extensions we ask for, in the order they are enabled
pub fn device_extension_table() -> Vec<DeviceExtension> {
    vec![
        DeviceExtension::required(c"VK_KHR_swapchain"),
        DeviceExtension::required(c"VK_KHR_maintenance1"),
    ]
}

/// Mark every available table entry as enabled.
///
/// A missing required entry is fatal; a missing optional one is only logged.
pub fn choose_device_extensions(
    table: &mut [DeviceExtension],
    info: &PhysicalDeviceInfo,
) -> Result<Vec<&'static CStr>> {
    let mut enabled = Vec::with_capacity(table.len());

    for ext in table.iter_mut() {
        ext.enabled = info.supports_extension(ext.name);
        if ext.enabled {
            enabled.push(ext.name);
        } else if ext.required {
            return Err(InitError::MissingExtension(
                ext.name.to_string_lossy().into_owned(),
            ));
        } else {
            log::warn!("Optional extension '{}' not available", ext.name.to_string_lossy());
        }
    }

    Ok(enabled)
}

/// Only opt into features the device actually reports.
pub fn choose_device_features(supported: &vk::PhysicalDeviceFeatures) -> vk::PhysicalDeviceFeatures {
    vk::PhysicalDeviceFeatures {
        // Anisotropic filtering
        sampler_anisotropy: supported.sampler_anisotropy,
        ..Default::default()
    }
}

/// Logical device plus what was negotiated to create it
pub struct LogicalDevice {
    pub device: ash::Device,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub extensions: Vec<DeviceExtension>,
    pub features: vk::PhysicalDeviceFeatures,
}

pub fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    info: &PhysicalDeviceInfo,
    queues: QueueAssignment,
) -> Result<LogicalDevice> {
    // Separate presentation queues are not wired up yet
    if !queues.is_combined() {
        return Err(InitError::SeparatePresentQueue {
            graphics: queues.graphics,
            present: queues.present,
        });
    }

    let mut extensions = device_extension_table();
    let enabled_names = choose_device_extensions(&mut extensions, info)?;
    let extension_ptrs: Vec<_> = enabled_names.iter().map(|name| name.as_ptr()).collect();
    let features = choose_device_features(&info.features);

    let queue_priorities = [1.0];
    let queue_create_info = vk::DeviceQueueCreateInfo::builder()
        .queue_family_index(queues.graphics)
        .queue_priorities(&queue_priorities)
        .build();

    let create_info = vk::DeviceCreateInfo::builder()
        .queue_create_infos(std::slice::from_ref(&queue_create_info))
        .enabled_extension_names(&extension_ptrs)
        .enabled_features(&features);

    let device = unsafe { instance.create_device(physical_device, &create_info, None) }
        .map_err(InitError::vulkan("Could not create Vulkan logical device"))?;

    let graphics_queue = unsafe { device.get_device_queue(queues.graphics, 0) };

    log::info!(
        "Created logical device (queue family {}, {} extensions, anisotropy {})",
        queues.graphics,
        enabled_names.len(),
        features.sampler_anisotropy == vk::TRUE
    );

    Ok(LogicalDevice {
        device,
        graphics_queue,
        present_queue: graphics_queue,
        extensions,
        features,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use std::os::raw::c_char;

    fn ext(name: &str) -> vk::ExtensionProperties {
        let mut props = vk::ExtensionProperties::default();
        for (dst, src) in props.extension_name.iter_mut().zip(name.bytes()) {
            *dst = src as c_char;
        }
        props
    }

    fn info_with(extensions: &[&str]) -> PhysicalDeviceInfo {
        PhysicalDeviceInfo {
            properties: Default::default(),
            memory_properties: Default::default(),
            features: Default::default(),
            extensions: extensions.iter().map(|name| ext(name)).collect(),
        }
    }

    struct FakeInstance {
        devices: Vec<vk::PhysicalDevice>,
    }

    impl DeviceSource for FakeInstance {
        fn enumerate_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
            Ok(self.devices.clone())
        }

        fn properties(&self, device: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties {
            let mut props = vk::PhysicalDeviceProperties {
                api_version: vk::make_api_version(0, 1, 2, 3),
                vendor_id: 0x10de,
                device_id: device.as_raw() as u32,
                device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
                ..Default::default()
            };
            for (dst, src) in props.device_name.iter_mut().zip(b"Fake GPU") {
                *dst = *src as c_char;
            }
            props
        }

        fn memory_properties(&self, _device: vk::PhysicalDevice) -> vk::PhysicalDeviceMemoryProperties {
            vk::PhysicalDeviceMemoryProperties {
                memory_type_count: 3,
                memory_heap_count: 2,
                ..Default::default()
            }
        }

        fn features(&self, _device: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures {
            vk::PhysicalDeviceFeatures {
                sampler_anisotropy: vk::TRUE,
                ..Default::default()
            }
        }

        fn extensions(&self, _device: vk::PhysicalDevice) -> VkResult<Vec<vk::ExtensionProperties>> {
            Ok(vec![ext("VK_KHR_swapchain"), ext("VK_KHR_maintenance1")])
        }
    }

    #[test]
    fn single_device_snapshot_matches_reported_properties() {
        let source = FakeInstance {
            devices: vec![vk::PhysicalDevice::from_raw(7)],
        };

        let (device, info) = select_physical_device(&source).unwrap();
        let reported = source.properties(device);

        assert_eq!(device.as_raw(), 7);
        assert_eq!(info.properties.device_id, reported.device_id);
        assert_eq!(info.properties.vendor_id, reported.vendor_id);
        assert_eq!(info.properties.api_version, reported.api_version);
        assert_eq!(info.properties.device_type, reported.device_type);
        assert_eq!(info.properties.device_name, reported.device_name);
        assert_eq!(info.device_name(), "Fake GPU");
        assert_eq!(info.memory_properties.memory_type_count, 3);
        assert_eq!(info.memory_properties.memory_heap_count, 2);
        assert_eq!(info.features.sampler_anisotropy, vk::TRUE);
        assert!(info.supports_extension(c"VK_KHR_swapchain"));
    }

    #[test]
    fn no_devices_is_fatal() {
        let source = FakeInstance { devices: vec![] };
        assert!(matches!(select_physical_device(&source), Err(InitError::NoDevices)));
    }

    #[test]
    fn multiple_devices_is_fatal() {
        let source = FakeInstance {
            devices: vec![vk::PhysicalDevice::from_raw(1), vk::PhysicalDevice::from_raw(2)],
        };
        assert!(matches!(
            select_physical_device(&source),
            Err(InitError::MultipleDevices(2))
        ));
    }

    #[test]
    fn extension_records_track_what_was_enabled() {
        let info = info_with(&["VK_KHR_maintenance1", "VK_KHR_swapchain", "VK_EXT_other"]);
        let mut table = device_extension_table();

        let enabled = choose_device_extensions(&mut table, &info).unwrap();

        assert_eq!(enabled, vec![c"VK_KHR_swapchain", c"VK_KHR_maintenance1"]);
        assert!(table.iter().all(|ext| ext.enabled));
    }

    #[test]
    fn missing_required_extension_is_fatal() {
        let info = info_with(&["VK_KHR_swapchain"]);
        let mut table = device_extension_table();

        match choose_device_extensions(&mut table, &info) {
            Err(InitError::MissingExtension(name)) => assert_eq!(name, "VK_KHR_maintenance1"),
            other => panic!("expected missing extension, got {:?}", other),
        }
    }

    #[test]
    fn missing_optional_extension_is_skipped() {
        let info = info_with(&["VK_KHR_swapchain"]);
        let mut table = vec![
            DeviceExtension::required(c"VK_KHR_swapchain"),
            DeviceExtension {
                name: c"VK_EXT_memory_budget",
                required: false,
                enabled: false,
            },
        ];

        let enabled = choose_device_extensions(&mut table, &info).unwrap();

        assert_eq!(enabled, vec![c"VK_KHR_swapchain"]);
        assert!(table[0].enabled);
        assert!(!table[1].enabled);
    }

    #[test]
    fn extension_name_must_match_exactly() {
        let info = info_with(&["VK_KHR_swapchain_mutable_format", "VK_KHR_maintenance1"]);
        let mut table = device_extension_table();

        assert!(matches!(
            choose_device_extensions(&mut table, &info),
            Err(InitError::MissingExtension(_))
        ));
    }

    #[test]
    fn features_follow_device_support() {
        let supported = vk::PhysicalDeviceFeatures {
            sampler_anisotropy: vk::TRUE,
            geometry_shader: vk::TRUE,
            ..Default::default()
        };
        let chosen = choose_device_features(&supported);
        assert_eq!(chosen.sampler_anisotropy, vk::TRUE);
        assert_eq!(chosen.geometry_shader, vk::FALSE);

        let chosen = choose_device_features(&vk::PhysicalDeviceFeatures::default());
        assert_eq!(chosen.sampler_anisotropy, vk::FALSE);
    }
}
