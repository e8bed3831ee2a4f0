// Vulkan instance - loader check, instance creation, validation hook
//
// The instance is created with exactly the extensions the windowing layer
// needs to build a presentation surface, plus debug utils when validation
// is requested.

use crate::error::{InitError, Result};
use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{CStr, CString};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Load the Vulkan library, failing if the platform has no usable loader.
pub fn load_entry() -> Result<Entry> {
    unsafe { Entry::load() }.map_err(|e| InitError::LoaderUnavailable(e.to_string()))
}

pub fn create_instance(
    entry: &Entry,
    app_name: &str,
    display_handle: RawDisplayHandle,
    enable_validation: bool,
) -> Result<ash::Instance> {
    let app_name_cstr = CString::new(app_name.replace('\0', "")).unwrap_or_default();
    let engine_name = c"vk-bringup";

    let app_info = vk::ApplicationInfo::builder()
        .application_name(&app_name_cstr)
        .application_version(1)
        .engine_name(engine_name)
        .engine_version(1)
        .api_version(vk::API_VERSION_1_0);

    let surface_extensions = ash_window::enumerate_required_extensions(display_handle)
        .map_err(InitError::vulkan("Required windowing instance extensions not available"))?;

    let mut extensions = surface_extensions.to_vec();
    if enable_validation {
        extensions.push(DebugUtils::name().as_ptr());
    }

    let layer_names = if enable_validation {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        vec![]
    };

    let create_info = vk::InstanceCreateInfo::builder()
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layer_names);

    let instance = unsafe { entry.create_instance(&create_info, None) }
        .map_err(InitError::vulkan("Failed to create Vulkan instance"))?;

    log::info!(
        "Created Vulkan instance ({} extensions, validation {})",
        extensions.len(),
        if enable_validation { "on" } else { "off" }
    );

    Ok(instance)
}

/// Validation messenger; informational only, never alters control flow.
pub struct DebugMessenger {
    loader: DebugUtils,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    pub fn new(entry: &Entry, instance: &ash::Instance) -> Result<Self> {
        let loader = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None) }
            .map_err(InitError::vulkan("Failed to register debug callback"))?;

        Ok(Self { loader, messenger })
    }

    /// Must run before the owning instance is destroyed.
    pub fn destroy(self) {
        unsafe {
            self.loader
                .destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
