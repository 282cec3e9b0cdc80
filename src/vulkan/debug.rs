use std::ffi::{CStr, CString, c_char, c_void};

use anyhow::Context;
use ash::{Entry, ext::debug_utils, vk};

#[cfg(debug_assertions)]
pub const ENABLE_VALIDATION_LAYERS: bool = true;
#[cfg(not(debug_assertions))]
pub const ENABLE_VALIDATION_LAYERS: bool = false;

const VALIDATION_LAYERS: [&CStr; 1] = [c"VK_LAYER_KHRONOS_validation"];

unsafe extern "system" fn vulkan_debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    typ: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _: *mut c_void,
) -> vk::Bool32 {
    unsafe {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;

        let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();
        match severity {
            Severity::VERBOSE => log::trace!(target: "framegraph::vulkan::validation", "{typ:?} - {message}"),
            Severity::INFO => log::debug!(target: "framegraph::vulkan::validation", "{typ:?} - {message}"),
            Severity::WARNING => log::warn!(target: "framegraph::vulkan::validation", "{typ:?} - {message}"),
            _ => log::error!(target: "framegraph::vulkan::validation", "{typ:?} - {message}"),
        }
        vk::FALSE
    }
}

/// Validation layers to enable, limited to the ones installed. A missing
/// layer only costs diagnostics, so it is skipped with a warning.
pub fn validation_layers(entry: &Entry) -> anyhow::Result<(Vec<CString>, Vec<*const c_char>)> {
    if !ENABLE_VALIDATION_LAYERS {
        return Ok((Vec::new(), Vec::new()));
    }

    let supported = unsafe {
        entry
            .enumerate_instance_layer_properties()
            .context("failed to enumerate Vulkan instance layer properties")?
    };
    let layer_names = VALIDATION_LAYERS
        .iter()
        .filter(|required| {
            let found = supported
                .iter()
                .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == **required));
            if !found {
                log::warn!("validation layer {required:?} is not installed, skipping");
            }
            found
        })
        .map(|name| CString::from(*name))
        .collect::<Vec<_>>();
    let layer_names_ptrs = layer_names
        .iter()
        .map(|name| name.as_ptr())
        .collect::<Vec<_>>();
    Ok((layer_names, layer_names_ptrs))
}

pub fn setup_debug_messenger(
    entry: &Entry,
    instance: &ash::Instance,
) -> Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    if !ENABLE_VALIDATION_LAYERS {
        return None;
    }

    let create_info = create_debug_create_info();
    let debug_utils = debug_utils::Instance::new(entry, instance);
    let messenger = match unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) } {
        Ok(messenger) => messenger,
        Err(e) => {
            log::warn!("failed to create debug_utils_messenger: {e:?}");
            return None;
        }
    };

    Some((debug_utils, messenger))
}

pub fn create_debug_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(vulkan_debug_callback))
}
