use anyhow::Context;
use ash::{ext::debug_utils, vk};

use super::debug::{ENABLE_VALIDATION_LAYERS, create_debug_create_info, validation_layers};

/// Creates an instance with no surface extensions.
pub fn create_instance(entry: &ash::Entry) -> anyhow::Result<ash::Instance> {
    let app_info = vk::ApplicationInfo::default()
        .api_version(vk::API_VERSION_1_3)
        .application_name(c"framegraph-demo")
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"framegraph")
        .engine_version(vk::make_api_version(0, 0, 1, 0));

    let mut extension_names = Vec::new();
    if ENABLE_VALIDATION_LAYERS {
        extension_names.push(debug_utils::NAME.as_ptr());
    }

    let create_flags = if cfg!(any(target_os = "macos", target_os = "ios")) {
        extension_names.push(ash::khr::portability_enumeration::NAME.as_ptr());
        vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
    } else {
        vk::InstanceCreateFlags::default()
    };

    let (_layer_names, layer_names_ptrs) =
        validation_layers(entry).context("failed to query validation layers")?;

    let mut debug_create_info = create_debug_create_info();
    let mut instance_create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names_ptrs)
        .flags(create_flags);
    if ENABLE_VALIDATION_LAYERS {
        instance_create_info = instance_create_info.push_next(&mut debug_create_info);
    }

    unsafe {
        entry
            .create_instance(&instance_create_info, None)
            .context("failed to create ash::Instance")
    }
}
