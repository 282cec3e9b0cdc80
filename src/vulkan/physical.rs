use std::ffi::CStr;

use anyhow::Context;
use ash::vk;

#[derive(Clone, Copy, Debug)]
pub struct QueueFamily {
    pub graphics_index: u32,
}

/// Picks the first device with a graphics queue and the Vulkan 1.3 features
/// the recorder relies on, preferring discrete GPUs.
pub fn pick_physical_device(
    instance: &ash::Instance,
) -> anyhow::Result<(vk::PhysicalDevice, QueueFamily)> {
    let devices = unsafe {
        instance
            .enumerate_physical_devices()
            .context("failed to enumerate physical devices")?
    };

    let mut candidates = devices
        .into_iter()
        .filter_map(|device| {
            let family = find_queue_family(instance, device)?;
            is_device_suitable(instance, device).then_some((device, family))
        })
        .collect::<Vec<_>>();
    candidates.sort_by_key(|(device, _)| {
        let props = unsafe { instance.get_physical_device_properties(*device) };
        props.device_type != vk::PhysicalDeviceType::DISCRETE_GPU
    });
    let (device, family) = candidates
        .into_iter()
        .next()
        .context("No suitable physical device.")?;

    let props = unsafe { instance.get_physical_device_properties(device) };
    log::debug!("Selected physical device: {:?}", unsafe {
        CStr::from_ptr(props.device_name.as_ptr())
    });

    Ok((device, family))
}

fn is_device_suitable(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    let props = unsafe { instance.get_physical_device_properties(device) };
    if props.api_version < vk::API_VERSION_1_3 {
        return false;
    }

    let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
    let mut features = vk::PhysicalDeviceFeatures2::default().push_next(&mut features13);
    unsafe { instance.get_physical_device_features2(device, &mut features) };

    features13.synchronization2 == vk::TRUE && features13.dynamic_rendering == vk::TRUE
}

fn find_queue_family(instance: &ash::Instance, device: vk::PhysicalDevice) -> Option<QueueFamily> {
    let props = unsafe { instance.get_physical_device_queue_family_properties(device) };
    props
        .iter()
        .position(|family| {
            family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map(|index| QueueFamily {
            graphics_index: index as u32,
        })
}
