use std::sync::Arc;

use anyhow::Context;
use ash::vk;

use super::physical::QueueFamily;

pub fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_family: QueueFamily,
) -> anyhow::Result<(Arc<ash::Device>, vk::Queue)> {
    let queue_priorities = [1.0f32];
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family.graphics_index)
        .queue_priorities(&queue_priorities)];

    let mut features13 = vk::PhysicalDeviceVulkan13Features::default()
        .synchronization2(true)
        .dynamic_rendering(true);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .push_next(&mut features13);

    let device = Arc::new(unsafe {
        instance
            .create_device(physical_device, &device_create_info, None)
            .context("failed to create logical device.")?
    });
    let queue = unsafe { device.get_device_queue(queue_family.graphics_index, 0) };

    log::trace!("Created logical device");

    Ok((device, queue))
}
