use std::sync::Arc;

use anyhow::Context;
use ash::{ext::debug_utils, vk};

use super::{
    DeviceContext,
    debug::setup_debug_messenger,
    device::create_logical_device,
    instance::create_instance,
    physical::{QueueFamily, pick_physical_device},
};

/// Instance, device and queue of a headless Vulkan 1.3 setup.
pub struct VulkanContext {
    pub device_context: DeviceContext,
    pub physical_device: vk::PhysicalDevice,
    pub queue_family: QueueFamily,
    pub queue: vk::Queue,
    debug_messenger: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    instance: ash::Instance,
    _entry: ash::Entry,
}

impl VulkanContext {
    pub fn new() -> anyhow::Result<Self> {
        let entry = unsafe { ash::Entry::load() }.context("failed to load the Vulkan library")?;
        let instance = create_instance(&entry).context("failed to create instance")?;
        let debug_messenger = setup_debug_messenger(&entry, &instance);

        let (physical_device, queue_family) =
            pick_physical_device(&instance).context("failed to pick physical device")?;
        let (device, queue) = create_logical_device(&instance, physical_device, queue_family)
            .context("failed to create logical device")?;

        let debug_utils = debug_messenger
            .as_ref()
            .map(|_| Arc::new(debug_utils::Device::new(&instance, &device)));

        Ok(Self {
            device_context: DeviceContext {
                device,
                debug_utils,
            },
            physical_device,
            queue_family,
            queue,
            debug_messenger,
            instance,
            _entry: entry,
        })
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn device(&self) -> &ash::Device {
        &self.device_context.device
    }

    pub fn wait_idle(&self) -> anyhow::Result<()> {
        unsafe { self.device().device_wait_idle() }.context("failed to wait for device idle")
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        log::trace!("Destroying Vulkan Context");
        unsafe {
            if let Err(e) = self.device().device_wait_idle() {
                log::warn!("device_wait_idle failed during shutdown: {e:?}");
            }
            log::trace!("  Destroying Device");
            self.device().destroy_device(None);
            if let Some((debug_utils, messenger)) = &self.debug_messenger {
                log::trace!("  Destroying debug messenger");
                debug_utils.destroy_debug_utils_messenger(*messenger, None);
            }
            log::trace!("  Destroying Instance");
            self.instance.destroy_instance(None);
        }
        log::trace!("Vulkan Context Destroyed");
    }
}
