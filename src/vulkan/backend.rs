use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use ash::vk;

use crate::{
    buffer::{BufferKey, BufferManager, BufferSpec},
    device::GpuDevice,
    image::{ImageKey, ImageManager, ImageSpec},
};

use super::VulkanContext;

#[derive(Default)]
struct Resources {
    images: ImageManager,
    buffers: BufferManager,
}

/// Native images and buffers allocated through VMA.
///
/// Shared with the resource pool, so all bookkeeping sits behind a mutex.
pub struct VulkanDevice {
    resources: Mutex<Resources>,
    allocator: vk_mem::Allocator,
    context: Arc<VulkanContext>,
}

impl VulkanDevice {
    pub fn new(context: Arc<VulkanContext>) -> anyhow::Result<Self> {
        let mut aci = vk_mem::AllocatorCreateInfo::new(
            context.instance(),
            context.device(),
            context.physical_device,
        );
        aci.vulkan_api_version = vk::API_VERSION_1_3;

        let allocator = unsafe { vk_mem::Allocator::new(aci).context("failed to create allocator")? };

        Ok(Self {
            resources: Mutex::new(Resources::default()),
            allocator,
            context,
        })
    }

    pub fn context(&self) -> &VulkanContext {
        &self.context
    }

    fn resources(&self) -> MutexGuard<'_, Resources> {
        self.resources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Native image, its full view and its shape.
    pub fn image(&self, key: ImageKey) -> (vk::Image, vk::ImageView, ImageSpec) {
        let resources = self.resources();
        let image = resources.images.image(key);
        (image.vk_image(), image.vk_view(), image.spec.clone())
    }

    pub fn buffer(&self, key: BufferKey) -> vk::Buffer {
        self.resources().buffers.buffer(key).vk_buffer
    }

    pub fn live_images(&self) -> usize {
        self.resources().images.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.resources().buffers.len()
    }
}

impl GpuDevice for VulkanDevice {
    fn create_image(&self, spec: &ImageSpec) -> anyhow::Result<ImageKey> {
        self.resources()
            .images
            .create_image(&self.allocator, &self.context.device_context, spec)
    }

    fn destroy_image(&self, key: ImageKey) {
        self.resources()
            .images
            .destroy_image(self.context.device(), &self.allocator, key);
    }

    fn create_buffer(&self, spec: &BufferSpec) -> anyhow::Result<BufferKey> {
        self.resources()
            .buffers
            .create_buffer(&self.allocator, &self.context.device_context, spec)
    }

    fn destroy_buffer(&self, key: BufferKey) {
        self.resources().buffers.destroy_buffer(&self.allocator, key);
    }

    fn write_buffer(&self, key: BufferKey, offset: u64, data: &[u8]) -> anyhow::Result<()> {
        self.resources()
            .buffers
            .write(&self.allocator, key, offset, data)
    }

    fn flush_buffers(&self, keys: &[BufferKey]) -> anyhow::Result<()> {
        let resources = self.resources();
        for &key in keys {
            resources.buffers.flush(&self.allocator, key)?;
        }
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::trace!("Destroying VulkanDevice");
        if let Err(e) = self.context.wait_idle() {
            log::warn!("{e:#}");
        }
        let resources = self
            .resources
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        resources
            .images
            .cleanup(self.context.device(), &self.allocator);
        resources.buffers.cleanup(&self.allocator);
    }
}
