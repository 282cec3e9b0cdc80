use anyhow::{Context, bail};
use ash::vk;
use slotmap::SlotMap;
use vk_mem::Alloc;

use crate::{
    buffer::{
        keys::BufferKey,
        resource::Buffer,
        spec::{BufferSpec, MemoryType},
    },
    vulkan::DeviceContext,
};

#[derive(Default)]
pub struct BufferManager {
    buffers: SlotMap<BufferKey, Buffer>,
}

impl BufferManager {
    #[inline]
    pub fn buffer(&self, key: BufferKey) -> &Buffer {
        self.buffers.get(key).expect("buffer: invalid BufferKey")
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn create_buffer(
        &mut self,
        allocator: &vk_mem::Allocator,
        device_context: &DeviceContext,
        spec: &BufferSpec,
    ) -> anyhow::Result<BufferKey> {
        let (vk_buffer, allocation) =
            with_buffer_create_info(spec, |bci, aci| unsafe { allocator.create_buffer(bci, aci) })
                .context("failed to create buffer")?;

        if let Some(name) = spec.debug_name.as_deref() {
            device_context.name_object(vk_buffer, name)?;
        }

        let key = self.buffers.insert(Buffer {
            vk_buffer,
            allocation,
            spec: spec.clone(),
        });
        log::trace!("created buffer {:?}: {}", key, spec);
        Ok(key)
    }

    /// Copies `data` into a staging buffer's memory at `offset`.
    pub fn write(
        &mut self,
        allocator: &vk_mem::Allocator,
        key: BufferKey,
        offset: u64,
        data: &[u8],
    ) -> anyhow::Result<()> {
        let buffer = self
            .buffers
            .get_mut(key)
            .context("write: invalid BufferKey")?;
        if buffer.spec.memory != MemoryType::Staging {
            bail!("buffer {:?} is not host visible", key);
        }
        if offset + data.len() as u64 > buffer.spec.size {
            bail!(
                "write of {} bytes at offset {} overflows buffer {:?} of {} bytes",
                data.len(),
                offset,
                key,
                buffer.spec.size
            );
        }

        unsafe {
            let mapped = allocator
                .map_memory(&mut buffer.allocation)
                .context("failed to map buffer memory")?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.add(offset as usize), data.len());
            allocator.unmap_memory(&mut buffer.allocation);
        }
        Ok(())
    }

    pub fn flush(&self, allocator: &vk_mem::Allocator, key: BufferKey) -> anyhow::Result<()> {
        let buffer = self.buffers.get(key).context("flush: invalid BufferKey")?;
        allocator
            .flush_allocation(&buffer.allocation, 0, vk::WHOLE_SIZE)
            .context("failed to flush buffer memory")
    }

    pub fn destroy_buffer(&mut self, allocator: &vk_mem::Allocator, key: BufferKey) {
        let Some(mut buffer) = self.buffers.remove(key) else {
            log::warn!("destroy_buffer: unknown BufferKey {:?}", key);
            return;
        };
        unsafe {
            allocator.destroy_buffer(buffer.vk_buffer, &mut buffer.allocation);
        }
    }

    pub fn cleanup(&mut self, allocator: &vk_mem::Allocator) {
        if !self.buffers.is_empty() {
            log::warn!("destroying {} buffers still owned at shutdown", self.buffers.len());
        }
        for (_, mut buffer) in self.buffers.drain() {
            unsafe {
                allocator.destroy_buffer(buffer.vk_buffer, &mut buffer.allocation);
            }
        }
    }
}

fn with_buffer_create_info<R>(
    spec: &BufferSpec,
    f: impl FnOnce(&vk::BufferCreateInfo, &vk_mem::AllocationCreateInfo) -> R,
) -> R {
    let bci = vk::BufferCreateInfo::default()
        .size(spec.size)
        .usage(spec.usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let aci = match spec.memory {
        MemoryType::DeviceLocal => vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        },
        MemoryType::Staging => vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::Auto,
            flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
            ..Default::default()
        },
    };
    f(&bci, &aci)
}
