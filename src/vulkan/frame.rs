use anyhow::Context;
use ash::vk;

use super::VulkanContext;

/// A command buffer plus the fence guarding its single submission.
pub struct Frame {
    pub fence: vk::Fence,
    pub command_buffer: vk::CommandBuffer,
    command_pool: vk::CommandPool,
}

impl Frame {
    pub fn new(device: &ash::Device, queue_family: u32) -> anyhow::Result<Self> {
        let fence = create_fence(device, true).context("failed to create fence")?;

        let command_pool = {
            let pool_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(queue_family)
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            unsafe {
                device
                    .create_command_pool(&pool_info, None)
                    .context("failed to create command pool")?
            }
        };

        let command_buffer = {
            let alloc_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            unsafe {
                device
                    .allocate_command_buffers(&alloc_info)
                    .context("failed to allocate command buffer")?[0]
            }
        };

        Ok(Self {
            fence,
            command_buffer,
            command_pool,
        })
    }

    /// Waits for the previous submission and starts recording.
    pub fn begin(&self, device: &ash::Device) -> anyhow::Result<vk::CommandBuffer> {
        self.wait(device)?;
        unsafe {
            device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .context("failed to reset command buffer")?;
            device
                .begin_command_buffer(
                    self.command_buffer,
                    &vk::CommandBufferBeginInfo::default()
                        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
                )
                .context("failed to begin command buffer")?;
        }
        Ok(self.command_buffer)
    }

    pub fn submit(&self, context: &VulkanContext) -> anyhow::Result<()> {
        #[cfg(feature = "tracing")]
        let _submit_span = tracy_client::span!("submit_frame");
        let device = context.device();

        let command_buffers = [self.command_buffer];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

        unsafe {
            device
                .end_command_buffer(self.command_buffer)
                .context("failed to end command buffer")?;
            device.reset_fences(&[self.fence])?;
            device
                .queue_submit(context.queue, &[submit_info], self.fence)
                .context("failed to submit frame")?;
        }
        Ok(())
    }

    pub fn wait(&self, device: &ash::Device) -> anyhow::Result<()> {
        unsafe {
            device
                .wait_for_fences(&[self.fence], true, u64::MAX)
                .context("failed waiting for fences")?;
        }
        Ok(())
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        log::trace!("Destroying Frame");
        unsafe {
            device.destroy_command_pool(self.command_pool, None);
            device.destroy_fence(self.fence, None);
        }
    }
}

fn create_fence(device: &ash::Device, signaled: bool) -> anyhow::Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    unsafe {
        device
            .create_fence(&create_info, None)
            .context("failed to create fence")
    }
}
