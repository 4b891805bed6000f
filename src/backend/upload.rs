// Staged host -> device transfers
//
// Uploads are a one-time setup cost, so every transfer is recorded into a
// one-shot command buffer, submitted, and waited on before returning.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::Pod;
use std::sync::Arc;

use super::{Buffer, VulkanDevice};

/// Command pool dedicated to blocking one-shot transfers
pub struct Uploader {
    command_pool: vk::CommandPool,
    device: Arc<VulkanDevice>,
}

impl Uploader {
    pub fn new(device: &Arc<VulkanDevice>) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.queue_families.graphics)
            // TRANSIENT: every buffer lives for a single submission
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);

        let command_pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Failed to create upload command pool")?;

        Ok(Self {
            command_pool,
            device: device.clone(),
        })
    }

    /// Record commands with `record`, submit them to the graphics queue and
    /// block until the queue is idle.
    pub fn one_time_submit<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()>,
    {
        let device = &self.device.device;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let cmd = unsafe { device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate one-shot command buffer")?[0];

        let result = self.record_and_wait(cmd, record);

        unsafe { device.free_command_buffers(self.command_pool, &[cmd]) };
        result
    }

    fn record_and_wait<F>(&self, cmd: vk::CommandBuffer, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()>,
    {
        let device = &self.device.device;

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe { device.begin_command_buffer(cmd, &begin_info) }?;
        record(device, cmd)?;
        unsafe { device.end_command_buffer(cmd) }?;

        let command_buffers = [cmd];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

        unsafe {
            device
                .queue_submit(
                    self.device.graphics_queue,
                    &[submit_info.build()],
                    vk::Fence::null(),
                )
                .context("Failed to submit transfer commands")?;
            device
                .queue_wait_idle(self.device.graphics_queue)
                .context("Failed waiting for transfer queue")?;
        }

        Ok(())
    }

    /// Upload `data` into a new device-local buffer usable as `usage`.
    /// The staging buffer is released once the copy has completed.
    pub fn upload_buffer<T: Pod>(&self, data: &[T], usage: vk::BufferUsageFlags) -> Result<Buffer> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        anyhow::ensure!(!bytes.is_empty(), "Refusing to upload an empty buffer");

        let staging = Buffer::staging(&self.device, bytes)?;
        let destination = Buffer::new(
            &self.device,
            staging.size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        self.one_time_submit(|device, cmd| {
            let region = vk::BufferCopy::builder().size(staging.size).build();
            unsafe { device.cmd_copy_buffer(cmd, staging.buffer, destination.buffer, &[region]) };
            Ok(())
        })?;

        log::debug!("Uploaded {} bytes ({:?})", bytes.len(), usage);
        Ok(destination)
    }
}

impl Drop for Uploader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .device
                .destroy_command_pool(self.command_pool, None);
        }
    }
}
