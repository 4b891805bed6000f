// Synchronization primitives
//
// One FrameSlot per frame in flight. The slot's fence gates reuse of its
// command buffer and of the uniform buffer bound through its descriptor set.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;

/// Per-frame sync objects and command buffer
pub struct FrameSlot {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
    pub command_buffer: vk::CommandBuffer,
}

/// All frame slots plus the pool their command buffers come from.
/// Slots are only destroyed together, at shutdown.
pub struct FrameSlots {
    slots: Vec<FrameSlot>,
    command_pool: vk::CommandPool,
    device: Arc<VulkanDevice>,
}

impl FrameSlots {
    pub fn new(device: &Arc<VulkanDevice>, count: usize) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.queue_families.graphics)
            // RESET: each slot re-records its own buffer every frame
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let command_pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Failed to create frame command pool")?;

        let mut frame_slots = Self {
            slots: Vec::with_capacity(count),
            command_pool,
            device: device.clone(),
        };

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count as u32);

        let command_buffers = unsafe { device.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate frame command buffers")?;

        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED); // Start signaled

        for command_buffer in command_buffers {
            unsafe {
                let image_available = device.device.create_semaphore(&semaphore_info, None)?;
                let render_finished = device.device.create_semaphore(&semaphore_info, None)?;
                let in_flight_fence = device.device.create_fence(&fence_info, None)?;

                frame_slots.slots.push(FrameSlot {
                    image_available,
                    render_finished,
                    in_flight_fence,
                    command_buffer,
                });
            }
        }

        log::debug!("Created {} frame slots", count);
        Ok(frame_slots)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }
}

impl Drop for FrameSlots {
    fn drop(&mut self) {
        unsafe {
            for slot in &self.slots {
                self.device.device.destroy_semaphore(slot.image_available, None);
                self.device.device.destroy_semaphore(slot.render_finished, None);
                self.device.device.destroy_fence(slot.in_flight_fence, None);
            }
            // Also frees the command buffers
            self.device
                .device
                .destroy_command_pool(self.command_pool, None);
        }
    }
}
