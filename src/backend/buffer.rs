// Buffer utilities for vertex, index, staging and uniform buffers
//
// A Buffer pairs the handle with its dedicated memory block and frees
// both together on drop.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::{BackendError, VulkanDevice};

/// Find a memory type index allowed by `type_filter` that carries every
/// flag in `properties`. The first match wins.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            let has_type = (type_filter & (1 << i)) != 0;
            let has_properties = memory_properties.memory_types[i as usize]
                .property_flags
                .contains(properties);
            has_type && has_properties
        })
        .ok_or_else(|| {
            BackendError::NoSuitableMemoryType {
                type_filter,
                properties,
            }
            .into()
        })
}

/// Allocate and bind a dedicated memory block for `requirements`
pub fn allocate_memory(
    device: &VulkanDevice,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
) -> Result<vk::DeviceMemory> {
    let memory_type_index = find_memory_type(
        &device.memory_properties,
        requirements.memory_type_bits,
        properties,
    )?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    unsafe { device.device.allocate_memory(&alloc_info, None) }
        .context("Failed to allocate device memory")
}

/// GPU buffer with its own memory block
pub struct Buffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    device: Arc<VulkanDevice>,
}

impl Buffer {
    /// Create a buffer with specified usage and memory properties
    pub fn new(
        device: &Arc<VulkanDevice>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory_properties: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
            .context("Failed to create buffer")?;

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let memory = match allocate_memory(device, requirements, memory_properties) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        // Wrap now so an error below still frees both
        let buffer = Self {
            buffer,
            memory,
            size,
            device: device.clone(),
        };

        unsafe { device.device.bind_buffer_memory(buffer.buffer, buffer.memory, 0) }
            .context("Failed to bind buffer memory")?;

        Ok(buffer)
    }

    /// Host-visible staging buffer filled with `bytes`
    pub fn staging(device: &Arc<VulkanDevice>, bytes: &[u8]) -> Result<Self> {
        let buffer = Self::new(
            device,
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        unsafe {
            let ptr = buffer.map()?;
            ptr.copy_from_nonoverlapping(bytes.as_ptr(), bytes.len());
            device.device.unmap_memory(buffer.memory);
        }

        Ok(buffer)
    }

    /// Map the whole buffer. Only valid for host-visible memory.
    ///
    /// # Safety
    /// The pointer is valid until `unmap_memory` or drop.
    pub unsafe fn map(&self) -> Result<*mut u8> {
        let ptr = self
            .device
            .device
            .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
            .context("Failed to map buffer memory")?;
        Ok(ptr.cast())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_buffer(self.buffer, None);
            self.device.device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, &flags) in types.iter().enumerate() {
            props.memory_types[i] = vk::MemoryType {
                property_flags: flags,
                heap_index: 0,
            };
        }
        props
    }

    const DEVICE_LOCAL: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
    const HOST: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
        vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw()
            | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
    );

    #[test]
    fn first_matching_type_wins() {
        let props = memory_properties(&[DEVICE_LOCAL, HOST, HOST | DEVICE_LOCAL]);

        assert_eq!(find_memory_type(&props, 0b111, HOST).unwrap(), 1);
        assert_eq!(find_memory_type(&props, 0b111, DEVICE_LOCAL).unwrap(), 0);
    }

    #[test]
    fn type_filter_excludes_otherwise_matching_types() {
        let props = memory_properties(&[DEVICE_LOCAL, HOST, HOST | DEVICE_LOCAL]);

        // Type 1 is masked out, so the superset at index 2 is taken
        assert_eq!(find_memory_type(&props, 0b100, HOST).unwrap(), 2);
    }

    #[test]
    fn chosen_type_satisfies_filter_and_flags() {
        let props = memory_properties(&[HOST, DEVICE_LOCAL, HOST | DEVICE_LOCAL, DEVICE_LOCAL]);

        for filter in 1u32..16 {
            for wanted in [DEVICE_LOCAL, HOST, HOST | DEVICE_LOCAL] {
                if let Ok(index) = find_memory_type(&props, filter, wanted) {
                    assert_ne!(filter & (1 << index), 0);
                    assert!(props.memory_types[index as usize].property_flags.contains(wanted));
                }
            }
        }
    }

    #[test]
    fn missing_properties_is_fatal() {
        let props = memory_properties(&[DEVICE_LOCAL]);

        let err = find_memory_type(&props, 0b1, HOST).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BackendError>(),
            Some(BackendError::NoSuitableMemoryType { type_filter: 0b1, .. })
        ));
    }

    #[test]
    fn filter_with_no_allowed_types_is_fatal() {
        let props = memory_properties(&[DEVICE_LOCAL, HOST]);

        assert!(find_memory_type(&props, 0b1000, DEVICE_LOCAL).is_err());
        assert!(find_memory_type(&props, 0, vk::MemoryPropertyFlags::empty()).is_err());
    }
}
