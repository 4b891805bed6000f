// Descriptors and per-frame uniforms
//
// One uniform buffer and one descriptor set per frame slot. A slot's buffer
// is only written after that slot's fence has signaled.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use std::sync::Arc;

use super::image::Texture;
use super::{Buffer, VulkanDevice};

pub const UNIFORM_BINDING: u32 = 0;
pub const SAMPLER_BINDING: u32 = 1;

/// Model, view and projection matrices, laid out for std140
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl UniformBufferObject {
    /// Radians per second the model spins about Z
    pub const SPIN_RATE: f32 = std::f32::consts::FRAC_PI_2;

    pub fn at_time(elapsed_secs: f32, extent: vk::Extent2D) -> Self {
        let model = Mat4::from_rotation_z(elapsed_secs * Self::SPIN_RATE);
        let view = Mat4::look_at_rh(Vec3::splat(2.0), Vec3::ZERO, Vec3::Z);

        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let mut proj = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 10.0);
        // Vulkan clip space Y points down
        proj.y_axis.y *= -1.0;

        Self { model, view, proj }
    }
}

/// Host-visible uniform buffer that stays mapped for its whole life
pub struct UniformBuffer {
    pub buffer: Buffer,
    mapped: *mut u8,
}

impl UniformBuffer {
    pub fn new(device: &Arc<VulkanDevice>) -> Result<Self> {
        let buffer = Buffer::new(
            device,
            std::mem::size_of::<UniformBufferObject>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let mapped = unsafe { buffer.map()? };
        Ok(Self { buffer, mapped })
    }

    pub fn write(&mut self, ubo: &UniformBufferObject) {
        let bytes = bytemuck::bytes_of(ubo);
        // Coherent memory: no flush needed
        unsafe { self.mapped.copy_from_nonoverlapping(bytes.as_ptr(), bytes.len()) };
    }
}

/// Layout, pool and one set per frame slot
pub struct Descriptors {
    pub layout: vk::DescriptorSetLayout,
    pub pool: vk::DescriptorPool,
    pub sets: Vec<vk::DescriptorSet>,
    device: Arc<VulkanDevice>,
}

pub fn layout_bindings() -> [vk::DescriptorSetLayoutBinding; 2] {
    [
        vk::DescriptorSetLayoutBinding::builder()
            .binding(UNIFORM_BINDING)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .build(),
        vk::DescriptorSetLayoutBinding::builder()
            .binding(SAMPLER_BINDING)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            .build(),
    ]
}

/// Pool sizes for `set_count` sets built from [`layout_bindings`]
pub fn pool_sizes(set_count: u32) -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: set_count,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: set_count,
        },
    ]
}

impl Descriptors {
    /// The layout is needed before the pipeline exists; sets are written
    /// later by [`Descriptors::allocate`].
    pub fn new(device: &Arc<VulkanDevice>) -> Result<Self> {
        let bindings = layout_bindings();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

        let layout = unsafe { device.device.create_descriptor_set_layout(&layout_info, None) }
            .context("Failed to create descriptor set layout")?;

        Ok(Self {
            layout,
            pool: vk::DescriptorPool::null(),
            sets: Vec::new(),
            device: device.clone(),
        })
    }

    /// Allocate one set per uniform buffer and point each at its buffer
    /// and the shared texture
    pub fn allocate(&mut self, uniforms: &[UniformBuffer], texture: &Texture) -> Result<()> {
        let count = uniforms.len() as u32;
        let sizes = pool_sizes(count);
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&sizes)
            .max_sets(count);

        self.pool = unsafe { self.device.device.create_descriptor_pool(&pool_info, None) }
            .context("Failed to create descriptor pool")?;

        let layouts = vec![self.layout; uniforms.len()];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        self.sets = unsafe { self.device.device.allocate_descriptor_sets(&alloc_info) }
            .context("Failed to allocate descriptor sets")?;

        for (&set, uniform) in self.sets.iter().zip(uniforms) {
            let buffer_info = [vk::DescriptorBufferInfo {
                buffer: uniform.buffer.buffer,
                offset: 0,
                range: std::mem::size_of::<UniformBufferObject>() as vk::DeviceSize,
            }];
            let image_info = [vk::DescriptorImageInfo {
                sampler: texture.sampler,
                image_view: texture.image.view,
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            }];

            let writes = [
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(UNIFORM_BINDING)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&buffer_info)
                    .build(),
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(SAMPLER_BINDING)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_info)
                    .build(),
            ];

            unsafe { self.device.device.update_descriptor_sets(&writes, &[]) };
        }

        log::debug!("Allocated {} descriptor sets", self.sets.len());
        Ok(())
    }
}

impl Drop for Descriptors {
    fn drop(&mut self) {
        unsafe {
            // Sets go with the pool
            if self.pool != vk::DescriptorPool::null() {
                self.device.device.destroy_descriptor_pool(self.pool, None);
            }
            self.device
                .device
                .destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    fn approx(a: Vec4, b: Vec4) -> bool {
        (a - b).abs().max_element() < 1e-5
    }

    #[test]
    fn ubo_is_three_packed_matrices() {
        assert_eq!(std::mem::size_of::<UniformBufferObject>(), 3 * 64);
    }

    #[test]
    fn model_starts_at_identity() {
        let ubo = UniformBufferObject::at_time(0.0, EXTENT);
        assert_eq!(ubo.model, Mat4::IDENTITY);
    }

    #[test]
    fn model_quarter_turn_per_second() {
        let ubo = UniformBufferObject::at_time(1.0, EXTENT);
        let x = ubo.model * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert!(approx(x, Vec4::new(0.0, 1.0, 0.0, 1.0)));
    }

    #[test]
    fn projection_flips_y() {
        let ubo = UniformBufferObject::at_time(0.0, EXTENT);
        let unflipped = Mat4::perspective_rh(45f32.to_radians(), 800.0 / 600.0, 0.1, 10.0);
        assert_eq!(ubo.proj.y_axis.y, -unflipped.y_axis.y);
        assert_eq!(ubo.proj.x_axis.x, unflipped.x_axis.x);
    }

    #[test]
    fn origin_is_in_front_of_the_camera() {
        let ubo = UniformBufferObject::at_time(0.0, EXTENT);
        let clip = ubo.proj * ubo.view * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip / clip.w;
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn bindings_match_shader_interface() {
        let bindings = layout_bindings();
        assert_eq!(bindings[0].binding, UNIFORM_BINDING);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(bindings[0].stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(bindings[1].binding, SAMPLER_BINDING);
        assert_eq!(
            bindings[1].descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(bindings[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn pool_holds_one_of_each_per_set() {
        let sizes = pool_sizes(2);
        assert!(sizes.iter().all(|s| s.descriptor_count == 2));
    }
}
