// Images: textures, depth buffer, multisampled color target
//
// Covers creation (image + memory + view as one owned unit), the small
// set of layout transitions the renderer performs, and mip chain blits.

use anyhow::{Context, Result};
use ash::vk;
use std::ops::Range;
use std::sync::Arc;

use super::buffer::allocate_memory;
use super::device::has_stencil_component;
use super::upload::Uploader;
use super::{BackendError, Buffer, VulkanDevice};

/// Number of levels in a full mip chain: floor(log2(max(w, h))) + 1
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    width.max(height).max(1).ilog2() + 1
}

/// One downsampling step of the mip chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipBlit {
    pub src_level: u32,
    pub src_extent: (i32, i32),
    pub dst_extent: (i32, i32),
}

impl MipBlit {
    pub fn dst_level(&self) -> u32 {
        self.src_level + 1
    }
}

/// Blits producing levels 1..mip_levels, each half the previous level and
/// never smaller than 1x1
pub fn mip_blits(width: u32, height: u32, mip_levels: u32) -> Vec<MipBlit> {
    let mut extent = (width as i32, height as i32);

    (1..mip_levels)
        .map(|level| {
            let next = ((extent.0 / 2).max(1), (extent.1 / 2).max(1));
            let blit = MipBlit {
                src_level: level - 1,
                src_extent: extent,
                dst_extent: next,
            };
            extent = next;
            blit
        })
        .collect()
}

/// Access and stage masks for one image memory barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// The only layout transitions the renderer performs outside render passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutTransition {
    UndefinedToTransferDst,
    TransferDstToShaderRead,
    UndefinedToDepthAttachment,
}

impl LayoutTransition {
    pub fn from_layouts(old: vk::ImageLayout, new: vk::ImageLayout) -> Result<Self> {
        use vk::ImageLayout as L;

        match (old, new) {
            (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => Ok(Self::UndefinedToTransferDst),
            (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => {
                Ok(Self::TransferDstToShaderRead)
            }
            (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => {
                Ok(Self::UndefinedToDepthAttachment)
            }
            _ => Err(BackendError::UnsupportedLayoutTransition { old, new }.into()),
        }
    }

    pub fn layouts(self) -> (vk::ImageLayout, vk::ImageLayout) {
        match self {
            Self::UndefinedToTransferDst => {
                (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            }
            Self::TransferDstToShaderRead => (
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ),
            Self::UndefinedToDepthAttachment => (
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ),
        }
    }

    pub fn masks(self) -> BarrierMasks {
        match self {
            Self::UndefinedToTransferDst => BarrierMasks {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::TRANSFER_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
            },
            Self::TransferDstToShaderRead => BarrierMasks {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            },
            Self::UndefinedToDepthAttachment => BarrierMasks {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            },
        }
    }

    pub fn aspect_mask(self, format: vk::Format) -> vk::ImageAspectFlags {
        match self {
            Self::UndefinedToDepthAttachment if has_stencil_component(format) => {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            }
            Self::UndefinedToDepthAttachment => vk::ImageAspectFlags::DEPTH,
            _ => vk::ImageAspectFlags::COLOR,
        }
    }
}

fn subresource_range(
    aspect_mask: vk::ImageAspectFlags,
    base_mip_level: u32,
    level_count: u32,
) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask,
        base_mip_level,
        level_count,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Barrier and stage masks for moving `levels` of `image` from `old` to
/// `new`. Only the three supported transitions resolve; anything else is an
/// `UnsupportedLayoutTransition` error.
pub fn transition_barrier(
    image: vk::Image,
    format: vk::Format,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
    levels: Range<u32>,
) -> Result<(vk::ImageMemoryBarrier, BarrierMasks)> {
    let transition = LayoutTransition::from_layouts(old, new)?;
    let (old_layout, new_layout) = transition.layouts();
    let masks = transition.masks();

    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(subresource_range(
            transition.aspect_mask(format),
            levels.start,
            levels.len() as u32,
        ))
        .src_access_mask(masks.src_access)
        .dst_access_mask(masks.dst_access)
        .build();

    Ok((barrier, masks))
}

/// Record the barrier moving `levels` of `image` from `old` to `new`
pub fn record_transition(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    format: vk::Format,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
    levels: Range<u32>,
) -> Result<()> {
    let (barrier, masks) = transition_barrier(image, format, old, new, levels)?;

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            masks.src_stage,
            masks.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
    Ok(())
}

/// Record the blit chain for levels 1..mip_levels. Expects every level in
/// TRANSFER_DST_OPTIMAL and leaves every level in SHADER_READ_ONLY_OPTIMAL.
pub fn record_mipmaps(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    format: vk::Format,
    width: u32,
    height: u32,
    mip_levels: u32,
) -> Result<()> {
    let level_barrier = |level: u32,
                         old_layout: vk::ImageLayout,
                         new_layout: vk::ImageLayout,
                         src_access: vk::AccessFlags,
                         dst_access: vk::AccessFlags| {
        vk::ImageMemoryBarrier::builder()
            .image(image)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .subresource_range(subresource_range(vk::ImageAspectFlags::COLOR, level, 1))
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .build()
    };

    let layers = |level: u32| vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: level,
        base_array_layer: 0,
        layer_count: 1,
    };

    for blit in mip_blits(width, height, mip_levels) {
        let to_src = level_barrier(
            blit.src_level,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::TRANSFER_READ,
        );

        let region = vk::ImageBlit::builder()
            .src_offsets([
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: blit.src_extent.0,
                    y: blit.src_extent.1,
                    z: 1,
                },
            ])
            .src_subresource(layers(blit.src_level))
            .dst_offsets([
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: blit.dst_extent.0,
                    y: blit.dst_extent.1,
                    z: 1,
                },
            ])
            .dst_subresource(layers(blit.dst_level()))
            .build();

        let to_shader = level_barrier(
            blit.src_level,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::AccessFlags::TRANSFER_READ,
            vk::AccessFlags::SHADER_READ,
        );

        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_src],
            );
            device.cmd_blit_image(
                cmd,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
                vk::Filter::LINEAR,
            );
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_shader],
            );
        }
    }

    // The last level was only ever written to
    record_transition(
        device,
        cmd,
        image,
        format,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        mip_levels - 1..mip_levels,
    )
}

pub fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
    mip_levels: u32,
) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(subresource_range(aspect_mask, 0, mip_levels));

    unsafe { device.create_image_view(&create_info, None) }.context("Failed to create image view")
}

/// Parameters for a 2D device-local image
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    pub extent: vk::Extent2D,
    pub mip_levels: u32,
    pub samples: vk::SampleCountFlags,
    pub format: vk::Format,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
}

/// Device-local image with its memory and a view over all mip levels
pub struct Image {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    device: Arc<VulkanDevice>,
}

impl Image {
    pub fn new(device: &Arc<VulkanDevice>, desc: &ImageDesc) -> Result<Self> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(1)
            .format(desc.format)
            .tiling(desc.tiling)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .samples(desc.samples)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.device.create_image(&image_info, None) }
            .context("Failed to create image")?;

        let requirements = unsafe { device.device.get_image_memory_requirements(image) };
        let memory =
            match allocate_memory(device, requirements, vk::MemoryPropertyFlags::DEVICE_LOCAL) {
                Ok(memory) => memory,
                Err(e) => {
                    unsafe { device.device.destroy_image(image, None) };
                    return Err(e);
                }
            };

        let mut owned = Self {
            image,
            memory,
            view: vk::ImageView::null(),
            device: device.clone(),
        };

        unsafe { device.device.bind_image_memory(image, memory, 0) }
            .context("Failed to bind image memory")?;

        owned.view = create_image_view(
            &device.device,
            image,
            desc.format,
            desc.aspect,
            desc.mip_levels,
        )?;

        Ok(owned)
    }

    /// Multisampled color target the subpass renders into before resolve
    pub fn color_target(
        device: &Arc<VulkanDevice>,
        format: vk::Format,
        extent: vk::Extent2D,
        samples: vk::SampleCountFlags,
    ) -> Result<Self> {
        Self::new(
            device,
            &ImageDesc {
                extent,
                mip_levels: 1,
                samples,
                format,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::TRANSIENT_ATTACHMENT
                    | vk::ImageUsageFlags::COLOR_ATTACHMENT,
                aspect: vk::ImageAspectFlags::COLOR,
            },
        )
    }

    /// Depth attachment, already transitioned for depth testing
    pub fn depth_target(
        device: &Arc<VulkanDevice>,
        uploader: &Uploader,
        format: vk::Format,
        extent: vk::Extent2D,
        samples: vk::SampleCountFlags,
    ) -> Result<Self> {
        let depth = Self::new(
            device,
            &ImageDesc {
                extent,
                mip_levels: 1,
                samples,
                format,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                aspect: vk::ImageAspectFlags::DEPTH,
            },
        )?;

        uploader.one_time_submit(|device, cmd| {
            record_transition(
                device,
                cmd,
                depth.image,
                format,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                0..1,
            )
        })?;

        Ok(depth)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.device.destroy_image_view(self.view, None);
            }
            self.device.device.destroy_image(self.image, None);
            self.device.device.free_memory(self.memory, None);
        }
    }
}

/// Sampled, mip-mapped RGBA texture plus its sampler. Immutable once built.
pub struct Texture {
    pub image: Image,
    pub sampler: vk::Sampler,
}

impl Texture {
    pub const FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

    /// Upload tightly packed RGBA8 `pixels` and build the full mip chain
    pub fn from_rgba(
        device: &Arc<VulkanDevice>,
        uploader: &Uploader,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<Self> {
        anyhow::ensure!(
            pixels.len() == (width as usize) * (height as usize) * 4,
            "Texture data is {} bytes, expected {}x{} RGBA",
            pixels.len(),
            width,
            height
        );

        // No software fallback for the blit chain
        let props = device.format_properties(Self::FORMAT);
        if !props
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
        {
            return Err(BackendError::LinearBlitUnsupported(Self::FORMAT).into());
        }

        let mip_levels = mip_level_count(width, height);
        let staging = Buffer::staging(device, pixels)?;

        let image = Image::new(
            device,
            &ImageDesc {
                extent: vk::Extent2D { width, height },
                mip_levels,
                samples: vk::SampleCountFlags::TYPE_1,
                format: Self::FORMAT,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::SAMPLED,
                aspect: vk::ImageAspectFlags::COLOR,
            },
        )?;

        uploader.one_time_submit(|device, cmd| {
            record_transition(
                device,
                cmd,
                image.image,
                Self::FORMAT,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                0..mip_levels,
            )
        })?;

        uploader.one_time_submit(|device, cmd| {
            let region = vk::BufferImageCopy::builder()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                .image_extent(vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                })
                .build();

            unsafe {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    staging.buffer,
                    image.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }
            Ok(())
        })?;

        uploader.one_time_submit(|device, cmd| {
            record_mipmaps(device, cmd, image.image, Self::FORMAT, width, height, mip_levels)
        })?;

        let sampler = Self::create_sampler(device, mip_levels)?;

        log::info!("Texture {}x{} uploaded with {} mip levels", width, height, mip_levels);

        Ok(Self { image, sampler })
    }

    fn create_sampler(device: &VulkanDevice, mip_levels: u32) -> Result<vk::Sampler> {
        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(true)
            .max_anisotropy(device.properties.limits.max_sampler_anisotropy)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(mip_levels as f32);

        unsafe { device.device.create_sampler(&sampler_info, None) }
            .context("Failed to create texture sampler")
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.image.device.device.destroy_sampler(self.sampler, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_count_follows_largest_dimension() {
        assert_eq!(mip_level_count(512, 256), 10);
        assert_eq!(mip_level_count(256, 512), 10);
        assert_eq!(mip_level_count(1024, 1024), 11);
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(3, 1), 2);
        // Non power of two rounds down
        assert_eq!(mip_level_count(800, 600), 10);
    }

    #[test]
    fn mip_chain_halves_down_to_one_pixel() {
        let levels = mip_level_count(512, 256);
        let blits = mip_blits(512, 256, levels);

        assert_eq!(blits.len(), 9);
        assert_eq!(blits[0].src_extent, (512, 256));
        assert_eq!(blits[0].dst_extent, (256, 128));

        for pair in blits.windows(2) {
            assert_eq!(pair[0].dst_extent, pair[1].src_extent);
            assert_eq!(pair[0].dst_level(), pair[1].src_level);
        }

        // Height bottoms out one level before width
        assert_eq!(blits[7].dst_extent, (2, 1));
        assert_eq!(blits[8].dst_extent, (1, 1));
        assert_eq!(blits[8].dst_level(), levels - 1);

        assert!(blits
            .iter()
            .all(|b| b.dst_extent.0 >= 1 && b.dst_extent.1 >= 1));
    }

    #[test]
    fn single_level_needs_no_blits() {
        assert!(mip_blits(1, 1, 1).is_empty());
    }

    #[test]
    fn supported_transitions_map_to_masks() {
        use vk::ImageLayout as L;

        let upload = LayoutTransition::from_layouts(L::UNDEFINED, L::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(upload, LayoutTransition::UndefinedToTransferDst);
        assert_eq!(upload.masks().dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(upload.masks().src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);

        let sample =
            LayoutTransition::from_layouts(L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL)
                .unwrap();
        assert_eq!(sample.masks().dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(sample.masks().dst_access, vk::AccessFlags::SHADER_READ);

        let depth =
            LayoutTransition::from_layouts(L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .unwrap();
        assert_eq!(
            depth.masks().dst_stage,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
        );
        assert_eq!(
            depth.aspect_mask(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            depth.aspect_mask(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );

        for transition in [upload, sample, depth] {
            let (old, new) = transition.layouts();
            assert_eq!(LayoutTransition::from_layouts(old, new).unwrap(), transition);
        }
    }

    #[test]
    fn other_transitions_are_rejected() {
        use vk::ImageLayout as L;

        for (old, new) in [
            (L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_DST_OPTIMAL),
            (L::UNDEFINED, L::SHADER_READ_ONLY_OPTIMAL),
            (L::TRANSFER_DST_OPTIMAL, L::PRESENT_SRC_KHR),
            (L::UNDEFINED, L::UNDEFINED),
        ] {
            let err = LayoutTransition::from_layouts(old, new).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<BackendError>(),
                Some(BackendError::UnsupportedLayoutTransition { .. })
            ));
        }
    }

    #[test]
    fn recorded_barrier_rejects_unsupported_pair() {
        use vk::ImageLayout as L;

        let err = transition_barrier(
            vk::Image::null(),
            Texture::FORMAT,
            L::SHADER_READ_ONLY_OPTIMAL,
            L::TRANSFER_DST_OPTIMAL,
            0..1,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BackendError>(),
            Some(BackendError::UnsupportedLayoutTransition { .. })
        ));
    }

    #[test]
    fn last_mip_level_barrier_covers_one_level() {
        use vk::ImageLayout as L;

        let levels = mip_level_count(512, 256);
        let (barrier, masks) = transition_barrier(
            vk::Image::null(),
            Texture::FORMAT,
            L::TRANSFER_DST_OPTIMAL,
            L::SHADER_READ_ONLY_OPTIMAL,
            levels - 1..levels,
        )
        .unwrap();

        assert_eq!(barrier.old_layout, L::TRANSFER_DST_OPTIMAL);
        assert_eq!(barrier.new_layout, L::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(barrier.subresource_range.base_mip_level, levels - 1);
        assert_eq!(barrier.subresource_range.level_count, 1);
        assert_eq!(
            barrier.subresource_range.aspect_mask,
            vk::ImageAspectFlags::COLOR
        );
        assert_eq!(masks, LayoutTransition::TransferDstToShaderRead.masks());
        assert_eq!(barrier.src_access_mask, masks.src_access);
        assert_eq!(barrier.dst_access_mask, masks.dst_access);
    }

    #[test]
    fn depth_barrier_includes_stencil_aspect() {
        use vk::ImageLayout as L;

        let (barrier, _) = transition_barrier(
            vk::Image::null(),
            vk::Format::D24_UNORM_S8_UINT,
            L::UNDEFINED,
            L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            0..1,
        )
        .unwrap();
        assert_eq!(
            barrier.subresource_range.aspect_mask,
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(barrier.subresource_range.level_count, 1);
    }
}
