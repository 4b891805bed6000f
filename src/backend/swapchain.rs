// Swapchain - Window presentation
//
// Owns the chain of presentable images together with everything sized to
// them: views, MSAA color target, depth target and framebuffers. The whole
// set is torn down and rebuilt as a unit when the surface changes.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::image::{create_image_view, Image};
use super::pipeline::{framebuffer_attachments, needs_resolve, GraphicsPipeline};
use super::upload::Uploader;
use super::{BackendError, VulkanDevice};

/// Surface properties queried fresh for every (re)creation
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn query(device: &VulkanDevice) -> Result<Self> {
        let loader = &device.surface_loader;
        unsafe {
            Ok(Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(device.physical_device, device.surface)
                    .context("Failed to query surface capabilities")?,
                formats: loader
                    .get_physical_device_surface_formats(device.physical_device, device.surface)
                    .context("Failed to query surface formats")?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(device.physical_device, device.surface)
                    .context("Failed to query present modes")?,
            })
        }
    }
}

/// Prefer 8-bit BGRA sRGB, otherwise take whatever the surface lists first
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
        .ok_or_else(|| BackendError::NoSupportedFormat(Vec::new()).into())
}

/// Use `preferred` when offered, otherwise FIFO (always supported)
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if available.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Map a configured present mode name to its Vulkan value
pub fn present_mode_from_name(name: &str) -> Option<vk::PresentModeKHR> {
    match name.to_ascii_lowercase().as_str() {
        "mailbox" => Some(vk::PresentModeKHR::MAILBOX),
        "fifo" => Some(vk::PresentModeKHR::FIFO),
        "fifo_relaxed" => Some(vk::PresentModeKHR::FIFO_RELAXED),
        "immediate" => Some(vk::PresentModeKHR::IMMEDIATE),
        _ => None,
    }
}

/// The surface dictates the extent unless it reports the u32::MAX sentinel,
/// in which case the framebuffer size is clamped into the allowed range
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: framebuffer.width.clamp(min.width, max.width),
        height: framebuffer.height.clamp(min.height, max.height),
    }
}

/// One more than the minimum, capped by the maximum (0 means unbounded)
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// Result of asking the presentation engine for an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Ready { image_index: u32, suboptimal: bool },
    OutOfDate,
}

/// Result of queueing an image for presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    pub fn needs_recreate(self) -> bool {
        self != PresentOutcome::Presented
    }
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::extensions::khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub extent: vk::Extent2D,
    color_target: Option<Image>,
    depth_target: Option<Image>,
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    pub fn new(
        device: &Arc<VulkanDevice>,
        uploader: &Uploader,
        pipeline: &GraphicsPipeline,
        framebuffer_extent: vk::Extent2D,
        preferred_present_mode: vk::PresentModeKHR,
    ) -> Result<Self> {
        let support = SurfaceSupport::query(device)?;
        let surface_format = choose_surface_format(&support.formats)?;
        let present_mode = choose_present_mode(&support.present_modes, preferred_present_mode);
        let extent = choose_extent(&support.capabilities, framebuffer_extent);
        let image_count = choose_image_count(&support.capabilities);

        if surface_format.format != pipeline.color_format {
            // Render pass is kept across recreation; its format must still match
            log::warn!(
                "Surface format changed from {:?} to {:?}",
                pipeline.color_format,
                surface_format.format
            );
        }

        let swapchain_loader =
            ash::extensions::khr::Swapchain::new(&device.instance, &device.device);

        // Images are shared when graphics and present live on different families
        let family_indices = device.queue_families.unique();
        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(device.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());
        create_info = if device.queue_families.is_shared() {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        };

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .context("Failed to create swapchain")?;

        // Owned from here on so a later failure still releases what exists
        let mut owned = Self {
            swapchain,
            swapchain_loader,
            images: Vec::new(),
            image_views: Vec::new(),
            framebuffers: Vec::new(),
            extent,
            color_target: None,
            depth_target: None,
            device: device.clone(),
        };

        owned.images = unsafe { owned.swapchain_loader.get_swapchain_images(swapchain) }
            .context("Failed to get swapchain images")?;

        for &image in &owned.images {
            let view = create_image_view(
                &device.device,
                image,
                surface_format.format,
                vk::ImageAspectFlags::COLOR,
                1,
            )?;
            owned.image_views.push(view);
        }

        if needs_resolve(pipeline.samples) {
            owned.color_target = Some(Image::color_target(
                device,
                surface_format.format,
                extent,
                pipeline.samples,
            )?);
        }
        let depth = Image::depth_target(
            device,
            uploader,
            pipeline.depth_format,
            extent,
            pipeline.samples,
        )?;
        let depth_view = depth.view;
        owned.depth_target = Some(depth);

        let color_view = owned.color_target.as_ref().map(|image| image.view);
        for &swapchain_view in &owned.image_views {
            let attachments = framebuffer_attachments(swapchain_view, depth_view, color_view);
            let framebuffer_info = vk::FramebufferCreateInfo::builder()
                .render_pass(pipeline.render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = unsafe { device.device.create_framebuffer(&framebuffer_info, None) }
                .context("Failed to create framebuffer")?;
            owned.framebuffers.push(framebuffer);
        }

        log::info!(
            "Swapchain: {} images, {}x{}, {:?}, {:?}",
            owned.images.len(),
            extent.width,
            extent.height,
            surface_format.format,
            present_mode
        );

        Ok(owned)
    }

    /// Acquire the next presentable image, signaling `semaphore` when ready
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<AcquireOutcome> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Ready {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(e).context("Failed to acquire swapchain image"),
        }
    }

    /// Queue `image_index` for presentation once `wait_semaphore` is signaled
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<PresentOutcome> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };

        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(e).context("Failed to present swapchain image"),
        }
    }

    pub fn framebuffer(&self, image_index: u32) -> vk::Framebuffer {
        self.framebuffers[image_index as usize]
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.device.destroy_framebuffer(framebuffer, None);
            }
        }
        self.color_target = None;
        self.depth_target = None;
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}
