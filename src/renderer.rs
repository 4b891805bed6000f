// =============================================================================
// RENDERER - Vulkan implementation of the frame protocol
// =============================================================================
//
// Owns every GPU resource. Construction order is the dependency order;
// field order below is the reverse, so fields drop safely after the
// explicit wait-idle in Drop.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;
use std::time::Instant;
use winit::window::Window;

use crate::backend::descriptor::{Descriptors, UniformBuffer, UniformBufferObject};
use crate::backend::image::Texture;
use crate::backend::pipeline::{needs_resolve, GraphicsPipeline};
use crate::backend::swapchain::{
    choose_surface_format, AcquireOutcome, PresentOutcome, SurfaceSupport,
};
use crate::backend::sync::FrameSlots;
use crate::backend::upload::Uploader;
use crate::backend::{Buffer, Swapchain, VulkanDevice};
use crate::config::Config;
use crate::frame::FrameBackend;
use crate::mesh::{self, MeshData};
use crate::texture::TextureData;

pub struct Renderer {
    // ─────────────────────────────────────────────────────────────────────────
    // PER-FRAME
    // ─────────────────────────────────────────────────────────────────────────
    frames: FrameSlots,
    descriptors: Descriptors,
    /// One per frame slot, persistently mapped
    uniforms: Vec<UniformBuffer>,

    // ─────────────────────────────────────────────────────────────────────────
    // SCENE (immutable after upload)
    // ─────────────────────────────────────────────────────────────────────────
    index_buffer: Buffer,
    vertex_buffer: Buffer,
    index_count: u32,
    /// Referenced only through the descriptor sets
    _texture: Texture,

    // ─────────────────────────────────────────────────────────────────────────
    // PRESENTATION
    // ─────────────────────────────────────────────────────────────────────────
    /// None only while being rebuilt
    swapchain: Option<Swapchain>,
    pipeline: GraphicsPipeline,
    present_mode: vk::PresentModeKHR,
    clear_color: [f32; 4],
    wait_stages: [vk::PipelineStageFlags; 1],
    start_time: Instant,

    // ─────────────────────────────────────────────────────────────────────────
    // CORE (dropped last; the surface needs the window alive)
    // ─────────────────────────────────────────────────────────────────────────
    uploader: Uploader,
    device: Arc<VulkanDevice>,
    window: Arc<Window>,
}

impl Renderer {
    pub fn new(window: Arc<Window>, config: &Config) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        let device = VulkanDevice::new(
            window.as_ref(),
            &config.window.title,
            config.validation_enabled(),
            config.graphics.msaa,
        )?;
        let uploader = Uploader::new(&device)?;

        // ─────────────────────────────────────────────────────────────────────
        // Scene upload
        // ─────────────────────────────────────────────────────────────────────
        let mesh: MeshData = match &config.assets.model {
            Some(path) => mesh::load_obj(path)?,
            None => {
                log::info!("No model configured, drawing the built-in quad");
                mesh::quad()
            }
        };
        let vertex_buffer =
            uploader.upload_buffer(&mesh.vertices, vk::BufferUsageFlags::VERTEX_BUFFER)?;
        let index_buffer =
            uploader.upload_buffer(&mesh.indices, vk::BufferUsageFlags::INDEX_BUFFER)?;

        let pixels = TextureData::load(&config.assets.texture)?;
        let texture = Texture::from_rgba(
            &device,
            &uploader,
            pixels.width,
            pixels.height,
            &pixels.pixels,
        )?;

        // ─────────────────────────────────────────────────────────────────────
        // Render pass + pipeline (survive swapchain rebuilds)
        // ─────────────────────────────────────────────────────────────────────
        let mut descriptors = Descriptors::new(&device)?;
        let surface_format = choose_surface_format(&SurfaceSupport::query(&device)?.formats)?;
        let pipeline = GraphicsPipeline::new(
            &device,
            surface_format.format,
            descriptors.layout,
            &config.assets.vertex_shader,
            &config.assets.fragment_shader,
        )?;

        let present_mode = config.present_mode();
        let swapchain = Swapchain::new(
            &device,
            &uploader,
            &pipeline,
            framebuffer_extent(&window),
            present_mode,
        )?;

        // ─────────────────────────────────────────────────────────────────────
        // Frame slots
        // ─────────────────────────────────────────────────────────────────────
        let slot_count = config.frames_in_flight();
        let frames = FrameSlots::new(&device, slot_count)?;
        let uniforms = (0..slot_count)
            .map(|_| UniformBuffer::new(&device))
            .collect::<Result<Vec<_>>>()?;
        descriptors.allocate(&uniforms, &texture)?;

        log::info!(
            "Vulkan initialized successfully! ({} frames in flight, {} triangles)",
            frames.len(),
            mesh.triangle_count()
        );
        Ok(Self {
            frames,
            descriptors,
            uniforms,
            index_buffer,
            vertex_buffer,
            index_count: mesh.indices.len() as u32,
            _texture: texture,
            swapchain: Some(swapchain),
            pipeline,
            present_mode,
            clear_color: config.graphics.clear_color,
            wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
            start_time: Instant::now(),
            uploader,
            device,
            window,
        })
    }

    pub fn device(&self) -> &VulkanDevice {
        &self.device
    }

    fn swapchain(&self) -> Result<&Swapchain> {
        self.swapchain.as_ref().context("Swapchain not initialized")
    }

    fn clear_values(&self) -> Vec<vk::ClearValue> {
        let color = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        };
        let depth = vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        };
        // Resolve target is never cleared, but needs a slot when present
        if needs_resolve(self.pipeline.samples) {
            vec![color, depth, color]
        } else {
            vec![color, depth]
        }
    }
}

fn framebuffer_extent(window: &Window) -> vk::Extent2D {
    let size = window.inner_size();
    vk::Extent2D {
        width: size.width,
        height: size.height,
    }
}

impl FrameBackend for Renderer {
    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        let fence = self.frames.get(slot).in_flight_fence;
        unsafe { self.device.device.wait_for_fences(&[fence], true, u64::MAX) }
            .context("Failed waiting for frame fence")
    }

    fn acquire(&mut self, slot: usize) -> Result<AcquireOutcome> {
        let semaphore = self.frames.get(slot).image_available;
        self.swapchain()?.acquire_next_image(semaphore)
    }

    fn reset_fence(&mut self, slot: usize) -> Result<()> {
        let fence = self.frames.get(slot).in_flight_fence;
        unsafe { self.device.device.reset_fences(&[fence]) }.context("Failed to reset frame fence")
    }

    fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let device = &self.device.device;
        let cmd = self.frames.get(slot).command_buffer;
        let swapchain = self.swapchain()?;
        let extent = swapchain.extent;

        unsafe {
            device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            device.begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::builder())?;

            let clear_values = self.clear_values();
            let render_pass_info = vk::RenderPassBeginInfo::builder()
                .render_pass(self.pipeline.render_pass)
                .framebuffer(swapchain.framebuffer(image_index))
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .clear_values(&clear_values);

            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);

            // Dynamic state follows the current swapchain extent
            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(
                cmd,
                0,
                &[vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                }],
            );

            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]);
            device.cmd_bind_index_buffer(cmd, self.index_buffer.buffer, 0, vk::IndexType::UINT32);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.layout,
                0,
                &[self.descriptors.sets[slot]],
                &[],
            );
            device.cmd_draw_indexed(cmd, self.index_count, 1, 0, 0, 0);

            device.cmd_end_render_pass(cmd);
            device.end_command_buffer(cmd)?;
        }

        Ok(())
    }

    fn update_uniforms(&mut self, slot: usize) -> Result<()> {
        let extent = self.swapchain()?.extent;
        let ubo = UniformBufferObject::at_time(self.start_time.elapsed().as_secs_f32(), extent);
        self.uniforms[slot].write(&ubo);
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        let frame = self.frames.get(slot);
        let wait_semaphores = [frame.image_available];
        let signal_semaphores = [frame.render_finished];
        let command_buffers = [frame.command_buffer];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores) // Wait for image to be available
            .wait_dst_stage_mask(&self.wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores); // Signal when done

        unsafe {
            self.device.device.queue_submit(
                self.device.graphics_queue,
                &[submit_info.build()],
                frame.in_flight_fence,
            )
        }
        .context("Failed to submit draw command buffer")
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
        let render_finished = self.frames.get(slot).render_finished;
        self.swapchain()?
            .present(self.device.present_queue, image_index, render_finished)
    }

    fn framebuffer_extent(&self) -> vk::Extent2D {
        framebuffer_extent(&self.window)
    }

    fn recreate_swapchain(&mut self) -> Result<()> {
        // Nothing may still reference the old images
        self.device.wait_idle()?;

        // One swapchain per surface: drop the old set before building the new
        self.swapchain = None;
        let swapchain = Swapchain::new(
            &self.device,
            &self.uploader,
            &self.pipeline,
            framebuffer_extent(&self.window),
            self.present_mode,
        )?;
        log::info!(
            "Swapchain recreated: {}x{}",
            swapchain.extent.width,
            swapchain.extent.height
        );
        self.swapchain = Some(swapchain);
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");
        // Wait for GPU to finish before destroying anything
        if let Err(e) = self.device.wait_idle() {
            log::error!("wait_idle failed during shutdown: {:?}", e);
        }
        self.swapchain = None;
    }
}
