// =============================================================================
// MESH RENDERER - Textured, multisampled, depth-tested Vulkan renderer
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  winit event loop (App)                                         │
// │    └── FrameScheduler (per-frame protocol, resize handling)     │
// │          └── Renderer (FrameBackend over Vulkan)                │
// │                └── backend: device, uploads, images, swapchain, │
// │                    pipeline, descriptors, frame slots           │
// └─────────────────────────────────────────────────────────────────┘
//
// Exit code is 0 on window close and non-zero on any fatal error.
//
// =============================================================================

mod backend;
mod config;
mod frame;
mod mesh;
mod renderer;
mod texture;

use anyhow::Result;
use config::Config;
use frame::{FrameOutcome, FrameScheduler};
use renderer::Renderer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::process::ExitCode;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<ExitCode> {
    init_logging();

    let config = Config::load();
    log::info!("Starting mesh renderer");
    log::info!(
        "Window: {}x{}, present mode preference: {}",
        config.window.width,
        config.window.height,
        config.graphics.present_mode
    );

    let event_loop = EventLoop::new()?;
    // Redraws are requested explicitly, so idle windows cost nothing
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    // Tear down GPU state before reporting
    app.renderer = None;
    Ok(ExitCode::from(exit_code(app.fatal.as_ref(), app.scheduler.frame_count())))
}

/// A fatal error was already logged when it ended the loop
fn exit_code(fatal: Option<&anyhow::Error>, frames: u64) -> u8 {
    match fatal {
        Some(_) => 1,
        None => {
            log::info!("Shutdown complete after {} frames", frames);
            0
        }
    }
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env() // RUST_LOG overrides
        .init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

struct App {
    config: Config,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    scheduler: FrameScheduler,
    /// Shared with the scheduler; set on every resize event
    resize_flag: Arc<AtomicBool>,
    /// First unrecoverable error; ends the event loop
    fatal: Option<anyhow::Error>,

    // FPS tracking
    frame_count: u32,
    last_fps_update: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        let scheduler = FrameScheduler::new(config.frames_in_flight());
        let resize_flag = scheduler.resize_flag();
        Self {
            config,
            window: None,
            renderer: None,
            scheduler,
            resize_flag,
            fatal: None,
            frame_count: 0,
            last_fps_update: Instant::now(),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        if self.fatal.is_none() {
            self.fatal = Some(error);
        }
        event_loop.exit();
    }

    fn render(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        match self.scheduler.draw_frame(renderer) {
            Ok(outcome) => {
                if outcome.presented() {
                    self.update_fps();
                }
                if outcome == FrameOutcome::Minimized {
                    log::debug!("Minimized, waiting for a resize");
                }
            }
            Err(e) => self.fail(event_loop, e.context("Frame failed")),
        }
    }

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        self.frame_count += 1;
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();

        // Update title every second
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;
            if let Some(ref window) = self.window {
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms)",
                    self.config.window.title,
                    fps,
                    1000.0 / fps
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to create window"));
                return;
            }
        };

        match Renderer::new(window.clone(), &self.config) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => {
                self.fail(event_loop, e.context("Failed to initialize Vulkan"));
                return;
            }
        }

        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(ref renderer) = self.renderer {
                    if let Err(e) = renderer.device().wait_idle() {
                        log::warn!("wait_idle failed: {:?}", e);
                    }
                }
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.resize_flag.store(true, Ordering::Release);

                // A deferred rebuild can proceed now
                if size.width > 0 && size.height > 0 {
                    if let Some(ref window) = self.window {
                        window.request_redraw();
                    }
                }
            }

            WindowEvent::RedrawRequested => self.render(event_loop),

            _ => {}
        }
    }

    /// Keep drawing continuously, except while parked on a zero-size window
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.scheduler.is_waiting_for_size() {
            return;
        }
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_error_gives_failure_code() {
        let error = anyhow::anyhow!("No suitable GPU").context("Failed to initialize Vulkan");
        assert_eq!(exit_code(Some(&error), 3), 1);
    }

    #[test]
    fn clean_close_gives_success_code() {
        assert_eq!(exit_code(None, 120), 0);
    }
}
