// =============================================================================
// QUAD RENDERER - demo host
// =============================================================================
//
// Opens a window, hands its native handles to the render context and presents
// the quad every redraw.
//
// FRAME FLOW (inside RenderContext::update):
// 1. Acquire swapchain image
// 2. Submit the pre-recorded command buffer for that image
// 3. Present
// 4. Wait for the present queue to go idle
//
// Resizes and shader edits rebuild the pipeline through `configure`; the
// device, surface and instance stay alive.
//
// =============================================================================

use anyhow::{Context, Result};
use ash::vk;
use quad_renderer::config::Config;
use quad_renderer::watch::{is_recoverable, shaders_ready, ShaderWatcher};
use quad_renderer::{ConfigureError, ContextState, FrameError, RenderContext};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting quad renderer");
    log::info!(
        "Window: {}x{}, shaders {:?} + {:?}",
        config.window.width,
        config.window.height,
        config.shaders.vertex,
        config.shaders.fragment
    );

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

fn init_logging(config: &Config) {
    use env_logger::Builder;

    let mut builder = Builder::from_default_env();
    builder.filter_level(config.log_level());
    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

struct App {
    config: Config,

    // Declared before `window`; `Drop for App` deinits it first regardless.
    context: RenderContext,
    window: Option<Arc<Window>>,
    watcher: Option<ShaderWatcher>,

    /// Set on resize or shader change - rebuilds the pipeline before the next frame
    needs_reconfigure: bool,
    /// Window has zero area - skip rendering
    is_minimized: bool,

    frames_presented: u64,
    frame_count: u32,
    last_fps_update: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            context: RenderContext::new(),
            window: None,
            watcher: None,
            needs_reconfigure: false,
            is_minimized: false,
            frames_presented: 0,
            frame_count: 0,
            last_fps_update: Instant::now(),
        }
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    fn init_renderer(&mut self, window: &Window) -> Result<()> {
        log::info!("Initializing Vulkan...");

        self.context
            .init(window, &self.config.context_options())
            .context("Failed to initialize render context")?;

        self.configure(window).with_context(|| {
            format!(
                "Failed to configure pipeline with {:?} and {:?}",
                self.config.shaders.vertex, self.config.shaders.fragment
            )
        })?;

        if self.config.reload.watch_shaders {
            let watcher = ShaderWatcher::new(&self.shader_paths());
            match watcher {
                Ok(watcher) => self.watcher = Some(watcher),
                Err(e) => log::warn!("Shader hot reload disabled: {}", e),
            }
        }

        log::info!("Vulkan initialized successfully!");
        Ok(())
    }

    fn configure(&mut self, window: &Window) -> Result<(), ConfigureError> {
        let size = window.inner_size();
        self.context.configure(
            size.width,
            size.height,
            &self.config.shaders.vertex,
            &self.config.shaders.fragment,
        )?;
        self.needs_reconfigure = false;
        Ok(())
    }

    fn shader_paths(&self) -> [&PathBuf; 2] {
        [&self.config.shaders.vertex, &self.config.shaders.fragment]
    }

    // =========================================================================
    // FRAME
    // =========================================================================

    /// Returns whether a frame was presented.
    fn render_frame(&mut self) -> Result<bool> {
        if self.is_minimized {
            return Ok(false);
        }

        if self.watcher.as_ref().is_some_and(|w| w.poll_changed()) {
            // The compiler may still be writing; the next event retries.
            let ready = shaders_ready(&self.shader_paths());
            match ready {
                Ok(()) => {
                    log::info!("Shader change detected, rebuilding pipeline");
                    self.needs_reconfigure = true;
                }
                Err(e) => log::debug!("Ignoring incomplete shader write: {}", e),
            }
        }

        if self.needs_reconfigure {
            let window = self.window.clone().context("Window not created")?;
            match self.configure(&window) {
                Ok(()) => {}
                Err(e) if self.watcher.is_some() && is_recoverable(&e) => {
                    log::warn!(
                        "Pipeline rebuild failed, waiting for the next shader change: {}",
                        e
                    );
                    self.needs_reconfigure = false;
                }
                Err(e) => {
                    let code = e.code();
                    return Err(e).context(format!("Failed to configure pipeline (code {})", code));
                }
            }
        }

        if self.context.state() != ContextState::Pipelined {
            return Ok(false);
        }

        match self.context.update() {
            Ok(()) => {}
            // The surface changed under us; rebuild and try again next redraw.
            Err(FrameError::AcquireImage(vk::Result::ERROR_OUT_OF_DATE_KHR))
            | Err(FrameError::QueuePresent(vk::Result::ERROR_OUT_OF_DATE_KHR)) => {
                log::info!("Swapchain out of date");
                self.needs_reconfigure = true;
                return Ok(false);
            }
            Err(e) => {
                let code = e.code();
                return Err(e).context(format!("Frame failed (code {})", code));
            }
        }

        self.frames_presented += 1;
        Ok(true)
    }

    fn update_fps(&mut self) {
        self.frame_count += 1;
        let elapsed = self.last_fps_update.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f64 / elapsed;
            log::debug!("FPS: {:.0} ({:.2} ms/frame)", fps, 1000.0 / fps);
            if let Some(window) = &self.window {
                window.set_title(&format!("{} - {:.0} FPS", self.config.window.title, fps));
            }
            self.frame_count = 0;
            self.last_fps_update = Instant::now();
        }
    }

    fn frame_limit_reached(&self) -> bool {
        self.config.debug.max_frames > 0 && self.frames_presented >= self.config.debug.max_frames
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
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
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.init_renderer(&window) {
            log::error!("{:?}", e);
            self.context.deinit();
            event_loop.exit();
            return;
        }

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
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if size.width == 0 || size.height == 0 {
                    self.is_minimized = true;
                } else {
                    self.is_minimized = false;
                    self.needs_reconfigure = true;
                }
            }

            WindowEvent::RedrawRequested => match self.render_frame() {
                Ok(true) => {
                    self.update_fps();
                    if self.frame_limit_reached() {
                        log::info!("Presented {} frames, exiting", self.frames_presented);
                        event_loop.exit();
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    log::error!("Render error: {:?}", e);
                    event_loop.exit();
                }
            },

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    log::info!("ESC pressed, exiting...");
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");
        // The surface references the window, so the context goes first.
        self.context.deinit();
        log::info!("Cleanup complete");
    }
}
