//! Vulkan render context with a staged bring-up.
//!
//! [`RenderContext`] walks the object chain instance → surface → device →
//! swapchain → pipeline → per-image resources → semaphores, and tears it down
//! in reverse. The host supplies a window through `raw-window-handle`; the
//! context draws a fixed colored quad and presents one frame per `update`.
//!
//! ```no_run
//! # fn run(window: &winit::window::Window) -> anyhow::Result<()> {
//! use quad_renderer::{ContextOptions, RenderContext};
//!
//! let mut context = RenderContext::new();
//! context.init(window, &ContextOptions::default())?;
//! context.configure(1280, 720, "shaders/quad.vert.spv", "shaders/quad.frag.spv")?;
//! context.update()?;
//! context.deinit();
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod geometry;
pub mod guard;
pub mod watch;

pub use backend::ContextOptions;
pub use context::{ContextState, GeometryBytes, RenderContext};
pub use error::{ConfigureError, FrameError, InitError, LoadError, ShaderError};
