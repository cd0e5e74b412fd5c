// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash, one module per stage of the bring-up.
// Handles are plain Vulkan handles; ownership lives in `RenderContext`.

pub mod buffer;
pub mod commands;
pub mod device;
pub mod loader;
pub mod pipeline;
pub mod pipeline_state;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use device::DeviceContext;
pub use loader::{ContextOptions, InstanceFunctions, Platform};
pub use pipeline_state::{PipelineDesc, PipelineState, SwapchainImage};
pub use swapchain::Swapchain;
