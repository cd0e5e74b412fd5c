// Render context - lifecycle of the whole Vulkan object chain
//
// instance -> surface -> device -> swapchain -> pipeline -> per-image
// resources -> semaphores. `init` builds the first two links, `configure`
// the rest, `destroy_pipeline` and `deinit` unwind them in reverse.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::path::Path;

use crate::backend::device::{describe_physical_device, DeviceContext};
use crate::backend::{ContextOptions, InstanceFunctions, PipelineDesc, PipelineState, Platform};
use crate::error::{ConfigureError, FrameError, InitError, LoadError};
use crate::guard::Guard;

/// Image acquire timeout: 2 seconds.
pub const ACQUIRE_TIMEOUT_NS: u64 = 2_000_000_000;

/// Lifecycle stage of a [`RenderContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Nothing loaded. The state after `new` and after `deinit`.
    Unconfigured,
    /// Instance and surface exist; no swapchain or pipeline.
    Initialized,
    /// Ready for `update`.
    Pipelined,
}

/// Bytes currently held by the quad's vertex and index allocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryBytes {
    pub vertices: Vec<u8>,
    pub indices: Vec<u8>,
}

/// Instance-level state created by `init`.
struct Core {
    fns: InstanceFunctions,
    surface: vk::SurfaceKHR,
    physical_devices: Vec<vk::PhysicalDevice>,
    physical_device_index: usize,
}

impl Core {
    fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_devices[self.physical_device_index]
    }
}

/// Owner of every Vulkan object the renderer creates.
///
/// The logical device is created by the first `configure` and survives
/// reconfiguration; only `deinit` destroys it.
///
/// The window passed to `init` must outlive the context, or `deinit` must be
/// called before the window goes away.
#[derive(Default)]
pub struct RenderContext {
    pipeline: Option<PipelineState>,
    device: Option<DeviceContext>,
    core: Option<Core>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ContextState {
        match (&self.core, &self.pipeline) {
            (None, _) => ContextState::Unconfigured,
            (Some(_), None) => ContextState::Initialized,
            (Some(_), Some(_)) => ContextState::Pipelined,
        }
    }

    /// Extent negotiated with the surface by the last `configure`.
    pub fn swapchain_extent(&self) -> Option<vk::Extent2D> {
        self.pipeline.as_ref().map(|state| state.swapchain.extent)
    }

    /// Number of swapchain images (driver-determined, at least 2 requested).
    pub fn image_count(&self) -> usize {
        self.pipeline.as_ref().map_or(0, |state| state.images.len())
    }

    /// Load Vulkan, create the instance and a surface for `target`, and
    /// enumerate physical devices.
    ///
    /// Any previous state is torn down first. On failure nothing acquired by
    /// this call stays alive.
    pub fn init<W>(&mut self, target: &W, options: &ContextOptions) -> Result<(), InitError>
    where
        W: HasDisplayHandle + HasWindowHandle + ?Sized,
    {
        self.deinit();

        let display = target
            .display_handle()
            .map_err(|e| InitError::WindowHandle(e.to_string()))?
            .as_raw();
        let window = target
            .window_handle()
            .map_err(|e| InitError::WindowHandle(e.to_string()))?
            .as_raw();

        let platform = Platform::detect(display, window)?;

        // Dropping `fns` on any later error destroys the instance.
        let fns = InstanceFunctions::load(options, platform)?;

        let surface = fns.create_surface(display, window)?;
        let physical_devices = {
            let surface = Guard::new(surface, |surface| unsafe {
                fns.surface.destroy_surface(surface, None)
            });

            let devices = unsafe { fns.instance.enumerate_physical_devices() }
                .map_err(InitError::PhysicalDevices)?;
            if devices.is_empty() {
                return Err(InitError::NoDevices);
            }

            Guard::into_inner(surface);
            devices
        };

        log::info!("Found {} physical device(s)", physical_devices.len());
        let core = Core {
            fns,
            surface,
            physical_devices,
            physical_device_index: 0,
        };
        log::info!(
            "Selected GPU: {}",
            describe_physical_device(&core.fns.instance, core.physical_device())
        );

        self.core = Some(core);
        Ok(())
    }

    /// Tear everything down. Safe in every state, including twice in a row.
    pub fn deinit(&mut self) {
        self.destroy_pipeline();

        // DeviceContext waits for idle before destroying itself.
        self.device = None;

        if let Some(core) = self.core.take() {
            unsafe { core.fns.surface.destroy_surface(core.surface, None) };
            drop(core);
            log::info!("Render context destroyed");
        }
    }

    /// Build (or rebuild) the swapchain and pipeline.
    ///
    /// An existing pipeline is destroyed first. The surface decides the final
    /// extent; `width`/`height` only apply when it leaves the choice open.
    pub fn configure(
        &mut self,
        width: u32,
        height: u32,
        vertex_shader: impl AsRef<Path>,
        fragment_shader: impl AsRef<Path>,
    ) -> Result<(), ConfigureError> {
        self.destroy_pipeline();

        let core = self.core.as_ref().ok_or(ConfigureError::NotInitialized)?;

        if self.device.is_none() {
            let device = DeviceContext::create(&core.fns, core.surface, core.physical_device())?;
            self.device = Some(device);
        }
        let device = self.device.as_ref().ok_or(ConfigureError::NotInitialized)?;

        let desc = PipelineDesc {
            width,
            height,
            vertex_shader: vertex_shader.as_ref(),
            fragment_shader: fragment_shader.as_ref(),
        };
        let state = PipelineState::build(&core.fns, device, core.surface, &desc)?;
        self.pipeline = Some(state);
        Ok(())
    }

    /// Destroy the current pipeline generation, keeping device and surface.
    pub fn destroy_pipeline(&mut self) {
        let Some(state) = self.pipeline.take() else {
            return;
        };
        // A pipeline never exists without its device.
        if let Some(device) = &self.device {
            if let Err(e) = device.wait_idle() {
                log::warn!("vkDeviceWaitIdle failed before pipeline teardown: {}", e);
            }
            state.destroy(device);
            log::info!("Pipeline destroyed");
        }
    }

    /// Render and present one frame, returning once the present queue is idle.
    ///
    /// A suboptimal swapchain from acquire or present still counts as a
    /// presented frame and is only logged. `ERROR_OUT_OF_DATE_KHR` comes back
    /// as an error; call `configure` again to recover.
    pub fn update(&mut self) -> Result<(), FrameError> {
        let (Some(device), Some(state)) = (&self.device, &self.pipeline) else {
            return Err(FrameError::NotConfigured);
        };
        let sync = state.sync.as_ref().ok_or(FrameError::NotConfigured)?;

        // Step 1: Acquire
        let image_index = state
            .swapchain
            .acquire_next_image(device, ACQUIRE_TIMEOUT_NS, sync.image_acquired)
            .map_err(FrameError::AcquireImage)?;
        let record = state
            .image(image_index)
            .ok_or(FrameError::AcquireImage(vk::Result::ERROR_UNKNOWN))?;

        // Step 2: Submit the prerecorded commands for that image
        let wait_semaphores = [sync.image_acquired];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [record.command_buffer];
        let signal_semaphores = [sync.render_finished];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            device
                .device
                .queue_submit(device.graphics_queue, &[submit_info], vk::Fence::null())
        }
        .map_err(FrameError::QueueSubmit)?;

        // Step 3: Present
        state
            .swapchain
            .present(device, image_index, &signal_semaphores)
            .map_err(FrameError::QueuePresent)?;

        // Step 4: One frame in flight
        unsafe { device.device.queue_wait_idle(device.present_queue) }
            .map_err(FrameError::QueueWaitIdle)
    }

    /// Overwrite the start of the vertex allocation with `data`.
    pub fn load(&mut self, data: &[u8]) -> Result<(), LoadError> {
        let (Some(device), Some(state)) = (&self.device, &self.pipeline) else {
            return Err(LoadError::NotConfigured);
        };
        let buffer = state.vertex_buffer.as_ref().ok_or(LoadError::NotConfigured)?;

        if data.len() as vk::DeviceSize > buffer.allocation_size {
            return Err(LoadError::TooLarge {
                len: data.len(),
                capacity: buffer.allocation_size,
            });
        }

        buffer.write(&device.device, data).map_err(LoadError::MemoryMap)
    }

    /// Map the vertex and index allocations again and copy them out.
    pub fn read_geometry(&self) -> Result<GeometryBytes, LoadError> {
        let (Some(device), Some(state)) = (&self.device, &self.pipeline) else {
            return Err(LoadError::NotConfigured);
        };
        let (Some(vertex_buffer), Some(index_buffer)) = (&state.vertex_buffer, &state.index_buffer)
        else {
            return Err(LoadError::NotConfigured);
        };

        Ok(GeometryBytes {
            vertices: vertex_buffer
                .read(&device.device)
                .map_err(LoadError::MemoryMap)?,
            indices: index_buffer
                .read(&device.device)
                .map_err(LoadError::MemoryMap)?,
        })
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        self.deinit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::code;

    #[test]
    fn new_context_is_unconfigured() {
        let context = RenderContext::new();
        assert_eq!(context.state(), ContextState::Unconfigured);
        assert_eq!(context.image_count(), 0);
        assert!(context.swapchain_extent().is_none());
    }

    #[test]
    fn configure_requires_init() {
        let mut context = RenderContext::new();
        let err = context
            .configure(800, 600, "quad.vert.spv", "quad.frag.spv")
            .unwrap_err();
        assert!(matches!(err, ConfigureError::NotInitialized));
        assert_eq!(err.code(), code::NULL);
        assert_eq!(context.state(), ContextState::Unconfigured);
    }

    #[test]
    fn update_and_load_require_a_pipeline() {
        let mut context = RenderContext::new();
        assert!(matches!(context.update(), Err(FrameError::NotConfigured)));
        assert!(matches!(context.load(&[0; 4]), Err(LoadError::NotConfigured)));
        assert!(matches!(context.read_geometry(), Err(LoadError::NotConfigured)));
    }

    #[test]
    fn teardown_is_idempotent_without_init() {
        let mut context = RenderContext::new();
        context.destroy_pipeline();
        context.destroy_pipeline();
        context.deinit();
        context.deinit();
        assert_eq!(context.state(), ContextState::Unconfigured);
    }
}
