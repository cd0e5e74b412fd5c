// Pipeline generation - everything built by one `configure` call
//
// Swapchain, render pass, pipeline, per-image views/framebuffers/command
// buffers, quad buffers and semaphores. Built in dependency order, torn down
// in reverse. A failure part-way releases whatever was already created.

use ash::vk;
use std::path::Path;

use super::buffer::HostBuffer;
use super::commands::{self, DrawParams};
use super::device::DeviceContext;
use super::loader::InstanceFunctions;
use super::pipeline;
use super::shader;
use super::swapchain::{self, Swapchain};
use super::sync::FrameSync;
use crate::error::ConfigureError;
use crate::geometry::{self, QUAD_INDICES};
use crate::guard::Guard;

/// Handles owned per swapchain image.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwapchainImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub framebuffer: vk::Framebuffer,
    pub command_buffer: vk::CommandBuffer,
}

/// Inputs for one pipeline generation.
#[derive(Debug, Clone, Copy)]
pub struct PipelineDesc<'a> {
    pub width: u32,
    pub height: u32,
    pub vertex_shader: &'a Path,
    pub fragment_shader: &'a Path,
}

pub struct PipelineState {
    pub swapchain: Swapchain,
    pub images: Vec<SwapchainImage>,
    pub render_pass: vk::RenderPass,
    pub pipeline: vk::Pipeline,
    pub vertex_shader: vk::ShaderModule,
    pub fragment_shader: vk::ShaderModule,
    pub command_pool: vk::CommandPool,
    pub vertex_buffer: Option<HostBuffer>,
    pub index_buffer: Option<HostBuffer>,
    pub sync: Option<FrameSync>,
}

impl PipelineState {
    pub fn build(
        fns: &InstanceFunctions,
        device: &DeviceContext,
        surface: vk::SurfaceKHR,
        desc: &PipelineDesc<'_>,
    ) -> Result<Self, ConfigureError> {
        // Step 1: Swapchain (format, capabilities, images)
        let swapchain = Swapchain::new(fns, device, surface, desc.width, desc.height)?;
        let extent = swapchain.extent;
        if extent.width != desc.width || extent.height != desc.height {
            log::warn!(
                "Requested {}x{} but the surface dictates {}x{}",
                desc.width,
                desc.height,
                extent.width,
                extent.height
            );
        }

        let images = swapchain
            .images
            .iter()
            .map(|&image| SwapchainImage {
                image,
                ..Default::default()
            })
            .collect();

        // Null handles are skipped by `destroy`, so a half-built state can be
        // released at any point below.
        let mut state = Guard::new(
            Self {
                swapchain,
                images,
                render_pass: vk::RenderPass::null(),
                pipeline: vk::Pipeline::null(),
                vertex_shader: vk::ShaderModule::null(),
                fragment_shader: vk::ShaderModule::null(),
                command_pool: vk::CommandPool::null(),
                vertex_buffer: None,
                index_buffer: None,
                sync: None,
            },
            |state| state.destroy(device),
        );

        let ash_device = &device.device;
        let format = state.swapchain.format.format;

        // Step 2: Shaders
        state.vertex_shader = shader::load_shader_module(ash_device, desc.vertex_shader)?;
        state.fragment_shader = shader::load_shader_module(ash_device, desc.fragment_shader)?;

        // Step 3: Render pass + pipeline
        state.render_pass = pipeline::create_render_pass(ash_device, format)?;
        state.pipeline = pipeline::create_graphics_pipeline(
            ash_device,
            state.render_pass,
            extent,
            state.vertex_shader,
            state.fragment_shader,
        )?;

        // Step 4: Image views + framebuffers
        let render_pass = state.render_pass;
        for record in state.images.iter_mut() {
            record.view = swapchain::create_image_view(ash_device, record.image, format)?;
            record.framebuffer =
                pipeline::create_framebuffer(ash_device, record.view, render_pass, extent)?;
        }

        // Step 5: Command pool + one buffer per image
        state.command_pool = commands::create_command_pool(ash_device, device.graphics_family)?;
        let command_buffers = commands::allocate_command_buffers(
            ash_device,
            state.command_pool,
            state.images.len() as u32,
        )?;
        for (record, command_buffer) in state.images.iter_mut().zip(command_buffers) {
            record.command_buffer = command_buffer;
        }

        // Step 6: Quad geometry
        let vertex_bytes = geometry::quad_vertex_bytes();
        let index_bytes = geometry::quad_index_bytes();
        let vertex_buffer = HostBuffer::new(
            ash_device,
            &device.memory_properties,
            vertex_bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        state.vertex_buffer = Some(vertex_buffer);
        let index_buffer = HostBuffer::new(
            ash_device,
            &device.memory_properties,
            index_bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::INDEX_BUFFER,
        )?;
        state.index_buffer = Some(index_buffer);

        vertex_buffer
            .write(ash_device, vertex_bytes)
            .map_err(ConfigureError::MemoryMap)?;
        index_buffer
            .write(ash_device, index_bytes)
            .map_err(ConfigureError::MemoryMap)?;

        // Step 7: Static command recording
        let params = DrawParams {
            render_pass,
            pipeline: state.pipeline,
            extent,
            vertex_buffer: vertex_buffer.buffer,
            index_buffer: index_buffer.buffer,
            index_count: QUAD_INDICES.len() as u32,
        };
        for record in state.images.iter() {
            commands::record_draw(ash_device, record.command_buffer, record.framebuffer, &params)?;
        }

        // Step 8: Semaphores
        state.sync = Some(FrameSync::new(ash_device)?);

        log::info!(
            "Pipeline ready: {}x{}, {} swapchain images",
            extent.width,
            extent.height,
            state.images.len()
        );
        Ok(Guard::into_inner(state))
    }

    /// Release every handle, in reverse creation order.
    ///
    /// The GPU must be idle with respect to this generation.
    pub fn destroy(self, device: &DeviceContext) {
        let d = &device.device;
        unsafe {
            if let Some(sync) = &self.sync {
                sync.destroy(d);
            }
            for buffer in [self.vertex_buffer, self.index_buffer].into_iter().flatten() {
                buffer.destroy(d);
            }

            let command_buffers: Vec<vk::CommandBuffer> = self
                .images
                .iter()
                .map(|record| record.command_buffer)
                .filter(|&cb| cb != vk::CommandBuffer::null())
                .collect();
            if !command_buffers.is_empty() {
                d.free_command_buffers(self.command_pool, &command_buffers);
            }
            d.destroy_command_pool(self.command_pool, None);

            for record in &self.images {
                d.destroy_framebuffer(record.framebuffer, None);
                d.destroy_image_view(record.view, None);
            }

            d.destroy_shader_module(self.vertex_shader, None);
            d.destroy_shader_module(self.fragment_shader, None);
            d.destroy_pipeline(self.pipeline, None);
            d.destroy_render_pass(self.render_pass, None);
        }
        self.swapchain.destroy(device);
    }

    pub fn image(&self, index: u32) -> Option<&SwapchainImage> {
        self.images.get(index as usize)
    }
}
