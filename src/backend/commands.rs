// Command pool, command buffers and the static draw recording
//
// Each swapchain image gets one primary command buffer recorded once at
// configure time and resubmitted every frame.

use ash::vk;

use crate::error::ConfigureError;

/// Clear color for the single color attachment.
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

pub fn create_command_pool(
    device: &ash::Device,
    queue_family_index: u32,
) -> Result<vk::CommandPool, ConfigureError> {
    let pool_info = vk::CommandPoolCreateInfo::builder().queue_family_index(queue_family_index);

    unsafe { device.create_command_pool(&pool_info, None) }.map_err(ConfigureError::CommandPool)
}

pub fn allocate_command_buffers(
    device: &ash::Device,
    pool: vk::CommandPool,
    count: u32,
) -> Result<Vec<vk::CommandBuffer>, ConfigureError> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(count);

    unsafe { device.allocate_command_buffers(&alloc_info) }.map_err(ConfigureError::CommandBuffer)
}

/// Everything a draw recording needs, shared by all images.
#[derive(Debug, Clone, Copy)]
pub struct DrawParams {
    pub render_pass: vk::RenderPass,
    pub pipeline: vk::Pipeline,
    pub extent: vk::Extent2D,
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
}

/// Record clear + indexed draw into `command_buffer` targeting `framebuffer`.
pub fn record_draw(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    framebuffer: vk::Framebuffer,
    params: &DrawParams,
) -> Result<(), ConfigureError> {
    let begin_info = vk::CommandBufferBeginInfo::builder()
        .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);

    unsafe { device.begin_command_buffer(command_buffer, &begin_info) }
        .map_err(ConfigureError::CommandBufferBegin)?;

    let clear_values = [vk::ClearValue {
        color: vk::ClearColorValue {
            float32: CLEAR_COLOR,
        },
    }];

    let render_pass_info = vk::RenderPassBeginInfo::builder()
        .render_pass(params.render_pass)
        .framebuffer(framebuffer)
        .render_area(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: params.extent,
        })
        .clear_values(&clear_values);

    unsafe {
        device.cmd_begin_render_pass(command_buffer, &render_pass_info, vk::SubpassContents::INLINE);
        device.cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, params.pipeline);
        device.cmd_bind_vertex_buffers(command_buffer, 0, &[params.vertex_buffer], &[0]);
        device.cmd_bind_index_buffer(command_buffer, params.index_buffer, 0, vk::IndexType::UINT16);
        device.cmd_draw_indexed(command_buffer, params.index_count, 1, 0, 0, 0);
        device.cmd_end_render_pass(command_buffer);
    }

    unsafe { device.end_command_buffer(command_buffer) }.map_err(ConfigureError::CommandBufferEnd)
}
