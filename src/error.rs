// Error types for every stage of the render context lifecycle
//
// Each native call site gets its own variant so a caller can log exactly
// which acquisition step failed. `code()` maps variants onto the stable
// negative integer codes used by C-style hosts.

use ash::vk;
use std::ffi::CStr;
use std::path::PathBuf;
use thiserror::Error;

/// Numeric error codes shared by all error enums.
pub mod code {
    pub const MEMORY: i32 = -1;
    pub const FILE: i32 = -2;
    pub const NULL: i32 = -3;
    pub const VULKAN_LOAD: i32 = -4;
    pub const VULKAN_INSTANCE: i32 = -5;
    pub const VULKAN_PREINST_LOAD: i32 = -6;
    pub const VULKAN_PHYSICAL_DEVICE: i32 = -8;
    pub const VULKAN_NO_DEVICES: i32 = -9;
    pub const VULKAN_INSTANCE_FUNC_LOAD: i32 = -10;
    pub const VULKAN_DEVICE_FUNC_LOAD: i32 = -11;
    pub const VULKAN_SURFACE: i32 = -12;
    pub const VULKAN_QUEUE_INDICES: i32 = -14;
    pub const VULKAN_QUEUE_INDEX_MISMATCH: i32 = -15;
    pub const VULKAN_CREATE_DEVICE: i32 = -16;
    pub const VULKAN_SURFACE_FORMAT: i32 = -17;
    pub const VULKAN_SURFACE_CAPABILITIES: i32 = -21;
    pub const VULKAN_SWAPCHAIN: i32 = -22;
    pub const VULKAN_SHADER_MODULE: i32 = -23;
    pub const VULKAN_SHADER_READ: i32 = -24;
    pub const VULKAN_PIPELINE_LAYOUT: i32 = -26;
    pub const VULKAN_CREATE_PIPELINE: i32 = -27;
    pub const VULKAN_RENDER_PASS: i32 = -28;
    pub const VULKAN_SWAPCHAIN_IMAGES: i32 = -29;
    pub const VULKAN_IMAGE_VIEW: i32 = -30;
    pub const VULKAN_FRAMEBUFFER: i32 = -31;
    pub const VULKAN_COMMAND_POOL: i32 = -32;
    pub const VULKAN_COMMAND_BUFFER: i32 = -33;
    pub const VULKAN_BUFFER: i32 = -34;
    pub const VULKAN_MEMORY: i32 = -35;
    pub const VULKAN_MEMORY_MAP: i32 = -36;
    pub const VULKAN_COMMAND_BUFFER_BEGIN: i32 = -37;
    pub const VULKAN_COMMAND_BUFFER_END: i32 = -38;
    pub const VULKAN_SEMAPHORE: i32 = -39;
    pub const VULKAN_ACQUIRE_IMAGE: i32 = -40;
    pub const VULKAN_QUEUE_SUBMIT: i32 = -41;
    pub const VULKAN_QUEUE_PRESENT: i32 = -42;
    pub const VULKAN_DEBUG_MESSENGER: i32 = -43;
    pub const UNSUPPORTED_PLATFORM: i32 = -44;
    pub const VULKAN_QUEUE_WAIT_IDLE: i32 = -45;
    pub const VULKAN_NO_QUEUE_FAMILY: i32 = -46;
    pub const LOAD_TOO_LARGE: i32 = -47;
}

/// Failures while bringing up the loader, instance and surface.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("failed to load the Vulkan library: {0}")]
    LibraryLoad(String),

    #[error("pre-instance entry point {symbol:?} is missing")]
    PreInstanceLoad { symbol: &'static CStr },

    #[error("vkCreateInstance failed: {0}")]
    Instance(vk::Result),

    #[error("instance entry point {symbol:?} is missing")]
    InstanceFunctionLoad { symbol: &'static CStr },

    #[error("failed to create debug messenger: {0}")]
    DebugMessenger(vk::Result),

    #[error("unsupported native window handle: {0}")]
    UnsupportedPlatform(&'static str),

    #[error("could not obtain native window handles: {0}")]
    WindowHandle(String),

    #[error("failed to create presentation surface: {0}")]
    Surface(vk::Result),

    #[error("vkEnumeratePhysicalDevices failed: {0}")]
    PhysicalDevices(vk::Result),

    #[error("no Vulkan physical devices found")]
    NoDevices,
}

impl InitError {
    pub fn code(&self) -> i32 {
        match self {
            Self::LibraryLoad(_) => code::VULKAN_LOAD,
            Self::PreInstanceLoad { .. } => code::VULKAN_PREINST_LOAD,
            Self::Instance(_) => code::VULKAN_INSTANCE,
            Self::InstanceFunctionLoad { .. } => code::VULKAN_INSTANCE_FUNC_LOAD,
            Self::DebugMessenger(_) => code::VULKAN_DEBUG_MESSENGER,
            Self::UnsupportedPlatform(_) => code::UNSUPPORTED_PLATFORM,
            Self::WindowHandle(_) => code::NULL,
            Self::Surface(_) => code::VULKAN_SURFACE,
            Self::PhysicalDevices(_) => code::VULKAN_PHYSICAL_DEVICE,
            Self::NoDevices => code::VULKAN_NO_DEVICES,
        }
    }
}

/// Failures reading a SPIR-V binary from disk.
#[derive(Error, Debug)]
pub enum ShaderError {
    #[error("failed to read shader {path:?}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("shader {path:?} is {len} bytes, not a whole number of 4-byte words")]
    Size { path: PathBuf, len: u64 },

    #[error("shader {path:?} does not start with the SPIR-V magic number")]
    Header { path: PathBuf },
}

/// Failures while building the device, swapchain and pipeline.
#[derive(Error, Debug)]
pub enum ConfigureError {
    #[error("render context is not initialized")]
    NotInitialized,

    #[error("failed to query queue family support: {0}")]
    QueueIndices(vk::Result),

    #[error("physical device exposes no queue families")]
    NoQueueFamilies,

    #[error("no queue family supports {0}")]
    NoQueueFamily(&'static str),

    #[error("graphics queue family {graphics} differs from present queue family {present}")]
    QueueIndexMismatch { graphics: u32, present: u32 },

    #[error("vkCreateDevice failed: {0}")]
    CreateDevice(vk::Result),

    #[error("device entry point {symbol:?} is missing")]
    DeviceFunctionLoad { symbol: &'static CStr },

    #[error("failed to query surface formats: {0}")]
    SurfaceFormat(vk::Result),

    #[error("surface reports no formats")]
    NoSurfaceFormats,

    #[error("failed to query surface capabilities: {0}")]
    SurfaceCapabilities(vk::Result),

    #[error("vkCreateSwapchainKHR failed: {0}")]
    Swapchain(vk::Result),

    #[error("vkGetSwapchainImagesKHR failed: {0}")]
    SwapchainImages(vk::Result),

    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error("vkCreateShaderModule failed: {0}")]
    ShaderModule(vk::Result),

    #[error("vkCreatePipelineLayout failed: {0}")]
    PipelineLayout(vk::Result),

    #[error("vkCreateRenderPass failed: {0}")]
    RenderPass(vk::Result),

    #[error("vkCreateGraphicsPipelines failed: {0}")]
    CreatePipeline(vk::Result),

    #[error("vkCreateImageView failed: {0}")]
    ImageView(vk::Result),

    #[error("vkCreateFramebuffer failed: {0}")]
    Framebuffer(vk::Result),

    #[error("vkCreateCommandPool failed: {0}")]
    CommandPool(vk::Result),

    #[error("vkAllocateCommandBuffers failed: {0}")]
    CommandBuffer(vk::Result),

    #[error("vkCreateBuffer failed: {0}")]
    Buffer(vk::Result),

    #[error("no host-visible memory type is usable for the buffer")]
    NoHostVisibleMemory,

    #[error("failed to allocate or bind buffer memory: {0}")]
    Memory(vk::Result),

    #[error("failed to write mapped buffer memory: {0}")]
    MemoryMap(vk::Result),

    #[error("vkBeginCommandBuffer failed: {0}")]
    CommandBufferBegin(vk::Result),

    #[error("vkEndCommandBuffer failed: {0}")]
    CommandBufferEnd(vk::Result),

    #[error("vkCreateSemaphore failed: {0}")]
    Semaphore(vk::Result),
}

impl ConfigureError {
    pub fn code(&self) -> i32 {
        match self {
            Self::NotInitialized => code::NULL,
            Self::QueueIndices(_) | Self::NoQueueFamilies => code::VULKAN_QUEUE_INDICES,
            Self::NoQueueFamily(_) => code::VULKAN_NO_QUEUE_FAMILY,
            Self::QueueIndexMismatch { .. } => code::VULKAN_QUEUE_INDEX_MISMATCH,
            Self::CreateDevice(_) => code::VULKAN_CREATE_DEVICE,
            Self::DeviceFunctionLoad { .. } => code::VULKAN_DEVICE_FUNC_LOAD,
            Self::SurfaceFormat(_) | Self::NoSurfaceFormats => code::VULKAN_SURFACE_FORMAT,
            Self::SurfaceCapabilities(_) => code::VULKAN_SURFACE_CAPABILITIES,
            Self::Swapchain(_) => code::VULKAN_SWAPCHAIN,
            Self::SwapchainImages(_) => code::VULKAN_SWAPCHAIN_IMAGES,
            Self::Shader(ShaderError::File { .. }) => code::FILE,
            Self::Shader(ShaderError::Size { .. } | ShaderError::Header { .. }) => {
                code::VULKAN_SHADER_READ
            }
            Self::ShaderModule(_) => code::VULKAN_SHADER_MODULE,
            Self::PipelineLayout(_) => code::VULKAN_PIPELINE_LAYOUT,
            Self::RenderPass(_) => code::VULKAN_RENDER_PASS,
            Self::CreatePipeline(_) => code::VULKAN_CREATE_PIPELINE,
            Self::ImageView(_) => code::VULKAN_IMAGE_VIEW,
            Self::Framebuffer(_) => code::VULKAN_FRAMEBUFFER,
            Self::CommandPool(_) => code::VULKAN_COMMAND_POOL,
            Self::CommandBuffer(_) => code::VULKAN_COMMAND_BUFFER,
            Self::Buffer(_) => code::VULKAN_BUFFER,
            Self::NoHostVisibleMemory | Self::Memory(_) => code::VULKAN_MEMORY,
            Self::MemoryMap(_) => code::VULKAN_MEMORY_MAP,
            Self::CommandBufferBegin(_) => code::VULKAN_COMMAND_BUFFER_BEGIN,
            Self::CommandBufferEnd(_) => code::VULKAN_COMMAND_BUFFER_END,
            Self::Semaphore(_) => code::VULKAN_SEMAPHORE,
        }
    }
}

/// Failures inside a single `update` call.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("render context has no pipeline")]
    NotConfigured,

    #[error("vkAcquireNextImageKHR failed: {0}")]
    AcquireImage(vk::Result),

    #[error("vkQueueSubmit failed: {0}")]
    QueueSubmit(vk::Result),

    #[error("vkQueuePresentKHR failed: {0}")]
    QueuePresent(vk::Result),

    #[error("vkQueueWaitIdle failed: {0}")]
    QueueWaitIdle(vk::Result),
}

impl FrameError {
    pub fn code(&self) -> i32 {
        match self {
            Self::NotConfigured => code::NULL,
            Self::AcquireImage(_) => code::VULKAN_ACQUIRE_IMAGE,
            Self::QueueSubmit(_) => code::VULKAN_QUEUE_SUBMIT,
            Self::QueuePresent(_) => code::VULKAN_QUEUE_PRESENT,
            Self::QueueWaitIdle(_) => code::VULKAN_QUEUE_WAIT_IDLE,
        }
    }
}

/// Failures uploading or reading back geometry.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("render context has no pipeline")]
    NotConfigured,

    #[error("{len} bytes do not fit the {capacity}-byte vertex allocation")]
    TooLarge { len: usize, capacity: u64 },

    #[error("failed to access mapped buffer memory: {0}")]
    MemoryMap(vk::Result),
}

impl LoadError {
    pub fn code(&self) -> i32 {
        match self {
            Self::NotConfigured => code::NULL,
            Self::TooLarge { .. } => code::LOAD_TOO_LARGE,
            Self::MemoryMap(_) => code::VULKAN_MEMORY_MAP,
        }
    }
}
