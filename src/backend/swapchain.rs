// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Double buffered, FIFO (vsync), sized to whatever the surface reports.

use ash::vk;

use super::device::DeviceContext;
use super::loader::InstanceFunctions;
use crate::error::ConfigureError;
use crate::guard::Guard;

/// Images requested from the presentation engine. `choose_image_count` moves
/// it into the surface's supported range, since a count outside it is invalid.
pub const MIN_IMAGE_COUNT: u32 = 2;

/// First format the surface reports. No preference is applied.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Result<vk::SurfaceFormatKHR, ConfigureError> {
    formats.first().copied().ok_or(ConfigureError::NoSurfaceFormats)
}

/// The surface's current extent, or the requested size when the surface
/// leaves the choice to the swapchain (`u32::MAX` sentinel).
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// Double buffering, raised to the surface minimum and capped at its maximum.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = MIN_IMAGE_COUNT.max(caps.min_image_count);
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

/// Swapchain settings derived from the surface.
///
/// Transform, composite alpha and usage flags are taken from the capabilities
/// as reported.
pub fn create_info(
    surface: vk::SurfaceKHR,
    format: vk::SurfaceFormatKHR,
    caps: &vk::SurfaceCapabilitiesKHR,
    extent: vk::Extent2D,
) -> vk::SwapchainCreateInfoKHR {
    vk::SwapchainCreateInfoKHR::builder()
        .surface(surface)
        .min_image_count(choose_image_count(caps))
        .image_format(format.format)
        .image_color_space(format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(caps.supported_usage_flags)
        .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        .pre_transform(caps.current_transform)
        .composite_alpha(caps.supported_composite_alpha)
        .present_mode(vk::PresentModeKHR::FIFO)
        .clipped(true)
        .build()
}

pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
}

impl Swapchain {
    pub fn new(
        fns: &InstanceFunctions,
        device: &DeviceContext,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> Result<Self, ConfigureError> {
        let physical_device = device.physical_device;

        let formats = unsafe {
            fns.surface
                .get_physical_device_surface_formats(physical_device, surface)
        }
        .map_err(ConfigureError::SurfaceFormat)?;
        let format = choose_surface_format(&formats)?;

        let caps = unsafe {
            fns.surface
                .get_physical_device_surface_capabilities(physical_device, surface)
        }
        .map_err(ConfigureError::SurfaceCapabilities)?;

        let extent = choose_extent(&caps, width, height);
        log::info!(
            "Creating swapchain: {}x{} {:?}",
            extent.width,
            extent.height,
            format.format
        );

        let swapchain_info = create_info(surface, format, &caps, extent);
        let handle = unsafe { device.swapchain_fns.create_swapchain(&swapchain_info, None) }
            .map_err(ConfigureError::Swapchain)?;
        let handle = Guard::new(handle, |handle| unsafe {
            device.swapchain_fns.destroy_swapchain(handle, None)
        });

        let images = unsafe { device.swapchain_fns.get_swapchain_images(*handle) }
            .map_err(ConfigureError::SwapchainImages)?;

        log::info!("Created swapchain with {} images", images.len());

        Ok(Self {
            handle: Guard::into_inner(handle),
            format,
            extent,
            images,
        })
    }

    /// Acquire next image for rendering
    ///
    /// A suboptimal swapchain still yields a usable image.
    pub fn acquire_next_image(
        &self,
        device: &DeviceContext,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> Result<u32, vk::Result> {
        let (index, suboptimal) = unsafe {
            device.swapchain_fns.acquire_next_image(
                self.handle,
                timeout,
                semaphore,
                vk::Fence::null(),
            )
        }?;

        if suboptimal {
            log::warn!("Acquired image {} from a suboptimal swapchain", index);
        }
        Ok(index)
    }

    /// Present rendered image to screen
    pub fn present(
        &self,
        device: &DeviceContext,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<(), vk::Result> {
        let swapchains = [self.handle];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let suboptimal = unsafe {
            device
                .swapchain_fns
                .queue_present(device.present_queue, &present_info)
        }?;

        if suboptimal {
            log::warn!("Presented image {} to a suboptimal swapchain", image_index);
        }
        Ok(())
    }

    pub fn destroy(&self, device: &DeviceContext) {
        unsafe { device.swapchain_fns.destroy_swapchain(self.handle, None) };
    }
}

/// 2D color view over a swapchain image.
pub fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView, ConfigureError> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.create_image_view(&create_info, None) }.map_err(ConfigureError::ImageView)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: vk::Extent2D) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 1,
            max_image_count: 8,
            current_extent: current,
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
            max_image_array_layers: 1,
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_DST,
        }
    }

    #[test]
    fn first_reported_format_is_used() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(choose_surface_format(&formats).unwrap(), formats[0]);
        assert!(matches!(
            choose_surface_format(&[]),
            Err(ConfigureError::NoSurfaceFormats)
        ));
    }

    #[test]
    fn extent_follows_surface() {
        let surface = caps(vk::Extent2D { width: 1280, height: 720 });
        let extent = choose_extent(&surface, 640, 480);
        assert_eq!((extent.width, extent.height), (1280, 720));
    }

    #[test]
    fn extent_falls_back_to_requested_size() {
        let surface = caps(vk::Extent2D { width: u32::MAX, height: u32::MAX });
        let extent = choose_extent(&surface, 640, 480);
        assert_eq!((extent.width, extent.height), (640, 480));

        let extent = choose_extent(&surface, 10_000, 0);
        assert_eq!((extent.width, extent.height), (4096, 1));
    }

    #[test]
    fn image_count_is_two_within_limits() {
        let mut surface = caps(vk::Extent2D { width: 800, height: 600 });
        assert_eq!(choose_image_count(&surface), 2);

        surface.min_image_count = 3;
        assert_eq!(choose_image_count(&surface), 3);

        surface.min_image_count = 1;
        surface.max_image_count = 1;
        assert_eq!(choose_image_count(&surface), 1);

        surface.max_image_count = 0;
        assert_eq!(choose_image_count(&surface), 2);
    }

    #[test]
    fn create_info_copies_surface_capabilities() {
        let surface = caps(vk::Extent2D { width: 800, height: 600 });
        let format = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let info = create_info(vk::SurfaceKHR::null(), format, &surface, surface.current_extent);

        assert_eq!(info.min_image_count, 2);
        assert_eq!(info.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(info.image_usage, surface.supported_usage_flags);
        assert_eq!(info.pre_transform, surface.current_transform);
        assert_eq!(info.composite_alpha, surface.supported_composite_alpha);
        assert_eq!(info.image_sharing_mode, vk::SharingMode::EXCLUSIVE);
        assert_eq!(info.clipped, vk::TRUE);
        assert_eq!(info.image_extent.width, 800);
    }
}
