// Vulkan Device - queue family negotiation and logical device
//
// Responsibilities:
// - Queue family selection (graphics + present, must be the same family)
// - Logical device + queue creation
// - Device-level entry point validation

use ash::extensions::khr;
use ash::vk;
use std::ffi::CStr;

use super::loader::InstanceFunctions;
use crate::error::ConfigureError;

/// Queue family indices picked for graphics work and presentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilySelection {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilySelection {
    /// The one family used for both graphics and present.
    ///
    /// Separate graphics and present families are not supported.
    pub fn unified(&self) -> Result<u32, ConfigureError> {
        let graphics = self.graphics.ok_or(ConfigureError::NoQueueFamily("graphics"))?;
        let present = self.present.ok_or(ConfigureError::NoQueueFamily("present"))?;
        if graphics != present {
            return Err(ConfigureError::QueueIndexMismatch { graphics, present });
        }
        Ok(graphics)
    }
}

/// Scan every queue family for graphics and present support.
///
/// The last family satisfying each predicate wins: every match overwrites the
/// stored index, so later-enumerated families are preferred over earlier ones.
pub fn select_queue_families<P>(
    families: &[vk::QueueFamilyProperties],
    mut present_support: P,
) -> Result<QueueFamilySelection, ConfigureError>
where
    P: FnMut(u32) -> Result<bool, vk::Result>,
{
    if families.is_empty() {
        return Err(ConfigureError::NoQueueFamilies);
    }

    let mut selection = QueueFamilySelection::default();
    for (index, family) in families.iter().enumerate() {
        let index = index as u32;
        let has_queues = family.queue_count > 0;

        if has_queues && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            selection.graphics = Some(index);
        }

        let can_present = present_support(index).map_err(ConfigureError::QueueIndices)?;
        if has_queues && can_present {
            selection.present = Some(index);
        }
    }

    Ok(selection)
}

/// Logical device with its queues and the device-level function table.
pub struct DeviceContext {
    pub device: ash::Device,
    pub swapchain_fns: khr::Swapchain,
    pub physical_device: vk::PhysicalDevice,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    pub graphics_family: u32,
    pub present_family: u32,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl DeviceContext {
    /// Create the logical device for `physical_device`.
    ///
    /// Queue family validation happens before `vkCreateDevice`, so a
    /// mismatch never leaves a device behind.
    pub fn create(
        fns: &InstanceFunctions,
        surface: vk::SurfaceKHR,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self, ConfigureError> {
        let instance = &fns.instance;

        // Step 1: Queue families
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        for (index, family) in queue_families.iter().enumerate() {
            log::debug!(
                "Queue family {}: {:?} x{}",
                index,
                family.queue_flags,
                family.queue_count
            );
        }

        let selection = select_queue_families(&queue_families, |index| unsafe {
            fns.surface
                .get_physical_device_surface_support(physical_device, index, surface)
        })?;
        let family = selection.unified()?;
        log::info!("Using queue family {} for graphics and present", family);

        // Step 2: Logical device (one entry per role, even when they alias)
        let queue_priorities = [1.0];
        let queue_create_infos = [
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(family)
                .queue_priorities(&queue_priorities)
                .build(),
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(family)
                .queue_priorities(&queue_priorities)
                .build(),
        ];

        let extensions = [khr::Swapchain::name().as_ptr()];

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .map_err(ConfigureError::CreateDevice)?;

        let graphics_queue = unsafe { device.get_device_queue(family, 0) };
        let present_queue = unsafe { device.get_device_queue(family, 0) };

        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        // Owned from here; dropping it destroys the device.
        let context = Self {
            swapchain_fns: khr::Swapchain::new(instance, &device),
            device,
            physical_device,
            queue_families,
            graphics_family: family,
            present_family: family,
            graphics_queue,
            present_queue,
            memory_properties,
        };

        // Step 3: Device-level entry points
        fns.validate_device_symbols(context.device.handle())
            .map_err(|symbol| ConfigureError::DeviceFunctionLoad { symbol })?;

        Ok(context)
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<(), vk::Result> {
        unsafe { self.device.device_wait_idle() }
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");
        if let Err(e) = self.wait_idle() {
            log::warn!("vkDeviceWaitIdle failed during teardown: {}", e);
        }
        unsafe { self.device.destroy_device(None) };
    }
}

/// Human-readable summary of a physical device for logging.
pub fn describe_physical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> String {
    let properties = unsafe { instance.get_physical_device_properties(physical_device) };
    let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy();
    format!(
        "{} ({:?}, Vulkan {}.{}.{})",
        name,
        properties.device_type,
        vk::api_version_major(properties.api_version),
        vk::api_version_minor(properties.api_version),
        vk::api_version_patch(properties.api_version)
    )
}
