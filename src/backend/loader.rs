// Vulkan API loader - staged entry point resolution
//
// Responsibilities:
// - Load the Vulkan runtime library at runtime
// - Validate each tier of entry points before anything calls into it:
//   pre-instance (null instance), instance-level, device-level
// - Create the instance with surface + platform surface extensions
// - Create the presentation surface from raw window handles
// - Forward validation layer messages into `log`

use ash::extensions::{ext::DebugUtils, khr};
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{c_void, CStr, CString};

use crate::error::InitError;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Entry points resolvable before an instance exists.
pub const PRE_INSTANCE_SYMBOLS: &[&CStr] = &[c"vkCreateInstance"];

/// Entry points resolved against the instance, independent of platform.
pub const INSTANCE_SYMBOLS: &[&CStr] = &[
    c"vkDestroyInstance",
    c"vkGetDeviceProcAddr",
    c"vkEnumeratePhysicalDevices",
    c"vkGetPhysicalDeviceProperties",
    c"vkGetPhysicalDeviceQueueFamilyProperties",
    c"vkGetPhysicalDeviceMemoryProperties",
    c"vkCreateDevice",
    c"vkDestroySurfaceKHR",
    c"vkGetPhysicalDeviceSurfaceSupportKHR",
    c"vkGetPhysicalDeviceSurfaceCapabilitiesKHR",
    c"vkGetPhysicalDeviceSurfaceFormatsKHR",
];

/// Entry points resolved against the logical device.
pub const DEVICE_SYMBOLS: &[&CStr] = &[
    c"vkDestroyDevice",
    c"vkGetDeviceQueue",
    c"vkDeviceWaitIdle",
    c"vkCreateSwapchainKHR",
    c"vkDestroySwapchainKHR",
    c"vkGetSwapchainImagesKHR",
    c"vkAcquireNextImageKHR",
    c"vkQueuePresentKHR",
    c"vkCreateShaderModule",
    c"vkDestroyShaderModule",
    c"vkCreatePipelineLayout",
    c"vkDestroyPipelineLayout",
    c"vkCreateRenderPass",
    c"vkDestroyRenderPass",
    c"vkCreateGraphicsPipelines",
    c"vkDestroyPipeline",
    c"vkCreateImageView",
    c"vkDestroyImageView",
    c"vkCreateFramebuffer",
    c"vkDestroyFramebuffer",
    c"vkCreateCommandPool",
    c"vkDestroyCommandPool",
    c"vkAllocateCommandBuffers",
    c"vkFreeCommandBuffers",
    c"vkBeginCommandBuffer",
    c"vkEndCommandBuffer",
    c"vkCmdBeginRenderPass",
    c"vkCmdBindPipeline",
    c"vkCmdBindVertexBuffers",
    c"vkCmdBindIndexBuffer",
    c"vkCmdDrawIndexed",
    c"vkCmdEndRenderPass",
    c"vkCreateBuffer",
    c"vkDestroyBuffer",
    c"vkGetBufferMemoryRequirements",
    c"vkAllocateMemory",
    c"vkFreeMemory",
    c"vkBindBufferMemory",
    c"vkMapMemory",
    c"vkUnmapMemory",
    c"vkFlushMappedMemoryRanges",
    c"vkInvalidateMappedMemoryRanges",
    c"vkCreateSemaphore",
    c"vkDestroySemaphore",
    c"vkQueueSubmit",
    c"vkQueueWaitIdle",
];

/// Check that every name resolves, in order. Returns the first missing one.
pub fn validate_symbols<R>(symbols: &[&'static CStr], mut resolve: R) -> Result<(), &'static CStr>
where
    R: FnMut(&CStr) -> bool,
{
    match symbols.iter().find(|name| !resolve(name)) {
        Some(missing) => Err(*missing),
        None => Ok(()),
    }
}

/// Window system behind the native handles handed to `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Xcb,
    Xlib,
    Wayland,
    Win32,
}

impl Platform {
    pub fn detect(display: RawDisplayHandle, window: RawWindowHandle) -> Result<Self, InitError> {
        match (display, window) {
            (RawDisplayHandle::Xcb(_), RawWindowHandle::Xcb(_)) => Ok(Self::Xcb),
            (RawDisplayHandle::Xlib(_), RawWindowHandle::Xlib(_)) => Ok(Self::Xlib),
            (RawDisplayHandle::Wayland(_), RawWindowHandle::Wayland(_)) => Ok(Self::Wayland),
            (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(_)) => Ok(Self::Win32),
            (display, _) => Err(InitError::UnsupportedPlatform(display_kind(display))),
        }
    }

    /// Instance extension providing the platform surface.
    pub fn extension_name(self) -> &'static CStr {
        match self {
            Self::Xcb => khr::XcbSurface::name(),
            Self::Xlib => khr::XlibSurface::name(),
            Self::Wayland => khr::WaylandSurface::name(),
            Self::Win32 => khr::Win32Surface::name(),
        }
    }

    /// Instance entry point that creates the platform surface.
    pub fn create_surface_symbol(self) -> &'static CStr {
        match self {
            Self::Xcb => c"vkCreateXcbSurfaceKHR",
            Self::Xlib => c"vkCreateXlibSurfaceKHR",
            Self::Wayland => c"vkCreateWaylandSurfaceKHR",
            Self::Win32 => c"vkCreateWin32SurfaceKHR",
        }
    }
}

fn display_kind(display: RawDisplayHandle) -> &'static str {
    match display {
        RawDisplayHandle::Xcb(_) => "xcb",
        RawDisplayHandle::Xlib(_) => "xlib",
        RawDisplayHandle::Wayland(_) => "wayland",
        RawDisplayHandle::Windows(_) => "windows",
        RawDisplayHandle::AppKit(_) => "appkit",
        RawDisplayHandle::Android(_) => "android",
        _ => "unknown",
    }
}

/// Options for instance creation.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub application_name: String,
    /// Enable the Khronos validation layer and route its messages to `log`.
    pub validation: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            application_name: "quad-renderer".to_string(),
            validation: cfg!(debug_assertions),
        }
    }
}

/// Instance-level function table.
///
/// Built once by `InstanceFunctions::load`; nothing in it changes afterwards.
/// Dropping it destroys the debug messenger and the instance, then unloads
/// the library.
pub struct InstanceFunctions {
    pub instance: ash::Instance,
    pub surface: khr::Surface,
    pub platform: Platform,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    // Must outlive the instance.
    entry: Entry,
}

impl InstanceFunctions {
    pub fn load(options: &ContextOptions, platform: Platform) -> Result<Self, InitError> {
        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }.map_err(|e| match e {
            ash::LoadingError::LibraryLoadFailure(e) => InitError::LibraryLoad(e.to_string()),
            ash::LoadingError::MissingEntryPoint(_) => InitError::PreInstanceLoad {
                symbol: c"vkGetInstanceProcAddr",
            },
        })?;
        log::info!("Vulkan library loaded");

        // Step 2: Pre-instance entry points
        let get_instance_proc_addr = entry.static_fn().get_instance_proc_addr;
        validate_symbols(PRE_INSTANCE_SYMBOLS, |name| unsafe {
            get_instance_proc_addr(vk::Instance::null(), name.as_ptr()).is_some()
        })
        .map_err(|symbol| InitError::PreInstanceLoad { symbol })?;

        // Step 3: Instance
        let validation = options.validation && Self::has_validation_layer(&entry);
        let instance = Self::create_instance(&entry, options, platform, validation)?;

        // From here on dropping `fns` tears the instance down again.
        let mut fns = Self {
            surface: khr::Surface::new(&entry, &instance),
            instance,
            platform,
            debug_utils: None,
            entry,
        };

        // Step 4: Instance-level entry points
        let handle = fns.instance.handle();
        validate_symbols(INSTANCE_SYMBOLS, |name| unsafe {
            get_instance_proc_addr(handle, name.as_ptr()).is_some()
        })
        .and_then(|()| {
            validate_symbols(&[platform.create_surface_symbol()], |name| unsafe {
                get_instance_proc_addr(handle, name.as_ptr()).is_some()
            })
        })
        .map_err(|symbol| InitError::InstanceFunctionLoad { symbol })?;

        // Step 5: Debug messenger
        if validation {
            fns.debug_utils = Some(fns.setup_debug_messenger()?);
        }

        Ok(fns)
    }

    fn has_validation_layer(entry: &Entry) -> bool {
        let layers = match entry.enumerate_instance_layer_properties() {
            Ok(layers) => layers,
            Err(e) => {
                log::warn!("Could not enumerate instance layers: {}", e);
                return false;
            }
        };
        let found = layers
            .iter()
            .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER);
        if !found {
            log::warn!("Validation requested but {:?} is not installed", VALIDATION_LAYER);
        }
        found
    }

    fn create_instance(
        entry: &Entry,
        options: &ContextOptions,
        platform: Platform,
        validation: bool,
    ) -> Result<ash::Instance, InitError> {
        // Interior NULs cannot name an application; drop them rather than fail.
        let app_name = CString::new(options.application_name.replace('\0', ""))
            .unwrap_or_default();
        let engine_name = c"quad-renderer";

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        let mut extensions = vec![khr::Surface::name().as_ptr(), platform.extension_name().as_ptr()];
        let layer_names = if validation {
            extensions.push(DebugUtils::name().as_ptr());
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        // Chained messenger covers vkCreateInstance and vkDestroyInstance,
        // which the standalone messenger does not outlive.
        let mut debug_info = debug_messenger_info();
        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);
        if validation {
            create_info = create_info.push_next(&mut debug_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(InitError::Instance)?;

        log::info!(
            "Vulkan instance created ({:?} surface, validation {})",
            platform,
            if validation { "on" } else { "off" }
        );
        Ok(instance)
    }

    fn setup_debug_messenger(&self) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT), InitError> {
        let debug_utils = DebugUtils::new(&self.entry, &self.instance);

        let create_info = debug_messenger_info();
        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .map_err(InitError::DebugMessenger)?;

        Ok((debug_utils, messenger))
    }

    /// Create the presentation surface for the given native handles.
    pub fn create_surface(
        &self,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<vk::SurfaceKHR, InitError> {
        let result = unsafe {
            match (display, window) {
                (RawDisplayHandle::Xcb(display), RawWindowHandle::Xcb(window)) => {
                    let connection = display
                        .connection
                        .ok_or_else(|| InitError::WindowHandle("xcb connection is null".into()))?;
                    let create_info = vk::XcbSurfaceCreateInfoKHR::builder()
                        .connection(connection.as_ptr() as *mut _)
                        .window(window.window.get());
                    khr::XcbSurface::new(&self.entry, &self.instance)
                        .create_xcb_surface(&create_info, None)
                }
                (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(window)) => {
                    let dpy = display
                        .display
                        .ok_or_else(|| InitError::WindowHandle("xlib display is null".into()))?;
                    let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                        .dpy(dpy.as_ptr() as *mut _)
                        .window(window.window);
                    khr::XlibSurface::new(&self.entry, &self.instance)
                        .create_xlib_surface(&create_info, None)
                }
                (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(window)) => {
                    let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                        .display(display.display.as_ptr() as *mut _)
                        .surface(window.surface.as_ptr() as *mut _);
                    khr::WaylandSurface::new(&self.entry, &self.instance)
                        .create_wayland_surface(&create_info, None)
                }
                (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(window)) => {
                    let hinstance = window.hinstance.map(|h| h.get()).unwrap_or(0) as *const c_void;
                    let hwnd = window.hwnd.get() as *const c_void;
                    let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                        .hinstance(hinstance)
                        .hwnd(hwnd);
                    khr::Win32Surface::new(&self.entry, &self.instance)
                        .create_win32_surface(&create_info, None)
                }
                (display, _) => return Err(InitError::UnsupportedPlatform(display_kind(display))),
            }
        };

        result.map_err(InitError::Surface)
    }

    /// Confirm every device-level entry point resolves for `device`.
    pub fn validate_device_symbols(&self, device: vk::Device) -> Result<(), &'static CStr> {
        let get_device_proc_addr = self.instance.fp_v1_0().get_device_proc_addr;
        validate_symbols(DEVICE_SYMBOLS, |name| unsafe {
            get_device_proc_addr(device, name.as_ptr()).is_some()
        })
    }
}

impl Drop for InstanceFunctions {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance...");
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn debug_messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .build()
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;
    use raw_window_handle::{
        WaylandDisplayHandle, WaylandWindowHandle, XcbDisplayHandle, XcbWindowHandle,
        XlibDisplayHandle,
    };
    use std::num::NonZeroU32;
    use std::ptr::NonNull;

    #[test]
    fn validate_reports_first_missing_symbol() {
        let missing = [c"vkCreateDevice", c"vkCreateSwapchainKHR"];
        let resolves = |name: &CStr| !missing.iter().any(|m| *m == name);
        let result = validate_symbols(DEVICE_SYMBOLS, resolves);
        assert_eq!(result, Err(c"vkCreateSwapchainKHR"));

        let result = validate_symbols(INSTANCE_SYMBOLS, resolves);
        assert_eq!(result, Err(c"vkCreateDevice"));
    }

    #[test]
    fn validate_stops_at_first_failure() {
        let mut asked = Vec::new();
        let result = validate_symbols(INSTANCE_SYMBOLS, |name| {
            asked.push(name.to_owned());
            asked.len() < 3
        });
        assert_eq!(result, Err(INSTANCE_SYMBOLS[2]));
        assert_eq!(asked.len(), 3);
    }

    #[test]
    fn validate_accepts_complete_table() {
        assert_eq!(validate_symbols(DEVICE_SYMBOLS, |_| true), Ok(()));
    }

    #[test]
    fn symbol_tiers_do_not_overlap() {
        for name in PRE_INSTANCE_SYMBOLS.iter().chain(INSTANCE_SYMBOLS) {
            assert!(!DEVICE_SYMBOLS.contains(name), "{:?} listed twice", name);
        }
    }

    #[test]
    fn detects_matching_handle_pairs() {
        let mut xcb = 0u8;
        let display = RawDisplayHandle::Xcb(XcbDisplayHandle::new(
            Some(NonNull::from(&mut xcb).cast()),
            0,
        ));
        let window = RawWindowHandle::Xcb(XcbWindowHandle::new(NonZeroU32::new(7).unwrap()));
        assert_eq!(Platform::detect(display, window).unwrap(), Platform::Xcb);
        assert_eq!(Platform::Xcb.create_surface_symbol(), c"vkCreateXcbSurfaceKHR");
        assert_eq!(Platform::Xcb.extension_name(), c"VK_KHR_xcb_surface");
    }

    #[test]
    fn rejects_mixed_handle_pairs() {
        let mut wl = 0u8;
        let display = RawDisplayHandle::Xlib(XlibDisplayHandle::new(None, 0));
        let window = RawWindowHandle::Wayland(WaylandWindowHandle::new(NonNull::from(&mut wl).cast()));
        let err = Platform::detect(display, window).unwrap_err();
        assert!(matches!(err, InitError::UnsupportedPlatform("xlib")));

        let display = RawDisplayHandle::Wayland(WaylandDisplayHandle::new(NonNull::from(&mut wl).cast()));
        assert_eq!(Platform::detect(display, window).unwrap(), Platform::Wayland);
    }

    #[test]
    fn messenger_reports_errors_to_the_log_callback() {
        let info = debug_messenger_info();
        assert!(info
            .message_severity
            .contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR));
        assert!(info
            .message_type
            .contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION));
        assert!(info.pfn_user_callback.is_some());
        assert!(info.p_next.is_null());
    }
}
