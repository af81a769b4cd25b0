use std::ffi::{CStr, CString, c_char, c_void};

use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::eyre;

use crate::device::{Device, DeviceInfo};
use crate::handle::{DeviceHandle, HandleTable};

#[derive(Debug, Clone, Default)]
pub struct ContextInfo {
    pub app_name: String,
}

/// Owns the Vulkan instance and every device created from it.
///
/// Exactly one context should exist per host; it is an explicit value the
/// caller owns and threads through, not process-global state.
pub struct Context {
    entry: ash::Entry,
    instance: ash::Instance,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,

    devices: HandleTable<Device>,
}

impl Context {
    const ENABLE_VALIDATION_LAYERS: bool = cfg!(debug_assertions);
    const REQUIRED_VALIDATION_LAYERS: &'static [&'static CStr] =
        &[c"VK_LAYER_KHRONOS_validation"];

    pub fn new(info: &ContextInfo) -> Result<Self> {
        let entry = ash::Entry::linked();

        let enable_layers =
            Self::ENABLE_VALIDATION_LAYERS && Self::validation_layers_supported(&entry)?;
        let instance = Self::create_instance(&entry, &info.app_name, enable_layers)?;
        let debug_utils = if Self::ENABLE_VALIDATION_LAYERS {
            match Self::create_debug_utils_messenger(&entry, &instance) {
                Ok(pair) => Some(pair),
                Err(err) => {
                    log::warn!("Debug messenger unavailable: {err}");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            devices: HandleTable::new(),
        })
    }

    /// Creates a device from the best-scoring adapter. Nothing is inserted
    /// into the table on failure; there is no half-valid device state.
    pub fn create_device(&mut self, info: &DeviceInfo) -> Result<DeviceHandle> {
        let device = Device::new(&self.entry, &self.instance, info)?;
        let slot = self.devices.insert(device);
        let handle = DeviceHandle { slot };
        if let Some(device) = self.devices.get_mut(slot) {
            device.set_handle(handle);
        }
        log::debug!("Created device {handle:?}");
        Ok(handle)
    }

    /// Waits for the device's queues to go idle, then releases everything it
    /// transitively owns.
    pub fn destroy_device(&mut self, handle: DeviceHandle) -> Result<()> {
        self.devices
            .remove(handle.slot)
            .map(drop)
            .ok_or_else(|| eyre!("Device not found"))
    }

    pub fn device(&self, handle: DeviceHandle) -> Result<&Device> {
        self.devices
            .get(handle.slot)
            .ok_or_else(|| eyre!("Device not found"))
    }

    pub fn device_mut(&mut self, handle: DeviceHandle) -> Result<&mut Device> {
        self.devices
            .get_mut(handle.slot)
            .ok_or_else(|| eyre!("Device not found"))
    }

    fn create_instance(
        entry: &ash::Entry,
        app_name: &str,
        enable_layers: bool,
    ) -> Result<ash::Instance> {
        let app_name = CString::new(app_name)?;
        let application_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .api_version(vk::API_VERSION_1_3);

        let enabled_layer_names = if enable_layers {
            Self::REQUIRED_VALIDATION_LAYERS
                .iter()
                .map(|layer| layer.as_ptr())
                .collect::<Vec<*const c_char>>()
        } else {
            Vec::new()
        };
        let enabled_extension_names = Self::required_instance_extensions(entry)?
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();

        let mut debug_info = debug_utils_messenger_create_info();
        let instance_info = vk::InstanceCreateInfo::default()
            .application_info(&application_info)
            .enabled_layer_names(&enabled_layer_names)
            .enabled_extension_names(&enabled_extension_names)
            .push_next(&mut debug_info);

        #[cfg(target_os = "macos")]
        let instance_info = instance_info.flags(vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR);

        Ok(unsafe { entry.create_instance(&instance_info, None)? })
    }

    fn create_debug_utils_messenger(
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let debug_utils_loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let debug_utils_info = debug_utils_messenger_create_info();
        let debug_utils_messenger = unsafe {
            debug_utils_loader.create_debug_utils_messenger(&debug_utils_info, None)?
        };
        Ok((debug_utils_loader, debug_utils_messenger))
    }

    /// Surface extensions are requested opportunistically: whichever
    /// platform surface extensions the loader reports are enabled, so the
    /// context works both headless and windowed.
    fn required_instance_extensions(entry: &ash::Entry) -> Result<Vec<&'static CStr>> {
        let supported = unsafe { entry.enumerate_instance_extension_properties(None)? };
        let is_supported = |name: &CStr| {
            supported
                .iter()
                .filter_map(|props| props.extension_name_as_c_str().ok())
                .any(|supported_name| supported_name == name)
        };

        let candidates: &[&'static CStr] = &[
            ash::khr::surface::NAME,
            ash::khr::xlib_surface::NAME,
            ash::khr::xcb_surface::NAME,
            ash::khr::wayland_surface::NAME,
            ash::khr::win32_surface::NAME,
            ash::ext::metal_surface::NAME,
            #[cfg(target_os = "macos")]
            ash::khr::portability_enumeration::NAME,
            #[cfg(target_os = "macos")]
            ash::khr::get_physical_device_properties2::NAME,
        ];

        let mut exts = candidates
            .iter()
            .copied()
            .filter(|name| is_supported(name))
            .collect::<Vec<_>>();

        if Self::ENABLE_VALIDATION_LAYERS && is_supported(ash::ext::debug_utils::NAME) {
            exts.push(ash::ext::debug_utils::NAME);
        }

        Ok(exts)
    }

    fn validation_layers_supported(entry: &ash::Entry) -> Result<bool> {
        let supported_layers = unsafe {
            entry
                .enumerate_instance_layer_properties()?
                .iter()
                .map(|props| props.layer_name_as_c_str().map(CStr::to_owned))
                .collect::<Result<Vec<_>, _>>()?
        };

        for layer in Self::REQUIRED_VALIDATION_LAYERS {
            if !supported_layers
                .iter()
                .any(|supported| supported.as_c_str() == *layer)
            {
                log::warn!("Validation layer {layer:?} not supported, running without it");
                return Ok(false);
            }
        }

        Ok(true)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        // Devices wait-idle and tear down before the instance goes away.
        self.devices.clear();

        unsafe {
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn debug_utils_messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    let message_severity = vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
    let message_type = vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE;
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(message_severity)
        .message_type(message_type)
        .pfn_user_callback(Some(debug_callback))
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    let msg_type = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "[General]",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "[Performance]",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "[Validation]",
        _ => "[Unknown]",
    };
    let msg = unsafe { CStr::from_ptr((*p_callback_data).p_message) };
    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => {
            log::trace!("[Verbose]{} {:?}", msg_type, msg);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Warning]{} {:?}", msg_type, msg);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Error]{} {:?}", msg_type, msg);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            log::info!("[Info]{} {:?}", msg_type, msg);
        }
        _ => {
            log::warn!("[Unknown]{} {:?}", msg_type, msg);
        }
    }

    vk::FALSE
}
