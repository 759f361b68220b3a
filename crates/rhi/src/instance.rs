//! Vulkan instance and validation layer setup.
//!
//! The [`Instance`] owns the loader entry, the `VkInstance` and, when
//! validation is on, a debug messenger that forwards validation output to
//! `tracing`.
//!
//! # Example
//!
//! ```no_run
//! use orbit_rhi::instance::Instance;
//!
//! // Surface extensions normally come from the windowing layer.
//! let extensions = [ash::khr::surface::NAME.as_ptr()];
//! let instance = Instance::new("orbit", &extensions, cfg!(debug_assertions))
//!     .expect("Failed to create Vulkan instance");
//! ```

use std::ffi::{CStr, CString, c_char};

use ash::{Entry, vk};
use tracing::{debug, error, info, warn};

use crate::error::{RhiError, RhiResult};

/// The Khronos validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// API version requested from the loader.
pub const API_VERSION: u32 = vk::API_VERSION_1_1;

/// Vulkan instance wrapper with optional validation.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl Instance {
    /// Creates the Vulkan instance.
    ///
    /// # Arguments
    ///
    /// * `application_name` - Reported to the driver
    /// * `surface_extensions` - Instance extensions the window system needs
    /// * `enable_validation` - Request the Khronos validation layer
    ///
    /// # Errors
    ///
    /// Returns an error if the loader cannot be found, the application name
    /// contains a NUL byte, or instance creation fails.
    pub fn new(
        application_name: &str,
        surface_extensions: &[*const c_char],
        enable_validation: bool,
    ) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };

        let validation_available = if enable_validation {
            let available = Self::is_validation_layer_available(&entry)?;
            if !available {
                warn!("Validation layer requested but not available, proceeding without it");
            }
            available
        } else {
            false
        };

        let app_name = CString::new(application_name)
            .map_err(|e| RhiError::InvalidHandle(format!("Invalid application name: {}", e)))?;

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"orbit")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(API_VERSION);

        let mut extensions = surface_extensions.to_vec();
        if validation_available {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layers = if validation_available {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        info!(
            "Vulkan instance created ({} extension(s), validation {})",
            extensions.len(),
            if validation_available { "on" } else { "off" }
        );

        let (debug_utils, debug_messenger) = if validation_available {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let messenger = Self::setup_debug_messenger(&debug_utils)?;
            debug!("Debug messenger installed");
            (Some(debug_utils), Some(messenger))
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    /// Returns the Vulkan instance handle.
    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the loader entry.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Returns whether the validation layer is active.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }

    fn is_validation_layer_available(entry: &Entry) -> RhiResult<bool> {
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };

        Ok(available_layers.iter().any(|layer| {
            layer
                .layer_name_as_c_str()
                .is_ok_and(|name| name == VALIDATION_LAYER_NAME)
        }))
    }

    fn setup_debug_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
    ) -> RhiResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None)? };
        Ok(messenger)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// Forwards validation layer output to `tracing`.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let kind = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "performance",
        _ => "general",
    };

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", kind, "{}", message);
    } else {
        warn!(target: "vulkan", kind, "{}", message);
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_without_surface_extensions() {
        // Needs a Vulkan loader; absent on most CI machines.
        match Instance::new("orbit-test", &[], false) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(RhiError::LoadingError(_)) | Err(RhiError::VulkanError(_)) => {
                eprintln!("Skipping test: Vulkan not available");
            }
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }

    #[test]
    fn test_api_version_is_1_1() {
        assert_eq!(vk::api_version_major(API_VERSION), 1);
        assert_eq!(vk::api_version_minor(API_VERSION), 1);
    }
}
