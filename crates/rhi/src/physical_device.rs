//! Physical device (GPU) selection.
//!
//! Candidates must expose a graphics queue, a queue able to present to the
//! window surface, the swap chain extension and sampler anisotropy. Among
//! those, discrete GPUs win, then integrated ones.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};

/// Device extensions the renderer cannot run without.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Queue family indices used by the renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family supporting graphics commands.
    pub graphics_family: Option<u32>,
    /// Family able to present to the surface.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Both a graphics and a present family were found.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Returns the distinct family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);
        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }
        families
    }
}

/// Properties of the selected GPU.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties, including the limits used to size buffers.
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Queue family indices.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the device name.
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        device_type_name(self.properties.device_type)
    }

    /// Returns the device limits.
    #[inline]
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.properties.limits
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Selects the most suitable physical device for rendering to `surface`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no GPU meets the requirements.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    info!("Found {} GPU(s)", devices.len());

    let selected = devices
        .into_iter()
        .filter_map(|device| check_device_suitability(instance, device, surface, surface_loader))
        .max_by_key(|info| rate_device_type(info.properties.device_type));

    match selected {
        Some(info) => {
            info!(
                "Selected GPU '{}' ({})",
                info.device_name(),
                info.device_type_name()
            );
            Ok(info)
        }
        None => {
            warn!("No GPU supports graphics, presentation, swap chains and anisotropy");
            Err(RhiError::NoSuitableGpu)
        }
    }
}

fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let name = properties
        .device_name_as_c_str()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let queue_families = find_queue_families(instance, device, surface, surface_loader);
    if !queue_families.is_complete() {
        debug!("GPU '{}' skipped: missing graphics or present queue", name);
        return None;
    }

    if !supports_required_extensions(instance, device) {
        debug!("GPU '{}' skipped: swap chain extension missing", name);
        return None;
    }

    if features.sampler_anisotropy == vk::FALSE {
        debug!("GPU '{}' skipped: sampler anisotropy not supported", name);
        return None;
    }

    let formats =
        unsafe { surface_loader.get_physical_device_surface_formats(device, surface) }.ok()?;
    let present_modes =
        unsafe { surface_loader.get_physical_device_surface_present_modes(device, surface) }
            .ok()?;
    if formats.is_empty() || present_modes.is_empty() {
        debug!("GPU '{}' skipped: surface has no formats or present modes", name);
        return None;
    }

    Some(PhysicalDeviceInfo {
        device,
        properties,
        features,
        queue_families,
    })
}

fn supports_required_extensions(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    let Ok(available) = (unsafe { instance.enumerate_device_extension_properties(device) }) else {
        return false;
    };

    REQUIRED_DEVICE_EXTENSIONS.iter().all(|required| {
        available
            .iter()
            .any(|ext| ext.extension_name_as_c_str().is_ok_and(|name| name == *required))
    })
}

fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> QueueFamilyIndices {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let mut indices = QueueFamilyIndices::default();

    for (index, family) in families.iter().enumerate() {
        let index = index as u32;
        if family.queue_count == 0 {
            continue;
        }

        if indices.graphics_family.is_none()
            && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        {
            indices.graphics_family = Some(index);
        }

        let present_support = unsafe {
            surface_loader
                .get_physical_device_surface_support(device, index, surface)
                .unwrap_or(false)
        };
        if present_support {
            // A family doing both avoids concurrent sharing of swap chain images.
            if indices.present_family.is_none() || Some(index) == indices.graphics_family {
                indices.present_family = Some(index);
            }
        }
    }

    indices
}

fn rate_device_type(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 3,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 1,
        _ => 0,
    }
}

fn device_type_name(device_type: vk::PhysicalDeviceType) -> &'static str {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
        vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
        vk::PhysicalDeviceType::CPU => "CPU",
        _ => "Other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_family_indices_complete() {
        let mut indices = QueueFamilyIndices::default();
        assert!(!indices.is_complete());

        indices.graphics_family = Some(0);
        assert!(!indices.is_complete());

        indices.present_family = Some(1);
        assert!(indices.is_complete());
    }

    #[test]
    fn test_unique_families_deduplicates() {
        let shared = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert_eq!(shared.unique_families(), vec![0]);

        let split = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(2),
        };
        assert_eq!(split.unique_families(), vec![0, 2]);
    }

    #[test]
    fn test_discrete_gpu_preferred() {
        assert!(
            rate_device_type(vk::PhysicalDeviceType::DISCRETE_GPU)
                > rate_device_type(vk::PhysicalDeviceType::INTEGRATED_GPU)
        );
        assert!(
            rate_device_type(vk::PhysicalDeviceType::INTEGRATED_GPU)
                > rate_device_type(vk::PhysicalDeviceType::CPU)
        );
    }

    #[test]
    fn test_required_extensions_include_swapchain() {
        assert!(REQUIRED_DEVICE_EXTENSIONS.contains(&ash::khr::swapchain::NAME));
    }
}
