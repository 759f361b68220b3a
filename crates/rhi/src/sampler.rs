//! Texture and shadow-map samplers.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Sampler creation parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerDesc {
    pub filter: vk::Filter,
    pub address_mode: vk::SamplerAddressMode,
    pub border_color: vk::BorderColor,
    /// Maximum anisotropy, clamped to the device limit. `None` disables it.
    pub anisotropy: Option<f32>,
    /// Depth comparison for hardware PCF. `None` disables it.
    pub compare_op: Option<vk::CompareOp>,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: vk::Filter::LINEAR,
            address_mode: vk::SamplerAddressMode::REPEAT,
            border_color: vk::BorderColor::INT_OPAQUE_BLACK,
            anisotropy: Some(16.0),
            compare_op: None,
        }
    }
}

impl SamplerDesc {
    /// Linear, clamp-to-white-border, `LESS_OR_EQUAL` comparison.
    ///
    /// Samples outside the light frustum read as fully lit.
    pub fn shadow() -> Self {
        Self {
            filter: vk::Filter::LINEAR,
            address_mode: vk::SamplerAddressMode::CLAMP_TO_BORDER,
            border_color: vk::BorderColor::FLOAT_OPAQUE_WHITE,
            anisotropy: None,
            compare_op: Some(vk::CompareOp::LESS_OR_EQUAL),
        }
    }
}

/// RAII wrapper over `VkSampler`.
pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Creates a sampler.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkCreateSampler` fails.
    pub fn new(device: Arc<Device>, desc: SamplerDesc) -> RhiResult<Self> {
        let anisotropy = desc
            .anisotropy
            .map(|requested| requested.min(device.max_sampler_anisotropy()));

        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(desc.filter)
            .min_filter(desc.filter)
            .address_mode_u(desc.address_mode)
            .address_mode_v(desc.address_mode)
            .address_mode_w(desc.address_mode)
            .anisotropy_enable(anisotropy.is_some())
            .max_anisotropy(anisotropy.unwrap_or(1.0))
            .border_color(desc.border_color)
            .unnormalized_coordinates(false)
            .compare_enable(desc.compare_op.is_some())
            .compare_op(desc.compare_op.unwrap_or(vk::CompareOp::ALWAYS))
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(1.0);

        let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };
        debug!("Created sampler {:?}", desc);

        Ok(Self { device, sampler })
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
        debug!("Destroyed sampler");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sampler_is_anisotropic_without_compare() {
        let desc = SamplerDesc::default();
        assert!(desc.anisotropy.is_some());
        assert!(desc.compare_op.is_none());
        assert_eq!(desc.address_mode, vk::SamplerAddressMode::REPEAT);
    }

    #[test]
    fn test_shadow_sampler_compares_and_clamps() {
        let desc = SamplerDesc::shadow();
        assert_eq!(desc.compare_op, Some(vk::CompareOp::LESS_OR_EQUAL));
        assert_eq!(desc.address_mode, vk::SamplerAddressMode::CLAMP_TO_BORDER);
        assert_eq!(desc.border_color, vk::BorderColor::FLOAT_OPAQUE_WHITE);
    }
}
