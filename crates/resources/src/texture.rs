//! Sampled 2D textures.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use orbit_rhi::buffer::Buffer;
use orbit_rhi::device::Device;
use orbit_rhi::image::{Image, ImageDesc};
use orbit_rhi::sampler::{Sampler, SamplerDesc};
use tracing::info;

use crate::error::{ResourceError, ResourceResult};

/// Color texels are stored as sRGB and linearized by the sampler.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// A device-local image in `SHADER_READ_ONLY_OPTIMAL` with its sampler.
pub struct Texture {
    image: Image,
    sampler: Sampler,
}

impl Texture {
    /// Decodes a PNG or JPEG file and uploads it.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::FileNotFound`], an image decoding error, or
    /// the upload error.
    pub fn from_file(device: Arc<Device>, path: impl AsRef<Path>) -> ResourceResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let rgba = image::open(path)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        info!("Loaded texture {:?}: {}x{}", path, width, height);

        Self::from_rgba8(device, width, height, rgba.as_raw())
    }

    /// Uploads tightly packed RGBA8 texels.
    ///
    /// # Panics
    ///
    /// Panics if `pixels` is not `width * height * 4` bytes long.
    ///
    /// # Errors
    ///
    /// Returns an error if the image, staging buffer or sampler cannot be
    /// created, or the upload submission fails.
    pub fn from_rgba8(
        device: Arc<Device>,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> ResourceResult<Self> {
        assert_eq!(
            pixels.len(),
            width as usize * height as usize * 4,
            "RGBA8 data does not match {}x{}",
            width,
            height
        );

        let image = Image::new(
            Arc::clone(&device),
            ImageDesc::texture(vk::Extent2D { width, height }, TEXTURE_FORMAT),
        )?;
        let staging = Buffer::staging_with_data(Arc::clone(&device), pixels)?;

        let cmd = device.begin_single_time_commands()?;
        image.transition_layout(
            cmd,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        image.copy_from_buffer(cmd, &staging);
        image.transition_layout(
            cmd,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;
        device.end_single_time_commands(cmd)?;

        let sampler = Sampler::new(device, SamplerDesc::default())?;
        Ok(Self { image, sampler })
    }

    /// 1x1 opaque white, for meshes without a texture.
    ///
    /// # Errors
    ///
    /// See [`from_rgba8`](Self::from_rgba8).
    pub fn white(device: Arc<Device>) -> ResourceResult<Self> {
        Self::from_rgba8(device, 1, 1, &[255, 255, 255, 255])
    }

    /// Combined image sampler info for descriptor writes.
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        self.image.descriptor_info(
            self.sampler.handle(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}
