//! GPU images and their views.
//!
//! [`Image`] owns a 2D `VkImage`, its gpu-allocator memory and one image
//! view. It backs swap chain depth buffers, the shadow map and textures.

use std::cell::Cell;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::buffer::Buffer;
use crate::cleanup::Cleanup;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Creation parameters for an [`Image`].
#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    pub tiling: vk::ImageTiling,
    pub samples: vk::SampleCountFlags,
}

impl ImageDesc {
    /// Single-sampled depth attachment.
    pub fn depth(extent: vk::Extent2D, format: vk::Format) -> Self {
        Self {
            extent,
            format,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect: vk::ImageAspectFlags::DEPTH,
            tiling: vk::ImageTiling::OPTIMAL,
            samples: vk::SampleCountFlags::TYPE_1,
        }
    }

    /// Sampled color texture that is filled by a buffer copy.
    pub fn texture(extent: vk::Extent2D, format: vk::Format) -> Self {
        Self {
            extent,
            format,
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            aspect: vk::ImageAspectFlags::COLOR,
            tiling: vk::ImageTiling::OPTIMAL,
            samples: vk::SampleCountFlags::TYPE_1,
        }
    }

    /// Adds usage flags.
    pub fn with_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage |= usage;
        self
    }
}

/// 2D image with its memory and a view.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    desc: ImageDesc,
}

impl Image {
    /// Creates the image, binds device-local memory and creates a view over
    /// `desc.aspect`.
    ///
    /// # Errors
    ///
    /// Returns an error if image, memory or view creation fails.
    pub fn new(device: Arc<Device>, desc: ImageDesc) -> RhiResult<Self> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "Image extent must be non-zero, got {}x{}",
                desc.extent.width, desc.extent.height
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(desc.format)
            .tiling(desc.tiling)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .samples(desc.samples)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = device.with_allocator(|allocator| {
            Ok(allocator.allocate(&AllocationCreateDesc {
                name: "image",
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: desc.tiling == vk::ImageTiling::LINEAR,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?)
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };

        let (memory, offset) = unsafe { (allocation.memory(), allocation.offset()) };
        let allocation = Cell::new(Some(allocation));
        let cleanup = Cleanup::new(|| {
            if let Some(allocation) = allocation.take()
                && let Err(e) = device.with_allocator(|allocator| Ok(allocator.free(allocation)?))
            {
                error!("Failed to free image allocation: {:?}", e);
            }
            unsafe { device.handle().destroy_image(image, None) };
        });

        unsafe {
            device.handle().bind_image_memory(image, memory, offset)?;
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(desc.format)
            .subresource_range(subresource_range(desc.aspect));
        let view = unsafe { device.handle().create_image_view(&view_info, None)? };
        cleanup.disarm();

        debug!(
            "Created image {}x{} {:?} ({:?})",
            desc.extent.width, desc.extent.height, desc.format, desc.usage
        );

        Ok(Self {
            device,
            image,
            view,
            allocation: allocation.take(),
            desc,
        })
    }

    /// Records a layout transition barrier into `cmd`.
    ///
    /// Supported transitions are the ones textures and depth targets go
    /// through: `UNDEFINED → TRANSFER_DST_OPTIMAL`,
    /// `TRANSFER_DST_OPTIMAL → SHADER_READ_ONLY_OPTIMAL` and
    /// `UNDEFINED → DEPTH_STENCIL_ATTACHMENT_OPTIMAL`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] for any other pair.
    pub fn transition_layout(
        &self,
        cmd: vk::CommandBuffer,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> RhiResult<()> {
        let masks = transition_masks(old_layout, new_layout).ok_or_else(|| {
            RhiError::InvalidHandle(format!(
                "Unsupported layout transition {:?} -> {:?}",
                old_layout, new_layout
            ))
        })?;

        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(subresource_range(self.desc.aspect))
            .src_access_mask(masks.src_access)
            .dst_access_mask(masks.dst_access);

        unsafe {
            self.device.handle().cmd_pipeline_barrier(
                cmd,
                masks.src_stage,
                masks.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
        Ok(())
    }

    /// Records a copy of tightly packed texels from `buffer` into mip 0.
    ///
    /// The image must be in `TRANSFER_DST_OPTIMAL`.
    pub fn copy_from_buffer(&self, cmd: vk::CommandBuffer, buffer: &Buffer) {
        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(self.desc.aspect)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .image_offset(vk::Offset3D::default())
            .image_extent(vk::Extent3D {
                width: self.desc.extent.width,
                height: self.desc.extent.height,
                depth: 1,
            });

        unsafe {
            self.device.handle().cmd_copy_buffer_to_image(
                cmd,
                buffer.handle(),
                self.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
    }

    /// Returns a descriptor image info for sampling this image.
    #[inline]
    pub fn descriptor_info(
        &self,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    ) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo::default()
            .sampler(sampler)
            .image_view(self.view)
            .image_layout(layout)
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
        }

        if let Some(allocation) = self.allocation.take()
            && let Err(e) = self
                .device
                .with_allocator(|allocator| Ok(allocator.free(allocation)?))
        {
            error!("Failed to free image allocation: {:?}", e);
        }

        unsafe {
            self.device.handle().destroy_image(self.image, None);
        }
        debug!("Destroyed image {:?}", self.desc.format);
    }
}

/// Full single-mip, single-layer subresource range for `aspect`.
pub fn subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

#[derive(Debug, PartialEq, Eq)]
struct TransitionMasks {
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
    src_stage: vk::PipelineStageFlags,
    dst_stage: vk::PipelineStageFlags,
}

fn transition_masks(old: vk::ImageLayout, new: vk::ImageLayout) -> Option<TransitionMasks> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => {
            Some(TransitionMasks {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::TRANSFER_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
            })
        }
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Some(TransitionMasks {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            })
        }
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => {
            Some(TransitionMasks {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_transitions_supported() {
        let upload = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .expect("upload transition");
        assert_eq!(upload.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let sample = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .expect("sample transition");
        assert_eq!(sample.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(sample.dst_access, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn test_unsupported_transition() {
        assert!(
            transition_masks(
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::ImageLayout::UNDEFINED
            )
            .is_none()
        );
    }

    #[test]
    fn test_image_desc_presets() {
        let extent = vk::Extent2D {
            width: 2048,
            height: 2048,
        };
        let depth = ImageDesc::depth(extent, vk::Format::D32_SFLOAT)
            .with_usage(vk::ImageUsageFlags::SAMPLED);
        assert!(depth.usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT));
        assert!(depth.usage.contains(vk::ImageUsageFlags::SAMPLED));
        assert_eq!(depth.aspect, vk::ImageAspectFlags::DEPTH);

        let texture = ImageDesc::texture(extent, vk::Format::R8G8B8A8_SRGB);
        assert!(texture.usage.contains(vk::ImageUsageFlags::TRANSFER_DST));
        assert_eq!(texture.aspect, vk::ImageAspectFlags::COLOR);
    }
}
