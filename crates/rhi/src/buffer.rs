//! GPU buffers with per-instance alignment.
//!
//! A [`Buffer`] holds `instance_count` records of `instance_size` bytes, each
//! placed at a multiple of `alignment_size` (the instance size rounded up to
//! the caller's minimum offset alignment). This lets one buffer back several
//! frames of uniform data addressed through dynamic offsets, or an array of
//! per-object records addressed by index.
//!
//! Host-visible buffers are mapped for their whole life through
//! gpu-allocator. Flushes and invalidations only reach the driver when the
//! memory is not host-coherent.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use gpu_allocator::MemoryLocation;
//! use orbit_rhi::buffer::Buffer;
//! use orbit_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>) -> Result<(), orbit_rhi::RhiError> {
//! let alignment = device.min_uniform_buffer_offset_alignment();
//! let mut ubo = Buffer::new(
//!     device,
//!     64,
//!     2,
//!     vk::BufferUsageFlags::UNIFORM_BUFFER,
//!     MemoryLocation::CpuToGpu,
//!     alignment,
//! )?;
//! ubo.write_to_index(&[0u8; 64], 1)?;
//! ubo.flush_index(1)?;
//! # Ok(())
//! # }
//! ```

use std::cell::Cell;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::cleanup::Cleanup;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Rounds `instance_size` up to a multiple of `min_offset_alignment`.
///
/// An alignment of zero means "no requirement". Non-zero alignments are
/// powers of two on every conforming implementation.
#[inline]
pub fn aligned_size(instance_size: vk::DeviceSize, min_offset_alignment: vk::DeviceSize) -> vk::DeviceSize {
    if min_offset_alignment > 0 {
        (instance_size + min_offset_alignment - 1) & !(min_offset_alignment - 1)
    } else {
        instance_size
    }
}

/// Computes the `(offset, size)` of a mapped memory range inside the
/// allocation's `VkDeviceMemory`, rounded out to `atom_size`.
///
/// `size == vk::WHOLE_SIZE` covers from `offset` to the end of the buffer.
/// A rounded end past the allocation becomes `vk::WHOLE_SIZE`, which runs to
/// the end of the memory object.
fn mapped_range(
    allocation_offset: vk::DeviceSize,
    allocation_size: vk::DeviceSize,
    buffer_size: vk::DeviceSize,
    size: vk::DeviceSize,
    offset: vk::DeviceSize,
    atom_size: vk::DeviceSize,
) -> (vk::DeviceSize, vk::DeviceSize) {
    let size = if size == vk::WHOLE_SIZE {
        buffer_size.saturating_sub(offset)
    } else {
        size
    };
    let atom = atom_size.max(1);
    let start = allocation_offset + offset;
    let aligned_start = start / atom * atom;
    let end = start + size;
    let aligned_end = end.div_ceil(atom) * atom;
    if aligned_end > allocation_offset + allocation_size {
        return (aligned_start, vk::WHOLE_SIZE);
    }
    (aligned_start, aligned_end - aligned_start)
}

/// GPU buffer wrapper with gpu-allocator managed memory.
///
/// # Thread Safety
///
/// Writes take `&mut self`; share between threads behind external
/// synchronization only.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    instance_size: vk::DeviceSize,
    instance_count: u32,
    alignment_size: vk::DeviceSize,
    buffer_size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    location: MemoryLocation,
}

impl Buffer {
    /// Creates a buffer of `instance_count` aligned records.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `instance_size` - Size in bytes of one record
    /// * `instance_count` - Number of records
    /// * `usage` - Vulkan usage flags
    /// * `location` - Memory location; anything but `GpuOnly` is mapped
    /// * `min_offset_alignment` - Record stride alignment (1 or 0 for packed)
    ///
    /// # Errors
    ///
    /// Returns an error if the size is zero or buffer/memory creation fails.
    pub fn new(
        device: Arc<Device>,
        instance_size: vk::DeviceSize,
        instance_count: u32,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        min_offset_alignment: vk::DeviceSize,
    ) -> RhiResult<Self> {
        let alignment_size = aligned_size(instance_size, min_offset_alignment);
        let buffer_size = alignment_size * instance_count as vk::DeviceSize;
        if buffer_size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(buffer_size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = device.with_allocator(|allocator| {
            Ok(allocator.allocate(&AllocationCreateDesc {
                name: "buffer",
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?)
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let (memory, offset) = unsafe { (allocation.memory(), allocation.offset()) };
        let allocation = Cell::new(Some(allocation));
        let cleanup = Cleanup::new(|| {
            if let Some(allocation) = allocation.take()
                && let Err(e) = device.with_allocator(|allocator| Ok(allocator.free(allocation)?))
            {
                error!("Failed to free buffer allocation: {:?}", e);
            }
            unsafe { device.handle().destroy_buffer(buffer, None) };
        });

        unsafe {
            device.handle().bind_buffer_memory(buffer, memory, offset)?;
        }
        cleanup.disarm();

        debug!(
            "Created buffer: {} x {} bytes (stride {}), {:?}, {:?}",
            instance_count, instance_size, alignment_size, usage, location
        );

        Ok(Self {
            device,
            buffer,
            allocation: allocation.take(),
            instance_size,
            instance_count,
            alignment_size,
            buffer_size,
            usage,
            location,
        })
    }

    /// Creates a mapped transfer-source buffer holding `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if creation fails.
    pub fn staging_with_data(device: Arc<Device>, data: &[u8]) -> RhiResult<Self> {
        let mut staging = Self::new(
            device,
            data.len() as vk::DeviceSize,
            1,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            1,
        )?;
        staging.write_to_buffer(data, 0)?;
        staging.flush(vk::WHOLE_SIZE, 0)?;
        Ok(staging)
    }

    /// Creates a device-local buffer and fills it with `data` through a
    /// staging buffer and a one-shot copy.
    ///
    /// `TRANSFER_DST` is added to `usage`.
    ///
    /// # Errors
    ///
    /// Returns an error if either buffer cannot be created or the copy
    /// submission fails.
    pub fn device_local_with_data(
        device: Arc<Device>,
        usage: vk::BufferUsageFlags,
        data: &[u8],
    ) -> RhiResult<Self> {
        let staging = Self::staging_with_data(Arc::clone(&device), data)?;
        let buffer = Self::new(
            Arc::clone(&device),
            data.len() as vk::DeviceSize,
            1,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
            1,
        )?;

        let cmd = device.begin_single_time_commands()?;
        let region = vk::BufferCopy::default().size(data.len() as vk::DeviceSize);
        unsafe {
            device
                .handle()
                .cmd_copy_buffer(cmd, staging.handle(), buffer.handle(), &[region]);
        }
        device.end_single_time_commands(cmd)?;

        Ok(buffer)
    }

    /// Copies `data` into the mapped memory at byte `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is not mapped or the write would run
    /// past its end.
    pub fn write_to_buffer(&mut self, data: &[u8], offset: vk::DeviceSize) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let end = offset + data.len() as vk::DeviceSize;
        if end > self.buffer_size {
            return Err(RhiError::InvalidHandle(format!(
                "Write exceeds buffer size: offset {} + data {} > buffer {}",
                offset,
                data.len(),
                self.buffer_size
            )));
        }

        let allocation = self.allocation.as_ref().ok_or_else(|| {
            RhiError::InvalidHandle("Buffer allocation is not available".to_string())
        })?;
        let mapped_ptr = allocation
            .mapped_ptr()
            .ok_or_else(|| RhiError::InvalidHandle("Buffer memory is not mapped".to_string()))?;

        unsafe {
            let dst = (mapped_ptr.as_ptr() as *mut u8).add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    /// Writes one record at `index * alignment_size`.
    ///
    /// # Errors
    ///
    /// See [`write_to_buffer`](Self::write_to_buffer).
    pub fn write_to_index(&mut self, data: &[u8], index: u32) -> RhiResult<()> {
        debug_assert!(
            data.len() as vk::DeviceSize <= self.alignment_size,
            "record larger than its stride"
        );
        self.write_to_buffer(data, self.index_offset(index))
    }

    /// Makes host writes in `[offset, offset + size)` visible to the device.
    ///
    /// A no-op on host-coherent memory.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkFlushMappedMemoryRanges` fails.
    pub fn flush(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> RhiResult<()> {
        let Some(range) = self.non_coherent_range(size, offset) else {
            return Ok(());
        };
        unsafe { self.device.handle().flush_mapped_memory_ranges(&[range])? };
        Ok(())
    }

    /// Flushes the record at `index`.
    ///
    /// # Errors
    ///
    /// See [`flush`](Self::flush).
    pub fn flush_index(&self, index: u32) -> RhiResult<()> {
        self.flush(self.alignment_size, self.index_offset(index))
    }

    /// Makes device writes in `[offset, offset + size)` visible to the host.
    ///
    /// A no-op on host-coherent memory.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkInvalidateMappedMemoryRanges` fails.
    pub fn invalidate(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> RhiResult<()> {
        let Some(range) = self.non_coherent_range(size, offset) else {
            return Ok(());
        };
        unsafe { self.device.handle().invalidate_mapped_memory_ranges(&[range])? };
        Ok(())
    }

    /// Returns a descriptor buffer info for `[offset, offset + size)`.
    #[inline]
    pub fn descriptor_info(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::default()
            .buffer(self.buffer)
            .offset(offset)
            .range(size)
    }

    /// Returns a descriptor buffer info covering the record at `index`.
    #[inline]
    pub fn descriptor_info_for_index(&self, index: u32) -> vk::DescriptorBufferInfo {
        self.descriptor_info(self.alignment_size, self.index_offset(index))
    }

    /// Returns the byte offset of the record at `index`.
    #[inline]
    pub fn index_offset(&self, index: u32) -> vk::DeviceSize {
        debug_assert!(index < self.instance_count, "buffer index out of range");
        index as vk::DeviceSize * self.alignment_size
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn instance_size(&self) -> vk::DeviceSize {
        self.instance_size
    }

    #[inline]
    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    /// Returns the record stride in bytes.
    #[inline]
    pub fn alignment_size(&self) -> vk::DeviceSize {
        self.alignment_size
    }

    /// Returns the total size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer_size
    }

    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    #[inline]
    pub fn memory_location(&self) -> MemoryLocation {
        self.location
    }

    fn non_coherent_range(
        &self,
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
    ) -> Option<vk::MappedMemoryRange<'static>> {
        let allocation = self.allocation.as_ref()?;
        allocation.mapped_ptr()?;
        if allocation
            .memory_properties()
            .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
        {
            return None;
        }

        let (range_offset, range_size) = mapped_range(
            allocation.offset(),
            allocation.size(),
            self.buffer_size,
            size,
            offset,
            self.device.non_coherent_atom_size(),
        );
        Some(
            vk::MappedMemoryRange::default()
                .memory(unsafe { allocation.memory() })
                .offset(range_offset)
                .size(range_size),
        )
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take()
            && let Err(e) = self
                .device
                .with_allocator(|allocator| Ok(allocator.free(allocation)?))
        {
            error!("Failed to free buffer allocation: {:?}", e);
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed buffer ({} bytes)", self.buffer_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_size_rounds_up() {
        assert_eq!(aligned_size(208, 256), 256);
        assert_eq!(aligned_size(256, 256), 256);
        assert_eq!(aligned_size(257, 256), 512);
        assert_eq!(aligned_size(12, 16), 16);
    }

    #[test]
    fn test_aligned_size_without_requirement() {
        assert_eq!(aligned_size(208, 0), 208);
        assert_eq!(aligned_size(208, 1), 208);
    }

    #[test]
    fn test_mapped_range_rounds_to_atom() {
        // Record at offset 256, 208 bytes, allocation starting at 1024.
        let (offset, size) = mapped_range(1024, 512, 512, 208, 256, 64);
        assert_eq!(offset, 1280);
        assert_eq!(size, 256);
        assert_eq!(offset % 64, 0);
        assert_eq!(size % 64, 0);
    }

    #[test]
    fn test_mapped_range_whole_size() {
        let (offset, size) = mapped_range(0, 512, 512, vk::WHOLE_SIZE, 256, 64);
        assert_eq!(offset, 256);
        assert_eq!(size, 256);
    }

    #[test]
    fn test_mapped_range_unaligned_start() {
        let (offset, size) = mapped_range(100, 1000, 1000, 10, 0, 64);
        assert_eq!(offset, 64);
        // 64..128 covers 100..110.
        assert_eq!(size, 64);
    }

    #[test]
    fn test_mapped_range_never_passes_allocation_end() {
        // A 100 byte allocation: rounding the end to 128 would overrun it.
        let (offset, size) = mapped_range(0, 100, 100, vk::WHOLE_SIZE, 0, 64);
        assert_eq!(offset, 0);
        assert_eq!(size, vk::WHOLE_SIZE);

        // Last record of a buffer at the tail of its allocation.
        let (offset, size) = mapped_range(256, 200, 200, 40, 160, 64);
        assert_eq!(offset, 384);
        assert_eq!(size, vk::WHOLE_SIZE);
    }

    #[test]
    fn test_buffer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Buffer>();
    }
}
