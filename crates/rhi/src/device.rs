//! Vulkan logical device, queues and memory allocator.
//!
//! The [`Device`] is shared as `Arc<Device>` by every RAII wrapper in this
//! crate. Besides the queues and the gpu-allocator it exposes the device
//! limits the buffer layer needs and a transient command pool for one-shot
//! uploads and layout transitions.
//!
//! # Example
//!
//! ```no_run
//! use orbit_rhi::device::Device;
//! use orbit_rhi::instance::Instance;
//! use orbit_rhi::physical_device::select_physical_device;
//! use ash::vk;
//!
//! let instance = Instance::new("orbit", &[], false).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let info = select_physical_device(instance.handle(), surface, &surface_loader)
//!     .expect("No suitable GPU found");
//! let device = Device::new(&instance, &info).expect("Failed to create logical device");
//!
//! let cmd = device.begin_single_time_commands().expect("Failed to begin commands");
//! // ... record copies or barriers ...
//! device.end_single_time_commands(cmd).expect("Failed to submit commands");
//! ```

use std::sync::{Arc, Mutex};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices, REQUIRED_DEVICE_EXTENSIONS};

/// Vulkan logical device wrapper.
///
/// # Thread Safety
///
/// Shared across threads through `Arc`. The allocator and the transient
/// command pool are each guarded by a `Mutex`.
pub struct Device {
    device: ash::Device,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    swapchain_loader: ash::khr::swapchain::Device,
    allocator: Mutex<Option<Allocator>>,
    transient_pool: Mutex<vk::CommandPool>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    queue_families: QueueFamilyIndices,
}

impl Device {
    /// Creates the logical device, retrieves its queues and initializes the
    /// memory allocator.
    ///
    /// # Arguments
    ///
    /// * `instance` - The Vulkan instance
    /// * `physical_device_info` - The GPU returned by
    ///   [`select_physical_device`](crate::physical_device::select_physical_device)
    ///
    /// # Errors
    ///
    /// Returns an error if device creation, command pool creation or
    /// allocator initialization fails.
    pub fn new(instance: &Instance, physical_device_info: &PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let queue_families = physical_device_info.queue_families;
        let (Some(graphics_family), Some(present_family)) =
            (queue_families.graphics_family, queue_families.present_family)
        else {
            return Err(RhiError::NoSuitableGpu);
        };

        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);
        let extension_names: Vec<*const std::ffi::c_char> =
            REQUIRED_DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };
        info!(
            "Logical device created with {} extension(s)",
            extension_names.len()
        );

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        debug!(
            "Queues retrieved (graphics family {}, present family {})",
            graphics_family, present_family
        );

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(graphics_family)
            .flags(
                vk::CommandPoolCreateFlags::TRANSIENT
                    | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            );
        let transient_pool = unsafe { device.create_command_pool(&pool_info, None)? };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device_info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;
        info!("GPU memory allocator initialized");

        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), &device);

        Ok(Arc::new(Self {
            device,
            instance: instance.handle().clone(),
            physical_device: physical_device_info.device,
            properties: physical_device_info.properties,
            swapchain_loader,
            allocator: Mutex::new(Some(allocator)),
            transient_pool: Mutex::new(transient_pool),
            graphics_queue,
            present_queue,
            queue_families,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the instance the device was created from.
    #[inline]
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the `VK_KHR_swapchain` function table.
    #[inline]
    pub fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Runs `f` with exclusive access to the allocator.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if the allocator lock is poisoned
    /// or the allocator is already gone, otherwise whatever `f` returns.
    pub fn with_allocator<R>(
        &self,
        f: impl FnOnce(&mut Allocator) -> RhiResult<R>,
    ) -> RhiResult<R> {
        let mut guard = self
            .allocator
            .lock()
            .map_err(|_| RhiError::InvalidHandle("Allocator lock poisoned".into()))?;
        let allocator = guard
            .as_mut()
            .ok_or_else(|| RhiError::InvalidHandle("Allocator already destroyed".into()))?;
        f(allocator)
    }

    /// Returns the device limits.
    #[inline]
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.properties.limits
    }

    #[inline]
    pub fn min_uniform_buffer_offset_alignment(&self) -> vk::DeviceSize {
        self.properties.limits.min_uniform_buffer_offset_alignment
    }

    #[inline]
    pub fn min_storage_buffer_offset_alignment(&self) -> vk::DeviceSize {
        self.properties.limits.min_storage_buffer_offset_alignment
    }

    #[inline]
    pub fn non_coherent_atom_size(&self) -> vk::DeviceSize {
        self.properties.limits.non_coherent_atom_size
    }

    #[inline]
    pub fn max_sampler_anisotropy(&self) -> f32 {
        self.properties.limits.max_sampler_anisotropy
    }

    /// Returns the first format in `candidates` whose tiling features
    /// contain `features`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::UnsupportedFormat`] with the number of candidates
    /// tried when none qualifies.
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> RhiResult<vk::Format> {
        candidates
            .iter()
            .copied()
            .find(|&format| {
                let props = unsafe {
                    self.instance
                        .get_physical_device_format_properties(self.physical_device, format)
                };
                select_tiling_features(&props, tiling).contains(features)
            })
            .ok_or(RhiError::UnsupportedFormat(candidates.len()))
    }

    /// Allocates a primary command buffer from the transient pool and begins
    /// recording with `ONE_TIME_SUBMIT`.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation or `vkBeginCommandBuffer` fails.
    pub fn begin_single_time_commands(&self) -> RhiResult<vk::CommandBuffer> {
        let pool = self.lock_transient_pool()?;
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let cmd = unsafe { self.device.allocate_command_buffers(&alloc_info)? }[0];
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(cmd, &begin_info)? };

        Ok(cmd)
    }

    /// Ends `cmd`, submits it to the graphics queue, waits for the queue to
    /// drain and frees the command buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if ending, submitting or waiting fails. The command
    /// buffer is freed in every case.
    pub fn end_single_time_commands(&self, cmd: vk::CommandBuffer) -> RhiResult<()> {
        let pool = self.lock_transient_pool()?;
        let command_buffers = [cmd];

        let result = unsafe {
            self.device.end_command_buffer(cmd).and_then(|()| {
                let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
                self.device
                    .queue_submit(self.graphics_queue, &[submit_info], vk::Fence::null())?;
                self.device.queue_wait_idle(self.graphics_queue)
            })
        };

        unsafe { self.device.free_command_buffers(*pool, &command_buffers) };
        result.map_err(RhiError::from)
    }

    /// Blocks until every queue of the device is idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    fn lock_transient_pool(&self) -> RhiResult<std::sync::MutexGuard<'_, vk::CommandPool>> {
        self.transient_pool
            .lock()
            .map_err(|_| RhiError::InvalidHandle("Transient command pool lock poisoned".into()))
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }

            if let Ok(pool) = self.transient_pool.get_mut() {
                self.device.destroy_command_pool(*pool, None);
            }

            // The allocator frees its memory blocks through the device.
            if let Ok(allocator) = self.allocator.get_mut() {
                allocator.take();
            }

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: the ash tables and handles are plain data; the allocator and the
// transient pool are behind mutexes.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

fn select_tiling_features(
    props: &vk::FormatProperties,
    tiling: vk::ImageTiling,
) -> vk::FormatFeatureFlags {
    match tiling {
        vk::ImageTiling::LINEAR => props.linear_tiling_features,
        _ => props.optimal_tiling_features,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }

    #[test]
    fn test_select_tiling_features() {
        let props = vk::FormatProperties {
            linear_tiling_features: vk::FormatFeatureFlags::SAMPLED_IMAGE,
            optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            buffer_features: vk::FormatFeatureFlags::empty(),
        };

        assert_eq!(
            select_tiling_features(&props, vk::ImageTiling::LINEAR),
            vk::FormatFeatureFlags::SAMPLED_IMAGE
        );
        assert!(
            select_tiling_features(&props, vk::ImageTiling::OPTIMAL)
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        );
    }
}
