//! Semaphores, fences and the per-slot synchronization set.
//!
//! Each frame slot owns a [`FrameSync`]: an image-available semaphore
//! signaled by acquisition, a render-finished semaphore waited on by
//! presentation and an in-flight fence the host waits on before reusing the
//! slot's command buffer and per-frame buffers.
//!
//! ```text
//! wait in_flight ─► acquire (signal image_available)
//!                ─► submit  (wait image_available, signal render_finished + in_flight)
//!                ─► present (wait render_finished)
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Number of frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// RAII wrapper over `VkSemaphore`.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates an unsignaled binary semaphore.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkCreateSemaphore` fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// RAII wrapper over `VkFence`.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence, optionally already signaled so the first wait on it
    /// returns immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkCreateFence` fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };
        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout` nanoseconds pass.
    ///
    /// # Errors
    ///
    /// Returns `VulkanError(TIMEOUT)` on timeout, or the failing result.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout)?
        };
        Ok(())
    }

    /// Returns the fence to the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkResetFences` fails.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe { self.device.handle().reset_fences(&[self.fence])? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization objects of one frame slot.
pub struct FrameSync {
    image_available: Semaphore,
    render_finished: Semaphore,
    in_flight: Fence,
}

impl FrameSync {
    /// Creates the slot's semaphores and a signaled in-flight fence.
    ///
    /// # Errors
    ///
    /// Returns an error if any object cannot be created.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(Arc::clone(&device))?,
            render_finished: Semaphore::new(Arc::clone(&device))?,
            in_flight: Fence::new(device, true)?,
        })
    }

    /// Creates one [`FrameSync`] per frame in flight.
    ///
    /// # Errors
    ///
    /// Returns the first creation error.
    pub fn for_frames_in_flight(device: &Arc<Device>) -> RhiResult<Vec<Self>> {
        let syncs = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| Self::new(Arc::clone(device)))
            .collect::<RhiResult<Vec<_>>>()?;
        debug!("Created synchronization objects for {} frame(s)", syncs.len());
        Ok(syncs)
    }

    #[inline]
    pub fn image_available(&self) -> vk::Semaphore {
        self.image_available.handle()
    }

    #[inline]
    pub fn render_finished(&self) -> vk::Semaphore {
        self.render_finished.handle()
    }

    #[inline]
    pub fn in_flight_fence(&self) -> &Fence {
        &self.in_flight
    }
}
