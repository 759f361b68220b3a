//! Window management using winit.
//!
//! This module provides window creation and Vulkan surface creation functionality.

use std::ffi::c_char;
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use orbit_core::config::WindowConfig;
use orbit_core::{Error, Result};

/// RAII wrapper for a Vulkan surface.
///
/// The surface is destroyed when this struct is dropped. The Vulkan instance
/// must outlive it.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    /// The raw surface handle, valid as long as this `Surface` exists.
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Loader for surface capability, format and present mode queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: the handle was created by ash_window::create_surface with the
        // instance the loader was built from, and is destroyed only here.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        tracing::debug!("Vulkan surface destroyed");
    }
}

/// Application window with a sticky resize flag.
///
/// The app polls [`was_resized`](Window::was_resized) before each frame
/// and forwards the new size to the renderer when it is set.
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
    resized: bool,
}

impl Window {
    /// Creates a resizable window from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Window`] if winit cannot create the window.
    pub fn new(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(config.title.as_str())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        // The platform may not honor the requested size.
        let size = window.inner_size();
        tracing::info!("Window created: {}x{}", size.width, size.height);

        Ok(Self {
            window: Arc::new(window),
            width: size.width,
            height: size.height,
            resized: false,
        })
    }

    #[inline]
    pub fn inner(&self) -> &WinitWindow {
        &self.window
    }

    /// Current framebuffer size. Zero while minimized.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }

    #[inline]
    pub fn is_minimized(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Records a new framebuffer size and raises the resize flag.
    pub fn on_resized(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.resized = true;
        tracing::debug!("Window resized: {}x{}", width, height);
    }

    #[inline]
    pub fn was_resized(&self) -> bool {
        self.resized
    }

    #[inline]
    pub fn reset_resized_flag(&mut self) {
        self.resized = false;
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Instance extensions needed to create a surface for this window.
    ///
    /// The pointers refer to static strings owned by the Vulkan loader.
    ///
    /// # Errors
    ///
    /// Returns an error if the display handle is unavailable or the platform
    /// is not supported by `ash-window`.
    pub fn required_extensions(&self) -> Result<Vec<*const c_char>> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;

        let extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())
            .map_err(|e| Error::Vulkan(format!("Failed to enumerate required extensions: {}", e)))?;

        tracing::debug!(
            "Required Vulkan extensions for surface: {:?}",
            extensions
                .iter()
                // SAFETY: ash_window returns valid, null-terminated static strings.
                .map(|&ext| unsafe { std::ffi::CStr::from_ptr(ext) })
                .collect::<Vec<_>>()
        );

        Ok(extensions.to_vec())
    }

    /// Creates a Vulkan surface for this window.
    ///
    /// # Errors
    ///
    /// Returns an error if the window handles are unavailable or surface
    /// creation fails.
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;

        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(format!("Failed to get window handle: {}", e)))?;

        // SAFETY: entry and instance are valid, the handles come from a live
        // winit window, and Surface::drop destroys the result.
        let handle = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| Error::Vulkan(format!("Failed to create Vulkan surface: {}", e)))?
        };

        let surface_loader = ash::khr::surface::Instance::new(entry, instance);

        tracing::info!("Vulkan surface created");

        Ok(Surface {
            handle,
            surface_loader,
        })
    }
}
