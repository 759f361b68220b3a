//! Platform layer for orbit.
//!
//! - Window management via winit, with a resize flag for the renderer
//! - Vulkan surface creation and its RAII wrapper
//! - Keyboard state

mod input;
mod window;

pub use input::{InputState, KeyCode};
pub use window::{Surface, Window};

// Re-export winit types that users might need
pub use winit::event::{ElementState, KeyEvent, WindowEvent};
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
pub use winit::keyboard::PhysicalKey;
