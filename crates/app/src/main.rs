//! Orbit viewer.
//!
//! Renders the scene named by `[assets] scene` (the built-in scene when
//! unset) with a directional shadow-casting light and orbiting point lights. WASD moves, Q/E move
//! vertically and the arrow keys look around.
//!
//! The configuration file defaults to `config/orbit.toml` and can be given
//! as the first argument.

mod engine;
mod scene;

use anyhow::Result;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::WindowId;

use orbit_core::{EngineConfig, FrameTimer};
use orbit_platform::{InputState, Window};

use crate::engine::Engine;

const DEFAULT_CONFIG_PATH: &str = "config/orbit.toml";

struct App {
    config: EngineConfig,
    // Dropped before the window its surface belongs to.
    engine: Option<Engine>,
    window: Option<Window>,
    input: InputState,
    timer: FrameTimer,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            engine: None,
            window: None,
            input: InputState::new(),
            timer: FrameTimer::new(),
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(window), Some(engine)) = (self.window.as_mut(), self.engine.as_mut()) else {
            return;
        };

        if window.was_resized() {
            let extent = window.extent();
            engine.resize(extent.width, extent.height);
            window.reset_resized_flag();
        }

        let frame_time = self.timer.tick();
        if let Err(e) = engine.draw_frame(&self.input, frame_time) {
            error!("Render error: {:?}", e);
            event_loop.exit();
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::new(event_loop, &self.config.window) {
            Ok(window) => window,
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match Engine::new(&window, &self.config) {
            Ok(engine) => {
                info!("Initialization complete, entering main loop");
                self.engine = Some(engine);
                self.window = Some(window);
                self.timer.reset();
            }
            Err(e) => {
                error!("Failed to initialize renderer: {:?}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = self.window.as_mut() {
                    window.on_resized(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    if event.state.is_pressed() {
                        self.input.on_key_pressed(key);
                    } else {
                        self.input.on_key_released(key);
                    }
                }
            }
            WindowEvent::Focused(false) => self.input.clear(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        self.input.begin_frame();
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Waits for the device before anything is destroyed.
        self.engine = None;
        info!("Shut down after {} frames", self.timer.frame_count());
    }
}

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = EngineConfig::load(&config_path)?;

    orbit_core::init_logging(&config.logging);
    info!("Starting Orbit");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
