//! Core utilities for the orbit renderer.
//!
//! - Error type and result alias
//! - Logging initialization
//! - Frame timer
//! - Engine configuration loaded from TOML

pub mod config;
mod error;
mod logging;
mod timer;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::{FrameTimer, MAX_FRAME_TIME};
