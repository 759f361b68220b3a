//! Error type shared by the orbit crates above the GPU layer.

use thiserror::Error;

/// Main error type for orbit.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan errors surfaced outside `orbit_rhi`, such as surface creation.
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// Resource loading errors
    #[error("Resource error: {0}")]
    Resource(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration or scene description.
    #[error("Config error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result type alias using orbit's Error type.
pub type Result<T> = std::result::Result<T, Error>;
