//! Scene data for orbit.
//!
//! - [`Transform`] and [`Camera`] math (see [`transform`] for the axis
//!   convention)
//! - [`KeyboardController`] for the free-flying viewer
//! - light components
//! - [`GameObject`] and the [`World`] that owns them

pub mod camera;
pub mod controller;
pub mod light;
pub mod object;
pub mod transform;

pub use camera::Camera;
pub use controller::{KeyMappings, KeyboardController};
pub use light::{DirectionalLight, PointLight};
pub use object::{GameObject, ObjectId, World};
pub use transform::{Transform, WORLD_UP};
