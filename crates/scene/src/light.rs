//! Light components.

use glam::Vec3;

/// Point light component. The light sits at its object's translation and
/// its billboard radius is the object's X scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLight {
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

/// Sun-like light used for the diffuse term and as the shadow caster.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels, normalized.
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize(),
            color,
            intensity,
        }
    }
}

impl Default for DirectionalLight {
    fn default() -> Self {
        // From above, slightly to the side and front. +Y is down.
        Self::new(Vec3::new(1.0, 3.0, 1.0), Vec3::ONE, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directional_light_normalizes_direction() {
        let light = DirectionalLight::new(Vec3::new(0.0, 4.0, 0.0), Vec3::ONE, 0.5);
        assert_eq!(light.direction, Vec3::Y);
        assert!((DirectionalLight::default().direction.length() - 1.0).abs() < 1e-6);
    }
}
