//! Cameras: view and projection matrices.
//!
//! Projections map view-space depth to `[0, 1]` and keep +Y pointing down,
//! matching Vulkan clip space directly (see the axis convention in
//! [`crate::transform`]). View space looks down +Z.

use glam::{Mat4, Quat, Vec3, Vec4};

use crate::transform::basis;

/// Projection, view and inverse view of one viewpoint.
///
/// Cameras are cheap to rebuild and are recomputed every frame from the
/// viewer transform or the light direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    projection: Mat4,
    view: Mat4,
    inverse_view: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            inverse_view: Mat4::IDENTITY,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Box projection. `top` is the smaller Y value since +Y points down.
    pub fn set_orthographic_projection(
        &mut self,
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
        near: f32,
        far: f32,
    ) {
        // glam's `top` is the edge mapped to clip +1, which is our bottom.
        self.projection = Mat4::orthographic_lh(left, right, top, bottom, near, far);
    }

    /// Perspective projection with vertical field of view `fov_y` radians.
    ///
    /// # Panics
    ///
    /// Panics unless `aspect > 0` and `0 < near < far`.
    pub fn set_perspective_projection(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        assert!(aspect > f32::EPSILON, "aspect ratio must be positive");
        assert!(near > 0.0 && near < far, "require 0 < near < far");
        self.projection = Mat4::perspective_lh(fov_y, aspect, near, far);
    }

    /// Looks from `position` along `direction`.
    pub fn set_view_direction(&mut self, position: Vec3, direction: Vec3, up: Vec3) {
        let w = direction.normalize();
        let u = w.cross(up).normalize();
        let v = w.cross(u);
        self.set_view_basis(position, u, v, w);
    }

    /// Looks from `position` at `target`.
    pub fn set_view_target(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        self.set_view_direction(position, target - position, up);
    }

    /// First-person view from a position and orientation, such as the
    /// viewer's [`Transform`](crate::Transform).
    pub fn set_view_quat(&mut self, position: Vec3, orientation: Quat) {
        let (u, v, w) = basis(orientation.normalize());
        self.set_view_basis(position, u, v, w);
    }

    /// Builds view and inverse view from an orthonormal right/down/forward
    /// basis, transposing instead of inverting.
    fn set_view_basis(&mut self, position: Vec3, u: Vec3, v: Vec3, w: Vec3) {
        self.view = Mat4::from_cols(
            Vec4::new(u.x, v.x, w.x, 0.0),
            Vec4::new(u.y, v.y, w.y, 0.0),
            Vec4::new(u.z, v.z, w.z, 0.0),
            Vec4::new(-u.dot(position), -v.dot(position), -w.dot(position), 1.0),
        );
        self.inverse_view = Mat4::from_cols(
            u.extend(0.0),
            v.extend(0.0),
            w.extend(0.0),
            position.extend(1.0),
        );
    }

    #[inline]
    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    #[inline]
    pub fn view(&self) -> Mat4 {
        self.view
    }

    #[inline]
    pub fn inverse_view(&self) -> Mat4 {
        self.inverse_view
    }

    /// Camera position in world space.
    #[inline]
    pub fn position(&self) -> Vec3 {
        self.inverse_view.w_axis.truncate()
    }

    #[inline]
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}
