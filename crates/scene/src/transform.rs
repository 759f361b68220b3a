//! Transform component for scene objects and the viewer.
//!
//! # Axis convention
//!
//! World space has **+X right, -Y up and +Z forward**, so +Y points down
//! exactly like Vulkan clip space and no projection flip is needed. Rotations about the Y axis use the axis `(0, -1, 0)`, which makes a
//! positive yaw turn left (towards -X) and a positive pitch about the local X
//! axis look up (towards -Y).
//!
//! Euler angles are stored as `Vec3 { x: pitch, y: yaw, z: roll }` and
//! composed yaw, then pitch, then roll: `R = Ry(yaw) * Rx(pitch) * Rz(roll)`.
//!
//! # Example
//!
//! ```
//! use orbit_scene::Transform;
//! use glam::Vec3;
//!
//! let mut viewer = Transform::new().with_translation(Vec3::new(0.0, -1.0, -2.5));
//! viewer.rotate_global_y(0.1);
//! let model = viewer.mat4();
//! ```

use glam::{EulerRot, Mat3, Mat4, Quat, Vec3};

/// World up. Y points down, so up is negative Y.
pub const WORLD_UP: Vec3 = Vec3::NEG_Y;

/// Axis used for every rotation about Y.
const YAW_AXIS: Vec3 = Vec3::NEG_Y;

/// Translation, orientation and scale of one object.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    /// Per-axis scale. Must not contain zero components.
    pub scale: Vec3,
    /// Unit quaternion, renormalized after every composition.
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_translation(mut self, translation: Vec3) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation.normalize();
        self
    }

    /// Model matrix `T * R * S`.
    pub fn mat4(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Matrix that transforms normals into world space.
    ///
    /// This is the inverse transpose of the upper 3x3 of [`mat4`](Self::mat4).
    /// Since `R` is orthonormal that reduces to `R * S^-1`.
    pub fn normal_matrix(&self) -> Mat3 {
        Mat3::from_quat(self.rotation) * Mat3::from_diagonal(self.scale.recip())
    }

    pub fn rotate_global_x(&mut self, angle: f32) {
        self.pre_multiply(Quat::from_axis_angle(Vec3::X, angle));
    }

    pub fn rotate_global_y(&mut self, angle: f32) {
        self.pre_multiply(Quat::from_axis_angle(YAW_AXIS, angle));
    }

    pub fn rotate_global_z(&mut self, angle: f32) {
        self.pre_multiply(Quat::from_axis_angle(Vec3::Z, angle));
    }

    pub fn rotate_local_x(&mut self, angle: f32) {
        self.post_multiply(Quat::from_axis_angle(Vec3::X, angle));
    }

    pub fn rotate_local_y(&mut self, angle: f32) {
        self.post_multiply(Quat::from_axis_angle(YAW_AXIS, angle));
    }

    pub fn rotate_local_z(&mut self, angle: f32) {
        self.post_multiply(Quat::from_axis_angle(Vec3::Z, angle));
    }

    /// Rotates about the world axes by `qx * qy * qz`.
    pub fn euler_rotate_global(&mut self, angles: Vec3) {
        self.pre_multiply(euler_xyz(angles));
    }

    /// Rotates about the object's own axes by `qx * qy * qz`.
    pub fn euler_rotate_local(&mut self, angles: Vec3) {
        self.post_multiply(euler_xyz(angles));
    }

    /// Replaces the orientation with `angles` (`x` pitch, `y` yaw, `z` roll).
    pub fn set_euler(&mut self, angles: Vec3) {
        self.rotation = Quat::from_euler(EulerRot::YXZ, -angles.y, angles.x, angles.z).normalize();
    }

    /// Yaw in radians, positive to the left.
    pub fn yaw(&self) -> f32 {
        -self.rotation.normalize().to_euler(EulerRot::YXZ).0
    }

    /// Pitch in radians, positive up.
    pub fn pitch(&self) -> f32 {
        self.rotation.normalize().to_euler(EulerRot::YXZ).1
    }

    pub fn roll(&self) -> f32 {
        self.rotation.normalize().to_euler(EulerRot::YXZ).2
    }

    /// The object's +Z axis in world space.
    pub fn forward(&self) -> Vec3 {
        basis(self.rotation).2
    }

    /// The object's +X axis in world space.
    pub fn right(&self) -> Vec3 {
        basis(self.rotation).0
    }

    /// The object's +Y axis in world space.
    pub fn down(&self) -> Vec3 {
        basis(self.rotation).1
    }

    fn pre_multiply(&mut self, q: Quat) {
        self.rotation = (q * self.rotation).normalize();
    }

    fn post_multiply(&mut self, q: Quat) {
        self.rotation = (self.rotation * q).normalize();
    }
}

fn euler_xyz(angles: Vec3) -> Quat {
    Quat::from_axis_angle(Vec3::X, angles.x)
        * Quat::from_axis_angle(YAW_AXIS, angles.y)
        * Quat::from_axis_angle(Vec3::Z, angles.z)
}

/// Rotated X, Y and Z axes of a unit quaternion, i.e. the columns of its
/// rotation matrix, computed directly from the components.
pub(crate) fn basis(q: Quat) -> (Vec3, Vec3, Vec3) {
    let [x, y, z, w] = q.to_array();
    let right = Vec3::new(
        1.0 - 2.0 * (y * y + z * z),
        2.0 * (x * y + z * w),
        2.0 * (x * z - y * w),
    );
    let down = Vec3::new(
        2.0 * (x * y - z * w),
        1.0 - 2.0 * (x * x + z * z),
        2.0 * (y * z + x * w),
    );
    let forward = Vec3::new(
        2.0 * (x * z + y * w),
        2.0 * (y * z - x * w),
        1.0 - 2.0 * (x * x + y * y),
    );
    (right, down, forward)
}
