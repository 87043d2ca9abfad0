//! Math utilities and types
//!
//! Provides the vector, matrix and rotation aliases used by the scene graph,
//! the camera and the software rasterizer, plus Euler conversions matching the
//! document format (XYZ order, radians).

pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix3, Matrix4,
    Quaternion,
    Unit,
};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Position relative to the parent node
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Build a transform from document arrays (Euler XYZ rotation in radians)
    pub fn from_arrays(position: [f32; 3], rotation: [f32; 3], scale: [f32; 3]) -> Self {
        Self {
            position: Vec3::from(position),
            rotation: quat_from_euler_xyz(Vec3::from(rotation)),
            scale: Vec3::from(scale),
        }
    }

    /// Convert to a transformation matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Rotation expressed as Euler XYZ angles
    pub fn euler_xyz(&self) -> Vec3 {
        euler_xyz_from_quat(&self.rotation)
    }
}

/// Quaternion from intrinsic XYZ Euler angles (`R = Rx * Ry * Rz`)
pub fn quat_from_euler_xyz(euler: Vec3) -> Quat {
    let qx = Quat::from_axis_angle(&Vec3::x_axis(), euler.x);
    let qy = Quat::from_axis_angle(&Vec3::y_axis(), euler.y);
    let qz = Quat::from_axis_angle(&Vec3::z_axis(), euler.z);
    qx * qy * qz
}

/// Intrinsic XYZ Euler angles of a rotation
pub fn euler_xyz_from_quat(rotation: &Quat) -> Vec3 {
    let m = rotation.to_rotation_matrix();
    let m = m.matrix();
    let m13 = m[(0, 2)];
    let y = m13.clamp(-1.0, 1.0).asin();
    if m13.abs() < 0.999_999_9 {
        let x = (-m[(1, 2)]).atan2(m[(2, 2)]);
        let z = (-m[(0, 1)]).atan2(m[(0, 0)]);
        Vec3::new(x, y, z)
    } else {
        let x = m[(2, 1)].atan2(m[(1, 1)]);
        Vec3::new(x, y, 0.0)
    }
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Pi / 2
    pub const HALF_PI: f32 = PI * 0.5;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;

    /// Radians to degrees conversion factor
    pub const RAD_TO_DEG: f32 = 180.0 / PI;
}

/// Math utility functions
pub mod utils {
    use super::constants;

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }

    /// Convert radians to degrees
    pub fn rad_to_deg(radians: f32) -> f32 {
        radians * constants::RAD_TO_DEG
    }
}

/// Extension trait for Mat4 with projection helpers
pub trait Mat4Ext {
    /// Create a perspective projection matrix mapping view depth to `[0, 1]`
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Create a right-handed look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;

    /// Axis flip taking Y-up view space to the Y-down, Z-forward clip convention
    /// used by the rasterizer (NDC y = -1 is the top row of pixels)
    fn y_down_coordinate_transform() -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        let tan_half_fovy = (fov_y * 0.5).tan();

        let mut result = Mat4::zeros();
        result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
        result[(1, 1)] = 1.0 / tan_half_fovy;
        result[(2, 2)] = far / (far - near);
        result[(2, 3)] = -(near * far) / (far - near);
        result[(3, 2)] = 1.0;

        result
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        let forward = (target - eye).normalize();
        let mut right = forward.cross(&up);
        if right.norm_squared() < 1e-12 {
            // up parallel to the view direction; pick any perpendicular
            right = forward.cross(&Vec3::z()).try_normalize(1e-6).unwrap_or_else(Vec3::x);
        }
        let right = right.normalize();
        let camera_up = right.cross(&forward);

        let translation = Mat4::new(
            1.0, 0.0, 0.0, -eye.x,
            0.0, 1.0, 0.0, -eye.y,
            0.0, 0.0, 1.0, -eye.z,
            0.0, 0.0, 0.0, 1.0,
        );

        let rotation = Mat4::new(
            right.x, right.y, right.z, 0.0,
            camera_up.x, camera_up.y, camera_up.z, 0.0,
            -forward.x, -forward.y, -forward.z, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );

        rotation * translation
    }

    fn y_down_coordinate_transform() -> Mat4 {
        Mat4::new(
            1.0,  0.0,  0.0, 0.0,
            0.0, -1.0,  0.0, 0.0,
            0.0,  0.0, -1.0, 0.0,
            0.0,  0.0,  0.0, 1.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_euler_round_trip() {
        let euler = Vec3::new(0.3, -0.7, 1.2);
        let q = quat_from_euler_xyz(euler);
        let back = euler_xyz_from_quat(&q);
        assert_relative_eq!(back, euler, epsilon = 1e-5);
    }

    #[test]
    fn test_euler_order_is_xyz() {
        // Rx * Ry: rotating +Z by y first then x
        let q = quat_from_euler_xyz(Vec3::new(constants::HALF_PI, constants::HALF_PI, 0.0));
        let v = q * Vec3::z();
        // Ry(90) takes +Z to +X, Rx(90) leaves +X alone
        assert_relative_eq!(v, Vec3::x(), epsilon = 1e-5);
    }

    #[test]
    fn test_perspective_maps_near_far_to_unit_depth() {
        let proj = Mat4::perspective(utils::deg_to_rad(45.0), 1.0, 0.1, 100.0);
        let near = proj * Vec4::new(0.0, 0.0, 0.1, 1.0);
        let far = proj * Vec4::new(0.0, 0.0, 100.0, 1.0);
        assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-5);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-5);
    }
}
