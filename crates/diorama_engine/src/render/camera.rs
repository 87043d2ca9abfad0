//! # 3D Camera
//!
//! Perspective camera with the projection chain `P * X * V`: a right-handed
//! Y-up view matrix, an axis flip to Y-down/Z-forward, and a projection
//! mapping view depth to `[0, 1]`. NDC x runs -1 (left) to 1 (right) and NDC
//! y runs -1 (top) to 1 (bottom), matching pixel rows.

use crate::foundation::math::{utils, Mat4, Mat4Ext, Quat, Vec3, Vec4};
use crate::spatial::Ray;

/// 3D perspective camera
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,

    /// Point the camera is looking at in world space
    pub target: Vec3,

    /// Up vector for camera orientation (typically [0, 1, 0])
    pub up: Vec3,

    /// Vertical field of view in radians
    pub fov: f32,

    /// Aspect ratio (width / height)
    pub aspect: f32,

    /// Distance to near clipping plane
    pub near: f32,

    /// Distance to far clipping plane
    pub far: f32,
}

impl Camera {
    /// Create a new perspective camera looking at the origin
    ///
    /// # Arguments
    /// * `position` - Camera position in world space
    /// * `fov_degrees` - Vertical field of view in degrees
    /// * `aspect` - Aspect ratio (width / height) of the viewport
    /// * `near` - Distance to near clipping plane (must be > 0)
    /// * `far` - Distance to far clipping plane (must be > near)
    pub fn perspective(position: Vec3, fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            target: Vec3::zeros(),
            up: Vec3::new(0.0, 1.0, 0.0),
            fov: utils::deg_to_rad(fov_degrees),
            aspect,
            near,
            far,
        }
    }

    /// Field of view in degrees (the unit used by documents)
    pub fn fov_degrees(&self) -> f32 {
        utils::rad_to_deg(self.fov)
    }

    /// Set the field of view in degrees
    pub fn set_fov_degrees(&mut self, degrees: f32) {
        self.fov = utils::deg_to_rad(degrees);
    }

    /// Update camera aspect ratio for viewport changes
    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        if (self.aspect - aspect).abs() > 0.01 {
            log::debug!("Camera aspect ratio changed: {:.3} -> {:.3}", self.aspect, aspect);
        }
        self.aspect = aspect;
    }

    /// Unit view direction
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position)
            .try_normalize(1e-9)
            .unwrap_or_else(|| -Vec3::z())
    }

    /// Orientation taking -Z forward and +Y up into the current view basis
    pub fn orientation(&self) -> Quat {
        let forward = self.forward();
        Quat::face_towards(&-forward, &self.up)
    }

    /// Re-aim the camera from an orientation, keeping the target distance
    pub fn set_orientation(&mut self, rotation: &Quat) {
        let distance = (self.target - self.position).norm().max(1.0);
        self.target = self.position + rotation * (-Vec3::z()) * distance;
        self.up = rotation * Vec3::y();
    }

    /// World-to-view transformation
    pub fn get_view_matrix(&self) -> Mat4 {
        Mat4::look_at(self.position, self.target, self.up)
    }

    /// Perspective projection matrix
    pub fn get_projection_matrix(&self) -> Mat4 {
        Mat4::perspective(self.fov, self.aspect, self.near, self.far)
    }

    /// Combined `P * X * V` transform
    pub fn get_view_projection_matrix(&self) -> Mat4 {
        self.get_projection_matrix() * Mat4::y_down_coordinate_transform() * self.get_view_matrix()
    }

    /// Project a world point to NDC (x, y) and depth in `[0, 1]`
    ///
    /// Returns `None` for points behind the camera.
    pub fn project(&self, point: Vec3) -> Option<Vec3> {
        let clip = self.get_view_projection_matrix() * Vec4::new(point.x, point.y, point.z, 1.0);
        if clip.w <= f32::EPSILON {
            return None;
        }
        Some(Vec3::new(clip.x / clip.w, clip.y / clip.w, clip.z / clip.w))
    }

    /// Un-project NDC coordinates at a depth in `[0, 1]` back to world space
    pub fn unproject(&self, ndc_x: f32, ndc_y: f32, depth: f32) -> Option<Vec3> {
        let inverse = self.get_view_projection_matrix().try_inverse()?;
        let world = inverse * Vec4::new(ndc_x, ndc_y, depth, 1.0);
        if world.w.abs() <= f32::EPSILON {
            return None;
        }
        Some(Vec3::new(world.x / world.w, world.y / world.w, world.z / world.w))
    }

    /// Convert NDC coordinates to a world-space ray from the camera position
    pub fn screen_to_world_ray(&self, ndc_x: f32, ndc_y: f32) -> Option<Ray> {
        let near = self.unproject(ndc_x, ndc_y, 0.0)?;
        let far = self.unproject(ndc_x, ndc_y, 1.0)?;
        let direction = (far - near).try_normalize(1e-9)?;
        Some(Ray::new(self.position, direction))
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 3.0, 3.0),
            target: Vec3::zeros(),
            up: Vec3::new(0.0, 1.0, 0.0),
            fov: std::f32::consts::FRAC_PI_4,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> Camera {
        let mut camera = Camera::perspective(Vec3::new(0.0, 0.0, 10.0), 60.0, 1.0, 0.1, 100.0);
        camera.target = Vec3::zeros();
        camera
    }

    #[test]
    fn test_target_projects_to_center() {
        let ndc = camera().project(Vec3::zeros()).unwrap();
        assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn test_up_is_top_of_screen_and_right_is_right() {
        let cam = camera();
        assert!(cam.project(Vec3::new(0.0, 1.0, 0.0)).unwrap().y < 0.0);
        assert!(cam.project(Vec3::new(1.0, 0.0, 0.0)).unwrap().x > 0.0);
    }

    #[test]
    fn test_behind_camera_is_rejected() {
        assert!(camera().project(Vec3::new(0.0, 0.0, 20.0)).is_none());
    }

    #[test]
    fn test_unproject_inverts_project() {
        let cam = camera();
        let point = Vec3::new(1.5, -0.5, 2.0);
        let ndc = cam.project(point).unwrap();
        let back = cam.unproject(ndc.x, ndc.y, ndc.z).unwrap();
        assert_relative_eq!(back, point, epsilon = 1e-3);
    }

    #[test]
    fn test_center_ray_points_at_target() {
        let ray = camera().screen_to_world_ray(0.0, 0.0).unwrap();
        assert_relative_eq!(ray.direction, Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-5);
    }

    #[test]
    fn test_orientation_round_trip() {
        let mut cam = camera();
        let q = cam.orientation();
        assert_relative_eq!(q * -Vec3::z(), cam.forward(), epsilon = 1e-5);
        cam.set_orientation(&Quat::from_axis_angle(&Vec3::y_axis(), std::f32::consts::FRAC_PI_2));
        // facing -X after a quarter turn left
        assert_relative_eq!(cam.forward(), -Vec3::x(), epsilon = 1e-5);
    }
}
