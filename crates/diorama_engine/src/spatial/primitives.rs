//! Ray, plane and bounding-volume math

use crate::foundation::math::{Mat4, Point3, Vec3};

/// A ray with an origin and a normalized direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// The origin point of the ray in world space
    pub origin: Vec3,
    /// The direction of the ray (normalized)
    pub direction: Vec3,
}

impl Ray {
    /// Creates a new ray with the given origin and direction
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Get a point along the ray at distance t
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Plane defined by a unit normal and signed distance from the origin
///
/// Points `p` on the plane satisfy `normal . p + distance = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector (normalized)
    pub normal: Vec3,
    /// Signed distance term
    pub distance: f32,
}

impl Plane {
    /// Plane through `point` with the given normal
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize();
        Self {
            normal,
            distance: -normal.dot(&point),
        }
    }

    /// Signed distance from a point to the plane (positive = in front)
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }

    /// Intersection of a ray with the plane
    ///
    /// Returns `None` when the ray is parallel to the plane or the hit lies
    /// behind the ray origin.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<Vec3> {
        let denom = self.normal.dot(&ray.direction);
        if denom.abs() < 1e-6 {
            return None;
        }
        let t = -self.distance_to_point(ray.origin) / denom;
        if t < 0.0 {
            return None;
        }
        Some(ray.point_at(t))
    }
}

/// Axis-Aligned Bounding Box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl AABB {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// An inverted box that any `expand` call replaces
    pub fn empty() -> Self {
        Self {
            min: Vec3::repeat(f32::INFINITY),
            max: Vec3::repeat(f32::NEG_INFINITY),
        }
    }

    /// True when no point has been added
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Bounding box of a point set
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Self {
        let mut aabb = Self::empty();
        for point in points {
            aabb.expand(*point);
        }
        aabb
    }

    /// Grow to include a point
    pub fn expand(&mut self, point: Vec3) {
        self.min = self.min.inf(&point);
        self.max = self.max.sup(&point);
    }

    /// Grow to include another box
    pub fn union(&mut self, other: &Self) {
        if other.is_empty() {
            return;
        }
        self.expand(other.min);
        self.expand(other.max);
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// The eight corners
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Box enclosing this box after an affine transform
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        let mut out = Self::empty();
        for corner in self.corners() {
            out.expand(matrix.transform_point(&Point3::from(corner)).coords);
        }
        out
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }
}

/// A bounding sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// The center position of the sphere in world space
    pub center: Vec3,
    /// The radius of the sphere
    pub radius: f32,
}

impl BoundingSphere {
    /// Creates a new bounding sphere with the given center and radius
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Enclosing sphere of a point set
    ///
    /// Ritter's construction seeded with the farthest pair, then grown to
    /// cover outliers. Exact for the corner set of a single box.
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let first = *points.first()?;
        let farthest_from = |from: Vec3| {
            points
                .iter()
                .copied()
                .fold(from, |best, p| {
                    if (p - from).norm_squared() > (best - from).norm_squared() { p } else { best }
                })
        };
        let a = farthest_from(first);
        let b = farthest_from(a);
        let mut center = (a + b) * 0.5;
        let mut radius = (b - a).norm() * 0.5;

        for point in points {
            let distance = (point - center).norm();
            if distance > radius {
                let new_radius = (radius + distance) * 0.5;
                center += (point - center) * ((new_radius - radius) / distance);
                radius = new_radius;
            }
        }
        Some(Self { center, radius })
    }

    /// Whether the point lies inside (with tolerance)
    pub fn contains_point(&self, point: Vec3) -> bool {
        (point - self.center).norm() <= self.radius + 1e-4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_plane_ray_intersection() {
        let plane = Plane::from_point_normal(Vec3::new(0.0, 1.0, 0.0), Vec3::y());
        let ray = Ray::new(Vec3::new(2.0, 5.0, 3.0), Vec3::new(0.0, -1.0, 0.0));
        let hit = plane.intersect_ray(&ray).unwrap();
        assert_relative_eq!(hit, Vec3::new(2.0, 1.0, 3.0), epsilon = 1e-6);
    }

    #[test]
    fn test_plane_parallel_and_behind() {
        let plane = Plane::from_point_normal(Vec3::zeros(), Vec3::y());
        let parallel = Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::x());
        assert!(plane.intersect_ray(&parallel).is_none());
        let away = Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::y());
        assert!(plane.intersect_ray(&away).is_none());
    }

    #[test]
    fn test_aabb_transform_and_union() {
        let unit = AABB::new(Vec3::repeat(-0.5), Vec3::repeat(0.5));
        let moved = unit.transformed(&Mat4::new_translation(&Vec3::new(0.0, 1.0, 0.0)));
        assert_relative_eq!(moved.center(), Vec3::new(0.0, 1.0, 0.0));
        let mut total = AABB::empty();
        assert!(total.is_empty());
        total.union(&unit);
        total.union(&moved);
        assert_relative_eq!(total.max, Vec3::new(0.5, 1.5, 0.5));
    }

    #[test]
    fn test_sphere_encloses_box_corners() {
        let aabb = AABB::new(Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 2.0, 1.0));
        let corners = aabb.corners();
        let sphere = BoundingSphere::from_points(&corners).unwrap();
        assert_relative_eq!(sphere.center, Vec3::new(0.0, 1.0, 0.0), epsilon = 1e-5);
        assert_relative_eq!(sphere.radius, 3.0_f32.sqrt(), epsilon = 1e-5);
        assert!(corners.iter().all(|c| sphere.contains_point(*c)));
    }

    #[test]
    fn test_sphere_grows_for_outliers() {
        let points = [
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 3.0, 0.0),
            Vec3::new(0.0, 0.0, -2.0),
        ];
        let sphere = BoundingSphere::from_points(&points).unwrap();
        assert!(points.iter().all(|p| sphere.contains_point(*p)));
        assert!(BoundingSphere::from_points(&[]).is_none());
    }
}
