//! Spatial primitives
//!
//! Rays, planes, boxes and spheres used by picking, the transform gizmo,
//! camera framing and AR placement.

pub mod primitives;

pub use primitives::{BoundingSphere, Plane, Ray, AABB};
