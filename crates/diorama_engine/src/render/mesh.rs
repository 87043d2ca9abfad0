//! Mesh representation for 3D models
//!
//! Vertex and index data plus the procedural shapes the scene loader and the
//! transform gizmo build from. Meshes are pure data; the rasterizer reads
//! them directly.

use crate::foundation::math::Vec3;
use crate::spatial::AABB;
use std::f32::consts::{PI, TAU};

/// 3D vertex data structure for rendering
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    /// Position in model space
    pub position: [f32; 3],

    /// Normal vector
    pub normal: [f32; 3],

    /// Texture coordinates
    pub tex_coord: [f32; 2],
}

impl Vertex {
    /// Create a new vertex
    pub fn new(position: [f32; 3], normal: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            tex_coord,
        }
    }
}

/// Triangle mesh
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mesh {
    /// Vertex buffer
    pub vertices: Vec<Vertex>,
    /// Triangle list indices
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Create a mesh from vertex and index data
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Number of triangles
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Model-space bounds
    pub fn bounds(&self) -> AABB {
        let mut aabb = AABB::empty();
        for vertex in &self.vertices {
            aabb.expand(Vec3::from(vertex.position));
        }
        aabb
    }

    /// Append another mesh, shifted by `offset`
    pub fn append(&mut self, other: &Self, offset: Vec3) {
        let base = self.vertices.len() as u32;
        self.vertices.extend(other.vertices.iter().map(|vertex| {
            let position = Vec3::from(vertex.position) + offset;
            Vertex::new(position.into(), vertex.normal, vertex.tex_coord)
        }));
        self.indices.extend(other.indices.iter().map(|index| index + base));
    }

    /// Iterate triangles as vertex triples
    pub fn triangles(&self) -> impl Iterator<Item = [&Vertex; 3]> + '_ {
        self.indices.chunks_exact(3).filter_map(move |tri| {
            Some([
                self.vertices.get(tri[0] as usize)?,
                self.vertices.get(tri[1] as usize)?,
                self.vertices.get(tri[2] as usize)?,
            ])
        })
    }

    /// Axis-aligned box centered at the origin
    pub fn cuboid(width: f32, height: f32, depth: f32) -> Self {
        let (hx, hy, hz) = (width * 0.5, height * 0.5, depth * 0.5);
        // normal, u axis, v axis for each face
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ];
        let half = Vec3::new(hx, hy, hz);
        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, u, v) in faces {
            let (n, u, v) = (Vec3::from(normal), Vec3::from(u), Vec3::from(v));
            let base = vertices.len() as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let p = (n + u * su + v * sv).component_mul(&half);
                vertices.push(Vertex::new(
                    p.into(),
                    normal,
                    [(su + 1.0) * 0.5, (1.0 - sv) * 0.5],
                ));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Self::new(vertices, indices)
    }

    /// UV sphere centered at the origin
    pub fn sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        for ring in 0..=rings {
            let v = ring as f32 / rings as f32;
            let theta = v * PI;
            for segment in 0..=segments {
                let u = segment as f32 / segments as f32;
                let phi = u * TAU;
                let n = Vec3::new(-phi.cos() * theta.sin(), theta.cos(), phi.sin() * theta.sin());
                vertices.push(Vertex::new((n * radius).into(), n.into(), [u, v]));
            }
        }
        let stride = segments + 1;
        for ring in 0..rings {
            for segment in 0..segments {
                let a = ring * stride + segment;
                let b = a + stride;
                indices.extend_from_slice(&[a, b, a + 1, b, b + 1, a + 1]);
            }
        }
        Self::new(vertices, indices)
    }

    /// Plane in the XY plane facing +Z
    pub fn plane(width: f32, height: f32) -> Self {
        let (hx, hy) = (width * 0.5, height * 0.5);
        let normal = [0.0, 0.0, 1.0];
        let vertices = vec![
            Vertex::new([-hx, -hy, 0.0], normal, [0.0, 1.0]),
            Vertex::new([hx, -hy, 0.0], normal, [1.0, 1.0]),
            Vertex::new([hx, hy, 0.0], normal, [1.0, 0.0]),
            Vertex::new([-hx, hy, 0.0], normal, [0.0, 0.0]),
        ];
        Self::new(vertices, vec![0, 1, 2, 0, 2, 3])
    }

    /// Cylinder (or cone when one radius is zero) along +Y, base at y = 0
    pub fn cylinder(radius_top: f32, radius_bottom: f32, height: f32, segments: u32) -> Self {
        let segments = segments.max(3);
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        let slope = (radius_bottom - radius_top) / height.max(f32::EPSILON);
        for segment in 0..=segments {
            let u = segment as f32 / segments as f32;
            let (sin, cos) = (u * TAU).sin_cos();
            let normal = Vec3::new(sin, slope, cos).normalize();
            vertices.push(Vertex::new([radius_bottom * sin, 0.0, radius_bottom * cos], normal.into(), [u, 1.0]));
            vertices.push(Vertex::new([radius_top * sin, height, radius_top * cos], normal.into(), [u, 0.0]));
        }
        for segment in 0..segments {
            let a = segment * 2;
            indices.extend_from_slice(&[a, a + 2, a + 1, a + 1, a + 2, a + 3]);
        }
        // caps
        for (y, radius, normal) in [(0.0, radius_bottom, -1.0), (height, radius_top, 1.0)] {
            if radius <= 0.0 {
                continue;
            }
            let center = vertices.len() as u32;
            vertices.push(Vertex::new([0.0, y, 0.0], [0.0, normal, 0.0], [0.5, 0.5]));
            for segment in 0..=segments {
                let (sin, cos) = (segment as f32 / segments as f32 * TAU).sin_cos();
                vertices.push(Vertex::new(
                    [radius * sin, y, radius * cos],
                    [0.0, normal, 0.0],
                    [0.5 + sin * 0.5, 0.5 + cos * 0.5],
                ));
            }
            for segment in 0..segments {
                indices.extend_from_slice(&[center, center + 1 + segment, center + 2 + segment]);
            }
        }
        Self::new(vertices, indices)
    }

    /// Torus in the XY plane (ring axis +Z)
    pub fn torus(radius: f32, tube: f32, radial_segments: u32, tubular_segments: u32) -> Self {
        let radial = radial_segments.max(3);
        let tubular = tubular_segments.max(3);
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        for j in 0..=radial {
            let v = j as f32 / radial as f32 * TAU;
            for i in 0..=tubular {
                let u = i as f32 / tubular as f32 * TAU;
                let center = Vec3::new(radius * u.cos(), radius * u.sin(), 0.0);
                let position = Vec3::new(
                    (radius + tube * v.cos()) * u.cos(),
                    (radius + tube * v.cos()) * u.sin(),
                    tube * v.sin(),
                );
                let normal = (position - center).normalize();
                vertices.push(Vertex::new(
                    position.into(),
                    normal.into(),
                    [i as f32 / tubular as f32, j as f32 / radial as f32],
                ));
            }
        }
        let stride = tubular + 1;
        for j in 1..=radial {
            for i in 1..=tubular {
                let a = stride * j + i - 1;
                let b = stride * (j - 1) + i - 1;
                let c = stride * (j - 1) + i;
                let d = stride * j + i;
                indices.extend_from_slice(&[a, b, d, b, c, d]);
            }
        }
        Self::new(vertices, indices)
    }
}
