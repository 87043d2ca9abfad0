//! Deterministic CPU rasterizer
//!
//! Triangles are transformed by `view_proj * model`, mapped from NDC to
//! pixel space and scan-converted with edge functions sampled at pixel
//! centres. Attributes are interpolated perspective-correctly. Triangles
//! with a vertex behind the eye are dropped rather than clipped.

use super::framebuffer::{Framebuffer, Rect};
use super::material::Side;
use super::mesh::Mesh;
use crate::foundation::math::{Mat3, Mat4, Vec2, Vec3, Vec4};

/// Fixed-function state for one draw
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterState {
    /// Reject fragments behind the stored depth
    pub depth_test: bool,
    /// Store fragment depth
    pub depth_write: bool,
    /// Restrict writes to a rectangle
    pub scissor: Option<Rect>,
    /// Faces to draw, by screen winding
    pub faces: Side,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            scissor: None,
            faces: Side::Double,
        }
    }
}

/// Interpolated fragment inputs
#[derive(Debug, Clone, Copy)]
pub struct Fragment {
    /// Pixel column
    pub x: u32,
    /// Pixel row
    pub y: u32,
    /// Depth in `[0, 1]`
    pub depth: f32,
    /// World-space position
    pub world: Vec3,
    /// World-space normal (unnormalized)
    pub normal: Vec3,
    /// Texture coordinates
    pub uv: Vec2,
}

#[derive(Clone, Copy)]
struct ScreenVertex {
    x: f32,
    y: f32,
    z: f32,
    inv_w: f32,
    world: Vec3,
    normal: Vec3,
    uv: Vec2,
}

fn to_screen(clip: Vec4, width: u32, height: u32) -> Option<(f32, f32, f32, f32)> {
    if clip.w <= 1e-6 {
        return None;
    }
    let inv_w = 1.0 / clip.w;
    let ndc_x = clip.x * inv_w;
    let ndc_y = clip.y * inv_w;
    Some((
        (ndc_x + 1.0) * 0.5 * width as f32,
        (ndc_y + 1.0) * 0.5 * height as f32,
        clip.z * inv_w,
        inv_w,
    ))
}

fn bounds(width: u32, height: u32, scissor: Option<Rect>) -> (u32, u32, u32, u32) {
    match scissor {
        Some(rect) => (
            rect.x.min(width),
            rect.y.min(height),
            (rect.x + rect.width).min(width),
            (rect.y + rect.height).min(height),
        ),
        None => (0, 0, width, height),
    }
}

fn edge(ax: f32, ay: f32, bx: f32, by: f32, px: f32, py: f32) -> f32 {
    (bx - ax) * (py - ay) - (by - ay) * (px - ax)
}

/// Draw a triangle mesh
///
/// `shade` receives each covered fragment and the current pixel value and
/// returns the new value, or `None` to discard the fragment.
pub fn draw_mesh<T: Copy>(
    target: &mut Framebuffer<T>,
    mesh: &Mesh,
    model: &Mat4,
    view_proj: &Mat4,
    state: &RasterState,
    shade: &mut dyn FnMut(&Fragment, T) -> Option<T>,
) {
    let (width, height) = (target.width(), target.height());
    if width == 0 || height == 0 {
        return;
    }
    let mvp = view_proj * model;
    let normal_matrix: Mat3 = model
        .fixed_view::<3, 3>(0, 0)
        .into_owned()
        .try_inverse()
        .map_or_else(Mat3::identity, |m| m.transpose());

    let transformed: Vec<Option<ScreenVertex>> = mesh
        .vertices
        .iter()
        .map(|vertex| {
            let p = Vec4::new(vertex.position[0], vertex.position[1], vertex.position[2], 1.0);
            let (x, y, z, inv_w) = to_screen(mvp * p, width, height)?;
            let world = model * p;
            Some(ScreenVertex {
                x,
                y,
                z,
                inv_w,
                world: world.xyz(),
                normal: normal_matrix * Vec3::from(vertex.normal),
                uv: Vec2::from(vertex.tex_coord),
            })
        })
        .collect();

    let (min_x, min_y, max_x, max_y) = bounds(width, height, state.scissor);

    for tri in mesh.indices.chunks_exact(3) {
        let fetch = |i: u32| transformed.get(i as usize).copied().flatten();
        let (Some(a), Some(b), Some(c)) = (fetch(tri[0]), fetch(tri[1]), fetch(tri[2])) else {
            continue;
        };
        let area = edge(a.x, a.y, b.x, b.y, c.x, c.y);
        if area.abs() <= f32::EPSILON {
            continue;
        }
        match state.faces {
            Side::Front if area < 0.0 => continue,
            Side::Back if area > 0.0 => continue,
            _ => {}
        }

        let x0 = (a.x.min(b.x).min(c.x).floor().max(0.0) as u32).max(min_x);
        let y0 = (a.y.min(b.y).min(c.y).floor().max(0.0) as u32).max(min_y);
        let x1 = (a.x.max(b.x).max(c.x).ceil().max(0.0) as u32).min(max_x);
        let y1 = (a.y.max(b.y).max(c.y).ceil().max(0.0) as u32).min(max_y);

        for py in y0..y1 {
            for px in x0..x1 {
                let sx = px as f32 + 0.5;
                let sy = py as f32 + 0.5;
                let w0 = edge(b.x, b.y, c.x, c.y, sx, sy) / area;
                let w1 = edge(c.x, c.y, a.x, a.y, sx, sy) / area;
                let w2 = edge(a.x, a.y, b.x, b.y, sx, sy) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }

                let depth = w0 * a.z + w1 * b.z + w2 * c.z;
                if !(0.0..=1.0).contains(&depth) {
                    continue;
                }
                if state.depth_test && depth >= target.depth_at(px, py).unwrap_or(1.0) {
                    continue;
                }

                let inv_w = w0 * a.inv_w + w1 * b.inv_w + w2 * c.inv_w;
                let (p0, p1, p2) = (
                    w0 * a.inv_w / inv_w,
                    w1 * b.inv_w / inv_w,
                    w2 * c.inv_w / inv_w,
                );
                let fragment = Fragment {
                    x: px,
                    y: py,
                    depth,
                    world: a.world * p0 + b.world * p1 + c.world * p2,
                    normal: a.normal * p0 + b.normal * p1 + c.normal * p2,
                    uv: a.uv * p0 + b.uv * p1 + c.uv * p2,
                };

                let Some(current) = target.get(px, py) else {
                    continue;
                };
                if let Some(value) = shade(&fragment, current) {
                    target.set(px, py, value);
                    if state.depth_write {
                        target.set_depth(px, py, depth);
                    }
                }
            }
        }
    }
}

/// Draw square point sprites
///
/// `focal_px` is the vertical focal length in pixels, used to size sprites
/// by distance.
pub fn draw_points<T: Copy>(
    target: &mut Framebuffer<T>,
    points: &[Vec3],
    size: f32,
    model: &Mat4,
    view_proj: &Mat4,
    focal_px: f32,
    state: &RasterState,
    shade: &mut dyn FnMut(&Fragment, T) -> Option<T>,
) {
    let (width, height) = (target.width(), target.height());
    let (min_x, min_y, max_x, max_y) = bounds(width, height, state.scissor);
    let mvp = view_proj * model;

    for point in points {
        let p = Vec4::new(point.x, point.y, point.z, 1.0);
        let Some((x, y, depth, inv_w)) = to_screen(mvp * p, width, height) else {
            continue;
        };
        if !(0.0..=1.0).contains(&depth) {
            continue;
        }
        let half = (size * 0.5 * focal_px * inv_w).max(0.5);
        let x0 = ((x - half).floor().max(0.0) as u32).max(min_x);
        let y0 = ((y - half).floor().max(0.0) as u32).max(min_y);
        let x1 = ((x + half).ceil().max(0.0) as u32).min(max_x);
        let y1 = ((y + half).ceil().max(0.0) as u32).min(max_y);
        let world = (model * p).xyz();

        for py in y0..y1 {
            for px in x0..x1 {
                if state.depth_test && depth >= target.depth_at(px, py).unwrap_or(1.0) {
                    continue;
                }
                let fragment = Fragment {
                    x: px,
                    y: py,
                    depth,
                    world,
                    normal: Vec3::z(),
                    uv: Vec2::new(
                        (px as f32 + 0.5 - (x - half)) / (2.0 * half),
                        (py as f32 + 0.5 - (y - half)) / (2.0 * half),
                    ),
                };
                let Some(current) = target.get(px, py) else {
                    continue;
                };
                if let Some(value) = shade(&fragment, current) {
                    target.set(px, py, value);
                    if state.depth_write {
                        target.set_depth(px, py, depth);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Camera;

    fn camera() -> Camera {
        let mut camera = Camera::perspective(Vec3::new(0.0, 0.0, 5.0), 45.0, 1.0, 0.1, 100.0);
        camera.target = Vec3::zeros();
        camera
    }

    #[test]
    fn test_box_covers_center_not_corner() {
        let mut target = Framebuffer::new("t", 32, 32, 0u32);
        let vp = camera().get_view_projection_matrix();
        draw_mesh(&mut target, &Mesh::cuboid(1.0, 1.0, 1.0), &Mat4::identity(), &vp, &RasterState::default(), &mut |_, _| Some(1));
        assert_eq!(target.get(16, 16), Some(1));
        assert_eq!(target.get(0, 0), Some(0));
    }

    #[test]
    fn test_depth_test_keeps_nearest() {
        let mut target = Framebuffer::new("t", 16, 16, 0u32);
        let vp = camera().get_view_projection_matrix();
        let near = Mat4::new_translation(&Vec3::new(0.0, 0.0, 1.0));
        let far = Mat4::identity();
        let state = RasterState::default();
        draw_mesh(&mut target, &Mesh::plane(2.0, 2.0), &near, &vp, &state, &mut |_, _| Some(1));
        draw_mesh(&mut target, &Mesh::plane(2.0, 2.0), &far, &vp, &state, &mut |_, _| Some(2));
        assert_eq!(target.get(8, 8), Some(1));
    }

    #[test]
    fn test_face_selection_by_winding() {
        let vp = camera().get_view_projection_matrix();
        let depth_with = |faces: Side| {
            let mut target = Framebuffer::new("t", 16, 16, 0u32);
            let state = RasterState {
                faces,
                ..RasterState::default()
            };
            draw_mesh(&mut target, &Mesh::cuboid(1.0, 1.0, 1.0), &Mat4::identity(), &vp, &state, &mut |_, _| Some(1));
            target.depth_at(8, 8).unwrap()
        };
        let front = depth_with(Side::Front);
        let back = depth_with(Side::Back);
        assert!(front < back);
        assert!((depth_with(Side::Double) - front).abs() < 1e-6);
    }

    #[test]
    fn test_scissor_limits_writes() {
        let mut target = Framebuffer::new("t", 16, 16, 0u32);
        let vp = camera().get_view_projection_matrix();
        let state = RasterState {
            scissor: Some(Rect::pixel(5, 9)),
            ..RasterState::default()
        };
        let mut writes = 0;
        draw_mesh(&mut target, &Mesh::plane(4.0, 4.0), &Mat4::identity(), &vp, &state, &mut |_, _| {
            writes += 1;
            Some(3)
        });
        assert_eq!(writes, 1);
        assert_eq!(target.get(5, 9), Some(3));
        assert_eq!(target.get(4, 9), Some(0));
    }

    #[test]
    fn test_up_is_top_of_image() {
        let mut target = Framebuffer::new("t", 32, 32, 0u32);
        let vp = camera().get_view_projection_matrix();
        let up = Mat4::new_translation(&Vec3::new(0.0, 1.0, 0.0));
        draw_mesh(&mut target, &Mesh::cuboid(0.4, 0.4, 0.4), &up, &vp, &RasterState::default(), &mut |_, _| Some(1));
        let top: u32 = (0..16).map(|y| target.get(16, y).unwrap_or(0)).sum();
        let bottom: u32 = (16..32).map(|y| target.get(16, y).unwrap_or(0)).sum();
        assert!(top > 0);
        assert_eq!(bottom, 0);
    }

    #[test]
    fn test_points_draw_sprites() {
        let mut target = Framebuffer::new("t", 16, 16, 0u32);
        let camera = camera();
        let vp = camera.get_view_projection_matrix();
        let focal = 8.0 / (camera.fov * 0.5).tan();
        draw_points(
            &mut target,
            &[Vec3::zeros()],
            0.5,
            &Mat4::identity(),
            &vp,
            focal,
            &RasterState::default(),
            &mut |_, _| Some(5),
        );
        assert_eq!(target.get(8, 8), Some(5));
        assert_eq!(target.get(0, 0), Some(0));
    }
}
