//! Square marker detection and pose estimation
//!
//! The marker is a dark square of known physical width printed on a light
//! background. Its apparent width in pixels gives the distance by similar
//! triangles: `distance = width_m * focal_px / span_px`, with the focal
//! length taken from the camera's vertical field of view and the video
//! frame's pixel height. The placement point lies on the ray through the
//! marker centre at that distance.

use std::collections::VecDeque;

use super::MarkerDetector;
use crate::foundation::math::{Vec2, Vec3};
use crate::render::{Camera, Texture};

/// Marker corners in frame pixels, clockwise from top-left
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerCorners {
    /// Top-left corner in pixels
    pub top_left: Vec2,
    /// Top-right corner in pixels
    pub top_right: Vec2,
    /// Bottom-right corner in pixels
    pub bottom_right: Vec2,
    /// Bottom-left corner in pixels
    pub bottom_left: Vec2,
}

impl MarkerCorners {
    /// Mean of the four corners
    pub fn center(&self) -> Vec2 {
        (self.top_left + self.top_right + self.bottom_right + self.bottom_left) * 0.25
    }

    /// Length of the top edge in pixels
    pub fn top_span(&self) -> f32 {
        (self.top_right - self.top_left).norm()
    }

    fn sides(&self) -> [f32; 4] {
        [
            self.top_span(),
            (self.bottom_right - self.top_right).norm(),
            (self.bottom_left - self.bottom_right).norm(),
            (self.top_left - self.bottom_left).norm(),
        ]
    }
}

/// Where a detected marker sits relative to the camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerPose {
    /// Estimated camera-to-marker distance in meters
    pub distance: f32,
    /// Marker centre in NDC
    pub ndc: Vec2,
    /// World-space placement point
    pub position: Vec3,
}

/// Estimate the marker pose from its corners
///
/// Returns `None` for a degenerate span or a camera that cannot unproject.
pub fn estimate_marker_pose(
    corners: &MarkerCorners,
    frame_width: u32,
    frame_height: u32,
    camera: &Camera,
    marker_width_m: f32,
) -> Option<MarkerPose> {
    let span = corners.top_span();
    if span < 1.0 || frame_width == 0 || frame_height == 0 {
        return None;
    }
    let focal_px = frame_height as f32 * 0.5 / (camera.fov * 0.5).tan().max(1e-6);
    let distance = marker_width_m * focal_px / span;

    let center = corners.center();
    let ndc = Vec2::new(
        center.x / frame_width as f32 * 2.0 - 1.0,
        center.y / frame_height as f32 * 2.0 - 1.0,
    );
    let through = camera.unproject(ndc.x, ndc.y, 0.5)?;
    let direction = (through - camera.position).try_normalize(1e-9)?;
    Some(MarkerPose {
        distance,
        ndc,
        position: camera.position + direction * distance,
    })
}

/// Finds the largest dark, roughly square blob fully inside the frame
#[derive(Debug, Clone)]
pub struct SquareMarkerDetector {
    /// Luminance below which a pixel counts as marker ink, in `[0, 1]`
    pub threshold: f32,
    /// Smallest accepted side in pixels
    pub min_side_px: f32,
    /// Largest accepted ratio between the longest and shortest side
    pub max_side_ratio: f32,
}

impl Default for SquareMarkerDetector {
    fn default() -> Self {
        Self {
            threshold: 0.35,
            min_side_px: 6.0,
            max_side_ratio: 1.3,
        }
    }
}

struct Blob {
    pixels: usize,
    touches_border: bool,
    corners: MarkerCorners,
}

impl SquareMarkerDetector {
    /// Detector with default thresholds
    pub fn new() -> Self {
        Self::default()
    }

    fn dark_mask(&self, frame: &Texture) -> Vec<bool> {
        let limit = self.threshold * 255.0;
        frame
            .data
            .chunks_exact(4)
            .map(|px| {
                let luma = 0.2126 * f32::from(px[0]) + 0.7152 * f32::from(px[1]) + 0.0722 * f32::from(px[2]);
                px[3] > 0 && luma < limit
            })
            .collect()
    }

    fn flood(mask: &[bool], visited: &mut [bool], width: usize, height: usize, start: usize) -> Blob {
        // extreme pixels along the diagonals give the four corners
        let mut top_left = (i64::MAX, 0usize, 0usize);
        let mut top_right = (i64::MIN, 0usize, 0usize);
        let mut bottom_right = (i64::MIN, 0usize, 0usize);
        let mut bottom_left = (i64::MAX, 0usize, 0usize);
        let mut pixels = 0;
        let mut touches_border = false;

        let mut queue = VecDeque::from([start]);
        visited[start] = true;
        while let Some(index) = queue.pop_front() {
            let (x, y) = (index % width, index / width);
            pixels += 1;
            if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
                touches_border = true;
            }
            let (sum, diff) = ((x + y) as i64, x as i64 - y as i64);
            if sum < top_left.0 {
                top_left = (sum, x, y);
            }
            if sum > bottom_right.0 {
                bottom_right = (sum, x, y);
            }
            if diff > top_right.0 {
                top_right = (diff, x, y);
            }
            if diff < bottom_left.0 {
                bottom_left = (diff, x, y);
            }

            let mut visit = |next: usize| {
                if mask[next] && !visited[next] {
                    visited[next] = true;
                    queue.push_back(next);
                }
            };
            if x > 0 {
                visit(index - 1);
            }
            if x + 1 < width {
                visit(index + 1);
            }
            if y > 0 {
                visit(index - width);
            }
            if y + 1 < height {
                visit(index + width);
            }
        }

        // pixel edges, so a side of n pixels spans n
        let edge = |(_, x, y): (i64, usize, usize), dx: f32, dy: f32| Vec2::new(x as f32 + dx, y as f32 + dy);
        Blob {
            pixels,
            touches_border,
            corners: MarkerCorners {
                top_left: edge(top_left, 0.0, 0.0),
                top_right: edge(top_right, 1.0, 0.0),
                bottom_right: edge(bottom_right, 1.0, 1.0),
                bottom_left: edge(bottom_left, 0.0, 1.0),
            },
        }
    }

    fn is_square(&self, blob: &Blob) -> bool {
        let sides = blob.corners.sides();
        let shortest = sides.iter().copied().fold(f32::INFINITY, f32::min);
        let longest = sides.iter().copied().fold(0.0, f32::max);
        if shortest < self.min_side_px || longest > shortest * self.max_side_ratio {
            return false;
        }
        // a filled square covers most of the area its corners enclose
        let area = shortest * longest;
        blob.pixels as f32 >= area * 0.6
    }
}

impl MarkerDetector for SquareMarkerDetector {
    fn detect(&mut self, frame: &Texture) -> Option<MarkerCorners> {
        let (width, height) = (frame.width as usize, frame.height as usize);
        if width == 0 || height == 0 || frame.data.len() < width * height * 4 {
            return None;
        }
        let mask = self.dark_mask(frame);
        let mut visited = vec![false; mask.len()];
        let mut best: Option<Blob> = None;

        for start in 0..mask.len() {
            if !mask[start] || visited[start] {
                continue;
            }
            let blob = Self::flood(&mask, &mut visited, width, height, start);
            if blob.touches_border || !self.is_square(&blob) {
                continue;
            }
            if best.as_ref().map_or(true, |b| blob.pixels > b.pixels) {
                best = Some(blob);
            }
        }
        if let Some(blob) = &best {
            log::trace!("Marker found: {} px, span {:.1}", blob.pixels, blob.corners.top_span());
        }
        best.map(|blob| blob.corners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use crate::foundation::color::Color;
    use crate::foundation::math::Transform;
    use crate::render::{FrameOptions, Material, RenderPipeline};
    use crate::scene::{Geometry, Node, SceneGraph};
    use approx::assert_relative_eq;

    const WIDTH: u32 = 640;
    const HEIGHT: u32 = 480;

    fn white_frame(width: u32, height: u32) -> Texture {
        Texture::solid(width, height, [255, 255, 255, 255])
    }

    fn paint(frame: &mut Texture, x0: u32, y0: u32, w: u32, h: u32) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                let i = ((y * frame.width + x) * 4) as usize;
                frame.data[i..i + 3].copy_from_slice(&[0, 0, 0]);
            }
        }
    }

    fn camera() -> Camera {
        let mut camera = Camera::perspective(Vec3::zeros(), 45.0, WIDTH as f32 / HEIGHT as f32, 0.01, 100.0);
        camera.target = Vec3::new(0.0, 0.0, -1.0);
        camera
    }

    /// Render a black marker of `width` meters at `position` and return the frame
    fn rendered_marker(width: f32, position: Vec3) -> Texture {
        let config = RenderConfig {
            clear_color: Color::WHITE,
            ..RenderConfig::default()
        };
        let mut pipeline = RenderPipeline::new(&config, WIDTH, HEIGHT);
        let mut graph = SceneGraph::new();
        graph.add_to_content(
            Node::mesh("marker", Geometry::plane(width, width), Material::unlit(Color::BLACK))
                .with_transform(Transform::from_position(position)),
        );
        let image = pipeline
            .render_without_bloom(&graph, &camera(), FrameOptions::default())
            .unwrap()
            .to_image();
        Texture::new(image.width(), image.height(), image.into_raw())
    }

    #[test]
    fn test_detects_axis_aligned_square() {
        let mut frame = white_frame(200, 150);
        paint(&mut frame, 60, 40, 40, 40);
        let corners = SquareMarkerDetector::new().detect(&frame).unwrap();
        assert_eq!(corners.top_left, Vec2::new(60.0, 40.0));
        assert_eq!(corners.top_right, Vec2::new(100.0, 40.0));
        assert_eq!(corners.bottom_right, Vec2::new(100.0, 80.0));
        assert_eq!(corners.bottom_left, Vec2::new(60.0, 80.0));
        assert_relative_eq!(corners.top_span(), 40.0);
        assert_eq!(corners.center(), Vec2::new(80.0, 60.0));
    }

    #[test]
    fn test_ignores_bars_border_blobs_and_blank_frames() {
        let mut detector = SquareMarkerDetector::new();
        assert!(detector.detect(&white_frame(100, 100)).is_none());

        let mut frame = white_frame(200, 150);
        // long bar, a dark strip along the edge, and the real marker
        paint(&mut frame, 10, 10, 120, 12);
        paint(&mut frame, 0, 100, 60, 50);
        paint(&mut frame, 140, 60, 20, 20);
        let corners = detector.detect(&frame).unwrap();
        assert_eq!(corners.top_left, Vec2::new(140.0, 60.0));

        // two squares: the larger wins
        paint(&mut frame, 60, 40, 30, 30);
        let corners = detector.detect(&frame).unwrap();
        assert_eq!(corners.top_left, Vec2::new(60.0, 40.0));
    }

    #[test]
    fn test_rendered_marker_distance_within_tolerance() {
        let camera = camera();
        let mut detector = SquareMarkerDetector::new();
        for distance in [0.75, 1.0, 2.0, 3.0] {
            let frame = rendered_marker(0.15, Vec3::new(0.0, 0.0, -distance));
            let corners = detector.detect(&frame).unwrap();
            let pose = estimate_marker_pose(&corners, frame.width, frame.height, &camera, 0.15).unwrap();
            let error = (pose.distance - distance).abs() / distance;
            assert!(error < 0.1, "distance {distance}: estimated {} ({error:.3})", pose.distance);
            assert_relative_eq!(pose.ndc, Vec2::zeros(), epsilon = 0.02);
        }
    }

    #[test]
    fn test_off_centre_marker_places_content_near_it() {
        let camera = camera();
        let truth = Vec3::new(0.4, -0.2, -2.0);
        let frame = rendered_marker(0.15, truth);
        let corners = SquareMarkerDetector::new().detect(&frame).unwrap();
        let pose = estimate_marker_pose(&corners, frame.width, frame.height, &camera, 0.15).unwrap();
        // right of centre, below centre (NDC y grows downwards)
        assert!(pose.ndc.x > 0.0 && pose.ndc.y > 0.0);
        assert!((pose.position - truth).norm() < truth.norm() * 0.1, "placed at {:?}", pose.position);
    }

    #[test]
    fn test_similar_triangles_relation() {
        let camera = camera();
        let focal = HEIGHT as f32 * 0.5 / (camera.fov * 0.5).tan();
        let span = 50.0;
        let corners = MarkerCorners {
            top_left: Vec2::new(295.0, 215.0),
            top_right: Vec2::new(295.0 + span, 215.0),
            bottom_right: Vec2::new(295.0 + span, 215.0 + span),
            bottom_left: Vec2::new(295.0, 215.0 + span),
        };
        let pose = estimate_marker_pose(&corners, WIDTH, HEIGHT, &camera, 0.15).unwrap();
        assert_relative_eq!(pose.distance, 0.15 * focal / span, epsilon = 1e-4);
        assert_relative_eq!(pose.position, Vec3::new(0.0, 0.0, -pose.distance), epsilon = 1e-3);

        let collapsed = MarkerCorners {
            top_right: corners.top_left,
            ..corners
        };
        assert!(estimate_marker_pose(&collapsed, WIDTH, HEIGHT, &camera, 0.15).is_none());
    }
}
