//! Frame composition with selective bloom
//!
//! A frame is a lit base render, an optional bloom mask pass, an additive
//! composite of the blurred mask onto the base, and an overlay pass for
//! editor handles. With bloom off the mask pass and composite never run, so
//! the output is exactly the base render plus overlay.

use std::sync::Arc;

use super::framebuffer::{ColorTarget, IdTarget, Rect};
use super::lighting::LightingEnvironment;
use super::material::{Material, Shading, Texture};
use super::rasterizer::{draw_mesh, draw_points, Fragment, RasterState};
use super::{Camera, RenderError};
use crate::config::{BloomConfig, RenderConfig};
use crate::foundation::color::Color;
use crate::foundation::math::Mat4;
use crate::scene::{Geometry, Node, NodeFlags, NodeId, SceneGraph};

/// Per-frame switches decided by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOptions {
    /// Draw diary/library markers
    pub show_markers: bool,
    /// Run the bloom passes when bloom is enabled
    pub allow_bloom: bool,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            show_markers: false,
            allow_bloom: true,
        }
    }
}

/// Counters for diagnostics and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames rendered
    pub frames: u64,
    /// Bloom mask passes run
    pub mask_passes: u64,
    /// Base and overlay draws; mask pass draws are not counted
    pub draws_last_frame: usize,
}

/// Temporarily replaces the material of every non-blooming node with flat
/// black; the originals come back when the guard drops.
pub struct MaterialSwap<'g> {
    graph: &'g mut SceneGraph,
    saved: Vec<(NodeId, Material)>,
}

impl<'g> MaterialSwap<'g> {
    /// Swap materials on every node outside a bloom subtree
    pub fn darken_non_bloom(graph: &'g mut SceneGraph) -> Self {
        let targets: Vec<NodeId> = graph
            .iter()
            .filter(|(_, node)| node.material.is_some())
            .map(|(id, _)| id)
            .filter(|id| !graph.has_flag_inherited(*id, NodeFlags::BLOOM))
            .collect();

        let mut saved = Vec::with_capacity(targets.len());
        for id in targets {
            if let Some(node) = graph.get_mut(id) {
                if let Some(original) = node.material.replace(Material::bloom_mask()) {
                    saved.push((id, original));
                }
            }
        }
        Self { graph, saved }
    }

    /// The graph with swapped materials
    pub fn graph(&self) -> &SceneGraph {
        self.graph
    }

    /// Number of nodes whose material is swapped
    pub fn swapped(&self) -> usize {
        self.saved.len()
    }
}

impl Drop for MaterialSwap<'_> {
    fn drop(&mut self) {
        for (id, material) in self.saved.drain(..) {
            if let Some(node) = self.graph.get_mut(id) {
                node.material = Some(material);
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Pass {
    Scene,
    Overlay,
}

struct DrawItem {
    id: NodeId,
    world: Mat4,
    order: i32,
    transparent: bool,
}

/// Owns the frame targets and runs the passes
pub struct RenderPipeline {
    width: u32,
    height: u32,
    clear_color: Color,
    lighting: LightingEnvironment,
    bloom: BloomConfig,
    bloom_suppressed: bool,
    background_layer: Option<Arc<Texture>>,
    base: ColorTarget,
    bloom_target: ColorTarget,
    blur_scratch: ColorTarget,
    output: ColorTarget,
    id_target: IdTarget,
    in_frame: bool,
    released: bool,
    stats: FrameStats,
}

impl RenderPipeline {
    /// Allocate targets for a viewport
    pub fn new(config: &RenderConfig, width: u32, height: u32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        Self {
            width,
            height,
            clear_color: config.clear_color,
            lighting: LightingEnvironment::from_config(config),
            bloom: config.bloom,
            bloom_suppressed: false,
            background_layer: None,
            base: ColorTarget::new("base", width, height, config.clear_color),
            bloom_target: ColorTarget::new("bloom_mask", width, height, Color::BLACK),
            blur_scratch: ColorTarget::new("bloom_blur", width, height, Color::BLACK),
            output: ColorTarget::new("output", width, height, config.clear_color),
            id_target: IdTarget::new("picking_ids", width, height, 0),
            in_frame: false,
            released: false,
            stats: FrameStats::default(),
        }
    }

    /// Target width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Target height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Resize every target
    ///
    /// # Errors
    /// [`RenderError::TargetBusy`] mid-frame, [`RenderError::InvalidSize`] for a zero dimension.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        self.ensure_idle("resize")?;
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidSize { width, height });
        }
        self.width = width;
        self.height = height;
        self.base.resize(width, height, self.clear_color);
        self.bloom_target.resize(width, height, Color::BLACK);
        self.blur_scratch.resize(width, height, Color::BLACK);
        self.output.resize(width, height, self.clear_color);
        self.id_target.resize(width, height, 0);
        log::debug!("Render targets resized to {}x{}", width, height);
        Ok(())
    }

    /// Background colour for the base pass
    pub fn set_clear_color(&mut self, color: Color) {
        self.clear_color = color;
    }

    /// Background colour
    pub fn clear_color(&self) -> Color {
        self.clear_color
    }

    /// Full-bleed image drawn behind the scene (AR camera feed)
    pub fn set_background_layer(&mut self, layer: Option<Arc<Texture>>) {
        self.background_layer = layer;
    }

    /// Whether a full-bleed layer is set
    pub fn has_background_layer(&self) -> bool {
        self.background_layer.is_some()
    }

    /// Bloom parameters, adjustable by effects
    pub fn bloom(&self) -> &BloomConfig {
        &self.bloom
    }

    /// Bloom parameters, for effects
    pub fn bloom_mut(&mut self) -> &mut BloomConfig {
        &mut self.bloom
    }

    /// Turn the bloom composite on or off
    pub fn set_bloom_enabled(&mut self, enabled: bool) {
        self.bloom.enabled = enabled;
    }

    /// Suppress bloom without changing the configured flag (edit selection)
    pub fn set_bloom_suppressed(&mut self, suppressed: bool) {
        self.bloom_suppressed = suppressed;
    }

    /// Whether the next frame runs the bloom passes
    pub fn bloom_active(&self) -> bool {
        self.bloom.enabled && !self.bloom_suppressed
    }

    /// Frame counters
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Last composed frame
    pub fn output(&self) -> &ColorTarget {
        &self.output
    }

    /// Mark the targets as in use
    ///
    /// # Errors
    /// [`RenderError::TargetBusy`] if a frame is already open.
    pub fn begin_frame(&mut self) -> Result<(), RenderError> {
        self.ensure_idle("frame")?;
        self.in_frame = true;
        Ok(())
    }

    /// Finish the frame and update counters
    pub fn end_frame(&mut self) {
        self.in_frame = false;
    }

    fn ensure_idle(&self, what: &'static str) -> Result<(), RenderError> {
        if self.released {
            return Err(RenderError::Released);
        }
        if self.in_frame {
            return Err(RenderError::TargetBusy(what));
        }
        Ok(())
    }

    /// Render a complete frame
    ///
    /// Takes the graph mutably for the duration of the bloom mask pass;
    /// every swapped material is restored before this returns.
    pub fn render(
        &mut self,
        graph: &mut SceneGraph,
        camera: &Camera,
        options: FrameOptions,
    ) -> Result<&ColorTarget, RenderError> {
        self.begin_frame()?;
        let mut draws = self.base_pass(graph, camera, options);

        if options.allow_bloom && self.bloom_active() {
            {
                let swap = MaterialSwap::darken_non_bloom(graph);
                log::trace!("Bloom mask pass with {} swapped materials", swap.swapped());
                let view_proj = camera.get_view_projection_matrix();
                let focal = self.focal_px(camera);
                let lighting = self.lighting;
                self.bloom_target.clear(Color::BLACK);
                draw_pass(&mut self.bloom_target, swap.graph(), &view_proj, focal, &lighting, options, Pass::Scene);
            }
            self.stats.mask_passes += 1;
            self.blur_bloom();
            self.composite();
        } else {
            self.output.clone_from(&self.base);
        }

        draws += self.overlay_pass(graph, camera, options);
        self.stats.frames += 1;
        self.stats.draws_last_frame = draws;
        self.end_frame();
        Ok(&self.output)
    }

    /// Render base and overlay only, as if bloom did not exist
    pub fn render_without_bloom(
        &mut self,
        graph: &SceneGraph,
        camera: &Camera,
        options: FrameOptions,
    ) -> Result<&ColorTarget, RenderError> {
        self.begin_frame()?;
        let mut draws = self.base_pass(graph, camera, options);
        self.output.clone_from(&self.base);
        draws += self.overlay_pass(graph, camera, options);
        self.stats.frames += 1;
        self.stats.draws_last_frame = draws;
        self.end_frame();
        Ok(&self.output)
    }

    fn focal_px(&self, camera: &Camera) -> f32 {
        self.height as f32 * 0.5 / (camera.fov * 0.5).tan().max(1e-6)
    }

    fn base_pass(&mut self, graph: &SceneGraph, camera: &Camera, options: FrameOptions) -> usize {
        self.base.clear(self.clear_color);
        if let Some(layer) = &self.background_layer {
            draw_cover(&mut self.base, layer);
        }
        let view_proj = camera.get_view_projection_matrix();
        let focal = self.focal_px(camera);
        draw_pass(&mut self.base, graph, &view_proj, focal, &self.lighting, options, Pass::Scene)
    }

    fn overlay_pass(&mut self, graph: &SceneGraph, camera: &Camera, options: FrameOptions) -> usize {
        self.output.clear_depth();
        let view_proj = camera.get_view_projection_matrix();
        let focal = self.focal_px(camera);
        draw_pass(&mut self.output, graph, &view_proj, focal, &self.lighting, options, Pass::Overlay)
    }

    fn blur_bloom(&mut self) {
        let threshold = self.bloom.threshold;
        for pixel in self.bloom_target.pixels_mut() {
            if pixel.luminance() < threshold {
                *pixel = Color::BLACK;
            }
        }
        let radius = self.bloom.radius as i64;
        if radius == 0 {
            return;
        }
        box_blur(&self.bloom_target, &mut self.blur_scratch, radius, true);
        box_blur(&self.blur_scratch, &mut self.bloom_target, radius, false);
    }

    fn composite(&mut self) {
        let strength = self.bloom.strength;
        for ((out, base), glow) in self
            .output
            .pixels_mut()
            .iter_mut()
            .zip(self.base.pixels())
            .zip(self.bloom_target.pixels())
        {
            *out = *base + *glow * strength;
        }
    }

    /// Resolve the id under one pixel with a scissored id-buffer render
    ///
    /// `id_for` assigns an id to each node that should take part; nodes it
    /// returns `None` for are not drawn at all. 0 means nothing was hit.
    pub fn render_id_pixel(
        &mut self,
        graph: &SceneGraph,
        camera: &Camera,
        x: u32,
        y: u32,
        id_for: &dyn Fn(NodeId, &Node) -> Option<u32>,
    ) -> Result<u32, RenderError> {
        self.ensure_idle("picking")?;
        if x >= self.width || y >= self.height {
            return Ok(0);
        }
        let scissor = Rect::pixel(x, y);
        self.id_target.clear_rect(scissor, 0);
        let view_proj = camera.get_view_projection_matrix();
        let state = RasterState {
            scissor: Some(scissor),
            ..RasterState::default()
        };

        for item in graph.visible_nodes() {
            let Some(node) = graph.get(item.id) else {
                continue;
            };
            let Some(id) = id_for(item.id, node) else {
                continue;
            };
            if let Some(Geometry::Triangles { mesh, .. }) = &node.geometry {
                draw_mesh(&mut self.id_target, mesh, &item.world, &view_proj, &state, &mut |_, _| Some(id));
            }
        }
        Ok(self.id_target.get(x, y).unwrap_or(0))
    }

    /// Free every target; a second call is logged and ignored
    pub fn release(&mut self) {
        if self.released {
            log::warn!("Render pipeline already released");
            return;
        }
        self.in_frame = false;
        self.base.release();
        self.bloom_target.release();
        self.blur_scratch.release();
        self.output.release();
        self.id_target.release();
        self.background_layer = None;
        self.released = true;
    }

    /// Whether render targets were released
    pub fn is_released(&self) -> bool {
        self.released
    }
}

fn draw_pass(
    target: &mut ColorTarget,
    graph: &SceneGraph,
    view_proj: &Mat4,
    focal_px: f32,
    lighting: &LightingEnvironment,
    options: FrameOptions,
    pass: Pass,
) -> usize {
    let mut items: Vec<DrawItem> = graph
        .visible_nodes()
        .into_iter()
        .filter_map(|item| {
            let node = graph.get(item.id)?;
            let material = node.material.as_ref()?;
            node.geometry.as_ref()?;
            let overlay = node.flags.contains(NodeFlags::OVERLAY);
            if (pass == Pass::Overlay) != overlay {
                return None;
            }
            if node.flags.contains(NodeFlags::MARKER) && !options.show_markers {
                return None;
            }
            Some(DrawItem {
                id: item.id,
                world: item.world,
                order: node.render_order,
                transparent: material.is_transparent(),
            })
        })
        .collect();
    items.sort_by_key(|item| (item.transparent, item.order));

    for item in &items {
        let Some(node) = graph.get(item.id) else {
            continue;
        };
        let (Some(geometry), Some(material)) = (&node.geometry, &node.material) else {
            continue;
        };
        let state = RasterState {
            depth_write: !item.transparent,
            faces: material.side,
            ..RasterState::default()
        };
        match geometry {
            Geometry::Triangles { mesh, .. } => {
                draw_mesh(target, mesh, &item.world, view_proj, &state, &mut |frag, dst| {
                    shade_surface(material, lighting, frag, dst)
                });
            }
            Geometry::Points(cloud) => {
                draw_points(target, &cloud.positions, cloud.size, &item.world, view_proj, focal_px, &state, &mut |frag, dst| {
                    let (dx, dy) = (frag.uv.x - 0.5, frag.uv.y - 0.5);
                    if dx * dx + dy * dy > 0.25 {
                        return None;
                    }
                    blend(material.color + material.emissive, material.opacity, dst)
                });
            }
        }
    }
    items.len()
}

fn blend(color: Color, alpha: f32, dst: Color) -> Option<Color> {
    if alpha <= 1e-3 {
        None
    } else if alpha >= 1.0 {
        Some(color)
    } else {
        Some(dst.lerp(color, alpha))
    }
}

fn shade_surface(material: &Material, lighting: &LightingEnvironment, frag: &Fragment, dst: Color) -> Option<Color> {
    let mut albedo = material.color;
    let mut alpha = material.opacity;
    if let Some(texture) = &material.texture {
        let (texel, texel_alpha) = texture.sample(frag.uv.x, frag.uv.y);
        albedo = albedo.tint(texel);
        alpha *= texel_alpha;
    }
    let color = match material.shading {
        Shading::Lit => lighting.shade(albedo, &frag.normal) + material.emissive,
        Shading::Unlit => albedo + material.emissive,
        Shading::Interference { time, intensity } => {
            let band = (frag.y as f32 * 0.35 + time * 12.0).sin() * 0.5 + 0.5;
            let flicker = ((frag.y / 4) as f32 * 12.9898 + time * 78.233).sin().abs();
            lighting.shade(albedo, &frag.normal) * (1.0 - intensity * band)
                + Color::new(0.0, 0.08, 0.1) * (intensity * flicker)
                + material.emissive
        }
    };
    blend(color, alpha, dst)
}

/// Scale `layer` to cover the whole target, cropping the overflow
fn draw_cover(target: &mut ColorTarget, layer: &Texture) {
    if layer.width == 0 || layer.height == 0 {
        return;
    }
    let (w, h) = (target.width() as f32, target.height() as f32);
    let scale = (w / layer.width as f32).max(h / layer.height as f32);
    let (shown_w, shown_h) = (layer.width as f32 * scale, layer.height as f32 * scale);
    let (offset_x, offset_y) = ((w - shown_w) * 0.5, (h - shown_h) * 0.5);
    for y in 0..target.height() {
        for x in 0..target.width() {
            let u = (x as f32 + 0.5 - offset_x) / shown_w;
            let v = (y as f32 + 0.5 - offset_y) / shown_h;
            let (color, _) = layer.sample(u, v);
            target.set(x, y, color);
        }
    }
}

fn box_blur(src: &ColorTarget, dst: &mut ColorTarget, radius: i64, horizontal: bool) {
    let (w, h) = (i64::from(src.width()), i64::from(src.height()));
    let norm = 1.0 / (2 * radius + 1) as f32;
    for y in 0..h {
        for x in 0..w {
            let mut sum = Color::BLACK;
            for k in -radius..=radius {
                let (sx, sy) = if horizontal { ((x + k).clamp(0, w - 1), y) } else { (x, (y + k).clamp(0, h - 1)) };
                if let Some(c) = src.get(sx as u32, sy as u32) {
                    sum = sum + c;
                }
            }
            dst.set(x as u32, y as u32, sum * norm);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Transform, Vec3};
    use crate::scene::Node;

    fn camera() -> Camera {
        Camera::perspective(Vec3::new(0.0, 0.0, 6.0), 45.0, 1.0, 0.1, 100.0)
    }

    fn scene(bloom_on_right: bool) -> (SceneGraph, NodeId, NodeId) {
        let mut graph = SceneGraph::new();
        let left = graph.add_to_content(
            Node::mesh("left", Geometry::cuboid([1.0, 1.0, 1.0]), Material::lit(Color::new(0.2, 0.4, 0.9)))
                .with_transform(Transform::from_position(Vec3::new(-1.2, 0.0, 0.0))),
        );
        let mut right = Node::mesh("right", Geometry::sphere(0.6), Material::unlit(Color::new(1.0, 0.8, 0.2)))
            .with_transform(Transform::from_position(Vec3::new(1.2, 0.0, 0.0)));
        if bloom_on_right {
            right = right.with_flags(NodeFlags::BLOOM);
        }
        let right = graph.add_to_content(right);
        (graph, left, right)
    }

    #[test]
    fn test_disabled_bloom_matches_plain_render() {
        let (mut graph, _, _) = scene(true);
        let mut config = RenderConfig::default();
        config.bloom.enabled = false;
        let mut pipeline = RenderPipeline::new(&config, 48, 32);
        let with_pipeline = pipeline.render(&mut graph, &camera(), FrameOptions::default()).unwrap().clone();
        assert_eq!(pipeline.stats().mask_passes, 0);

        let mut plain = RenderPipeline::new(&config, 48, 32);
        let reference = plain.render_without_bloom(&graph, &camera(), FrameOptions::default()).unwrap();
        assert!(with_pipeline.max_difference(reference).unwrap() < 1e-6);
    }

    #[test]
    fn test_bloom_brightens_only_near_flagged_node() {
        let (mut graph, left, right) = scene(true);
        let config = RenderConfig::default();
        let mut pipeline = RenderPipeline::new(&config, 48, 32);
        let bloomed = pipeline.render(&mut graph, &camera(), FrameOptions::default()).unwrap().clone();
        assert_eq!(pipeline.stats().mask_passes, 1);

        let mut plain = RenderPipeline::new(&config, 48, 32);
        let reference = plain.render_without_bloom(&graph, &camera(), FrameOptions::default()).unwrap().clone();

        let right_px = camera().project(Vec3::new(1.2, 0.0, 0.0)).unwrap();
        let (rx, ry) = (((right_px.x + 1.0) * 24.0) as u32, ((right_px.y + 1.0) * 16.0) as u32);
        let lum = |t: &ColorTarget, x: u32, y: u32| t.get(x, y).unwrap().luminance();
        assert!(lum(&bloomed, rx, ry) > lum(&reference, rx, ry));

        // materials restored after the mask pass
        assert_eq!(graph.get(left).unwrap().material.as_ref().unwrap().color, Color::new(0.2, 0.4, 0.9));
        assert_eq!(graph.get(right).unwrap().material.as_ref().unwrap().color, Color::new(1.0, 0.8, 0.2));
    }

    #[test]
    fn test_material_swap_restores_on_drop() {
        let (mut graph, left, right) = scene(true);
        {
            let swap = MaterialSwap::darken_non_bloom(&mut graph);
            assert_eq!(swap.swapped(), 1);
            assert_eq!(swap.graph().get(left).unwrap().material.as_ref().unwrap().name, "bloom_mask");
            assert_ne!(swap.graph().get(right).unwrap().material.as_ref().unwrap().name, "bloom_mask");
        }
        assert_eq!(graph.get(left).unwrap().material.as_ref().unwrap().shading, Shading::Lit);
    }

    #[test]
    fn test_suppressed_bloom_skips_mask_pass() {
        let (mut graph, _, _) = scene(true);
        let mut pipeline = RenderPipeline::new(&RenderConfig::default(), 16, 16);
        pipeline.set_bloom_suppressed(true);
        pipeline.render(&mut graph, &camera(), FrameOptions::default()).unwrap();
        assert_eq!(pipeline.stats().mask_passes, 0);
        pipeline.set_bloom_suppressed(false);
        pipeline
            .render(&mut graph, &camera(), FrameOptions { allow_bloom: false, ..FrameOptions::default() })
            .unwrap();
        assert_eq!(pipeline.stats().mask_passes, 0);
    }

    #[test]
    fn test_id_pixel_and_busy_guard() {
        let (graph, left, _) = scene(false);
        let mut pipeline = RenderPipeline::new(&RenderConfig::default(), 48, 32);
        let center = camera().project(Vec3::new(-1.2, 0.0, 0.0)).unwrap();
        let (x, y) = (((center.x + 1.0) * 24.0) as u32, ((center.y + 1.0) * 16.0) as u32);
        let id_for = |id: NodeId, _: &Node| (id == left).then_some(7);
        assert_eq!(pipeline.render_id_pixel(&graph, &camera(), x, y, &id_for).unwrap(), 7);
        assert_eq!(pipeline.render_id_pixel(&graph, &camera(), 0, 0, &id_for).unwrap(), 0);

        pipeline.begin_frame().unwrap();
        assert!(matches!(
            pipeline.render_id_pixel(&graph, &camera(), x, y, &id_for),
            Err(RenderError::TargetBusy(_))
        ));
        assert!(matches!(pipeline.resize(8, 8), Err(RenderError::TargetBusy(_))));
        pipeline.end_frame();
        pipeline.resize(8, 8).unwrap();
    }

    #[test]
    fn test_markers_hidden_unless_requested() {
        let mut graph = SceneGraph::new();
        graph.add_to_content(
            Node::mesh("marker", Geometry::sphere(1.0), Material::unlit(Color::WHITE)).with_flags(NodeFlags::MARKER),
        );
        let mut pipeline = RenderPipeline::new(&RenderConfig::default(), 16, 16);
        pipeline.render(&mut graph, &camera(), FrameOptions::default()).unwrap();
        assert_eq!(pipeline.stats().draws_last_frame, 0);
        pipeline
            .render(&mut graph, &camera(), FrameOptions { show_markers: true, ..FrameOptions::default() })
            .unwrap();
        assert_eq!(pipeline.stats().draws_last_frame, 1);
    }

    #[test]
    fn test_background_layer_and_release() {
        let mut graph = SceneGraph::new();
        let mut pipeline = RenderPipeline::new(&RenderConfig::default(), 8, 4);
        pipeline.set_background_layer(Some(Arc::new(Texture::solid(2, 2, [0, 255, 0, 255]))));
        let frame = pipeline.render(&mut graph, &camera(), FrameOptions::default()).unwrap();
        assert_eq!(frame.get(0, 0).unwrap().to_rgb8(), [0, 255, 0]);

        pipeline.release();
        pipeline.release();
        assert!(matches!(
            pipeline.render(&mut graph, &camera(), FrameOptions::default()),
            Err(RenderError::Released)
        ));
    }
}
