//! Toon-style silhouette outlines
//!
//! Each mesh under the target gets an inflated back-face hull drawn in a flat
//! color. The hull sits next to its source mesh (same parent) and is
//! re-sized every frame so the visible rim stays `pixelWidth` pixels wide
//! whatever the camera distance.

use serde::Deserialize;

use super::{parse_params, Effect, EffectContext, EffectError, EffectKind};
use crate::foundation::color::Color;
use crate::render::{Material, Side};
use crate::scene::{Geometry, Node, NodeFlags, NodeId, Options, SceneGraph};

const DEFAULT_COLOR: &str = "#111318";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct OutlineParams {
    color: String,
    opacity: f32,
    pixel_width: f32,
    only_opaque: bool,
    ignore_names: Vec<String>,
}

impl Default for OutlineParams {
    fn default() -> Self {
        Self {
            color: DEFAULT_COLOR.to_string(),
            opacity: 1.0,
            pixel_width: 2.0,
            only_opaque: true,
            ignore_names: Vec::new(),
        }
    }
}

/// Source mesh and the hull drawn behind it
#[derive(Debug, Clone, Copy)]
struct Hull {
    source: NodeId,
    outline: NodeId,
}

/// Outlines every eligible mesh under the target
pub struct ToonOutlineEffect {
    target: NodeId,
    options: Options,
    params: OutlineParams,
    hulls: Vec<Hull>,
    disposed: bool,
}

impl ToonOutlineEffect {
    /// Unbound outline effect for `target`
    pub fn new(target: NodeId, options: Options) -> Self {
        Self {
            target,
            params: parse_params(&EffectKind::ToonOutline, &options),
            options,
            hulls: Vec::new(),
            disposed: false,
        }
    }

    /// Number of hulls currently in the scene
    pub fn hull_count(&self) -> usize {
        self.hulls.len()
    }

    fn outline_material(&self) -> Material {
        let color = Color::from_hex(&self.params.color).unwrap_or_else(|| {
            log::warn!("Invalid outline color '{}', using {}", self.params.color, DEFAULT_COLOR);
            Color::from_hex(DEFAULT_COLOR).unwrap_or(Color::BLACK)
        });
        let mut material = Material::unlit(color)
            .with_opacity(self.params.opacity)
            .with_name("toon_outline");
        material.side = Side::Back;
        material
    }

    fn eligible(&self, graph: &SceneGraph, id: NodeId) -> bool {
        let Some(node) = graph.get(id) else {
            return false;
        };
        if node.flags.intersects(NodeFlags::EFFECT_OWNED | NodeFlags::HELPER) {
            return false;
        }
        if !matches!(node.geometry, Some(Geometry::Triangles { .. })) {
            return false;
        }
        if self.params.ignore_names.iter().any(|part| node.name.contains(part.as_str())) {
            return false;
        }
        match &node.material {
            Some(material) => !(self.params.only_opaque && material.is_transparent()),
            None => false,
        }
    }

    /// Copy the source pose onto the hull, inflated to the rim width
    fn sync(&self, ctx: &mut EffectContext<'_>, hull: Hull) -> bool {
        let graph = &*ctx.graph;
        let (Some(source), Some(world)) = (graph.get(hull.source), graph.world_matrix(hull.source)) else {
            return false;
        };
        let Some(geometry) = &source.geometry else {
            return false;
        };
        let local = geometry.bounds();
        let bounds = local.transformed(&world);
        let radius = (bounds.max - bounds.min).norm() * 0.5;

        let distance = (ctx.camera.position - bounds.center()).norm().max(0.001);
        let units_per_pixel = 2.0 * (ctx.camera.fov * 0.5).tan() * distance / ctx.viewport_height.max(1) as f32;
        let thickness = self.params.pixel_width * units_per_pixel;
        let factor = if radius > 1e-6 { 1.0 + thickness / radius } else { 1.0 };

        let mut transform = source.transform;
        transform.scale = source.transform.scale * factor;
        // keep the geometry centre fixed while scaling about the node origin
        let center = local.center().component_mul(&source.transform.scale);
        transform.position += source.transform.rotation * (center * (1.0 - factor));
        let visible = graph.is_effectively_visible(hull.source);
        let order = source.render_order;

        let Some(outline) = ctx.graph.get_mut(hull.outline) else {
            return false;
        };
        outline.transform = transform;
        outline.render_order = order;
        outline.flags.set(NodeFlags::VISIBLE, visible);
        true
    }
}

impl Effect for ToonOutlineEffect {
    fn kind(&self) -> EffectKind {
        EffectKind::ToonOutline
    }

    fn target(&self) -> NodeId {
        self.target
    }

    fn options(&self) -> &Options {
        &self.options
    }

    fn init(&mut self, ctx: &mut EffectContext<'_>) -> Result<(), EffectError> {
        if !ctx.graph.contains(self.target) {
            return Err(EffectError::MissingTarget(self.target));
        }
        let material = self.outline_material();
        let graph = &*ctx.graph;
        let sources: Vec<NodeId> = graph
            .descendants(self.target)
            .into_iter()
            .filter(|id| self.eligible(graph, *id))
            .collect();

        for source in sources {
            let Some((name, geometry)) = ctx.graph.get(source).and_then(|node| {
                let name = if node.name.is_empty() { "mesh" } else { node.name.as_str() };
                Some((format!("{name}__outline"), node.geometry.clone()?))
            }) else {
                continue;
            };
            let hull = Node::mesh(name, geometry, material.clone())
                .with_flags(NodeFlags::VISIBLE | NodeFlags::EFFECT_OWNED | NodeFlags::IGNORE_PICK);
            let parent = ctx.graph.parent(source).unwrap_or_else(|| ctx.graph.root());
            let outline = ctx.graph.add(hull, parent);
            let hull = Hull { source, outline };
            self.sync(ctx, hull);
            self.hulls.push(hull);
        }
        log::debug!("Toon outline attached {} hulls", self.hulls.len());
        Ok(())
    }

    fn update(&mut self, ctx: &mut EffectContext<'_>, delta: f32) {
        if delta <= 0.0 || self.disposed {
            return;
        }
        let mut lost = Vec::new();
        for hull in self.hulls.clone() {
            if !self.sync(ctx, hull) {
                lost.push(hull.outline);
            }
        }
        for outline in lost {
            ctx.graph.remove(outline);
            self.hulls.retain(|hull| hull.outline != outline);
        }
    }

    fn dispose(&mut self, ctx: &mut EffectContext<'_>) {
        if self.disposed {
            return;
        }
        for hull in self.hulls.drain(..) {
            ctx.graph.remove(hull.outline);
        }
        self.disposed = true;
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}
