//! Falling snow particles

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use super::{parse_params, Effect, EffectContext, EffectError, EffectKind};
use crate::foundation::color::Color;
use crate::foundation::math::Vec3;
use crate::render::Material;
use crate::scene::{Geometry, Node, NodeFlags, NodeId, Options, PointCloud};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SnowParams {
    count: usize,
    size: f32,
    area: f32,
    min_height: f32,
    max_height: f32,
    speed: f32,
    color: Option<String>,
    seed: u64,
}

impl Default for SnowParams {
    fn default() -> Self {
        Self {
            count: 800,
            size: 0.1,
            area: 50.0,
            min_height: 2.0,
            max_height: 52.0,
            speed: 1.0,
            color: None,
            seed: 0x5eed,
        }
    }
}

/// Point particles drifting down over the target, respawned at the top
pub struct SnowEffect {
    target: NodeId,
    options: Options,
    params: SnowParams,
    rng: StdRng,
    particles: Option<NodeId>,
    disposed: bool,
}

impl SnowEffect {
    /// Unbound snowfall for `target`
    pub fn new(target: NodeId, options: Options) -> Self {
        let params: SnowParams = parse_params(&EffectKind::Snow, &options);
        Self {
            target,
            rng: StdRng::seed_from_u64(params.seed),
            params,
            options,
            particles: None,
            disposed: false,
        }
    }

    /// Node holding the particle cloud
    pub fn particles(&self) -> Option<NodeId> {
        self.particles
    }

    fn spawn(&mut self, y: f32) -> Vec3 {
        let half = self.params.area * 0.5;
        Vec3::new(
            self.rng.gen_range(-half..=half),
            y,
            self.rng.gen_range(-half..=half),
        )
    }
}

impl Effect for SnowEffect {
    fn kind(&self) -> EffectKind {
        EffectKind::Snow
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
        let (low, high) = (self.params.min_height, self.params.max_height.max(self.params.min_height));
        let positions: Vec<Vec3> = (0..self.params.count)
            .map(|_| {
                let y = self.rng.gen_range(low..=high);
                self.spawn(y)
            })
            .collect();

        let color = self
            .params
            .color
            .as_deref()
            .and_then(Color::from_hex)
            .unwrap_or(Color::WHITE);
        let node = Node::mesh(
            "snow",
            Geometry::Points(PointCloud {
                positions,
                size: self.params.size,
            }),
            Material::unlit(color).with_opacity(0.8).with_name("snow"),
        )
        .with_flags(NodeFlags::EFFECT_OWNED | NodeFlags::IGNORE_PICK);
        self.particles = Some(ctx.graph.add(node, self.target));
        Ok(())
    }

    fn update(&mut self, ctx: &mut EffectContext<'_>, delta: f32) {
        if delta <= 0.0 || self.disposed {
            return;
        }
        let Some(id) = self.particles else {
            return;
        };
        let Some(Geometry::Points(cloud)) = ctx.graph.get_mut(id).and_then(|n| n.geometry.as_mut()) else {
            return;
        };
        let mut positions = std::mem::take(&mut cloud.positions);
        for p in &mut positions {
            p.y -= self.params.speed * delta;
            if p.y < 0.0 {
                *p = self.spawn(self.params.max_height);
            }
        }
        if let Some(Geometry::Points(cloud)) = ctx.graph.get_mut(id).and_then(|n| n.geometry.as_mut()) {
            cloud.positions = positions;
        }
    }

    fn dispose(&mut self, ctx: &mut EffectContext<'_>) {
        if self.disposed {
            return;
        }
        if let Some(id) = self.particles.take() {
            ctx.graph.remove(id);
        }
        self.disposed = true;
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}
