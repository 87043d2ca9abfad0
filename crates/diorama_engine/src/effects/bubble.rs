//! Rising bubbles

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
struct BubbleParams {
    count: usize,
    size: f32,
    area: f32,
    height: f32,
    min_speed: f32,
    max_speed: f32,
    sway: f32,
    seed: u64,
}

impl Default for BubbleParams {
    fn default() -> Self {
        Self {
            count: 50,
            size: 0.8,
            area: 80.0,
            height: 60.0,
            min_speed: 0.3,
            max_speed: 1.1,
            sway: 0.5,
            seed: 0xb0b,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bubble {
    base_x: f32,
    z: f32,
    y: f32,
    speed: f32,
    phase: f32,
}

/// Bubbles rising with a sideways sway, wrapped back to the floor
pub struct BubbleEffect {
    target: NodeId,
    options: Options,
    params: BubbleParams,
    rng: StdRng,
    bubbles: Vec<Bubble>,
    elapsed: f32,
    cloud: Option<NodeId>,
    disposed: bool,
}

impl BubbleEffect {
    /// Unbound bubble emitter for `target`
    pub fn new(target: NodeId, options: Options) -> Self {
        let params: BubbleParams = parse_params(&EffectKind::Bubble, &options);
        Self {
            target,
            rng: StdRng::seed_from_u64(params.seed),
            params,
            options,
            bubbles: Vec::new(),
            elapsed: 0.0,
            cloud: None,
            disposed: false,
        }
    }

    fn position(&self, bubble: &Bubble) -> Vec3 {
        let sway = (self.elapsed + bubble.phase).sin() * self.params.sway;
        Vec3::new(bubble.base_x + sway, bubble.y, bubble.z)
    }

    fn write_positions(&self, ctx: &mut EffectContext<'_>) {
        let positions: Vec<Vec3> = self.bubbles.iter().map(|b| self.position(b)).collect();
        if let Some(Geometry::Points(cloud)) = self
            .cloud
            .and_then(|id| ctx.graph.get_mut(id))
            .and_then(|node| node.geometry.as_mut())
        {
            cloud.positions = positions;
        }
    }
}

impl Effect for BubbleEffect {
    fn kind(&self) -> EffectKind {
        EffectKind::Bubble
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
        let half = self.params.area * 0.5;
        let (low, high) = (self.params.min_speed, self.params.max_speed.max(self.params.min_speed));
        let height = self.params.height.max(0.0);
        self.bubbles = (0..self.params.count)
            .map(|_| Bubble {
                base_x: self.rng.gen_range(-half..=half),
                z: self.rng.gen_range(-half..=half),
                y: self.rng.gen_range(0.0..=height),
                speed: self.rng.gen_range(low..=high),
                phase: self.rng.gen_range(0.0..std::f32::consts::TAU),
            })
            .collect();

        let node = Node::mesh(
            "bubbles",
            Geometry::Points(PointCloud {
                positions: Vec::new(),
                size: self.params.size,
            }),
            Material::unlit(Color::new(0.75, 0.9, 1.0)).with_opacity(0.5).with_name("bubbles"),
        )
        .with_flags(NodeFlags::EFFECT_OWNED | NodeFlags::IGNORE_PICK);
        self.cloud = Some(ctx.graph.add(node, self.target));
        self.write_positions(ctx);
        Ok(())
    }

    fn update(&mut self, ctx: &mut EffectContext<'_>, delta: f32) {
        if delta <= 0.0 || self.disposed {
            return;
        }
        self.elapsed += delta;
        let height = self.params.height;
        for bubble in &mut self.bubbles {
            bubble.y += bubble.speed * delta;
            if bubble.y > height {
                bubble.y = 0.0;
            }
        }
        self.write_positions(ctx);
    }

    fn dispose(&mut self, ctx: &mut EffectContext<'_>) {
        if self.disposed {
            return;
        }
        if let Some(id) = self.cloud.take() {
            ctx.graph.remove(id);
        }
        self.bubbles.clear();
        self.disposed = true;
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::test_support::Fixture;

    fn heights(fx: &Fixture, effect: &BubbleEffect) -> Vec<f32> {
        match effect.cloud.and_then(|id| fx.graph.get(id)).and_then(|n| n.geometry.clone()) {
            Some(Geometry::Points(cloud)) => cloud.positions.iter().map(|p| p.y).collect(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_bubbles_rise_and_wrap() {
        let mut fx = Fixture::new();
        let root = fx.graph.content_root();
        let mut bubbles = BubbleEffect::new(root, Options::new());
        bubbles.init(&mut fx.ctx()).unwrap();
        let start = heights(&fx, &bubbles);
        assert_eq!(start.len(), 50);
        assert!(bubbles.bubbles.iter().all(|b| (0.3..=1.1).contains(&b.speed)));

        bubbles.update(&mut fx.ctx(), 1.0);
        let after = heights(&fx, &bubbles);
        for (before, now) in start.iter().zip(&after) {
            assert!(now > before || *now == 0.0);
        }

        for _ in 0..300 {
            bubbles.update(&mut fx.ctx(), 1.0);
        }
        assert!(heights(&fx, &bubbles).iter().all(|y| (0.0..=60.0).contains(y)));
    }

    #[test]
    fn test_zero_delta_keeps_positions() {
        let mut fx = Fixture::new();
        let root = fx.graph.content_root();
        let mut bubbles = BubbleEffect::new(root, Options::new());
        bubbles.init(&mut fx.ctx()).unwrap();
        let start = heights(&fx, &bubbles);
        bubbles.update(&mut fx.ctx(), 0.0);
        assert_eq!(heights(&fx, &bubbles), start);
    }
}
