//! Selective bloom on a subtree

use serde::Deserialize;

use super::{parse_params, Effect, EffectContext, EffectError, EffectKind};
use crate::config::BloomConfig;
use crate::scene::{NodeFlags, NodeId, Options};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct BloomParams {
    strength: Option<f32>,
    radius: Option<u32>,
    threshold: Option<f32>,
}

/// Flags the target subtree for the bloom mask pass
pub struct BloomEffect {
    target: NodeId,
    options: Options,
    params: BloomParams,
    flagged: Vec<NodeId>,
    previous_settings: Option<BloomConfig>,
    disposed: bool,
}

impl BloomEffect {
    /// Unbound bloom effect for `target`
    pub fn new(target: NodeId, options: Options) -> Self {
        Self {
            target,
            params: parse_params(&EffectKind::Bloom, &options),
            options,
            flagged: Vec::new(),
            previous_settings: None,
            disposed: false,
        }
    }
}

impl Effect for BloomEffect {
    fn kind(&self) -> EffectKind {
        EffectKind::Bloom
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
        for id in ctx.graph.descendants(self.target) {
            if let Some(node) = ctx.graph.get_mut(id) {
                if !node.flags.contains(NodeFlags::BLOOM) {
                    node.flags.insert(NodeFlags::BLOOM);
                    self.flagged.push(id);
                }
            }
        }

        let params = &self.params;
        if params.strength.is_some() || params.radius.is_some() || params.threshold.is_some() {
            self.previous_settings = Some(*ctx.bloom);
            if let Some(strength) = params.strength {
                ctx.bloom.strength = strength;
            }
            if let Some(radius) = params.radius {
                ctx.bloom.radius = radius;
            }
            if let Some(threshold) = params.threshold {
                ctx.bloom.threshold = threshold;
            }
        }
        Ok(())
    }

    fn update(&mut self, _ctx: &mut EffectContext<'_>, _delta: f32) {}

    fn dispose(&mut self, ctx: &mut EffectContext<'_>) {
        if self.disposed {
            return;
        }
        for id in self.flagged.drain(..) {
            if let Some(node) = ctx.graph.get_mut(id) {
                node.flags.remove(NodeFlags::BLOOM);
            }
        }
        if let Some(previous) = self.previous_settings.take() {
            let enabled = ctx.bloom.enabled;
            *ctx.bloom = BloomConfig { enabled, ..previous };
        }
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
    use crate::foundation::color::Color;
    use crate::render::Material;
    use crate::scene::{Geometry, Node};

    #[test]
    fn test_flags_subtree_and_restores() {
        let mut fx = Fixture::new();
        let target = fx.target;
        let child = fx.graph.add(
            Node::mesh("child", Geometry::sphere(0.2), Material::lit(Color::WHITE)),
            target,
        );
        let already = fx.graph.add(
            Node::group("glow").with_flags(NodeFlags::BLOOM),
            target,
        );

        let mut options = Options::new();
        options.insert("strength".into(), 2.5.into());
        let mut effect = BloomEffect::new(target, options);
        effect.init(&mut fx.ctx()).unwrap();
        assert!(fx.graph.get(child).unwrap().flags.contains(NodeFlags::BLOOM));
        assert!((fx.bloom.strength - 2.5).abs() < 1e-6);

        effect.dispose(&mut fx.ctx());
        effect.dispose(&mut fx.ctx());
        assert!(!fx.graph.get(target).unwrap().flags.contains(NodeFlags::BLOOM));
        assert!(!fx.graph.get(child).unwrap().flags.contains(NodeFlags::BLOOM));
        assert!(fx.graph.get(already).unwrap().flags.contains(NodeFlags::BLOOM));
        assert!((fx.bloom.strength - 1.0).abs() < 1e-6);
    }
}
