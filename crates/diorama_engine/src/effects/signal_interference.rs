//! Scanline interference look

use serde::Deserialize;

use super::{parse_params, Effect, EffectContext, EffectError, EffectKind};
use crate::render::{Material, Shading};
use crate::scene::{NodeId, Options};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct InterferenceParams {
    intensity: f32,
    speed: f32,
}

impl Default for InterferenceParams {
    fn default() -> Self {
        Self {
            intensity: 0.6,
            speed: 1.0,
        }
    }
}

/// Swaps every material under the target for an animated interference
/// variant; the originals are put back on dispose.
pub struct SignalInterferenceEffect {
    target: NodeId,
    options: Options,
    params: InterferenceParams,
    originals: Vec<(NodeId, Material)>,
    time: f32,
    disposed: bool,
}

impl SignalInterferenceEffect {
    /// Unbound interference effect for `target`
    pub fn new(target: NodeId, options: Options) -> Self {
        Self {
            target,
            params: parse_params(&EffectKind::SignalInterference, &options),
            options,
            originals: Vec::new(),
            time: 0.0,
            disposed: false,
        }
    }

    fn apply(&self, ctx: &mut EffectContext<'_>) {
        for (id, _) in &self.originals {
            if let Some(material) = ctx.graph.get_mut(*id).and_then(|n| n.material.as_mut()) {
                material.shading = Shading::Interference {
                    time: self.time,
                    intensity: self.params.intensity,
                };
            }
        }
    }
}

impl Effect for SignalInterferenceEffect {
    fn kind(&self) -> EffectKind {
        EffectKind::SignalInterference
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
        self.originals = ctx
            .graph
            .descendants(self.target)
            .into_iter()
            .filter_map(|id| Some((id, ctx.graph.get(id)?.material.clone()?)))
            .collect();
        self.apply(ctx);
        Ok(())
    }

    fn update(&mut self, ctx: &mut EffectContext<'_>, delta: f32) {
        if delta <= 0.0 || self.disposed {
            return;
        }
        self.time += delta * self.params.speed;
        self.apply(ctx);
    }

    fn dispose(&mut self, ctx: &mut EffectContext<'_>) {
        if self.disposed {
            return;
        }
        for (id, original) in self.originals.drain(..) {
            if let Some(node) = ctx.graph.get_mut(id) {
                node.material = Some(original);
            }
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

    #[test]
    fn test_swap_animate_restore() {
        let mut fx = Fixture::new();
        let target = fx.target;
        let original = fx.graph.get(target).unwrap().material.clone();

        let mut effect = SignalInterferenceEffect::new(target, Options::new());
        effect.init(&mut fx.ctx()).unwrap();
        effect.update(&mut fx.ctx(), 0.5);
        match fx.graph.get(target).unwrap().material.as_ref().unwrap().shading {
            Shading::Interference { time, intensity } => {
                assert!((time - 0.5).abs() < 1e-6);
                assert!((intensity - 0.6).abs() < 1e-6);
            }
            other => panic!("unexpected shading {other:?}"),
        }

        effect.dispose(&mut fx.ctx());
        effect.dispose(&mut fx.ctx());
        assert_eq!(fx.graph.get(target).unwrap().material, original);
    }
}
