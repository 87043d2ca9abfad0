//! Ping-pong uniform scale animation

use serde::Deserialize;

use super::{parse_params, Effect, EffectContext, EffectError, EffectKind};
use crate::foundation::math::Vec3;
use crate::scene::{NodeId, Options};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ScaleParams {
    speed: f32,
    max_scale: f32,
}

impl Default for ScaleParams {
    fn default() -> Self {
        Self {
            speed: 1.0,
            max_scale: 2.0,
        }
    }
}

/// Scales the target between its original size and `maxScale` times it
pub struct ScaleAnimate {
    target: NodeId,
    options: Options,
    params: ScaleParams,
    original: Option<Vec3>,
    phase: f32,
    disposed: bool,
}

impl ScaleAnimate {
    /// Unbound scale animation for `target`
    pub fn new(target: NodeId, options: Options) -> Self {
        Self {
            target,
            params: parse_params(&EffectKind::ScaleAnimate, &options),
            options,
            original: None,
            phase: 0.0,
            disposed: false,
        }
    }

    /// Scale factor for the current phase, 1 at phase 0 and `max_scale` at phase 1
    fn factor(&self) -> f32 {
        let t = self.phase % 2.0;
        let ping = if t <= 1.0 { t } else { 2.0 - t };
        1.0 + (self.params.max_scale - 1.0) * ping
    }
}

impl Effect for ScaleAnimate {
    fn kind(&self) -> EffectKind {
        EffectKind::ScaleAnimate
    }

    fn target(&self) -> NodeId {
        self.target
    }

    fn options(&self) -> &Options {
        &self.options
    }

    fn init(&mut self, ctx: &mut EffectContext<'_>) -> Result<(), EffectError> {
        let node = ctx.graph.get(self.target).ok_or(EffectError::MissingTarget(self.target))?;
        self.original = Some(node.transform.scale);
        Ok(())
    }

    fn update(&mut self, ctx: &mut EffectContext<'_>, delta: f32) {
        if delta <= 0.0 || self.disposed {
            return;
        }
        let Some(original) = self.original else {
            return;
        };
        self.phase = (self.phase + delta * self.params.speed) % 2.0;
        let factor = self.factor();
        if let Some(node) = ctx.graph.get_mut(self.target) {
            node.transform.scale = original * factor;
        }
    }

    fn dispose(&mut self, ctx: &mut EffectContext<'_>) {
        if self.disposed {
            return;
        }
        if let (Some(original), Some(node)) = (self.original.take(), ctx.graph.get_mut(self.target)) {
            node.transform.scale = original;
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
    use approx::assert_relative_eq;

    #[test]
    fn test_ping_pong_and_restore() {
        let mut fx = Fixture::new();
        let target = fx.target;
        fx.graph.get_mut(target).unwrap().transform.scale = Vec3::new(2.0, 2.0, 2.0);

        let mut effect = ScaleAnimate::new(target, Options::new());
        effect.init(&mut fx.ctx()).unwrap();

        effect.update(&mut fx.ctx(), 0.5);
        assert_relative_eq!(fx.graph.get(target).unwrap().transform.scale.x, 3.0, epsilon = 1e-5);
        effect.update(&mut fx.ctx(), 0.5);
        assert_relative_eq!(fx.graph.get(target).unwrap().transform.scale.x, 4.0, epsilon = 1e-5);
        effect.update(&mut fx.ctx(), 0.5);
        assert_relative_eq!(fx.graph.get(target).unwrap().transform.scale.x, 3.0, epsilon = 1e-5);

        effect.dispose(&mut fx.ctx());
        effect.dispose(&mut fx.ctx());
        assert_eq!(fx.graph.get(target).unwrap().transform.scale, Vec3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn test_options_override_defaults() {
        let mut fx = Fixture::new();
        let mut options = Options::new();
        options.insert("speed".into(), 2.0.into());
        options.insert("maxScale".into(), 3.0.into());
        let mut effect = ScaleAnimate::new(fx.target, options);
        effect.init(&mut fx.ctx()).unwrap();
        effect.update(&mut fx.ctx(), 0.5);
        assert_relative_eq!(fx.graph.get(fx.target).unwrap().transform.scale.y, 3.0, epsilon = 1e-5);
    }
}
