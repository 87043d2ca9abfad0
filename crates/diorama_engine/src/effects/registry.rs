//! Static effect registry
//!
//! Maps an [`EffectKind`] to the function that builds it. Built-in kinds
//! are registered up front; applications add their own with
//! [`EffectRegistry::register`].

use std::collections::HashMap;

use super::{
    BloomEffect, BubbleEffect, Effect, EffectError, EffectKind, ScaleAnimate,
    SignalInterferenceEffect, SnowEffect, ToonOutlineEffect,
};
use crate::scene::{NodeId, Options};

/// Builds an unbound effect for a target
pub type EffectFactory = fn(NodeId, Options) -> Box<dyn Effect>;

/// Kind to factory table
#[derive(Clone)]
pub struct EffectRegistry {
    factories: HashMap<EffectKind, EffectFactory>,
}

impl EffectRegistry {
    /// Registry without any kinds
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with every built-in kind
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(EffectKind::Snow, build_snow);
        registry.register(EffectKind::Bubble, build_bubble);
        registry.register(EffectKind::ScaleAnimate, build_scale_animate);
        registry.register(EffectKind::SignalInterference, build_signal_interference);
        registry.register(EffectKind::Bloom, build_bloom);
        registry.register(EffectKind::ToonOutline, build_toon_outline);
        registry
    }

    /// Register or replace a factory; returns the previous one
    pub fn register(&mut self, kind: EffectKind, factory: EffectFactory) -> Option<EffectFactory> {
        log::debug!("Registering effect kind {}", kind);
        self.factories.insert(kind, factory)
    }

    /// Whether `kind` has a factory
    pub fn contains(&self, kind: &EffectKind) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<EffectKind> {
        let mut kinds: Vec<_> = self.factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Build an effect
    ///
    /// # Errors
    /// [`EffectError::UnknownKind`] when nothing is registered for `kind`.
    pub fn create(&self, kind: &EffectKind, target: NodeId, options: Options) -> Result<Box<dyn Effect>, EffectError> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| EffectError::UnknownKind(kind.name().to_string()))?;
        Ok(factory(target, options))
    }
}

fn build_snow(target: NodeId, options: Options) -> Box<dyn Effect> {
    Box::new(SnowEffect::new(target, options))
}

fn build_bubble(target: NodeId, options: Options) -> Box<dyn Effect> {
    Box::new(BubbleEffect::new(target, options))
}

fn build_scale_animate(target: NodeId, options: Options) -> Box<dyn Effect> {
    Box::new(ScaleAnimate::new(target, options))
}

fn build_signal_interference(target: NodeId, options: Options) -> Box<dyn Effect> {
    Box::new(SignalInterferenceEffect::new(target, options))
}

fn build_bloom(target: NodeId, options: Options) -> Box<dyn Effect> {
    Box::new(BloomEffect::new(target, options))
}

fn build_toon_outline(target: NodeId, options: Options) -> Box<dyn Effect> {
    Box::new(ToonOutlineEffect::new(target, options))
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::test_support::Fixture;

    #[test]
    fn test_builtins_registered() {
        let registry = EffectRegistry::with_builtins();
        assert_eq!(registry.kinds().len(), 6);
        let fixture = Fixture::new();
        let effect = registry.create(&EffectKind::Snow, fixture.target, Options::new()).unwrap();
        assert_eq!(effect.kind(), EffectKind::Snow);
        assert_eq!(effect.target(), fixture.target);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let registry = EffectRegistry::empty();
        let fixture = Fixture::new();
        assert_eq!(
            registry.create(&EffectKind::Bloom, fixture.target, Options::new()).err(),
            Some(EffectError::UnknownKind("BloomEffect".into()))
        );
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = EffectRegistry::empty();
        assert!(registry
            .register(EffectKind::Custom("Pulse".into()), build_scale_animate)
            .is_none());
        assert!(registry.contains(&EffectKind::Custom("Pulse".into())));
    }
}
