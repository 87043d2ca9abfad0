//! Effect lifecycle management
//!
//! Effects live in a slot map keyed by [`EffectId`]. Registration order is
//! kept separately for deterministic updates, and a side table maps each
//! target node to the effects bound to it.

use std::collections::HashMap;

use slotmap::{new_key_type, SlotMap};

use super::{wants_replace, Effect, EffectContext, EffectError, EffectKind, EffectRegistry};
use crate::scene::{NodeId, Options};

new_key_type! {
    /// Handle of an attached effect
    pub struct EffectId;
}

/// What to do when the target already has an effect of the same kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddMode {
    /// Warn and refuse the new effect
    #[default]
    Reject,
    /// Dispose the existing effect first; it is re-attached if the new
    /// one fails to initialise
    Replace,
}

/// Owns every attached effect
#[derive(Default)]
pub struct EffectManager {
    registry: EffectRegistry,
    effects: SlotMap<EffectId, Box<dyn Effect>>,
    order: Vec<EffectId>,
    by_target: HashMap<NodeId, Vec<EffectId>>,
}

impl EffectManager {
    /// Manager using the given registry
    pub fn new(registry: EffectRegistry) -> Self {
        Self {
            registry,
            effects: SlotMap::with_key(),
            order: Vec::new(),
            by_target: HashMap::new(),
        }
    }

    /// Factories used to build effects
    pub fn registry(&self) -> &EffectRegistry {
        &self.registry
    }

    /// Number of attached effects
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// Whether no effect is attached
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Attach an effect to `target`
    ///
    /// `onlyOne` or `replace` set to true in `options` upgrades `mode` to
    /// [`AddMode::Replace`].
    ///
    /// # Errors
    /// - [`EffectError::UnknownKind`] if the registry has no factory
    /// - [`EffectError::MissingTarget`] if the node does not exist
    /// - [`EffectError::AlreadyAttached`] for a duplicate in reject mode
    /// - whatever the new effect's `init` returns
    pub fn add_effect(
        &mut self,
        kind: &EffectKind,
        target: NodeId,
        options: Options,
        mode: AddMode,
        ctx: &mut EffectContext<'_>,
    ) -> Result<EffectId, EffectError> {
        if !self.registry.contains(kind) {
            return Err(EffectError::UnknownKind(kind.name().to_string()));
        }
        if !ctx.graph.contains(target) {
            return Err(EffectError::MissingTarget(target));
        }

        let mode = if wants_replace(&options) { AddMode::Replace } else { mode };
        if let Some(existing) = self.find(target, kind) {
            match mode {
                AddMode::Reject => {
                    log::warn!("{} already exists on {:?}; ignoring duplicate", kind, target);
                    return Err(EffectError::AlreadyAttached {
                        kind: kind.name().to_string(),
                        target,
                    });
                }
                AddMode::Replace => {
                    log::debug!("Replacing {} on {:?}", kind, target);
                    let previous = self.effects.get(existing).map(|effect| effect.options().clone());
                    self.dispose_one(existing, ctx);
                    let result = self.attach(kind, target, options, ctx);
                    if let (Err(e), Some(previous)) = (&result, previous) {
                        log::warn!("Replacement {} failed ({}); restoring the previous one", kind, e);
                        if let Err(e) = self.attach(kind, target, previous, ctx) {
                            log::warn!("Could not restore {} on {:?}: {}", kind, target, e);
                        }
                    }
                    return result;
                }
            }
        }
        self.attach(kind, target, options, ctx)
    }

    fn attach(
        &mut self,
        kind: &EffectKind,
        target: NodeId,
        options: Options,
        ctx: &mut EffectContext<'_>,
    ) -> Result<EffectId, EffectError> {
        let mut effect = self.registry.create(kind, target, options)?;
        effect.init(ctx)?;
        let id = self.effects.insert(effect);
        self.order.push(id);
        self.by_target.entry(target).or_default().push(id);
        log::debug!("Added {} to {:?}", kind, target);
        Ok(id)
    }

    /// Attach an effect by document name
    pub fn add_effect_by_name(
        &mut self,
        name: &str,
        target: NodeId,
        options: Options,
        ctx: &mut EffectContext<'_>,
    ) -> Result<EffectId, EffectError> {
        self.add_effect(&EffectKind::from_name(name), target, options, AddMode::Reject, ctx)
    }

    /// Effect of `kind` on `target`, if any
    pub fn find(&self, target: NodeId, kind: &EffectKind) -> Option<EffectId> {
        self.by_target.get(&target)?.iter().copied().find(|id| {
            self.effects.get(*id).is_some_and(|effect| effect.kind() == *kind)
        })
    }

    /// Whether `target` has an effect of `kind`
    pub fn has_effect(&self, target: NodeId, kind: &EffectKind) -> bool {
        self.find(target, kind).is_some()
    }

    /// Attached effect by id
    pub fn get(&self, id: EffectId) -> Option<&dyn Effect> {
        self.effects.get(id).map(AsRef::as_ref)
    }

    /// Kinds attached to `target`, in attach order
    pub fn effects_on(&self, target: NodeId) -> Vec<EffectKind> {
        self.by_target
            .get(&target)
            .map(|ids| ids.iter().filter_map(|id| self.effects.get(*id)).map(|e| e.kind()).collect())
            .unwrap_or_default()
    }

    /// Every effect in registration order
    pub fn iter(&self) -> impl Iterator<Item = (EffectId, &dyn Effect)> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.effects.get(*id).map(|effect| (*id, effect.as_ref())))
    }

    /// Detach and dispose one effect kind from `target`; false if none was attached
    pub fn remove_effect(&mut self, target: NodeId, kind: &EffectKind, ctx: &mut EffectContext<'_>) -> bool {
        match self.find(target, kind) {
            Some(id) => {
                self.dispose_one(id, ctx);
                true
            }
            None => false,
        }
    }

    /// Detach and dispose everything on `target`; returns how many were removed
    pub fn remove_all_effects(&mut self, target: NodeId, ctx: &mut EffectContext<'_>) -> usize {
        let ids = self.by_target.get(&target).cloned().unwrap_or_default();
        for id in &ids {
            self.dispose_one(*id, ctx);
        }
        ids.len()
    }

    /// Detach effects whose targets were removed from the graph
    pub fn on_nodes_removed(&mut self, removed: &[NodeId], ctx: &mut EffectContext<'_>) {
        for node in removed {
            let count = self.remove_all_effects(*node, ctx);
            if count > 0 {
                log::debug!("Detached {} effects from removed node {:?}", count, node);
            }
        }
    }

    /// Advance every effect in registration order
    pub fn update(&mut self, delta: f32, ctx: &mut EffectContext<'_>) {
        for id in &self.order {
            if let Some(effect) = self.effects.get_mut(*id) {
                effect.update(ctx, delta);
            }
        }
    }

    /// Dispose every effect
    pub fn dispose_all(&mut self, ctx: &mut EffectContext<'_>) {
        for id in std::mem::take(&mut self.order) {
            if let Some(mut effect) = self.effects.remove(id) {
                effect.dispose(ctx);
            }
        }
        self.by_target.clear();
    }

    fn dispose_one(&mut self, id: EffectId, ctx: &mut EffectContext<'_>) {
        let Some(mut effect) = self.effects.remove(id) else {
            return;
        };
        let target = effect.target();
        self.order.retain(|other| *other != id);
        if let Some(ids) = self.by_target.get_mut(&target) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_target.remove(&target);
            }
        }
        effect.dispose(ctx);
        log::debug!("Removed {} from {:?}", effect.kind(), target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::test_support::Fixture;
    use crate::scene::{NodeFlags, SceneGraph};

    fn snapshot(graph: &SceneGraph) -> Vec<String> {
        let mut out: Vec<String> = graph.iter().map(|(id, node)| format!("{id:?}{node:?}")).collect();
        out.sort();
        out
    }

    /// Fails `init` when its options carry `"fail": true`
    struct Picky {
        target: NodeId,
        options: Options,
    }

    impl Effect for Picky {
        fn kind(&self) -> EffectKind {
            EffectKind::Custom("Picky".into())
        }
        fn target(&self) -> NodeId {
            self.target
        }
        fn options(&self) -> &Options {
            &self.options
        }
        fn init(&mut self, _ctx: &mut EffectContext<'_>) -> Result<(), EffectError> {
            if self.options.get("fail").and_then(serde_json::Value::as_bool) == Some(true) {
                return Err(EffectError::InvalidOptions {
                    kind: "Picky".into(),
                    reason: "asked to fail".into(),
                });
            }
            Ok(())
        }
        fn update(&mut self, _ctx: &mut EffectContext<'_>, _delta: f32) {}
        fn dispose(&mut self, _ctx: &mut EffectContext<'_>) {}
        fn is_disposed(&self) -> bool {
            false
        }
    }

    fn build_picky(target: NodeId, options: Options) -> Box<dyn Effect> {
        Box::new(Picky { target, options })
    }

    #[test]
    fn test_failed_replacement_keeps_previous_effect() {
        let mut fx = Fixture::new();
        let target = fx.target;
        let kind = EffectKind::Custom("Picky".into());
        let mut registry = EffectRegistry::empty();
        registry.register(kind.clone(), build_picky);
        let mut manager = EffectManager::new(registry);

        let mut options = Options::new();
        options.insert("label".into(), "first".into());
        manager.add_effect(&kind, target, options, AddMode::Reject, &mut fx.ctx()).unwrap();

        let mut failing = Options::new();
        failing.insert("fail".into(), true.into());
        let result = manager.add_effect(&kind, target, failing, AddMode::Replace, &mut fx.ctx());
        assert!(matches!(result, Err(EffectError::InvalidOptions { .. })));

        assert_eq!(manager.len(), 1);
        let id = manager.find(target, &kind).unwrap();
        assert_eq!(manager.get(id).unwrap().options()["label"], "first");
    }

    #[test]
    fn test_duplicate_is_rejected_once() {
        let mut fx = Fixture::new();
        let root = fx.graph.content_root();
        let mut manager = EffectManager::default();

        manager.add_effect(&EffectKind::Snow, root, Options::new(), AddMode::Reject, &mut fx.ctx()).unwrap();
        let second = manager.add_effect(&EffectKind::Snow, root, Options::new(), AddMode::Reject, &mut fx.ctx());
        assert!(matches!(second, Err(EffectError::AlreadyAttached { .. })));
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.effects_on(root), vec![EffectKind::Snow]);
        let particle_nodes = fx
            .graph
            .iter()
            .filter(|(_, n)| n.flags.contains(NodeFlags::EFFECT_OWNED))
            .count();
        assert_eq!(particle_nodes, 1);
    }

    #[test]
    fn test_replace_disposes_previous() {
        let mut fx = Fixture::new();
        let target = fx.target;
        let mut manager = EffectManager::default();
        let first = manager
            .add_effect(&EffectKind::ScaleAnimate, target, Options::new(), AddMode::Reject, &mut fx.ctx())
            .unwrap();
        let mut options = Options::new();
        options.insert("onlyOne".into(), true.into());
        let second = manager
            .add_effect(&EffectKind::ScaleAnimate, target, options, AddMode::Reject, &mut fx.ctx())
            .unwrap();
        assert_ne!(first, second);
        assert!(manager.get(first).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_unknown_and_missing_target() {
        let mut fx = Fixture::new();
        let mut manager = EffectManager::default();
        let target = fx.target;
        assert!(matches!(
            manager.add_effect_by_name("NopeEffect", target, Options::new(), &mut fx.ctx()),
            Err(EffectError::UnknownKind(_))
        ));
        fx.graph.remove(target);
        assert!(matches!(
            manager.add_effect(&EffectKind::Bloom, target, Options::new(), AddMode::Reject, &mut fx.ctx()),
            Err(EffectError::MissingTarget(_))
        ));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_update_zero_is_idempotent() {
        let mut fx = Fixture::new();
        let target = fx.target;
        let root = fx.graph.content_root();
        let mut manager = EffectManager::default();
        for kind in [EffectKind::Snow, EffectKind::Bubble] {
            manager.add_effect(&kind, root, Options::new(), AddMode::Reject, &mut fx.ctx()).unwrap();
        }
        for kind in [
            EffectKind::ScaleAnimate,
            EffectKind::SignalInterference,
            EffectKind::Bloom,
            EffectKind::ToonOutline,
        ] {
            manager.add_effect(&kind, target, Options::new(), AddMode::Reject, &mut fx.ctx()).unwrap();
        }
        manager.update(0.25, &mut fx.ctx());

        let before = snapshot(&fx.graph);
        let bloom_before = fx.bloom;
        manager.update(0.0, &mut fx.ctx());
        assert_eq!(snapshot(&fx.graph), before);
        assert_eq!(fx.bloom, bloom_before);
    }

    #[test]
    fn test_remove_all_and_double_remove() {
        let mut fx = Fixture::new();
        let target = fx.target;
        let mut manager = EffectManager::default();
        let before = snapshot(&fx.graph);
        manager.add_effect(&EffectKind::ScaleAnimate, target, Options::new(), AddMode::Reject, &mut fx.ctx()).unwrap();
        manager.add_effect(&EffectKind::SignalInterference, target, Options::new(), AddMode::Reject, &mut fx.ctx()).unwrap();
        manager.update(0.3, &mut fx.ctx());

        assert_eq!(manager.remove_all_effects(target, &mut fx.ctx()), 2);
        assert_eq!(manager.remove_all_effects(target, &mut fx.ctx()), 0);
        assert!(!manager.remove_effect(target, &EffectKind::ScaleAnimate, &mut fx.ctx()));
        assert_eq!(snapshot(&fx.graph), before);
    }

    #[test]
    fn test_node_removal_detaches_effects() {
        let mut fx = Fixture::new();
        let target = fx.target;
        let mut manager = EffectManager::default();
        manager.add_effect(&EffectKind::Bubble, target, Options::new(), AddMode::Reject, &mut fx.ctx()).unwrap();
        let removed = fx.graph.remove(target);
        manager.on_nodes_removed(&removed, &mut fx.ctx());
        assert!(manager.is_empty());
        manager.update(1.0, &mut fx.ctx());
    }

    #[test]
    fn test_iteration_follows_registration_order() {
        let mut fx = Fixture::new();
        let target = fx.target;
        let root = fx.graph.content_root();
        let mut manager = EffectManager::default();
        manager.add_effect(&EffectKind::Bloom, target, Options::new(), AddMode::Reject, &mut fx.ctx()).unwrap();
        manager.add_effect(&EffectKind::Snow, root, Options::new(), AddMode::Reject, &mut fx.ctx()).unwrap();
        let kinds: Vec<_> = manager.iter().map(|(_, e)| e.kind()).collect();
        assert_eq!(kinds, vec![EffectKind::Bloom, EffectKind::Snow]);
    }
}
