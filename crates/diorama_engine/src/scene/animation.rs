//! Property tweens driven by document animation descriptors
//!
//! `animation` descriptors tween dotted property paths on a node;
//! `timeline` descriptors schedule their children one after another or all
//! at once. Start values are captured when a tween first becomes active.

use std::f32::consts::{PI, TAU};

use super::document::{AnimationSpec, EffectDescriptor};
use super::node::NodeId;
use super::scene_graph::SceneGraph;

/// Which half of the curve the easing applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EaseDirection {
    /// Accelerate from zero
    In,
    /// Decelerate to the end
    Out,
    /// Accelerate then decelerate
    InOut,
}

/// Easing curves named the way animation documents name them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    /// Constant speed (`none`, `linear`)
    Linear,
    /// Polynomial; `power1` is quadratic, `power4` quintic
    Power(u8, EaseDirection),
    /// Sine curve
    Sine(EaseDirection),
    /// Exponential
    Expo(EaseDirection),
    /// Circular
    Circ(EaseDirection),
    /// Overshoot
    Back(EaseDirection),
    /// Bounce
    Bounce(EaseDirection),
    /// Spring
    Elastic(EaseDirection),
}

impl Default for Easing {
    fn default() -> Self {
        Self::Power(1, EaseDirection::Out)
    }
}

impl Easing {
    /// Quadratic ease-out, used for camera transitions
    pub const QUAD_OUT: Self = Self::Power(1, EaseDirection::Out);

    /// Parse `family.direction` names such as `power2.inOut` or `sine.out`
    ///
    /// A bare family name eases out. Returns `None` for unknown names.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if matches!(name, "none" | "linear" | "power0" | "Linear.easeNone") {
            return Some(Self::Linear);
        }
        let (family, direction) = match name.split_once('.') {
            Some((family, dir)) => (family, dir),
            None => (name, "out"),
        };
        let direction = match direction {
            "in" | "easeIn" => EaseDirection::In,
            "out" | "easeOut" => EaseDirection::Out,
            "inOut" | "easeInOut" => EaseDirection::InOut,
            _ => return None,
        };
        Some(match family {
            "power0" => Self::Linear,
            "power1" | "quad" => Self::Power(1, direction),
            "power2" | "cubic" => Self::Power(2, direction),
            "power3" | "quart" => Self::Power(3, direction),
            "power4" | "quint" | "strong" => Self::Power(4, direction),
            "sine" => Self::Sine(direction),
            "expo" => Self::Expo(direction),
            "circ" => Self::Circ(direction),
            "back" => Self::Back(direction),
            "bounce" => Self::Bounce(direction),
            "elastic" => Self::Elastic(direction),
            _ => return None,
        })
    }

    /// Map linear progress in `[0, 1]` to eased progress
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        let direction = match self {
            Self::Linear => return t,
            Self::Power(_, d)
            | Self::Sine(d)
            | Self::Expo(d)
            | Self::Circ(d)
            | Self::Back(d)
            | Self::Bounce(d)
            | Self::Elastic(d) => d,
        };
        shape(direction, t, |x| self.ease_in(x))
    }

    fn ease_in(self, x: f32) -> f32 {
        match self {
            Self::Linear => x,
            Self::Power(power, _) => x.powi(i32::from(power) + 1),
            Self::Sine(_) => 1.0 - (x * PI * 0.5).cos(),
            Self::Expo(_) => {
                if x <= 0.0 {
                    0.0
                } else {
                    2f32.powf(10.0 * (x - 1.0))
                }
            }
            Self::Circ(_) => 1.0 - (1.0 - x * x).max(0.0).sqrt(),
            Self::Back(_) => x * x * ((BACK_OVERSHOOT + 1.0) * x - BACK_OVERSHOOT),
            Self::Bounce(_) => 1.0 - bounce_out(1.0 - x),
            Self::Elastic(_) => {
                if x <= 0.0 || x >= 1.0 {
                    x
                } else {
                    -(2f32.powf(10.0 * (x - 1.0))) * ((x - 1.075) * TAU / 0.3).sin()
                }
            }
        }
    }
}

const BACK_OVERSHOOT: f32 = 1.70158;

/// Build out and in-out variants from an ease-in curve
fn shape(direction: EaseDirection, t: f32, ease_in: impl Fn(f32) -> f32) -> f32 {
    match direction {
        EaseDirection::In => ease_in(t),
        EaseDirection::Out => 1.0 - ease_in(1.0 - t),
        EaseDirection::InOut => {
            if t < 0.5 {
                ease_in(t * 2.0) * 0.5
            } else {
                1.0 - ease_in((1.0 - t) * 2.0) * 0.5
            }
        }
    }
}

fn bounce_out(t: f32) -> f32 {
    const N: f32 = 7.5625;
    const D: f32 = 2.75;
    if t < 1.0 / D {
        N * t * t
    } else if t < 2.0 / D {
        let t = t - 1.5 / D;
        N * t * t + 0.75
    } else if t < 2.5 / D {
        let t = t - 2.25 / D;
        N * t * t + 0.9375
    } else {
        let t = t - 2.625 / D;
        N * t * t + 0.984_375
    }
}

/// Animatable node property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimProperty {
    /// `position.x|y|z`
    Position(usize),
    /// `rotation.x|y|z` (Euler XYZ, radians)
    Rotation(usize),
    /// `scale.x|y|z`
    Scale(usize),
    /// `scale`, all three axes
    UniformScale,
    /// `material.opacity`
    Opacity,
}

impl AnimProperty {
    /// Parse a dotted property path
    pub fn parse(path: &str) -> Option<Self> {
        let axis = |a: &str| match a {
            "x" => Some(0),
            "y" => Some(1),
            "z" => Some(2),
            _ => None,
        };
        match path.split_once('.') {
            Some(("position", a)) => axis(a).map(Self::Position),
            Some(("rotation", a)) => axis(a).map(Self::Rotation),
            Some(("scale", a)) => axis(a).map(Self::Scale),
            Some(("material", "opacity")) => Some(Self::Opacity),
            None if path == "scale" => Some(Self::UniformScale),
            None if path == "opacity" => Some(Self::Opacity),
            _ => None,
        }
    }

    fn read(self, graph: &SceneGraph, node: NodeId) -> Option<f32> {
        let node = graph.get(node)?;
        Some(match self {
            Self::Position(i) => node.transform.position[i],
            Self::Rotation(i) => node.transform.euler_xyz()[i],
            Self::Scale(i) => node.transform.scale[i],
            Self::UniformScale => node.transform.scale.x,
            Self::Opacity => node.material.as_ref()?.opacity,
        })
    }

    fn write(self, graph: &mut SceneGraph, node: NodeId, value: f32) {
        let Some(node) = graph.get_mut(node) else {
            return;
        };
        match self {
            Self::Position(i) => node.transform.position[i] = value,
            Self::Rotation(i) => {
                let mut euler = node.transform.euler_xyz();
                euler[i] = value;
                node.transform.rotation = crate::foundation::math::quat_from_euler_xyz(euler);
            }
            Self::Scale(i) => node.transform.scale[i] = value,
            Self::UniformScale => node.transform.scale.fill(value),
            Self::Opacity => {
                if let Some(material) = node.material.as_mut() {
                    material.opacity = value.clamp(0.0, 1.0);
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Track {
    property: AnimProperty,
    from: Option<f32>,
    to: f32,
}

#[derive(Debug, Clone)]
struct NodeTween {
    node: NodeId,
    tracks: Vec<Track>,
    start: f32,
    duration: f32,
    ease: Easing,
    repeat: i32,
    yoyo: bool,
    repeat_delay: f32,
    finished: bool,
}

impl NodeTween {
    /// Progress along the curve for local time `t >= 0`, and whether the tween is done
    fn progress(&self, t: f32) -> (f32, bool) {
        let duration = self.duration.max(1e-6);
        let cycle = duration + self.repeat_delay.max(0.0);
        let mut iteration = (t / cycle).floor();
        let mut done = false;
        if self.repeat >= 0 && iteration > self.repeat as f32 {
            iteration = self.repeat as f32;
            done = true;
        }
        let local = if done { duration } else { t - iteration * cycle };
        let mut p = (local / duration).min(1.0);
        if done && self.repeat >= 0 {
            p = 1.0;
        } else if self.repeat >= 0 && iteration == self.repeat as f32 && p >= 1.0 {
            done = true;
        }
        if self.yoyo && (iteration as i64) % 2 == 1 {
            p = 1.0 - p;
        }
        (p, done)
    }
}

/// Total running time of a spec, infinite when it repeats forever
fn span(spec: &AnimationSpec) -> f32 {
    if spec.repeat < 0 {
        return f32::INFINITY;
    }
    let passes = spec.repeat as f32 + 1.0;
    spec.delay + spec.duration * passes + spec.repeat_delay * spec.repeat as f32
}

/// Runs every scheduled tween
#[derive(Debug, Default)]
pub struct AnimationSystem {
    tweens: Vec<NodeTween>,
    clock: f32,
}

impl AnimationSystem {
    /// Empty system
    pub fn new() -> Self {
        Self::default()
    }

    /// Active tweens
    pub fn len(&self) -> usize {
        self.tweens.len()
    }

    /// Whether no tween is running
    pub fn is_empty(&self) -> bool {
        self.tweens.is_empty()
    }

    /// Schedule an `animation` or `timeline` descriptor on `node`
    ///
    /// `effect` descriptors are ignored here; they are attached through the
    /// effect manager. Returns the number of tweens scheduled.
    pub fn add(&mut self, node: NodeId, descriptor: &EffectDescriptor) -> usize {
        let before = self.tweens.len();
        self.schedule(node, descriptor, self.clock);
        self.tweens.len() - before
    }

    /// Schedule a descriptor at absolute `offset`; returns its span
    fn schedule(&mut self, node: NodeId, descriptor: &EffectDescriptor, offset: f32) -> f32 {
        match descriptor {
            EffectDescriptor::Effect { .. } => 0.0,
            EffectDescriptor::Animation(spec) => {
                self.animate(node, spec, offset);
                span(spec)
            }
            EffectDescriptor::Timeline { children, sequence } => {
                let mut cursor = 0.0_f32;
                let mut longest = 0.0_f32;
                for child in children {
                    let start = if *sequence { cursor } else { 0.0 };
                    if !start.is_finite() {
                        log::debug!("Timeline child after an endless tween never starts");
                        break;
                    }
                    let child_span = self.schedule(node, child, offset + start);
                    cursor = start + child_span;
                    longest = longest.max(child_span);
                }
                if *sequence {
                    cursor
                } else {
                    longest
                }
            }
        }
    }

    fn animate(&mut self, node: NodeId, spec: &AnimationSpec, offset: f32) {
        let tracks: Vec<Track> = spec
            .properties
            .iter()
            .filter_map(|(path, to)| match AnimProperty::parse(path) {
                Some(property) => Some(Track {
                    property,
                    from: None,
                    to: *to,
                }),
                None => {
                    log::warn!("Unsupported animation property '{}'", path);
                    None
                }
            })
            .collect();
        if tracks.is_empty() {
            return;
        }
        let ease = match spec.ease.as_deref() {
            Some(name) => Easing::from_name(name).unwrap_or_else(|| {
                log::warn!("Unknown ease '{}', using default", name);
                Easing::default()
            }),
            None => Easing::default(),
        };
        self.tweens.push(NodeTween {
            node,
            tracks,
            start: offset + spec.delay.max(0.0),
            duration: spec.duration.max(0.0),
            ease,
            repeat: spec.repeat,
            yoyo: spec.yoyo,
            repeat_delay: spec.repeat_delay,
            finished: false,
        });
    }

    /// Advance by `delta` seconds; a non-positive delta changes nothing
    pub fn update(&mut self, graph: &mut SceneGraph, delta: f32) {
        if delta <= 0.0 {
            return;
        }
        self.clock += delta;
        let now = self.clock;
        for tween in &mut self.tweens {
            let t = now - tween.start;
            if t < 0.0 || !graph.contains(tween.node) {
                continue;
            }
            let (progress, done) = tween.progress(t);
            let eased = tween.ease.apply(progress);
            let node = tween.node;
            for track in &mut tween.tracks {
                let from = match track.from {
                    Some(from) => from,
                    None => {
                        let from = track.property.read(graph, node).unwrap_or(track.to);
                        track.from = Some(from);
                        from
                    }
                };
                track.property.write(graph, node, from + (track.to - from) * eased);
            }
            tween.finished = done;
        }
        self.tweens.retain(|t| !t.finished && graph.contains(t.node));
    }

    /// Drop tweens targeting removed nodes
    pub fn remove_nodes(&mut self, removed: &[NodeId]) {
        self.tweens.retain(|t| !removed.contains(&t.node));
    }

    /// Drop every tween
    pub fn clear(&mut self) {
        self.tweens.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Node;
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;

    fn spec(path: &str, to: f32, duration: f32) -> AnimationSpec {
        AnimationSpec {
            properties: BTreeMap::from([(path.to_string(), to)]),
            duration,
            ease: Some("none".into()),
            delay: 0.0,
            repeat: 0,
            yoyo: false,
            repeat_delay: 0.0,
        }
    }

    #[test]
    fn test_easing_names_and_endpoints() {
        assert_eq!(Easing::from_name("power2.inOut"), Some(Easing::Power(2, EaseDirection::InOut)));
        assert_eq!(Easing::from_name("sine"), Some(Easing::Sine(EaseDirection::Out)));
        assert_eq!(Easing::from_name("wobble.out"), None);
        for ease in [
            Easing::Linear,
            Easing::QUAD_OUT,
            Easing::Sine(EaseDirection::InOut),
            Easing::Expo(EaseDirection::In),
            Easing::Circ(EaseDirection::Out),
            Easing::Back(EaseDirection::Out),
            Easing::Bounce(EaseDirection::Out),
            Easing::Elastic(EaseDirection::Out),
        ] {
            assert_relative_eq!(ease.apply(0.0), 0.0, epsilon = 1e-3);
            assert_relative_eq!(ease.apply(1.0), 1.0, epsilon = 1e-3);
        }
        assert_relative_eq!(Easing::QUAD_OUT.apply(0.5), 0.75, epsilon = 1e-6);
    }

    #[test]
    fn test_property_paths() {
        assert_eq!(AnimProperty::parse("position.x"), Some(AnimProperty::Position(0)));
        assert_eq!(AnimProperty::parse("rotation.y"), Some(AnimProperty::Rotation(1)));
        assert_eq!(AnimProperty::parse("scale"), Some(AnimProperty::UniformScale));
        assert_eq!(AnimProperty::parse("scale.z"), Some(AnimProperty::Scale(2)));
        assert_eq!(AnimProperty::parse("material.opacity"), Some(AnimProperty::Opacity));
        assert_eq!(AnimProperty::parse("position.w"), None);
    }

    #[test]
    fn test_linear_tween_and_finish() {
        let mut graph = SceneGraph::new();
        let node = graph.add_to_content(Node::group("n"));
        let mut system = AnimationSystem::new();
        assert_eq!(system.add(node, &EffectDescriptor::Animation(spec("position.x", 4.0, 2.0))), 1);

        system.update(&mut graph, 0.0);
        assert_eq!(graph.get(node).unwrap().transform.position.x, 0.0);
        system.update(&mut graph, 1.0);
        assert_relative_eq!(graph.get(node).unwrap().transform.position.x, 2.0, epsilon = 1e-5);
        system.update(&mut graph, 1.5);
        assert_relative_eq!(graph.get(node).unwrap().transform.position.x, 4.0, epsilon = 1e-5);
        assert!(system.is_empty());
    }

    #[test]
    fn test_yoyo_repeat_returns_to_start() {
        let mut graph = SceneGraph::new();
        let node = graph.add_to_content(Node::group("n"));
        let mut system = AnimationSystem::new();
        let mut s = spec("scale", 2.0, 1.0);
        s.repeat = 1;
        s.yoyo = true;
        system.add(node, &EffectDescriptor::Animation(s));
        system.update(&mut graph, 1.0);
        assert_relative_eq!(graph.get(node).unwrap().transform.scale.z, 2.0, epsilon = 1e-5);
        system.update(&mut graph, 0.5);
        assert_relative_eq!(graph.get(node).unwrap().transform.scale.z, 1.5, epsilon = 1e-5);
        system.update(&mut graph, 1.0);
        assert_relative_eq!(graph.get(node).unwrap().transform.scale.z, 1.0, epsilon = 1e-5);
        assert!(system.is_empty());
    }

    #[test]
    fn test_endless_repeat_keeps_running() {
        let mut graph = SceneGraph::new();
        let node = graph.add_to_content(Node::group("n"));
        let mut system = AnimationSystem::new();
        let mut s = spec("rotation.y", 1.0, 1.0);
        s.repeat = -1;
        system.add(node, &EffectDescriptor::Animation(s));
        for _ in 0..10 {
            system.update(&mut graph, 0.7);
        }
        assert_eq!(system.len(), 1);
        let removed = graph.remove(node);
        system.remove_nodes(&removed);
        assert!(system.is_empty());
    }

    #[test]
    fn test_sequential_timeline_offsets_children() {
        let mut graph = SceneGraph::new();
        let node = graph.add_to_content(Node::group("n"));
        let mut system = AnimationSystem::new();
        let timeline = EffectDescriptor::Timeline {
            children: vec![
                EffectDescriptor::Animation(spec("position.x", 1.0, 1.0)),
                EffectDescriptor::Animation(spec("position.y", 1.0, 1.0)),
            ],
            sequence: true,
        };
        assert_eq!(system.add(node, &timeline), 2);
        system.update(&mut graph, 0.5);
        let p = graph.get(node).unwrap().transform.position;
        assert_relative_eq!(p.x, 0.5, epsilon = 1e-5);
        assert_eq!(p.y, 0.0);
        system.update(&mut graph, 1.0);
        let p = graph.get(node).unwrap().transform.position;
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(p.y, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_parallel_timeline_runs_together() {
        let mut graph = SceneGraph::new();
        let node = graph.add_to_content(Node::group("n"));
        let mut system = AnimationSystem::new();
        let timeline = EffectDescriptor::Timeline {
            children: vec![
                EffectDescriptor::Animation(spec("position.x", 1.0, 1.0)),
                EffectDescriptor::Animation(spec("position.z", -1.0, 1.0)),
            ],
            sequence: false,
        };
        system.add(node, &timeline);
        system.update(&mut graph, 0.5);
        let p = graph.get(node).unwrap().transform.position;
        assert_relative_eq!(p.x, 0.5, epsilon = 1e-5);
        assert_relative_eq!(p.z, -0.5, epsilon = 1e-5);
    }
}
