//! Visual effects attached to scene nodes
//!
//! Effects are created through an [`EffectRegistry`] mapping each
//! [`EffectKind`] to a factory, and driven by the [`EffectManager`], which
//! keeps the node-to-effects table on its side so nodes never carry engine
//! bookkeeping.
//!
//! Every effect follows the same lifecycle: `init` binds it to its target,
//! `update` advances it by a frame delta (a zero delta changes nothing), and
//! `dispose` undoes everything `init` did. Disposing twice is a no-op.

pub mod registry;
pub mod manager;
pub mod snow;
pub mod bubble;
pub mod scale_animate;
pub mod signal_interference;
pub mod bloom;
pub mod toon_outline;

pub use registry::{EffectFactory, EffectRegistry};
pub use manager::{AddMode, EffectId, EffectManager};
pub use snow::SnowEffect;
pub use bubble::BubbleEffect;
pub use scale_animate::ScaleAnimate;
pub use signal_interference::SignalInterferenceEffect;
pub use bloom::BloomEffect;
pub use toon_outline::ToonOutlineEffect;

use std::fmt;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::BloomConfig;
use crate::render::Camera;
use crate::scene::{NodeId, Options, SceneGraph};

/// Effect errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EffectError {
    /// No factory registered for the kind
    #[error("Unknown effect kind: {0}")]
    UnknownKind(String),

    /// The target already has an effect of this kind
    #[error("{kind} already attached to {target:?}")]
    AlreadyAttached {
        /// Effect kind name
        kind: String,
        /// Target node
        target: NodeId,
    },

    /// The target node does not exist
    #[error("Effect target {0:?} does not exist")]
    MissingTarget(NodeId),

    /// Options could not be decoded
    #[error("Invalid options for {kind}: {reason}")]
    InvalidOptions {
        /// Effect kind name
        kind: String,
        /// Decode failure
        reason: String,
    },
}

/// Effect kinds known to the registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EffectKind {
    /// Falling snow particles
    Snow,
    /// Rising bubbles
    Bubble,
    /// Ping-pong uniform scale
    ScaleAnimate,
    /// Scanline interference material
    SignalInterference,
    /// Selective bloom on the target subtree
    Bloom,
    /// Back-face hull outlines around meshes
    ToonOutline,
    /// Kind registered by the embedding application
    Custom(String),
}

impl EffectKind {
    /// Document name of the kind
    pub fn name(&self) -> &str {
        match self {
            Self::Snow => "SnowEffect",
            Self::Bubble => "BubbleEffect",
            Self::ScaleAnimate => "ScaleAnimate",
            Self::SignalInterference => "SignalInterferenceEffect",
            Self::Bloom => "BloomEffect",
            Self::ToonOutline => "ToonOutlineEffect",
            Self::Custom(name) => name,
        }
    }

    /// Parse a document name; anything unrecognised becomes [`EffectKind::Custom`]
    pub fn from_name(name: &str) -> Self {
        match name {
            "SnowEffect" => Self::Snow,
            "BubbleEffect" => Self::Bubble,
            "ScaleAnimate" => Self::ScaleAnimate,
            "SignalInterferenceEffect" => Self::SignalInterference,
            "BloomEffect" => Self::Bloom,
            "ToonOutlineEffect" => Self::ToonOutline,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What an effect may touch while running
pub struct EffectContext<'a> {
    /// Live scene
    pub graph: &'a mut SceneGraph,
    /// Active camera
    pub camera: &'a Camera,
    /// Bloom parameters of the render pipeline
    pub bloom: &'a mut BloomConfig,
    /// Render target height in pixels
    pub viewport_height: u32,
}

/// A visual effect bound to one node
pub trait Effect {
    /// Kind of this effect
    fn kind(&self) -> EffectKind;

    /// Node the effect is bound to
    fn target(&self) -> NodeId;

    /// Options it was created with, written back on save
    fn options(&self) -> &Options;

    /// Bind to the target and create any resources
    ///
    /// # Errors
    /// [`EffectError::MissingTarget`] when the target is gone.
    fn init(&mut self, ctx: &mut EffectContext<'_>) -> Result<(), EffectError>;

    /// Advance by `delta` seconds; `delta <= 0` must not change anything
    fn update(&mut self, ctx: &mut EffectContext<'_>, delta: f32);

    /// Release resources and restore the target; idempotent
    fn dispose(&mut self, ctx: &mut EffectContext<'_>);

    /// Whether `dispose` has run
    fn is_disposed(&self) -> bool;
}

/// Decode typed parameters from a loose options map
pub(crate) fn parse_params<T: DeserializeOwned + Default>(kind: &EffectKind, options: &Options) -> T {
    match serde_json::from_value(serde_json::Value::Object(options.clone())) {
        Ok(params) => params,
        Err(e) => {
            log::warn!("Ignoring invalid options for {}: {}", kind, e);
            T::default()
        }
    }
}

/// Whether the options ask to replace an existing effect of the same kind
pub(crate) fn wants_replace(options: &Options) -> bool {
    ["replace", "onlyOne"]
        .iter()
        .any(|key| options.get(*key).and_then(serde_json::Value::as_bool).unwrap_or(false))
}
