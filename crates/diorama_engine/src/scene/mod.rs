//! Scene graph, document model, loading and saving
//!
//! A session builds its live scene once from a [`SceneDocument`] and can write
//! it back with [`save_document`]. Loading is sequential in document order
//! and tolerant of bad entries; see [`loader`].

pub mod document;
pub mod node;
pub mod scene_graph;
pub mod animation;
pub mod loader;
pub mod serializer;

pub use document::{
    AnimationSpec, CameraState, ControlsLimits, EffectDescriptor, ModelObject, ObjectKind, Options,
    ParsedDocument, SceneDocument, SceneObject, SkippedObject,
};
pub use node::{Geometry, Node, NodeFlags, NodeId, NodeTag, PointCloud, Shape};
pub use scene_graph::{SceneGraph, WorldNode};
pub use animation::{AnimProperty, AnimationSystem, EaseDirection, Easing};
pub use loader::{
    LoadContext, LoadJob, LoadReport, LoadStatus, ProgressFn, SceneLoader, TemplateBody, TemplateRecord,
    TemplateSource,
};
pub use serializer::{save_document, DocumentMeta};

use thiserror::Error;

use crate::assets::AssetError;
use crate::effects::EffectError;

/// Scene loading and saving errors
#[derive(Error, Debug)]
pub enum SceneError {
    /// The document could not be read at the top level
    #[error("Document parse error: {0}")]
    Parse(String),

    /// The document could not be encoded
    #[error("Document serialization error: {0}")]
    Serialize(String),

    /// An asset needed by an object failed to load
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    /// An effect named by an object could not be attached
    #[error("Effect error: {0}")]
    Effect(#[from] EffectError),

    /// A template could not be fetched or decoded
    #[error("Template {id} unavailable: {reason}")]
    Template {
        /// Template record id
        id: i64,
        /// Failure description
        reason: String,
    },

    /// The session was disposed while the load was running
    #[error("Load cancelled: session disposed")]
    Cancelled,
}
