//! # Diorama Engine
//!
//! An interactive 3D diorama composition and viewing engine.
//!
//! ## Features
//!
//! - **Scene Documents**: JSON scenes with primitives, models, images, text,
//!   templates, effects and animations, loaded progressively and saved back
//! - **Resource Cache**: Shared asset fetching with de-duplicated in-flight loads
//! - **Effects**: Snow, bubbles, scale pulses, signal interference, toon
//!   outlines and selective bloom attached per node
//! - **Editing**: Id-buffer picking, translate/rotate gizmo, camera tours
//! - **Rendering**: Software rasterizer with a selective bloom composite
//! - **AR Placement**: Native hit-test sessions or webcam fallback with
//!   orientation sensors and square markers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use diorama_engine::prelude::*;
//!
//! struct Counter(usize);
//!
//! impl Application for Counter {
//!     fn on_frame(&mut self, _engine: &mut Engine, _delta_time: f32) -> Result<(), AppError> {
//!         self.0 += 1;
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = Arc::new(ResourceCache::new(Arc::new(FileFetcher::new("assets")), ""));
//!     let mut engine = Engine::new(EngineConfig::default(), cache);
//!     engine.load_json(r#"{ "objects": [{ "type": "box" }] }"#, None)?;
//!     engine.run(&mut Counter(0), 60, 1.0 / 60.0)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod config;
pub mod assets;
pub mod spatial;
pub mod scene;
pub mod render;
pub mod effects;
pub mod input;
pub mod editor;
pub mod controls;
pub mod ar;

mod application;
mod engine;

pub use application::{AppError, AppEvent, Application};
pub use engine::{Engine, EngineError, PointerOutcome};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        AppError, AppEvent, Application, Engine, EngineError, PointerOutcome,
        ar::{ArBackend, ArError, ArPlatforms, PlacementMode},
        assets::{AssetFetcher, FileFetcher, MemoryFetcher, ResourceCache},
        config::{Config, EngineConfig},
        effects::{AddMode, EffectKind},
        foundation::{
            color::Color,
            math::{Quat, Transform, Vec3},
        },
        input::PointerEvent,
        render::Camera,
        scene::{CameraState, LoadReport, NodeFlags, NodeId, Options, SceneDocument},
    };
}
