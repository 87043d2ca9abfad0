//! # Rendering System
//!
//! A deterministic CPU rasterizer behind a small frame pipeline. The
//! pipeline owns every render target (lit base, bloom mask, blur scratch,
//! composed output, picking ids) and refuses to resize or reuse them while a
//! frame is open.

pub mod camera;
pub mod framebuffer;
pub mod lighting;
pub mod material;
pub mod mesh;
pub mod pipeline;
pub mod rasterizer;

pub use camera::Camera;
pub use framebuffer::{ColorTarget, Framebuffer, IdTarget, Rect};
pub use lighting::{Light, LightingEnvironment};
pub use material::{Material, Shading, Side, Texture};
pub use mesh::{Mesh, Vertex};
pub use pipeline::{FrameOptions, FrameStats, MaterialSwap, RenderPipeline};
pub use rasterizer::{Fragment, RasterState};

use thiserror::Error;

/// Rendering errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A render target was touched while a frame is in progress
    #[error("Render targets busy: {0} requested mid-frame")]
    TargetBusy(&'static str),

    /// Targets have been released by teardown
    #[error("Render targets released")]
    Released,

    /// Zero-sized viewport
    #[error("Invalid target size {width}x{height}")]
    InvalidSize {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
    },
}
