//! Asset management system
//!
//! Assets are fetched by URL through an [`AssetFetcher`], decoded once, and
//! kept in a session-owned [`ResourceCache`]. Every request hands out an
//! independent copy, so per-node tinting or material swaps never reach the
//! cached original. [`AsyncLoader`] runs fetches off the frame thread.

pub mod fetcher;
pub mod obj_loader;
pub mod image_loader;
pub mod resource_cache;
pub mod async_loader;

pub use fetcher::{resolve_url, AssetFetcher, FileFetcher, MemoryFetcher};
pub use obj_loader::{ModelAsset, ModelPart, ObjError, ObjLoader};
pub use image_loader::ImageData;
pub use resource_cache::{CacheStats, ResourceCache};
pub use async_loader::{AssetRequest, AssetTicket, AsyncLoader, Completion, LoadedAsset};

use thiserror::Error;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// Asset not found
    #[error("Asset not found: {0}")]
    NotFound(String),

    /// Failed to load asset
    #[error("Failed to load asset: {0}")]
    LoadFailed(String),

    /// Invalid asset data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Unsupported asset format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The background loader has been shut down
    #[error("Loader closed")]
    LoaderClosed,

    /// IO error during asset loading
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<ObjError> for AssetError {
    fn from(error: ObjError) -> Self {
        Self::InvalidData(error.to_string())
    }
}
