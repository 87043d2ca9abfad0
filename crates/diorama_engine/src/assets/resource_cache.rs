//! Session-owned asset cache
//!
//! Each asset is fetched and decoded at most once per resolved URL. The
//! cache keeps the decoded original behind an `Arc` and hands consumers their
//! own copy: models are deep-cloned so parts can be re-tinted freely, while
//! textures and raw blobs are immutable and shared.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::fetcher::{resolve_url, AssetFetcher};
use super::image_loader::ImageData;
use super::obj_loader::{ModelAsset, ObjLoader};
use super::AssetError;
use crate::render::Texture;

/// Hit and miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests served from the cache
    pub hits: usize,
    /// Requests that fetched and decoded
    pub misses: usize,
    /// Cached URLs
    pub entries: usize,
}

/// Thread-safe map from resolved URL to decoded asset
struct Store<T> {
    entries: RwLock<HashMap<String, Arc<T>>>,
}

impl<T> Store<T> {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn get(&self, key: &str) -> Option<Arc<T>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Keep the first decoded value if two loads raced
    fn insert(&self, key: String, value: Arc<T>) -> Arc<T> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(entries.entry(key).or_insert(value))
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// Asset cache shared by the loader, effects and the session
pub struct ResourceCache {
    fetcher: Arc<dyn AssetFetcher>,
    base_url: String,
    models: Store<ModelAsset>,
    textures: Store<Texture>,
    blobs: Store<Vec<u8>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl ResourceCache {
    /// Create a cache reading through `fetcher`, prefixing relative URLs with `base_url`
    pub fn new(fetcher: Arc<dyn AssetFetcher>, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
            models: Store::new(),
            textures: Store::new(),
            blobs: Store::new(),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Prefix for relative URLs
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Cache key for a document URL
    pub fn resolve(&self, url: &str) -> String {
        resolve_url(&self.base_url, url)
    }

    /// Load a model; the returned copy is independent of the cached original
    ///
    /// # Errors
    /// Fetch or OBJ decode failures. Failures are not cached.
    pub fn load_model(&self, url: &str) -> Result<ModelAsset, AssetError> {
        let shared = self.get_or_load(&self.models, url, |bytes| {
            Ok(ObjLoader::parse(&bytes)?)
        })?;
        Ok(ModelAsset::clone(&shared))
    }

    /// Load and decode an image
    pub fn load_texture(&self, url: &str) -> Result<Arc<Texture>, AssetError> {
        self.get_or_load(&self.textures, url, |bytes| {
            let image = ImageData::from_bytes(&bytes)?;
            Ok(Texture::new(image.width, image.height, image.data))
        })
    }

    /// Load raw bytes (fonts, scene documents)
    pub fn load_bytes(&self, url: &str) -> Result<Arc<Vec<u8>>, AssetError> {
        self.get_or_load(&self.blobs, url, Ok)
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::SeqCst),
            misses: self.misses.load(Ordering::SeqCst),
            entries: self.models.len() + self.textures.len() + self.blobs.len(),
        }
    }

    /// Drop every cached asset
    pub fn clear(&self) {
        self.models.clear();
        self.textures.clear();
        self.blobs.clear();
    }

    fn get_or_load<T>(
        &self,
        store: &Store<T>,
        url: &str,
        decode: impl FnOnce(Vec<u8>) -> Result<T, AssetError>,
    ) -> Result<Arc<T>, AssetError> {
        let key = self.resolve(url);
        if let Some(hit) = store.get(&key) {
            self.hits.fetch_add(1, Ordering::SeqCst);
            return Ok(hit);
        }

        self.misses.fetch_add(1, Ordering::SeqCst);
        log::debug!("Cache miss for {}", key);
        let bytes = self.fetcher.fetch(&key)?;
        let decoded = decode(bytes).map_err(|e| {
            log::warn!("Failed to decode {}: {}", key, e);
            e
        })?;
        Ok(store.insert(key, Arc::new(decoded)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryFetcher;
    use crate::foundation::color::Color;

    const TRIANGLE: &str = "o Tri\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";

    fn cache_with(fetcher: &Arc<MemoryFetcher>, base: &str) -> ResourceCache {
        ResourceCache::new(Arc::clone(fetcher) as Arc<dyn AssetFetcher>, base)
    }

    #[test]
    fn test_model_fetched_once_per_url() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("assets/tri.obj", TRIANGLE.as_bytes().to_vec());
        let cache = cache_with(&fetcher, "assets/");

        let a = cache.load_model("tri.obj").unwrap();
        let b = cache.load_model("tri.obj").unwrap();
        let c = cache.load_model("assets/tri.obj").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(fetcher.fetch_count(), 1);

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_model_copies_are_independent() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("tri.obj", TRIANGLE.as_bytes().to_vec());
        let cache = cache_with(&fetcher, "");

        let mut first = cache.load_model("tri.obj").unwrap();
        first.parts[0].material.color = Color::new(1.0, 0.0, 0.0);
        first.parts[0].mesh.vertices[0].position = [9.0, 9.0, 9.0];

        let second = cache.load_model("tri.obj").unwrap();
        assert_eq!(second.parts[0].material.color, Color::WHITE);
        assert_eq!(second.parts[0].mesh.vertices[0].position, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let fetcher = Arc::new(MemoryFetcher::new());
        let cache = cache_with(&fetcher, "");
        assert!(matches!(cache.load_model("late.obj"), Err(AssetError::NotFound(_))));

        fetcher.insert("late.obj", TRIANGLE.as_bytes().to_vec());
        assert!(cache.load_model("late.obj").is_ok());
        assert_eq!(fetcher.fetch_count(), 2);
    }

    #[test]
    fn test_bad_model_data_reports_invalid() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("bad.obj", b"v 0 0 0\n".to_vec());
        let cache = cache_with(&fetcher, "");
        assert!(matches!(cache.load_model("bad.obj"), Err(AssetError::InvalidData(_))));
    }

    #[test]
    fn test_bytes_shared_and_clear() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("font.json", b"{}".to_vec());
        let cache = cache_with(&fetcher, "");
        let a = cache.load_bytes("font.json").unwrap();
        let b = cache.load_bytes("font.json").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        cache.clear();
        assert_eq!(cache.stats().entries, 0);
        cache.load_bytes("font.json").unwrap();
        assert_eq!(fetcher.fetch_count(), 2);
    }
}
