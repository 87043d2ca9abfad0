//! Byte sources for assets

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use super::AssetError;

/// Source of raw asset bytes
///
/// Implementations must be callable from the background loader thread.
pub trait AssetFetcher: Send + Sync {
    /// Fetch the bytes behind a fully resolved URL
    ///
    /// # Errors
    /// [`AssetError::NotFound`] or an IO error when the asset is unavailable.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError>;
}

/// Prepend the asset base prefix to relative paths
///
/// Absolute URLs (`scheme://...`), root-relative paths and `data:` URIs are
/// returned unchanged.
pub fn resolve_url(base: &str, url: &str) -> String {
    let is_absolute = url.contains("://") || url.starts_with('/') || url.starts_with("data:");
    if is_absolute || base.is_empty() || url.starts_with(base) {
        return url.to_string();
    }
    match (base.ends_with('/'), url.starts_with('/')) {
        (true, true) => format!("{}{}", base, &url[1..]),
        (false, false) => format!("{base}/{url}"),
        _ => format!("{base}{url}"),
    }
}

/// Reads assets from a directory on disk
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    /// Serve files relative to `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetFetcher for FileFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        let relative = url.strip_prefix("file://").unwrap_or(url);
        let path = if std::path::Path::new(relative).is_absolute() {
            PathBuf::from(relative)
        } else {
            self.root.join(relative)
        };
        if !path.exists() {
            return Err(AssetError::NotFound(path.display().to_string()));
        }
        log::debug!("Reading asset {}", path.display());
        Ok(std::fs::read(path)?)
    }
}

/// In-memory asset table, for embedded content and tests
#[derive(Default)]
pub struct MemoryFetcher {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
}

impl MemoryFetcher {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bytes under a URL
    pub fn insert(&self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), bytes.into());
    }

    /// Number of fetches served or refused so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl AssetFetcher for MemoryFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url_prefixes_relative_paths() {
        assert_eq!(resolve_url("https://cdn.example/", "models/a.obj"), "https://cdn.example/models/a.obj");
        assert_eq!(resolve_url("https://cdn.example", "models/a.obj"), "https://cdn.example/models/a.obj");
        assert_eq!(resolve_url("assets/", "a.png"), "assets/a.png");
        assert_eq!(resolve_url("", "a.png"), "a.png");
    }

    #[test]
    fn test_resolve_url_keeps_absolute_urls() {
        assert_eq!(resolve_url("https://cdn.example/", "https://other/a.obj"), "https://other/a.obj");
        assert_eq!(resolve_url("https://cdn.example/", "/local/a.obj"), "/local/a.obj");
        assert_eq!(
            resolve_url("https://cdn.example/", "https://cdn.example/a.obj"),
            "https://cdn.example/a.obj"
        );
    }

    #[test]
    fn test_memory_fetcher_counts_requests() {
        let fetcher = MemoryFetcher::new();
        fetcher.insert("a", b"abc".to_vec());
        assert_eq!(fetcher.fetch("a").unwrap(), b"abc");
        assert!(matches!(fetcher.fetch("b"), Err(AssetError::NotFound(_))));
        assert_eq!(fetcher.fetch_count(), 2);
    }

    #[test]
    fn test_file_fetcher_reads_relative_paths() {
        let dir = std::env::temp_dir().join(format!("diorama_fetch_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("hello.txt"), b"hi").unwrap();
        let fetcher = FileFetcher::new(&dir);
        assert_eq!(fetcher.fetch("hello.txt").unwrap(), b"hi");
        assert!(matches!(fetcher.fetch("missing.txt"), Err(AssetError::NotFound(_))));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
